//! Timer-heap entries, detached tasks, and the ready queue.
//!
//! Wakes never resume anything inline. A waker pushes its task onto the
//! loop's FIFO ready queue and the loop polls from there, so arbitrarily
//! long await chains resume without growing the host stack.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Wake, Waker};

use crate::time::Instant;

/// A unit of work parked in the timer heap until its deadline.
pub(crate) struct ScheduledHandle {
    time: Instant,
    kind: ScheduledKind,
}

enum ScheduledKind {
    /// A plain function, called inline when due.
    Function(fn()),
    /// A suspended waiter; waking it re-queues its task.
    Waker(Waker),
    /// First resume of a detached task.
    Task(Arc<ScheduledTask>),
}

impl ScheduledHandle {
    pub(crate) fn function(f: fn(), time: Instant) -> Self {
        Self {
            time,
            kind: ScheduledKind::Function(f),
        }
    }

    pub(crate) fn waker(waker: Waker, time: Instant) -> Self {
        Self {
            time,
            kind: ScheduledKind::Waker(waker),
        }
    }

    pub(crate) fn task(task: Arc<ScheduledTask>, time: Instant) -> Self {
        Self {
            time,
            kind: ScheduledKind::Task(task),
        }
    }

    pub(crate) fn time(&self) -> Instant {
        self.time
    }

    /// Consumes the handle; each popped entry runs exactly once.
    pub(crate) fn run(self) {
        match self.kind {
            ScheduledKind::Function(f) => f(),
            ScheduledKind::Waker(waker) => waker.wake(),
            ScheduledKind::Task(task) => task.poll(),
        }
    }
}

// Entries compare by deadline only; equal deadlines tie arbitrarily.
impl PartialEq for ScheduledHandle {
    fn eq(&self, other: &ScheduledHandle) -> bool {
        self.time == other.time
    }
}

impl Eq for ScheduledHandle {}

impl PartialOrd for ScheduledHandle {
    fn partial_cmp(&self, other: &ScheduledHandle) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledHandle {
    fn cmp(&self, other: &ScheduledHandle) -> Ordering {
        self.time.cmp(&other.time)
    }
}

/// A detached task adapting a scheduled future.
///
/// The future is dropped as soon as it completes. A panic escaping it is
/// captured, reported through the log, and the task terminates; detached
/// work has no awaiter to re-raise into.
pub(crate) struct ScheduledTask {
    future: Mutex<Option<Pin<Box<dyn Future<Output = ()> + Send>>>>,
    ready: Arc<ReadyQueue>,
}

impl ScheduledTask {
    pub(crate) fn new(
        future: Pin<Box<dyn Future<Output = ()> + Send>>,
        ready: Arc<ReadyQueue>,
    ) -> Arc<Self> {
        Arc::new(Self {
            future: Mutex::new(Some(future)),
            ready,
        })
    }

    pub(crate) fn poll(self: &Arc<Self>) {
        let waker = Waker::from(self.clone());
        let mut cx = Context::from_waker(&waker);

        let mut slot = self.future.lock().unwrap();
        let Some(mut future) = slot.take() else {
            // Already completed; a stale wake.
            return;
        };

        match panic::catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx))) {
            Ok(Poll::Pending) => {
                *slot = Some(future);
            }
            Ok(Poll::Ready(())) => {}
            Err(payload) => {
                log::error!("detached task panicked: {}", panic_message(&payload));
            }
        }
    }
}

impl Wake for ScheduledTask {
    fn wake(self: Arc<Self>) {
        self.ready.push(self.clone());
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.ready.push(self.clone());
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

/// FIFO of tasks woken and waiting to be polled by the loop.
pub(crate) struct ReadyQueue {
    queue: Mutex<VecDeque<Arc<ScheduledTask>>>,
}

impl ReadyQueue {
    pub(crate) fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub(crate) fn push(&self, task: Arc<ScheduledTask>) {
        self.queue.lock().unwrap().push_back(task);
    }

    pub(crate) fn pop(&self) -> Option<Arc<ScheduledTask>> {
        self.queue.lock().unwrap().pop_front()
    }
}
