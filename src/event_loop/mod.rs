//! The reactor core: timer heap, per-descriptor waiter queues, and the
//! selector, driven by [`EventLoop::run`].
//!
//! The loop is single-threaded and cooperative. Tasks suspend only at
//! explicit awaits ([`await_read`](crate::await_read),
//! [`await_write`](crate::await_write), [`sleep_for`](crate::sleep_for), or
//! awaiting another [`Task`](crate::Task)); between suspensions a task runs
//! until its next awaitable boundary. Each loop iteration waits on the
//! selector no longer than the earliest timer deadline, then runs every due
//! timer before delivering any readiness wake, so a burst of I/O can never
//! starve an expired timer.

mod context;
mod file;
mod future;
mod schedulable;
mod scheduled;

pub use file::FileOps;
pub use future::{AwaitRead, AwaitWrite, Sleep};
pub use schedulable::{AsFunction, AsFuture, AsFutureFn, AwaitSchedulable, Schedulable};

use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::sync::Arc;
use std::task::Waker;

use crate::error::{Error, Result};
use crate::selector::{EventData, Events, Selector};
use crate::time::{Duration, Instant};
use file::FileInternal;
use scheduled::{ReadyQueue, ScheduledHandle, ScheduledTask};

struct Inner {
    max_fileno: usize,
    /// Sparse per-descriptor table; residency in the map is what "has ever
    /// been used" means for a descriptor number.
    files: RefCell<HashMap<RawFd, FileInternal>>,
    selector: RefCell<Selector>,
    /// Min-heap of scheduled work, ordered by deadline.
    scheduled: RefCell<BinaryHeap<Reverse<ScheduledHandle>>>,
    ready: Arc<ReadyQueue>,
}

/// The event loop. At most one exists per process at a time; constructing
/// a second while one is alive fails with
/// [`Error::MultipleEventLoops`](crate::Error::MultipleEventLoops).
///
/// The loop does not own the descriptors it tracks: [`add_fd`] registers
/// interest and [`del_fd`] removes it, but closing remains the caller's
/// business.
///
/// # Example
///
/// ```no_run
/// use eddy::{EventLoop, sleep_for};
/// use eddy::time::Duration;
///
/// let event_loop = EventLoop::new().unwrap();
/// event_loop.schedule(
///     async {
///         sleep_for(Duration::from_millis(10)).await;
///         println!("ten milliseconds later");
///     },
///     Duration::ZERO,
/// );
/// event_loop.run().unwrap();
/// ```
///
/// [`add_fd`]: EventLoop::add_fd
/// [`del_fd`]: EventLoop::del_fd
pub struct EventLoop {
    handle: Handle,
}

/// A cloneable reference to the event loop, usable from tasks running on
/// it. Obtained from [`EventLoop::handle`] or ambiently via
/// [`Handle::current`].
#[derive(Clone)]
pub struct Handle {
    inner: Rc<Inner>,
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle").finish_non_exhaustive()
    }
}

impl EventLoop {
    /// Creates the loop with the descriptor bound taken from the process's
    /// hard `RLIMIT_NOFILE` limit.
    pub fn new() -> Result<Self> {
        Self::with_max_fd(proc_max_fileno()?)
    }

    /// Creates the loop accepting descriptors in `0..max_fileno`.
    pub fn with_max_fd(max_fileno: usize) -> Result<Self> {
        if max_fileno == 0 {
            return Err(Error::InvalidMaxFd);
        }
        if !context::claim() {
            return Err(Error::MultipleEventLoops);
        }

        let selector = match Selector::new() {
            Ok(selector) => selector,
            Err(error) => {
                context::release();
                return Err(error);
            }
        };

        let handle = Handle {
            inner: Rc::new(Inner {
                max_fileno,
                files: RefCell::new(HashMap::new()),
                selector: RefCell::new(selector),
                scheduled: RefCell::new(BinaryHeap::new()),
                ready: Arc::new(ReadyQueue::new()),
            }),
        };
        context::install(handle.clone());
        log::debug!("event loop created, max_fileno={max_fileno}");

        Ok(Self { handle })
    }

    /// Whether a loop currently exists anywhere in the process.
    pub fn exists() -> bool {
        context::exists()
    }

    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    /// See [`Handle::run`].
    pub fn run(&self) -> Result<()> {
        self.handle.run()
    }

    /// See [`Handle::schedule`].
    pub fn schedule<Route, S: Schedulable<Route>>(&self, schedulable: S, delay: Duration) {
        self.handle.schedule(schedulable, delay);
    }

    /// See [`Handle::schedule_i`].
    pub fn schedule_i(&self, function: fn(), delay: Duration) {
        self.handle.schedule_i(function, delay);
    }

    /// See [`Handle::schedule_a`].
    pub fn schedule_a<Route, S: AwaitSchedulable<Route>>(&self, schedulable: S, delay: Duration) {
        self.handle.schedule_a(schedulable, delay);
    }

    /// See [`Handle::add_fd`].
    pub fn add_fd(&self, fd: RawFd, ops: FileOps) -> Result<()> {
        self.handle.add_fd(fd, ops)
    }

    /// See [`Handle::del_fd`].
    pub fn del_fd(&self, fd: RawFd) -> Result<()> {
        self.handle.del_fd(fd)
    }

    /// See [`Handle::await_read`].
    pub fn await_read(&self, fd: RawFd) -> AwaitRead {
        self.handle.await_read(fd)
    }

    /// See [`Handle::await_write`].
    pub fn await_write(&self, fd: RawFd) -> AwaitWrite {
        self.handle.await_write(fd)
    }

    /// See [`Handle::sleep_for`].
    pub fn sleep_for(&self, delay: Duration) -> Sleep {
        self.handle.sleep_for(delay)
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        context::release();
        log::debug!("event loop destroyed");
    }
}

impl Handle {
    /// The handle of the loop owned by this thread.
    ///
    /// # Panics
    ///
    /// Panics when no event loop exists on this thread; use
    /// [`try_current`](Handle::try_current) for the non-panicking variant.
    pub fn current() -> Handle {
        context::current().expect("bad event loop access: no event loop on this thread")
    }

    pub fn try_current() -> Option<Handle> {
        context::current()
    }

    /// Schedules a function pointer, a future, or a future-returning
    /// callable to start after `delay`. Dispatches to
    /// [`schedule_i`](Handle::schedule_i) or
    /// [`schedule_a`](Handle::schedule_a) at compile time.
    pub fn schedule<Route, S: Schedulable<Route>>(&self, schedulable: S, delay: Duration) {
        schedulable.schedule_on(self, delay);
    }

    /// Schedules a plain function to run after `delay`.
    pub fn schedule_i(&self, function: fn(), delay: Duration) {
        let time = Instant::monotonic() + delay;
        self.inner
            .scheduled
            .borrow_mut()
            .push(Reverse(ScheduledHandle::function(function, time)));
    }

    /// Schedules an awaitable as a detached task whose first resume happens
    /// after `delay`. The task's future is dropped at completion; a panic
    /// escaping it is logged and terminates only that task.
    pub fn schedule_a<Route, S: AwaitSchedulable<Route>>(&self, schedulable: S, delay: Duration) {
        let task = ScheduledTask::new(schedulable.into_scheduled(), self.inner.ready.clone());
        let time = Instant::monotonic() + delay;
        self.inner
            .scheduled
            .borrow_mut()
            .push(Reverse(ScheduledHandle::task(task, time)));
    }

    /// Registers `fd` with the given capabilities.
    ///
    /// The descriptor must be in range, not currently registered, and stays
    /// owned by the caller. Stale waiters from a previous registration of
    /// the same descriptor number are discarded.
    pub fn add_fd(&self, fd: RawFd, ops: FileOps) -> Result<()> {
        self.ensure_fd_in_range(fd)?;

        let mut files = self.inner.files.borrow_mut();
        if files.get(&fd).is_some_and(|file| file.valid) {
            return Err(Error::AlreadyRegistered { fd });
        }

        let mut events = Events::NONE;
        if ops.contains(FileOps::READABLE) {
            events |= Events::INPUT;
        }
        if ops.contains(FileOps::WRITABLE) {
            events |= Events::OUTPUT;
        }
        self.inner.selector.borrow_mut().add(fd, events)?;

        let file = files.entry(fd).or_insert_with(FileInternal::new);
        file.ops = ops;
        file.valid = true;
        file.reading.clear();
        file.writing.clear();
        log::trace!("registered fd {fd}");

        Ok(())
    }

    /// Deregisters `fd` from the selector. The descriptor is not closed.
    ///
    /// Waiters still queued on the descriptor are not woken; they stay
    /// parked until the descriptor number is registered again, which
    /// discards them.
    pub fn del_fd(&self, fd: RawFd) -> Result<()> {
        self.ensure_fd_in_range(fd)?;

        let mut files = self.inner.files.borrow_mut();
        let file = files
            .get_mut(&fd)
            .filter(|file| file.valid)
            .ok_or(Error::NotRegistered { fd })?;

        self.inner.selector.borrow_mut().del(fd)?;
        file.valid = false;
        log::trace!("deregistered fd {fd}");

        Ok(())
    }

    /// Awaits readability of `fd`. Fails without suspending when `fd` is
    /// not registered readable.
    pub fn await_read(&self, fd: RawFd) -> AwaitRead {
        AwaitRead::new(fd)
    }

    /// Awaits writability of `fd`. Fails without suspending when `fd` is
    /// not registered writable.
    pub fn await_write(&self, fd: RawFd) -> AwaitWrite {
        AwaitWrite::new(fd)
    }

    /// Suspends the awaiting task until `delay` has elapsed on the
    /// monotonic clock.
    pub fn sleep_for(&self, delay: Duration) -> Sleep {
        Sleep::new(delay)
    }

    /// Drives the loop until no work is pending: the timer heap is empty
    /// and no descriptor is registered.
    ///
    /// Readiness events are delivered to whatever record sits at the event's
    /// descriptor number, so a descriptor recycled within one iteration can
    /// observe a wake meant for its predecessor.
    pub fn run(&self) -> Result<()> {
        let mut events: Vec<EventData> = Vec::with_capacity(512);

        loop {
            self.run_ready();

            let timeout = self.next_timeout();
            if timeout.is_none() && self.inner.selector.borrow().len() == 0 {
                break;
            }

            events.clear();
            self.inner.selector.borrow_mut().wait(&mut events, timeout)?;

            // Every due timer runs before any readiness wake is delivered.
            let now = Instant::monotonic();
            while let Some(handle) = self.pop_due(now) {
                handle.run();
            }
            self.run_ready();

            for ev in &events {
                if ev.flags.contains(Events::INPUT) {
                    self.wake_direction(ev.fd, Direction::Read);
                }
                if ev.flags.contains(Events::OUTPUT) {
                    self.wake_direction(ev.fd, Direction::Write);
                }
            }
        }

        Ok(())
    }

    /// Polls woken tasks in FIFO order until none remain.
    fn run_ready(&self) {
        while let Some(task) = self.inner.ready.pop() {
            task.poll();
        }
    }

    /// Time until the earliest deadline, clamped at zero; `None` when the
    /// heap is empty.
    fn next_timeout(&self) -> Option<Duration> {
        let scheduled = self.inner.scheduled.borrow();
        let Reverse(next) = scheduled.peek()?;

        let remaining = next.time() - Instant::monotonic();
        Some(if remaining.is_negative() {
            Duration::ZERO
        } else {
            remaining
        })
    }

    fn pop_due(&self, now: Instant) -> Option<ScheduledHandle> {
        let mut scheduled = self.inner.scheduled.borrow_mut();
        match scheduled.peek() {
            Some(Reverse(next)) if next.time() <= now => scheduled.pop().map(|Reverse(h)| h),
            _ => None,
        }
    }

    /// Drains one direction's waiter queue as a snapshot and wakes it FIFO,
    /// then runs the woken tasks. Draining first means a task that
    /// re-awaits the same descriptor while resuming parks itself for the
    /// next readiness wake instead of being woken twice by this one.
    fn wake_direction(&self, fd: RawFd, direction: Direction) {
        let awaiting: VecDeque<Waker> = {
            let mut files = self.inner.files.borrow_mut();
            match files.get_mut(&fd) {
                Some(file) => match direction {
                    Direction::Read => std::mem::take(&mut file.reading),
                    Direction::Write => std::mem::take(&mut file.writing),
                },
                None => return,
            }
        };

        for waker in awaiting {
            waker.wake();
        }
        self.run_ready();
    }

    pub(crate) fn push_read_waker(&self, fd: RawFd, waker: Waker) -> Result<()> {
        let mut files = self.inner.files.borrow_mut();
        let file = self.registered_file(&mut files, fd)?;
        if !file.ops.contains(FileOps::READABLE) {
            return Err(Error::NotReadable { fd });
        }
        file.reading.push_back(waker);

        Ok(())
    }

    pub(crate) fn push_write_waker(&self, fd: RawFd, waker: Waker) -> Result<()> {
        let mut files = self.inner.files.borrow_mut();
        let file = self.registered_file(&mut files, fd)?;
        if !file.ops.contains(FileOps::WRITABLE) {
            return Err(Error::NotWritable { fd });
        }
        file.writing.push_back(waker);

        Ok(())
    }

    pub(crate) fn push_timer_waker(&self, deadline: Instant, waker: Waker) {
        self.inner
            .scheduled
            .borrow_mut()
            .push(Reverse(ScheduledHandle::waker(waker, deadline)));
    }

    fn ensure_fd_in_range(&self, fd: RawFd) -> Result<()> {
        if fd < 0 || fd as usize >= self.inner.max_fileno {
            return Err(Error::OutOfRangeFd { fd });
        }

        Ok(())
    }

    fn registered_file<'a>(
        &self,
        files: &'a mut HashMap<RawFd, FileInternal>,
        fd: RawFd,
    ) -> Result<&'a mut FileInternal> {
        self.ensure_fd_in_range(fd)?;
        files
            .get_mut(&fd)
            .filter(|file| file.valid)
            .ok_or(Error::NotRegistered { fd })
    }
}

enum Direction {
    Read,
    Write,
}

fn proc_max_fileno() -> Result<usize> {
    let mut rlim = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut rlim) } == -1 {
        return Err(Error::os("getrlimit"));
    }

    Ok(rlim.rlim_max as usize)
}

/// Schedules on the current loop. See [`Handle::schedule`].
pub fn schedule<Route, S: Schedulable<Route>>(schedulable: S, delay: Duration) {
    Handle::current().schedule(schedulable, delay);
}

/// Schedules a plain function on the current loop. See
/// [`Handle::schedule_i`].
pub fn schedule_i(function: fn(), delay: Duration) {
    Handle::current().schedule_i(function, delay);
}

/// Schedules an awaitable on the current loop. See [`Handle::schedule_a`].
pub fn schedule_a<Route, S: AwaitSchedulable<Route>>(schedulable: S, delay: Duration) {
    Handle::current().schedule_a(schedulable, delay);
}

/// Awaits readability on the current loop. See [`Handle::await_read`].
pub fn await_read(fd: RawFd) -> AwaitRead {
    Handle::current().await_read(fd)
}

/// Awaits writability on the current loop. See [`Handle::await_write`].
pub fn await_write(fd: RawFd) -> AwaitWrite {
    Handle::current().await_write(fd)
}

/// Sleeps on the current loop. See [`Handle::sleep_for`].
pub fn sleep_for(delay: Duration) -> Sleep {
    Handle::current().sleep_for(delay)
}

/// Registers a descriptor with the current loop. See [`Handle::add_fd`].
pub fn add_fd(fd: RawFd, ops: FileOps) -> Result<()> {
    Handle::current().add_fd(fd, ops)
}

/// Deregisters a descriptor from the current loop. See [`Handle::del_fd`].
pub fn del_fd(fd: RawFd) -> Result<()> {
    Handle::current().del_fd(fd)
}
