//! Lazy, move-only handles to suspendable computations.
//!
//! A [`Task`] wraps a future without polling it: the computation starts on
//! the first await, runs cooperatively between suspension points, and its
//! outcome (a value or a captured panic) is recorded in the task itself.
//! Awaiting a completed task yields the stored outcome; awaiting a task
//! that panicked re-raises the panic at the await point, so failures travel
//! up a chain of awaiting tasks the same way values do.
//!
//! Chaining costs no host stack: a parent awaiting a child is resumed
//! through the ordinary waker path when the child's innermost suspension
//! completes.
//!
//! # Example
//!
//! ```no_run
//! use eddy::Task;
//!
//! # async fn example() {
//! let child = Task::new(async { 21 * 2 });
//! assert_eq!(child.await, 42);
//! # }
//! ```

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};

const BROKEN_PROMISE: &str = "broken promise: task detached from its computation";

enum TaskState<T> {
    /// No computation attached: the task was defaulted, moved out of, or
    /// already consumed.
    Empty,
    /// Computation not yet complete; it has either never been polled or is
    /// suspended at an await point.
    Running(Pin<Box<dyn Future<Output = T> + Send>>),
    Value(T),
    Panicked(Box<dyn Any + Send>),
}

/// A suspended computation producing a `T`.
///
/// Construction never runs anything. Ownership is unique: moving a `Task`
/// transfers the computation, and dropping it drops the computation at
/// whatever suspension point it reached.
///
/// # Panics
///
/// Awaiting a task in the empty state panics with a broken-promise message.
pub struct Task<T = ()> {
    state: TaskState<T>,
}

impl<T> Task<T> {
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Task {
            state: TaskState::Running(Box::pin(future)),
        }
    }

    /// A task with nothing attached. Awaiting it is a protocol violation.
    pub fn empty() -> Self {
        Task {
            state: TaskState::Empty,
        }
    }

    /// True when there is nothing left to run: the task is empty or its
    /// computation already finished.
    pub fn is_ready(&self) -> bool {
        !matches!(self.state, TaskState::Running(_))
    }

    /// Observes completion without consuming the outcome: drives the
    /// computation like an await, but yields `()` and never re-raises a
    /// stored panic. The result stays in the task for a later await.
    pub fn when_ready(&mut self) -> WhenReady<'_, T> {
        WhenReady { task: self }
    }

    /// Runs the computation one step, capturing its outcome on completion.
    fn drive(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        let TaskState::Running(future) = &mut self.state else {
            return Poll::Ready(());
        };

        match panic::catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(cx))) {
            Ok(Poll::Pending) => Poll::Pending,
            Ok(Poll::Ready(value)) => {
                self.state = TaskState::Value(value);
                Poll::Ready(())
            }
            Err(payload) => {
                self.state = TaskState::Panicked(payload);
                Poll::Ready(())
            }
        }
    }

    fn take_result(&mut self) -> T {
        match std::mem::replace(&mut self.state, TaskState::Empty) {
            TaskState::Value(value) => value,
            TaskState::Panicked(payload) => {
                // String-ish payloads are re-raised by value and kept, so a
                // later awaiter observes the same panic. Other payload types
                // can only be raised once.
                if let Some(&message) = payload.downcast_ref::<&'static str>() {
                    self.state = TaskState::Panicked(payload);
                    panic::resume_unwind(Box::new(message));
                }
                if let Some(message) = payload.downcast_ref::<String>() {
                    let message = message.clone();
                    self.state = TaskState::Panicked(payload);
                    panic::resume_unwind(Box::new(message));
                }
                panic::resume_unwind(payload);
            }
            TaskState::Empty => std::panic::panic_any(BROKEN_PROMISE),
            TaskState::Running(_) => unreachable!("result taken from a running task"),
        }
    }
}

impl<T> Default for Task<T> {
    fn default() -> Self {
        Self::empty()
    }
}

// The state is never pinned structurally; the inner future carries its own
// pinning through the box.
impl<T> Unpin for Task<T> {}

impl<T> Future for Task<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let this = self.get_mut();

        match this.drive(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(()) => Poll::Ready(this.take_result()),
        }
    }
}

/// Future returned by [`Task::when_ready`].
pub struct WhenReady<'a, T> {
    task: &'a mut Task<T>,
}

impl<T> Future for WhenReady<'_, T> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.get_mut().task.drive(cx)
    }
}
