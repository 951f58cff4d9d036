//! Leaf futures for readiness waits and timer sleeps.
//!
//! These are the loop's suspension points. Each registers the caller's
//! waker lazily on the first poll: readiness waits enqueue into the
//! descriptor's FIFO, sleeps into the timer heap. Registration validates
//! first, so a wait on a descriptor lacking the matching capability
//! resolves with an error without ever suspending.
//!
//! Because the selector is edge-triggered, a task resumed for readability
//! must read until the OS reports `EAGAIN`, then await again:
//!
//! ```no_run
//! use eddy::{await_read, Error};
//!
//! # async fn drain(fd: i32, buf: &mut [u8]) -> Result<usize, Error> {
//! loop {
//!     let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut _, buf.len()) };
//!     if n >= 0 {
//!         return Ok(n as usize);
//!     }
//!     match std::io::Error::last_os_error().raw_os_error() {
//!         Some(libc::EAGAIN) => await_read(fd).await?,
//!         _ => panic!("read failed"),
//!     }
//! }
//! # }
//! ```

use std::future::Future;
use std::os::unix::io::RawFd;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::error::Result;
use crate::event_loop::Handle;
use crate::time::{Duration, Instant};

/// Future returned by [`await_read`](crate::await_read); resolves once the
/// selector reports the descriptor readable.
pub struct AwaitRead {
    fd: RawFd,
    registered: bool,
}

impl AwaitRead {
    pub(crate) fn new(fd: RawFd) -> Self {
        Self {
            fd,
            registered: false,
        }
    }
}

impl Future for AwaitRead {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.registered {
            return Poll::Ready(Ok(()));
        }

        match Handle::current().push_read_waker(self.fd, cx.waker().clone()) {
            Ok(()) => {
                self.registered = true;
                Poll::Pending
            }
            Err(error) => Poll::Ready(Err(error)),
        }
    }
}

/// Future returned by [`await_write`](crate::await_write); resolves once
/// the selector reports the descriptor writable.
pub struct AwaitWrite {
    fd: RawFd,
    registered: bool,
}

impl AwaitWrite {
    pub(crate) fn new(fd: RawFd) -> Self {
        Self {
            fd,
            registered: false,
        }
    }
}

impl Future for AwaitWrite {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.registered {
            return Poll::Ready(Ok(()));
        }

        match Handle::current().push_write_waker(self.fd, cx.waker().clone()) {
            Ok(()) => {
                self.registered = true;
                Poll::Pending
            }
            Err(error) => Poll::Ready(Err(error)),
        }
    }
}

/// Future returned by [`sleep_for`](crate::sleep_for); resolves once the
/// deadline passes on the monotonic clock.
pub struct Sleep {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Sleep {
    pub(crate) fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let now = Instant::monotonic();

        match self.deadline {
            None => {
                let deadline = now + self.delay;
                self.deadline = Some(deadline);
                Handle::current().push_timer_waker(deadline, cx.waker().clone());
                Poll::Pending
            }
            // Polled before the deadline (a stale wake from some racing
            // awaitable): re-arm at the original deadline.
            Some(deadline) if now < deadline => {
                Handle::current().push_timer_waker(deadline, cx.waker().clone());
                Poll::Pending
            }
            Some(_) => Poll::Ready(()),
        }
    }
}
