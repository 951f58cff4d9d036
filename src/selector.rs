//! Edge-triggered readiness selection over `epoll(7)`.
//!
//! The selector is registered `EPOLLET`, so a notification is delivered once
//! per transition to ready. Consumers must drain their descriptor until the
//! OS reports `EAGAIN` before waiting again; the selector never rearms.

use std::os::unix::io::RawFd;
use std::ptr;

use crate::bits::impl_bit_ops;
use crate::error::{Error, Result};
use crate::time::Duration;

/// Maximum events returned by a single wait, kept small enough for the
/// kernel-facing buffer to live on the stack.
const MAX_EVENTS: usize = 1024;

/// Readiness directions reported by the selector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Events(u8);

impl Events {
    pub const NONE: Events = Events(0x00);
    pub const INPUT: Events = Events(0x01);
    pub const OUTPUT: Events = Events(0x02);

    pub const fn contains(self, other: Events) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl_bit_ops!(Events);

/// One readiness notification: which descriptor, which directions.
#[derive(Clone, Copy, Debug)]
pub struct EventData {
    pub fd: RawFd,
    pub flags: Events,
}

/// Thin owner of an epoll instance, tracking how many descriptors are
/// currently registered.
pub(crate) struct Selector {
    epfd: RawFd,
    registered: usize,
}

impl Selector {
    pub(crate) fn new() -> Result<Self> {
        let epfd = unsafe { libc::epoll_create1(0) };
        if epfd == -1 {
            return Err(Error::os("epoll_create1"));
        }

        Ok(Self {
            epfd,
            registered: 0,
        })
    }

    /// Registers `fd` edge-triggered. `INPUT` covers readable, priority
    /// readable and read-side peer hangup; `OUTPUT` covers writable.
    pub(crate) fn add(&mut self, fd: RawFd, events: Events) -> Result<()> {
        let mut interest = libc::EPOLLET;
        if events.contains(Events::INPUT) {
            interest |= libc::EPOLLIN | libc::EPOLLPRI | libc::EPOLLRDHUP;
        }
        if events.contains(Events::OUTPUT) {
            interest |= libc::EPOLLOUT;
        }

        let mut ev = libc::epoll_event {
            events: interest as u32,
            u64: fd as u64,
        };

        if unsafe { libc::epoll_ctl(self.epfd, libc::EPOLL_CTL_ADD, fd, &mut ev) } == -1 {
            return Err(Error::os("epoll_ctl"));
        }
        self.registered += 1;

        Ok(())
    }

    pub(crate) fn del(&mut self, fd: RawFd) -> Result<()> {
        if unsafe { libc::epoll_ctl(self.epfd, libc::EPOLL_CTL_DEL, fd, ptr::null_mut()) } == -1 {
            return Err(Error::os("epoll_ctl"));
        }
        debug_assert!(self.registered > 0);
        self.registered -= 1;

        Ok(())
    }

    /// Count of descriptors currently registered; the loop's signal that
    /// I/O work may still arrive.
    pub(crate) fn len(&self) -> usize {
        self.registered
    }

    /// Blocks until at least one event arrives or `timeout` elapses,
    /// appending translated events to `out` and returning how many. `None`
    /// or a negative timeout blocks indefinitely. Interruption by a signal
    /// is not an error; it reports zero events so the caller reloops.
    pub(crate) fn wait(&mut self, out: &mut Vec<EventData>, timeout: Option<Duration>) -> Result<usize> {
        let ts;
        let ts_ptr = match timeout {
            Some(t) if !t.is_negative() => {
                ts = t.as_timespec();
                &ts as *const libc::timespec
            }
            _ => ptr::null(),
        };

        let mut events: [libc::epoll_event; MAX_EVENTS] = unsafe { std::mem::zeroed() };
        let n = unsafe {
            libc::epoll_pwait2(
                self.epfd,
                events.as_mut_ptr(),
                MAX_EVENTS as libc::c_int,
                ts_ptr,
                ptr::null(),
            )
        };
        if n == -1 {
            if std::io::Error::last_os_error().raw_os_error() == Some(libc::EINTR) {
                return Ok(0);
            }
            return Err(Error::os("epoll_pwait2"));
        }

        for ev in events.iter().take(n as usize) {
            let mask = ev.events as libc::c_int;
            let mut flags = Events::NONE;

            if mask & libc::EPOLLERR != 0 {
                // Surface the error on both directions so every waiter gets
                // a chance to observe it through its own I/O path.
                flags = Events::INPUT | Events::OUTPUT;
            } else {
                if mask & (libc::EPOLLIN | libc::EPOLLPRI | libc::EPOLLRDHUP) != 0 {
                    flags |= Events::INPUT;
                }
                if mask & (libc::EPOLLOUT | libc::EPOLLHUP) != 0 {
                    flags |= Events::OUTPUT;
                }
            }

            out.push(EventData {
                fd: ev.u64 as RawFd,
                flags,
            });
        }

        Ok(n as usize)
    }
}

impl Drop for Selector {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.epfd);
        }
    }
}
