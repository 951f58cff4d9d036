//! Error type shared across the event loop, selector and registration APIs.

use std::io;
use std::os::unix::io::RawFd;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the event loop and its registration surface.
///
/// Misuse of the descriptor table (`OutOfRangeFd`, `AlreadyRegistered`,
/// `NotRegistered`, `NotReadable`, `NotWritable`) is reported at the
/// offending call, before anything is enqueued or suspended. OS failures
/// carry the syscall that produced them.
#[derive(Debug, Error)]
pub enum Error {
    /// A second event loop was constructed while one was still alive.
    #[error("multiple event loops exist at the same time")]
    MultipleEventLoops,

    /// The requested descriptor bound was zero.
    #[error("max_fileno must be greater than zero")]
    InvalidMaxFd,

    /// The descriptor is negative or beyond the loop's descriptor bound.
    #[error("fd {fd} is out of range")]
    OutOfRangeFd { fd: RawFd },

    /// The descriptor is already registered with the loop.
    #[error("fd {fd} is already registered")]
    AlreadyRegistered { fd: RawFd },

    /// The descriptor is not registered with the loop.
    #[error("fd {fd} is not registered")]
    NotRegistered { fd: RawFd },

    /// The descriptor was registered without the readable capability.
    #[error("fd {fd} is not readable")]
    NotReadable { fd: RawFd },

    /// The descriptor was registered without the writable capability.
    #[error("fd {fd} is not writable")]
    NotWritable { fd: RawFd },

    /// A syscall failed; `source` holds the OS error.
    #[error("{syscall} failed")]
    Os {
        syscall: &'static str,
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Captures `errno` for a failed syscall. Must be called before anything
    /// else can clobber the thread's error slot.
    pub(crate) fn os(syscall: &'static str) -> Self {
        Error::Os {
            syscall,
            source: io::Error::last_os_error(),
        }
    }
}
