//! The ambient loop slot.
//!
//! One event loop may exist per process at a time; a static flag enforces
//! that. The handle itself lives in thread-local storage on the thread that
//! constructed the loop, which is the only thread allowed to touch it.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::event_loop::Handle;

/// Process-wide claim on "the" event loop.
static LOOP_EXISTS: AtomicBool = AtomicBool::new(false);

thread_local! {
    /// Handle to the loop constructed on this thread, set for its lifetime.
    static CURRENT: RefCell<Option<Handle>> = const { RefCell::new(None) };
}

/// Attempts to claim the process-wide slot. Fails when a loop already
/// exists anywhere in the process.
pub(crate) fn claim() -> bool {
    LOOP_EXISTS
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
}

pub(crate) fn install(handle: Handle) {
    CURRENT.with(|current| *current.borrow_mut() = Some(handle));
}

/// Clears both the thread-local handle and the process-wide claim.
pub(crate) fn release() {
    CURRENT.with(|current| *current.borrow_mut() = None);
    LOOP_EXISTS.store(false, Ordering::Release);
}

pub(crate) fn current() -> Option<Handle> {
    CURRENT.with(|current| current.borrow().clone())
}

pub(crate) fn exists() -> bool {
    LOOP_EXISTS.load(Ordering::Acquire)
}
