use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant as StdInstant;

use eddy::time::Duration;
use eddy::{Error, EventLoop, FileOps, Handle};

// Only one event loop may exist per process; serialize the tests in this
// binary around it.
static SERIAL: Mutex<()> = Mutex::new(());

fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn pipe() -> (i32, i32) {
    let mut fds = [0i32; 2];
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
    assert_eq!(rc, 0, "pipe() failed");
    (fds[0], fds[1])
}

fn close(fd: i32) {
    unsafe {
        libc::close(fd);
    }
}

#[test]
fn at_most_one_loop_per_process() {
    let _guard = serial();

    let first = EventLoop::new().unwrap();
    match EventLoop::new() {
        Err(Error::MultipleEventLoops) => {}
        Ok(_) => panic!("second loop must be rejected"),
        Err(other) => panic!("expected MultipleEventLoops, got {other:?}"),
    }

    // Destroying the first frees the slot.
    drop(first);
    let second = EventLoop::new().unwrap();
    drop(second);
}

#[test]
fn zero_descriptor_bound_is_rejected() {
    match EventLoop::with_max_fd(0) {
        Err(Error::InvalidMaxFd) => {}
        other => panic!("expected InvalidMaxFd, got {other:?}", other = other.err()),
    }
}

#[test]
fn descriptor_bound_is_enforced() {
    let _guard = serial();

    let event_loop = EventLoop::with_max_fd(64).unwrap();
    match event_loop.add_fd(-1, FileOps::READABLE) {
        Err(Error::OutOfRangeFd { fd: -1 }) => {}
        other => panic!("expected OutOfRangeFd, got {other:?}"),
    }
    match event_loop.add_fd(64, FileOps::READABLE) {
        Err(Error::OutOfRangeFd { fd: 64 }) => {}
        other => panic!("expected OutOfRangeFd, got {other:?}"),
    }
}

#[test]
fn double_registration_and_missing_registration_are_rejected() {
    let _guard = serial();
    let (rfd, wfd) = pipe();

    let event_loop = EventLoop::new().unwrap();
    event_loop.add_fd(rfd, FileOps::READABLE).unwrap();
    match event_loop.add_fd(rfd, FileOps::READABLE | FileOps::WRITABLE) {
        Err(Error::AlreadyRegistered { fd }) => assert_eq!(fd, rfd),
        other => panic!("expected AlreadyRegistered, got {other:?}"),
    }

    event_loop.del_fd(rfd).unwrap();
    match event_loop.del_fd(rfd) {
        Err(Error::NotRegistered { fd }) => assert_eq!(fd, rfd),
        other => panic!("expected NotRegistered, got {other:?}"),
    }

    // The descriptor number can be registered again after removal.
    event_loop.add_fd(rfd, FileOps::READABLE).unwrap();
    event_loop.del_fd(rfd).unwrap();

    close(rfd);
    close(wfd);
}

#[test]
fn run_returns_once_no_work_is_pending() {
    let _guard = serial();

    let event_loop = EventLoop::new().unwrap();
    let start = StdInstant::now();
    event_loop.run().unwrap();

    assert!(
        start.elapsed() < std::time::Duration::from_millis(50),
        "an idle loop must return immediately"
    );
}

#[test]
fn ambient_access_tracks_the_loop_lifetime() {
    let _guard = serial();

    assert!(!EventLoop::exists());
    assert!(Handle::try_current().is_none());

    let event_loop = EventLoop::new().unwrap();
    assert!(EventLoop::exists());
    assert!(Handle::try_current().is_some());

    drop(event_loop);
    assert!(!EventLoop::exists());
    assert!(Handle::try_current().is_none());
}

#[test]
fn current_panics_without_a_loop() {
    let _guard = serial();
    assert!(!EventLoop::exists());

    let payload = catch_unwind(AssertUnwindSafe(|| Handle::current())).unwrap_err();
    let message = payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .expect("string payload");
    assert!(message.contains("bad event loop access"), "got: {message}");
}

#[test]
fn detached_panic_terminates_only_its_task() {
    let _guard = serial();
    let survivor_ran = Arc::new(AtomicBool::new(false));
    let survivor_flag = survivor_ran.clone();

    let event_loop = EventLoop::new().unwrap();
    event_loop.schedule(async { panic!("detached boom") }, Duration::ZERO);
    event_loop.schedule(
        async move {
            survivor_flag.store(true, Ordering::SeqCst);
        },
        Duration::from_millis(5),
    );

    // The panic is captured and logged; the loop keeps running.
    event_loop.run().unwrap();
    assert!(survivor_ran.load(Ordering::SeqCst));
}
