use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant as StdInstant;

use futures::executor::block_on;
use futures::FutureExt;

use eddy::time::Duration;
use eddy::{sleep_for, EventLoop, Task};

// Only one event loop may exist per process; serialize the tests in this
// binary around it.
static SERIAL: Mutex<()> = Mutex::new(());

fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[test]
fn awaiting_yields_the_returned_value() {
    let task = Task::new(async { 21 * 2 });

    assert_eq!(block_on(task), 42);
}

#[test]
fn tasks_start_suspended() {
    let started = Arc::new(AtomicBool::new(false));
    let started_flag = started.clone();

    let mut task = Task::new(async move {
        started_flag.store(true, Ordering::SeqCst);
    });

    assert!(!started.load(Ordering::SeqCst), "construction must not run anything");
    assert!(!task.is_ready());

    block_on(&mut task);
    assert!(started.load(Ordering::SeqCst));
    assert!(task.is_ready());
}

#[test]
fn when_ready_observes_without_consuming() {
    let mut task = Task::new(async { 7 });

    block_on(task.when_ready());
    assert!(task.is_ready());

    // The value is still there for a real await.
    assert_eq!(block_on(&mut task), 7);
}

#[test]
fn awaiting_an_empty_task_is_a_broken_promise() {
    let mut task: Task<i32> = Task::empty();

    let payload = catch_unwind(AssertUnwindSafe(|| block_on(&mut task))).unwrap_err();
    let message = payload.downcast_ref::<&str>().expect("string payload");
    assert!(message.contains("broken promise"), "got: {message}");
}

#[test]
fn moving_a_task_leaves_the_source_broken() {
    let mut task = Task::new(async { 1 });
    let taken = std::mem::take(&mut task);

    assert_eq!(block_on(taken), 1);

    let payload = catch_unwind(AssertUnwindSafe(|| block_on(&mut task))).unwrap_err();
    let message = payload.downcast_ref::<&str>().expect("string payload");
    assert!(message.contains("broken promise"), "got: {message}");
}

#[test]
fn panics_rethrow_at_the_await_point() {
    let mut task: Task<i32> = Task::new(async { panic!("boom") });

    // The same payload is observed by repeated awaiters.
    for _ in 0..2 {
        let payload = catch_unwind(AssertUnwindSafe(|| block_on(&mut task))).unwrap_err();
        assert_eq!(*payload.downcast_ref::<&str>().expect("string payload"), "boom");
    }
}

#[test]
fn when_ready_never_rethrows() {
    let mut task: Task<()> = Task::new(async { panic!("boom") });

    block_on(task.when_ready());
    assert!(task.is_ready());

    let payload = catch_unwind(AssertUnwindSafe(|| block_on(&mut task))).unwrap_err();
    assert_eq!(*payload.downcast_ref::<&str>().expect("string payload"), "boom");
}

#[test]
fn parent_resumes_when_child_completes() {
    let _guard = serial();
    let observed = Arc::new(AtomicBool::new(false));
    let observed_flag = observed.clone();

    let event_loop = EventLoop::new().unwrap();
    let start = StdInstant::now();
    event_loop.schedule(
        async move {
            let child = Task::new(async {
                sleep_for(Duration::from_millis(5)).await;
                42
            });
            assert_eq!(child.await, 42);
            observed_flag.store(true, Ordering::SeqCst);
        },
        Duration::ZERO,
    );
    event_loop.run().unwrap();

    assert!(observed.load(Ordering::SeqCst));
    assert!(start.elapsed() >= std::time::Duration::from_millis(5));
}

#[test]
fn chains_of_tasks_propagate_values() {
    let _guard = serial();
    let observed = Arc::new(AtomicBool::new(false));
    let observed_flag = observed.clone();

    let event_loop = EventLoop::new().unwrap();
    event_loop.schedule(
        async move {
            let inner = Task::new(async {
                sleep_for(Duration::from_millis(2)).await;
                20
            });
            let middle = Task::new(async move { inner.await + 2 });
            let outer = Task::new(async move { middle.await * 2 });
            assert_eq!(outer.await, 44);
            observed_flag.store(true, Ordering::SeqCst);
        },
        Duration::ZERO,
    );
    event_loop.run().unwrap();

    assert!(observed.load(Ordering::SeqCst));
}

#[test]
fn child_panic_reaches_every_parent_awaiter() {
    let _guard = serial();
    let observed = Arc::new(AtomicBool::new(false));
    let observed_flag = observed.clone();

    let event_loop = EventLoop::new().unwrap();
    event_loop.schedule(
        async move {
            let child: Task<i32> = Task::new(async {
                sleep_for(Duration::from_millis(5)).await;
                panic!("boom")
            });
            let mut parent: Task<i32> = Task::new(async move { child.await });

            // Drive the parent to completion; its stored result is the panic.
            parent.when_ready().await;
            assert!(parent.is_ready());

            // Every subsequent awaiter observes the same payload.
            for _ in 0..2 {
                let payload = AssertUnwindSafe(&mut parent)
                    .catch_unwind()
                    .await
                    .unwrap_err();
                assert_eq!(*payload.downcast_ref::<&str>().expect("string payload"), "boom");
            }
            observed_flag.store(true, Ordering::SeqCst);
        },
        Duration::ZERO,
    );
    event_loop.run().unwrap();

    assert!(observed.load(Ordering::SeqCst));
}
