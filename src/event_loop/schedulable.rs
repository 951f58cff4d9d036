//! Compile-time routing for [`schedule`](crate::schedule).
//!
//! `schedule` accepts a plain function pointer, a future, or a
//! zero-argument callable returning a future, and picks the right entry
//! point for each without runtime dispatch. The route is carried by a
//! marker type parameter, so the three impls target distinct trait
//! instantiations; a value admitting more than one route fails type
//! inference at the call site instead of silently picking one.

use std::future::Future;
use std::pin::Pin;

use crate::event_loop::Handle;
use crate::time::Duration;

/// Route marker: plain function pointer.
pub struct AsFunction;

/// Route marker: a value that is itself awaitable.
pub struct AsFuture;

/// Route marker: a zero-argument callable returning an awaitable.
pub struct AsFutureFn;

/// A value acceptable to [`schedule`](crate::schedule).
pub trait Schedulable<Route> {
    fn schedule_on(self, handle: &Handle, delay: Duration);
}

/// A value acceptable to [`schedule_a`](crate::schedule_a): anything that
/// can be turned into the future a detached task will drive.
pub trait AwaitSchedulable<Route> {
    fn into_scheduled(self) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

impl<F> AwaitSchedulable<AsFuture> for F
where
    F: Future<Output = ()> + Send + 'static,
{
    fn into_scheduled(self) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(self)
    }
}

impl<F, Fut> AwaitSchedulable<AsFutureFn> for F
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn into_scheduled(self) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        // The callable runs inside the detached task, not at schedule time.
        Box::pin(async move { self().await })
    }
}

impl Schedulable<AsFunction> for fn() {
    fn schedule_on(self, handle: &Handle, delay: Duration) {
        handle.schedule_i(self, delay);
    }
}

impl<F> Schedulable<AsFuture> for F
where
    F: Future<Output = ()> + Send + 'static,
{
    fn schedule_on(self, handle: &Handle, delay: Duration) {
        handle.schedule_a(self, delay);
    }
}

impl<F, Fut> Schedulable<AsFutureFn> for F
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn schedule_on(self, handle: &Handle, delay: Duration) {
        handle.schedule_a(self, delay);
    }
}
