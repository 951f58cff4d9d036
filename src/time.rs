//! Nanosecond-precision monotonic time.
//!
//! The loop schedules against [`Instant::monotonic`], a clock that is not
//! perturbed by wall-clock adjustments and does not advance while the system
//! is suspended. [`Instant::hard_monotonic`] is the suspend-including
//! counterpart; it is exposed for callers but never consumed by the loop.
//!
//! Both types wrap a signed 64-bit nanosecond count, which covers roughly
//! ±292 years. Arithmetic uses plain two's-complement wrapping within that
//! horizon.

use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

const NANOS_PER_SEC: i64 = 1_000_000_000;
const NANOS_PER_MILLI: i64 = 1_000_000;

// Floor division: rounds toward negative infinity, so -1ns is second -1,
// not second 0.
const fn fdiv(a: i64, b: i64) -> i64 {
    let mut a = a;
    if (a < 0) != (b < 0) {
        a -= b - 1;
    }
    a / b
}

/// A signed span of time with nanosecond precision.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Duration(i64);

impl Duration {
    pub const ZERO: Duration = Duration(0);

    pub const fn from_nanos(nanos: i64) -> Self {
        Duration(nanos)
    }

    pub const fn from_millis(millis: i64) -> Self {
        Duration(millis * NANOS_PER_MILLI)
    }

    pub const fn from_secs(secs: i64) -> Self {
        Duration(secs * NANOS_PER_SEC)
    }

    pub fn from_timespec(ts: libc::timespec) -> Self {
        Duration(ts.tv_sec as i64 * NANOS_PER_SEC + ts.tv_nsec as i64)
    }

    /// The full count, no precision loss.
    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    /// Whole milliseconds, floored.
    pub const fn as_millis(self) -> i64 {
        fdiv(self.0, NANOS_PER_MILLI)
    }

    /// Whole seconds, floored.
    pub const fn as_secs(self) -> i64 {
        fdiv(self.0, NANOS_PER_SEC)
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_SEC as f64
    }

    /// Splits into floored seconds and a non-negative nanosecond remainder,
    /// the `timespec` normal form.
    pub fn as_timespec(self) -> libc::timespec {
        let sec = fdiv(self.0, NANOS_PER_SEC);
        let nsec = self.0 - NANOS_PER_SEC * sec;

        libc::timespec {
            tv_sec: sec as libc::time_t,
            tv_nsec: nsec as libc::c_long,
        }
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl From<std::time::Duration> for Duration {
    fn from(d: std::time::Duration) -> Self {
        Duration(d.as_nanos() as i64)
    }
}

impl Add for Duration {
    type Output = Duration;

    fn add(self, rhs: Duration) -> Duration {
        Duration(self.0.wrapping_add(rhs.0))
    }
}

impl AddAssign for Duration {
    fn add_assign(&mut self, rhs: Duration) {
        *self = *self + rhs;
    }
}

impl Sub for Duration {
    type Output = Duration;

    fn sub(self, rhs: Duration) -> Duration {
        Duration(self.0.wrapping_sub(rhs.0))
    }
}

impl SubAssign for Duration {
    fn sub_assign(&mut self, rhs: Duration) {
        *self = *self - rhs;
    }
}

impl Neg for Duration {
    type Output = Duration;

    fn neg(self) -> Duration {
        Duration(self.0.wrapping_neg())
    }
}

/// A point on a monotonic clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instant(i64);

impl Instant {
    /// Now on the scheduling clock (`CLOCK_MONOTONIC_RAW`): unaffected by
    /// clock slewing and stopped during system suspend.
    pub fn monotonic() -> Self {
        Instant(Duration::from_timespec(gettime(libc::CLOCK_MONOTONIC_RAW)).as_nanos())
    }

    /// Like [`monotonic`](Instant::monotonic), but keeps counting while the
    /// system is suspended (`CLOCK_BOOTTIME`).
    pub fn hard_monotonic() -> Self {
        Instant(Duration::from_timespec(gettime(libc::CLOCK_BOOTTIME)).as_nanos())
    }

    /// Nanoseconds since the clock's unspecified epoch.
    pub const fn as_nanos(self) -> i64 {
        self.0
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Instant {
        Instant(self.0.wrapping_add(rhs.as_nanos()))
    }
}

impl AddAssign<Duration> for Instant {
    fn add_assign(&mut self, rhs: Duration) {
        *self = *self + rhs;
    }
}

impl Sub<Duration> for Instant {
    type Output = Instant;

    fn sub(self, rhs: Duration) -> Instant {
        Instant(self.0.wrapping_sub(rhs.as_nanos()))
    }
}

impl Sub for Instant {
    type Output = Duration;

    fn sub(self, rhs: Instant) -> Duration {
        Duration::from_nanos(self.0.wrapping_sub(rhs.0))
    }
}

fn gettime(clock: libc::clockid_t) -> libc::timespec {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    let rc = unsafe { libc::clock_gettime(clock, &mut ts) };
    debug_assert!(rc == 0, "clock_gettime failed");

    ts
}
