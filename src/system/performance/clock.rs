//! Monotonic Nanosecond Clock
//!
//! Thin wrappers over CLOCK_MONOTONIC:
//! - `now_ns()` reads the clock as a single u64 nanosecond count
//! - `sleep_ns()` suspends the calling thread with clock_nanosleep
//!
//! All measurement paths use these instead of `Instant` so that the probe and
//! the driver share one time base and one unit.

use std::time::Duration;

pub const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Outcome of a single timed suspension
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SleepOutcome {
    /// Slept for the full requested time
    Completed,
    /// Woken early by a signal (EINTR)
    Interrupted,
}

/// Current CLOCK_MONOTONIC time in nanoseconds.
#[inline]
pub fn now_ns() -> u64 {
    let ts: libc::timespec = unsafe {
        let mut ts = std::mem::zeroed::<libc::timespec>();
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
        ts
    };
    timespec_to_ns(&ts)
}

/// Suspend the calling thread for `ns` nanoseconds (relative sleep).
///
/// EINTR is reported as `SleepOutcome::Interrupted`; any other error code is
/// returned as an `io::Error`.
pub fn sleep_ns(ns: u64) -> std::io::Result<SleepOutcome> {
    let request = ns_to_timespec(ns);
    let mut remaining = unsafe { std::mem::zeroed::<libc::timespec>() };

    // clock_nanosleep returns the error number directly instead of setting errno
    let rc = unsafe { libc::clock_nanosleep(libc::CLOCK_MONOTONIC, 0, &request, &mut remaining) };

    match rc {
        0 => Ok(SleepOutcome::Completed),
        libc::EINTR => Ok(SleepOutcome::Interrupted),
        errno => Err(std::io::Error::from_raw_os_error(errno)),
    }
}

/// Busy-poll the clock until `deadline_ns` has passed. Never blocks.
#[inline]
pub fn spin_until(deadline_ns: u64) {
    while now_ns() < deadline_ns {
        std::hint::spin_loop();
    }
}

/// Saturating conversion of a Duration to u64 nanoseconds.
pub fn duration_to_ns(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Helper: Convert a timespec to nanoseconds.
fn timespec_to_ns(ts: &libc::timespec) -> u64 {
    (ts.tv_sec as u64) * NANOS_PER_SEC + (ts.tv_nsec as u64)
}

/// Helper: Convert nanoseconds to a normalized timespec.
fn ns_to_timespec(ns: u64) -> libc::timespec {
    libc::timespec {
        tv_sec: (ns / NANOS_PER_SEC) as libc::time_t,
        tv_nsec: (ns % NANOS_PER_SEC) as libc::c_long,
    }
}
