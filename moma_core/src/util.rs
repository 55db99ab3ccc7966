//! Cadence helpers.

use std::time::Duration;

pub const MICROS_PER_SEC: u64 = 1_000_000;

/// Tick period for a rate in Hz, at least 1 µs. `hz` is clamped to 1.
#[inline]
pub fn period(hz: u32) -> Duration {
    Duration::from_micros((MICROS_PER_SEC / u64::from(hz.max(1))).max(1))
}
