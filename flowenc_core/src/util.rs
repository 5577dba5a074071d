//! Common time helpers for flowenc_core.

use std::time::Duration;

/// Number of microseconds in one second.
pub const MICROS_PER_SEC: u64 = 1_000_000;

/// Duration as whole microseconds, saturating at `u64::MAX`.
#[inline]
pub fn saturating_us(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

/// Duration as whole milliseconds, saturating at `u64::MAX`.
#[inline]
pub fn saturating_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Loop rate in Hz for a cycle period, at least 1 µs per cycle.
#[inline]
pub fn rate_hz(period: Duration) -> f64 {
    MICROS_PER_SEC as f64 / saturating_us(period).max(1) as f64
}
