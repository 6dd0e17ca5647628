//! Timestamp conversion utilities with clock skew protection.
//!
//! `sqlmodel` uses i64 (microseconds since Unix epoch) for timestamps. This
//! module provides conversion to/from chrono types, plus monotonic protection
//! against wall-clock jumps (NTP corrections, VM migration, etc.).

#![allow(clippy::missing_const_for_fn)]

use chrono::{NaiveDateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// Microseconds per second
const MICROS_PER_SECOND: i64 = 1_000_000;

/// Backward jump threshold: 1 second in microseconds.
const BACKWARD_JUMP_THRESHOLD_US: i64 = 1_000_000;

/// Last observed wall-clock value (microseconds since epoch).
static LAST_SYSTEM_TIME_US: AtomicI64 = AtomicI64::new(0);

/// Convert chrono `NaiveDateTime` to microseconds since Unix epoch.
#[inline]
#[must_use]
pub fn naive_to_micros(dt: NaiveDateTime) -> i64 {
    dt.and_utc().timestamp_micros()
}

/// Convert microseconds since Unix epoch to chrono `NaiveDateTime`.
///
/// For extreme values outside chrono's representable range, returns the
/// nearest representable bound instead of panicking.
#[inline]
#[must_use]
pub fn micros_to_naive(micros: i64) -> NaiveDateTime {
    let secs = micros.div_euclid(MICROS_PER_SECOND);
    let sub_micros = micros.rem_euclid(MICROS_PER_SECOND);
    let nsecs = u32::try_from(sub_micros * 1000).unwrap_or(0);
    Utc.timestamp_opt(secs, nsecs)
        .single()
        .unwrap_or(if micros < 0 {
            chrono::DateTime::<Utc>::MIN_UTC
        } else {
            chrono::DateTime::<Utc>::MAX_UTC
        })
        .naive_utc()
}

/// Get current time as microseconds since Unix epoch, with clock skew
/// protection.
///
/// If the wall clock jumped backward by more than 1 second, returns the last
/// observed value so stored timestamps never regress.
#[inline]
#[must_use]
pub fn now_micros() -> i64 {
    let current = Utc::now().timestamp_micros();
    let last = LAST_SYSTEM_TIME_US.load(Ordering::Relaxed);

    if last != 0 && current - last < -BACKWARD_JUMP_THRESHOLD_US {
        // Clock jumped backward — keep the high-water mark.
        return last;
    }

    LAST_SYSTEM_TIME_US.store(current, Ordering::Relaxed);
    current
}

/// Get the raw wall-clock time without skew protection.
///
/// Use this only when you need the actual system time (e.g., for display).
/// For stored timestamps, always use [`now_micros`].
#[inline]
#[must_use]
pub fn now_micros_raw() -> i64 {
    Utc::now().timestamp_micros()
}

/// Format microseconds since epoch as an ISO-8601 UTC string.
#[must_use]
pub fn micros_to_iso(micros: i64) -> String {
    micros_to_naive(micros)
        .and_utc()
        .to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// Parse an ISO-8601 string into microseconds since epoch.
#[must_use]
pub fn iso_to_micros(s: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.timestamp_micros())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn naive_roundtrip() {
        let micros = 1_705_320_000_123_456_i64;
        let dt = micros_to_naive(micros);
        assert_eq!(naive_to_micros(dt), micros);
    }

    #[test]
    fn micros_to_naive_handles_negative() {
        let dt = micros_to_naive(-1_500_000);
        assert_eq!(naive_to_micros(dt), -1_500_000);
    }

    #[test]
    fn micros_to_naive_extreme_values_do_not_panic() {
        let _ = micros_to_naive(i64::MAX);
        let _ = micros_to_naive(i64::MIN);
    }

    #[test]
    fn now_micros_is_monotonic_within_test() {
        let a = now_micros();
        let b = now_micros();
        assert!(b >= a);
    }

    #[test]
    fn iso_roundtrip() {
        let micros = 1_705_320_000_000_000_i64;
        let iso = micros_to_iso(micros);
        assert_eq!(iso_to_micros(&iso), Some(micros));
    }

    #[test]
    fn iso_to_micros_rejects_garbage() {
        assert_eq!(iso_to_micros("not a timestamp"), None);
    }
}
