//! Layer 3: Time Effect Handler - Production Only
//!
//! Monotonic time comes from `Instant`; wall-clock time from the system
//! clock, reported as unsynchronized until it reads a plausible date.

use chrono::{DateTime, NaiveDate, Utc};
use gatehouse_core::effects::TimeEffects;
use std::time::Instant;

/// Boards without a battery-backed RTC boot near the epoch; any reading
/// before this date means time sync has not happened yet.
const EARLIEST_VALID_YEAR: i32 = 2024;

/// Real time handler for production use
#[derive(Debug, Clone)]
pub struct RealTimeHandler {
    origin: Instant,
}

impl RealTimeHandler {
    /// Create a handler whose monotonic origin is now
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for RealTimeHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn plausible(now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let earliest = NaiveDate::from_ymd_opt(EARLIEST_VALID_YEAR, 1, 1)?;
    (now.date_naive() >= earliest).then_some(now)
}

impl TimeEffects for RealTimeHandler {
    fn monotonic_ms(&self) -> u64 {
        self.origin
            .elapsed()
            .as_millis()
            .try_into()
            .unwrap_or(u64::MAX)
    }

    fn wall_clock(&self) -> Option<DateTime<Utc>> {
        plausible(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_epoch_boot_is_unsynchronized() {
        assert_eq!(plausible(Utc.timestamp_opt(0, 0).unwrap()), None);
        let synced = Utc.with_ymd_and_hms(2026, 10, 18, 8, 0, 0).unwrap();
        assert_eq!(plausible(synced), Some(synced));
    }

    #[test]
    fn test_monotonic_never_decreases() {
        let time = RealTimeHandler::new();
        let first = time.monotonic_ms();
        assert!(time.monotonic_ms() >= first);
    }
}
