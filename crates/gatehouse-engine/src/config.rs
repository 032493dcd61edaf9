//! Engine configuration.
//!
//! Plain value types handed to each component at construction. Nothing here
//! reads files or the environment; `gatehouse-node` builds these from its
//! TOML configuration.

use std::time::Duration;

/// Minimum interval between lock actuations.
pub const COOLDOWN_MS: u64 = 3_000;
/// Default lock release duration.
pub const DEFAULT_UNLOCK_MS: u64 = 3_000;
/// Confirmation buzz after a grant.
pub const SHORT_BUZZ_MS: u64 = 100;
/// Buzz for an unknown credential.
pub const MEDIUM_BUZZ_MS: u64 = 500;
/// Buzz for a denied credential.
pub const LONG_BUZZ_MS: u64 = 2_000;
/// Buzz for a malformed scan.
pub const REJECT_BUZZ_MS: u64 = 50;
/// Exit-request debounce interval.
pub const DEBOUNCE_MS: u64 = 500;
/// Bounded wait for a registry set lock.
pub const REGISTRY_LOCK_TIMEOUT_MS: u64 = 50;
/// Accepted range for remote unlock durations, in seconds.
pub const UNLOCK_DURATION_RANGE_SECS: std::ops::RangeInclusive<u64> = 1..=300;

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub(crate) fn millis(duration: Duration) -> u64 {
    duration.as_millis().try_into().unwrap_or(u64::MAX)
}

/// Actuation controller timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuationConfig {
    /// Minimum interval between lock actuations
    pub cooldown_ms: u64,
    /// Lock duration for grants and exit requests
    pub unlock_ms: u64,
}

impl Default for ActuationConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: COOLDOWN_MS,
            unlock_ms: DEFAULT_UNLOCK_MS,
        }
    }
}

/// Exit request monitor timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitMonitorConfig {
    /// Minimum interval between accepted transitions
    pub debounce_ms: u64,
}

impl Default for ExitMonitorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEBOUNCE_MS,
        }
    }
}

/// Bounded queue capacities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// Audit records waiting to be mirrored
    pub audit_capacity: usize,
    /// New-pending notices waiting to be mirrored
    pub pending_capacity: usize,
    /// Control signals from the network context
    pub control_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            audit_capacity: 32,
            pending_capacity: 16,
            control_capacity: 8,
        }
    }
}

/// Remote command processor scheduling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorConfig {
    /// Interval between command inbox polls
    pub command_poll: Duration,
    /// Interval between status reports
    pub status_interval: Duration,
    /// Upper bound for any single remote call
    pub remote_timeout: Duration,
    /// Queue items mirrored per cycle, per queue
    pub mirror_batch: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            command_poll: Duration::from_millis(2_000),
            status_interval: Duration::from_secs(60),
            remote_timeout: Duration::from_secs(5),
            mirror_batch: 5,
        }
    }
}

/// Execution context periods and liveness bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Latency-sensitive context period
    pub control_period: Duration,
    /// Network context period
    pub network_period: Duration,
    /// A context not fed within this bound is reported stale
    pub watchdog_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            control_period: Duration::from_millis(10),
            network_period: Duration::from_millis(100),
            watchdog_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_saturates() {
        assert_eq!(millis(Duration::from_millis(2_500)), 2_500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }
}
