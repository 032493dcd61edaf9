//! Controllable clock for deterministic timing tests.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use gatehouse_core::effects::TimeEffects;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Clock that only moves when told to.
///
/// The monotonic and wall clocks advance together. The wall clock starts
/// unsynchronized (`None`) unless one is supplied.
#[derive(Debug)]
pub struct ControllableClock {
    monotonic_ms: AtomicU64,
    wall: Mutex<Option<DateTime<Utc>>>,
}

impl ControllableClock {
    /// Create a clock at `start_ms` with no wall clock.
    pub fn new(start_ms: u64) -> Self {
        Self {
            monotonic_ms: AtomicU64::new(start_ms),
            wall: Mutex::new(None),
        }
    }

    /// Create a clock at `start_ms` whose wall clock reads `wall`.
    pub fn with_wall_clock(start_ms: u64, wall: DateTime<Utc>) -> Self {
        Self {
            monotonic_ms: AtomicU64::new(start_ms),
            wall: Mutex::new(Some(wall)),
        }
    }

    /// Advance both clocks by `ms`.
    pub fn advance_ms(&self, ms: u64) {
        self.monotonic_ms.fetch_add(ms, Ordering::SeqCst);
        if let Some(wall) = self.wall.lock().as_mut() {
            *wall += ChronoDuration::milliseconds(ms as i64);
        }
    }

    /// Set or clear the wall clock.
    pub fn set_wall_clock(&self, wall: Option<DateTime<Utc>>) {
        *self.wall.lock() = wall;
    }
}

impl Default for ControllableClock {
    fn default() -> Self {
        Self::new(0)
    }
}

impl TimeEffects for ControllableClock {
    fn monotonic_ms(&self) -> u64 {
        self.monotonic_ms.load(Ordering::SeqCst)
    }

    fn wall_clock(&self) -> Option<DateTime<Utc>> {
        *self.wall.lock()
    }
}
