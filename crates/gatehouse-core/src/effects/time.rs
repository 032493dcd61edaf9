//! Time effect trait definitions.
//!
//! # Effect Classification
//!
//! - **Category**: Infrastructure Effect
//! - **Implementation**: `gatehouse-effects` (Layer 3)
//! - **Usage**: cooldowns, deadlines, debounce (monotonic) and audit
//!   timestamps (wall clock)

use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Clock access for both execution contexts.
pub trait TimeEffects: Send + Sync {
    /// Milliseconds from an arbitrary fixed origin; never goes backwards.
    fn monotonic_ms(&self) -> u64;

    /// Current wall-clock time, or `None` until the clock is synchronized.
    fn wall_clock(&self) -> Option<DateTime<Utc>>;
}

impl<T: TimeEffects + ?Sized> TimeEffects for Arc<T> {
    fn monotonic_ms(&self) -> u64 {
        (**self).monotonic_ms()
    }

    fn wall_clock(&self) -> Option<DateTime<Utc>> {
        (**self).wall_clock()
    }
}
