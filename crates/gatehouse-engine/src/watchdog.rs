//! Liveness watchdog for the execution contexts.
//!
//! Each context feeds its [`Heartbeat`] once per cycle. The [`Watchdog`]
//! reports contexts whose last feed is older than the timeout.

use crate::config::millis;
use gatehouse_core::effects::TimeEffects;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Feed handle held by one context
#[derive(Clone)]
pub struct Heartbeat {
    name: &'static str,
    last_fed: Arc<AtomicU64>,
    time: Arc<dyn TimeEffects>,
}

impl std::fmt::Debug for Heartbeat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heartbeat")
            .field("name", &self.name)
            .field("last_fed", &self.last_fed.load(Ordering::Relaxed))
            .finish()
    }
}

impl Heartbeat {
    /// Record that the context completed a cycle.
    pub fn feed(&self) {
        self.last_fed
            .store(self.time.monotonic_ms(), Ordering::Relaxed);
    }

    /// Context name
    pub fn name(&self) -> &'static str {
        self.name
    }
}

struct Watched {
    name: &'static str,
    last_fed: Arc<AtomicU64>,
}

/// Tracks heartbeats of every registered context.
pub struct Watchdog {
    time: Arc<dyn TimeEffects>,
    timeout_ms: u64,
    watched: Mutex<Vec<Watched>>,
    reported: Mutex<BTreeSet<&'static str>>,
}

impl std::fmt::Debug for Watchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watchdog")
            .field("timeout_ms", &self.timeout_ms)
            .finish_non_exhaustive()
    }
}

impl Watchdog {
    /// Create a watchdog with the given staleness bound.
    pub fn new(time: Arc<dyn TimeEffects>, timeout: Duration) -> Self {
        Self {
            time,
            timeout_ms: millis(timeout),
            watched: Mutex::new(Vec::new()),
            reported: Mutex::new(BTreeSet::new()),
        }
    }

    /// Register a context. It counts as fed at registration.
    pub fn register(&self, name: &'static str) -> Heartbeat {
        let last_fed = Arc::new(AtomicU64::new(self.time.monotonic_ms()));
        self.watched.lock().push(Watched {
            name,
            last_fed: last_fed.clone(),
        });
        Heartbeat {
            name,
            last_fed,
            time: self.time.clone(),
        }
    }

    /// Names of contexts not fed within the timeout.
    pub fn stale(&self) -> Vec<String> {
        let now = self.time.monotonic_ms();
        self.watched
            .lock()
            .iter()
            .filter(|w| now.saturating_sub(w.last_fed.load(Ordering::Relaxed)) > self.timeout_ms)
            .map(|w| w.name.to_string())
            .collect()
    }

    /// Log contexts that became stale or recovered since the last check,
    /// returning the currently stale ones.
    pub fn check(&self) -> Vec<String> {
        let stale = self.stale();
        let mut reported = self.reported.lock();
        let watched = self.watched.lock();
        for w in watched.iter() {
            let is_stale = stale.iter().any(|s| s == w.name);
            if is_stale && reported.insert(w.name) {
                error!(context = w.name, timeout_ms = self.timeout_ms, "context missed its liveness deadline");
            } else if !is_stale && reported.remove(w.name) {
                info!(context = w.name, "context recovered");
            }
        }
        stale
    }
}
