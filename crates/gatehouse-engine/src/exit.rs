//! Exit Request Monitor
//!
//! Debounced edge detector on the request-to-exit input. An accepted rising
//! edge runs the same actuation as a granted credential and is audited as
//! `EXIT_SENSOR`. The monitor latches on trigger and only re-arms once the
//! input has been low for the debounce interval, so a held button yields a
//! single actuation.

use crate::actuation::ActuationController;
use crate::audit_log::AuditTrail;
use crate::config::{ExitMonitorConfig, SHORT_BUZZ_MS};
use gatehouse_core::effects::{InputEffects, TimeEffects};
use gatehouse_core::AuditRecord;
use std::sync::Arc;
use tracing::{info, warn};

/// Request-to-exit edge detector.
pub struct ExitRequestMonitor {
    input: Arc<dyn InputEffects>,
    time: Arc<dyn TimeEffects>,
    audit: AuditTrail,
    config: ExitMonitorConfig,
    /// Last accepted level; `None` until the first successful sample
    stable: Option<bool>,
    last_transition_at: Option<u64>,
    latched: bool,
    read_failed: bool,
}

impl std::fmt::Debug for ExitRequestMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExitRequestMonitor")
            .field("stable", &self.stable)
            .field("latched", &self.latched)
            .finish_non_exhaustive()
    }
}

impl ExitRequestMonitor {
    /// Create a monitor; the first sample sets the baseline level.
    pub fn new(
        input: Arc<dyn InputEffects>,
        time: Arc<dyn TimeEffects>,
        audit: AuditTrail,
        config: ExitMonitorConfig,
    ) -> Self {
        Self {
            input,
            time,
            audit,
            config,
            stable: None,
            last_transition_at: None,
            latched: false,
            read_failed: false,
        }
    }

    /// Whether a trigger is latched
    pub fn is_latched(&self) -> bool {
        self.latched
    }

    /// Sample the input once. Returns `true` if this poll triggered an
    /// actuation.
    pub fn poll(&mut self, actuation: &mut ActuationController) -> bool {
        let level = match self.input.exit_request_level() {
            Ok(level) => {
                self.read_failed = false;
                level
            }
            Err(err) => {
                if !self.read_failed {
                    warn!(error = %err, "exit request input unreadable");
                    self.read_failed = true;
                }
                return false;
            }
        };
        let now = self.time.monotonic_ms();

        let Some(stable) = self.stable else {
            // A button already held at start-up must be released first.
            self.stable = Some(level);
            self.latched = level;
            if level {
                warn!("exit request input high at start-up, ignoring until released");
            }
            return false;
        };

        let debounced = self
            .last_transition_at
            .map_or(true, |at| now.saturating_sub(at) >= self.config.debounce_ms);

        if level != stable && debounced {
            self.stable = Some(level);
            self.last_transition_at = Some(now);
            if level && !self.latched {
                self.latched = true;
                self.trigger(actuation);
                return true;
            }
            return false;
        }

        if !level && stable == level && self.latched && debounced {
            self.latched = false;
        }
        false
    }

    fn trigger(&self, actuation: &mut ActuationController) {
        info!("exit request");
        actuation.unlock_default();
        actuation.buzz(SHORT_BUZZ_MS);
        self.audit
            .record(AuditRecord::exit_request(self.time.wall_clock()));
    }
}
