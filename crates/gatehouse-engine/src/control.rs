//! Latency-sensitive context.
//!
//! One [`ControlLoop::cycle`] polls the reader, applies control signals
//! from the network context, samples the exit input, advances the output
//! deadlines and feeds the heartbeat. Nothing in a cycle waits on the
//! network; the only I/O is a single audit append per decision.

use crate::actuation::{ActuationController, UnlockResult};
use crate::audit_log::AuditTrail;
use crate::config::SHORT_BUZZ_MS;
use crate::decision::{AccessDecisionEngine, ScanOutcome};
use crate::exit::ExitRequestMonitor;
use crate::queue::QueueReceiver;
use crate::watchdog::Heartbeat;
use gatehouse_core::effects::{CredentialReaderEffects, TimeEffects};
use gatehouse_core::{AuditOutcome, AuditRecord, REMOTE_UNLOCK_ID};
use std::sync::Arc;
use tracing::{info, warn};

/// Signals sent from the network context to the control context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Validated remote unlock
    Unlock {
        /// Requested release duration
        duration_ms: u64,
    },
}

/// Signals applied per cycle; the queue is small so this drains it.
const SIGNALS_PER_CYCLE: usize = 8;

/// Everything the control context owns.
pub struct ControlLoop {
    reader: Arc<dyn CredentialReaderEffects>,
    time: Arc<dyn TimeEffects>,
    decision: AccessDecisionEngine,
    exit: ExitRequestMonitor,
    actuation: ActuationController,
    audit: AuditTrail,
    signals: QueueReceiver<ControlSignal>,
    heartbeat: Heartbeat,
}

impl std::fmt::Debug for ControlLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlLoop")
            .field("actuation", &self.actuation)
            .field("exit", &self.exit)
            .finish_non_exhaustive()
    }
}

/// Handlers the control context reads from
pub struct ControlEffects {
    /// Credential reader
    pub reader: Arc<dyn CredentialReaderEffects>,
    /// Clock
    pub time: Arc<dyn TimeEffects>,
}

impl ControlLoop {
    /// Assemble the control context.
    pub fn new(
        effects: ControlEffects,
        decision: AccessDecisionEngine,
        exit: ExitRequestMonitor,
        actuation: ActuationController,
        audit: AuditTrail,
        signals: QueueReceiver<ControlSignal>,
        heartbeat: Heartbeat,
    ) -> Self {
        Self {
            reader: effects.reader,
            time: effects.time,
            decision,
            exit,
            actuation,
            audit,
            signals,
            heartbeat,
        }
    }

    /// Run one cycle. Returns the scan outcome if a credential was read.
    pub fn cycle(&mut self) -> Option<ScanOutcome> {
        let scan = self
            .reader
            .poll_scan()
            .map(|raw| self.decision.handle_scan(&raw, &mut self.actuation));

        for signal in self.signals.drain(SIGNALS_PER_CYCLE) {
            self.apply(signal);
        }

        self.exit.poll(&mut self.actuation);
        self.actuation.tick();
        self.heartbeat.feed();
        scan
    }

    fn apply(&mut self, signal: ControlSignal) {
        match signal {
            ControlSignal::Unlock { duration_ms } => {
                let result = self.actuation.unlock(duration_ms);
                let outcome = if result.is_engaged() {
                    self.actuation.buzz(SHORT_BUZZ_MS);
                    info!(duration_ms, "remote unlock");
                    AuditOutcome::Granted
                } else {
                    if let UnlockResult::CooldownActive { remaining_ms } = result {
                        warn!(remaining_ms, "remote unlock rejected by cooldown");
                    }
                    AuditOutcome::Error
                };
                self.audit.record(AuditRecord::remote(
                    REMOTE_UNLOCK_ID,
                    "Remote Unlock",
                    outcome,
                    self.time.wall_clock(),
                ));
            }
        }
    }

    /// Force every output low. Called once when the context stops.
    pub fn shutdown(&mut self) {
        info!("control context stopping, securing outputs");
        self.actuation.release_all();
    }

    /// Output state, for diagnostics and tests
    pub fn actuation(&self) -> &ActuationController {
        &self.actuation
    }
}
