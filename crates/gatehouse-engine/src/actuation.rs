//! Actuation Controller
//!
//! Owns the lock relay and buzzer. Each output runs `Idle -> Active(deadline)
//! -> Idle`; deadlines are checked by [`ActuationController::tick`] every
//! control cycle, so nothing here ever sleeps or blocks.
//!
//! The lock enforces a cooldown between actuations. The buzzer has none:
//! every call overwrites its deadline.

use crate::config::ActuationConfig;
use gatehouse_core::effects::{Output, OutputEffects, TimeEffects};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// State of one output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputState {
    /// Output low
    Idle,
    /// Output high until the monotonic deadline
    Active {
        /// Monotonic millisecond at which the output goes low
        deadline_ms: u64,
    },
}

impl OutputState {
    /// Whether the output is high
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    /// Deadline of an active output
    pub fn deadline(&self) -> Option<u64> {
        match self {
            Self::Active { deadline_ms } => Some(*deadline_ms),
            Self::Idle => None,
        }
    }
}

/// Read-only view of both outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuationState {
    /// Lock relay state
    pub lock: OutputState,
    /// Buzzer state
    pub buzzer: OutputState,
    /// Monotonic millisecond of the last accepted unlock
    pub last_unlock_at: Option<u64>,
}

/// Outcome of an unlock request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockResult {
    /// Lock released until the deadline
    Engaged {
        /// Monotonic millisecond at which the lock re-engages
        deadline_ms: u64,
    },
    /// Rejected: the previous unlock was too recent
    CooldownActive {
        /// Milliseconds until another unlock is accepted
        remaining_ms: u64,
    },
    /// The relay could not be driven
    Fault,
}

impl UnlockResult {
    /// Whether the lock was released
    pub fn is_engaged(&self) -> bool {
        matches!(self, Self::Engaged { .. })
    }
}

#[derive(Debug)]
struct Channel {
    output: Output,
    state: OutputState,
    release_faulted: bool,
}

impl Channel {
    fn new(output: Output) -> Self {
        Self {
            output,
            state: OutputState::Idle,
            release_faulted: false,
        }
    }

    fn engage(&mut self, outputs: &dyn OutputEffects, deadline_ms: u64) -> bool {
        if let Err(err) = outputs.set_output(self.output, true) {
            error!(output = %self.output, error = %err, "failed to engage output");
            return false;
        }
        self.state = OutputState::Active { deadline_ms };
        true
    }

    /// Drive low once the deadline has passed. A failed release stays
    /// active and is retried next tick.
    fn expire(&mut self, outputs: &dyn OutputEffects, now_ms: u64) {
        let OutputState::Active { deadline_ms } = self.state else {
            return;
        };
        if now_ms < deadline_ms {
            return;
        }
        self.release(outputs);
    }

    fn release(&mut self, outputs: &dyn OutputEffects) {
        match outputs.set_output(self.output, false) {
            Ok(()) => {
                if self.release_faulted {
                    info!(output = %self.output, "output release recovered");
                }
                self.state = OutputState::Idle;
                self.release_faulted = false;
            }
            Err(err) if !self.release_faulted => {
                error!(output = %self.output, error = %err, "failed to release output, retrying");
                self.release_faulted = true;
            }
            Err(err) => debug!(output = %self.output, error = %err, "output release still failing"),
        }
    }
}

/// Lock and buzzer state machines.
pub struct ActuationController {
    outputs: Arc<dyn OutputEffects>,
    time: Arc<dyn TimeEffects>,
    config: ActuationConfig,
    lock: Channel,
    buzzer: Channel,
    last_unlock_at: Option<u64>,
}

impl std::fmt::Debug for ActuationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActuationController")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ActuationController {
    /// Create a controller with both outputs idle.
    pub fn new(
        outputs: Arc<dyn OutputEffects>,
        time: Arc<dyn TimeEffects>,
        config: ActuationConfig,
    ) -> Self {
        Self {
            outputs,
            time,
            config,
            lock: Channel::new(Output::Lock),
            buzzer: Channel::new(Output::Buzzer),
            last_unlock_at: None,
        }
    }

    /// Release the lock for `duration_ms`, unless within the cooldown of the
    /// previous accepted unlock.
    pub fn unlock(&mut self, duration_ms: u64) -> UnlockResult {
        let now = self.time.monotonic_ms();
        if let Some(last) = self.last_unlock_at {
            let elapsed = now.saturating_sub(last);
            if elapsed < self.config.cooldown_ms {
                let remaining_ms = self.config.cooldown_ms - elapsed;
                warn!(remaining_ms, "cooldown active, unlock ignored");
                return UnlockResult::CooldownActive { remaining_ms };
            }
        }

        let deadline_ms = now.saturating_add(duration_ms);
        if !self.lock.engage(self.outputs.as_ref(), deadline_ms) {
            return UnlockResult::Fault;
        }
        self.last_unlock_at = Some(now);
        debug!(duration_ms, "lock released");
        UnlockResult::Engaged { deadline_ms }
    }

    /// Release the lock for the configured default duration.
    pub fn unlock_default(&mut self) -> UnlockResult {
        self.unlock(self.config.unlock_ms)
    }

    /// Sound the buzzer for `duration_ms`, overwriting any running buzz.
    pub fn buzz(&mut self, duration_ms: u64) {
        let deadline_ms = self.time.monotonic_ms().saturating_add(duration_ms);
        self.buzzer.engage(self.outputs.as_ref(), deadline_ms);
    }

    /// Drive expired outputs low. Called every control cycle.
    pub fn tick(&mut self) {
        let now = self.time.monotonic_ms();
        self.lock.expire(self.outputs.as_ref(), now);
        self.buzzer.expire(self.outputs.as_ref(), now);
    }

    /// Force both outputs low immediately (shutdown path).
    pub fn release_all(&mut self) {
        self.lock.release(self.outputs.as_ref());
        self.buzzer.release(self.outputs.as_ref());
    }

    /// Snapshot of both outputs
    pub fn state(&self) -> ActuationState {
        ActuationState {
            lock: self.lock.state,
            buzzer: self.buzzer.state,
            last_unlock_at: self.last_unlock_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_testkit::{ControllableClock, RecordingOutputs};

    fn controller() -> (Arc<ControllableClock>, Arc<RecordingOutputs>, ActuationController) {
        let clock = Arc::new(ControllableClock::new(10_000));
        let outputs = Arc::new(RecordingOutputs::new());
        let controller =
            ActuationController::new(outputs.clone(), clock.clone(), ActuationConfig::default());
        (clock, outputs, controller)
    }

    #[test]
    fn test_lock_releases_after_deadline() {
        let (clock, outputs, mut controller) = controller();
        assert_eq!(
            controller.unlock(3_000),
            UnlockResult::Engaged { deadline_ms: 13_000 }
        );
        assert!(outputs.level(Output::Lock));

        clock.advance_ms(2_999);
        controller.tick();
        assert!(outputs.level(Output::Lock));

        clock.advance_ms(1);
        controller.tick();
        assert!(!outputs.level(Output::Lock));
        assert_eq!(controller.state().lock, OutputState::Idle);
    }

    #[test]
    fn test_cooldown_yields_single_interval() {
        let (clock, outputs, mut controller) = controller();
        assert!(controller.unlock(3_000).is_engaged());
        clock.advance_ms(1_000);
        assert_eq!(
            controller.unlock(3_000),
            UnlockResult::CooldownActive { remaining_ms: 2_000 }
        );
        assert_eq!(controller.state().lock.deadline(), Some(13_000));

        clock.advance_ms(2_000);
        controller.tick();
        assert!(!outputs.level(Output::Lock));
        assert_eq!(outputs.transitions(Output::Lock), vec![true, false]);
    }

    #[test]
    fn test_unlock_accepted_after_cooldown() {
        let (clock, _outputs, mut controller) = controller();
        assert!(controller.unlock(1_000).is_engaged());
        clock.advance_ms(3_000);
        assert!(controller.unlock(1_000).is_engaged());
        assert_eq!(controller.state().last_unlock_at, Some(13_000));
    }

    #[test]
    fn test_buzzer_overwrites_deadline() {
        let (clock, outputs, mut controller) = controller();
        controller.buzz(2_000);
        clock.advance_ms(100);
        controller.buzz(100);
        assert_eq!(controller.state().buzzer.deadline(), Some(10_200));
        clock.advance_ms(100);
        controller.tick();
        assert!(!outputs.level(Output::Buzzer));
    }

    #[test]
    fn test_failed_release_is_retried() {
        let (clock, outputs, mut controller) = controller();
        controller.unlock(100);
        outputs.fail_writes(true);
        clock.advance_ms(100);
        controller.tick();
        assert!(controller.state().lock.is_active());

        outputs.fail_writes(false);
        controller.tick();
        assert!(!controller.state().lock.is_active());
        assert!(!outputs.level(Output::Lock));
    }

    #[test]
    fn test_fault_does_not_start_cooldown() {
        let (_clock, outputs, mut controller) = controller();
        outputs.fail_writes(true);
        assert_eq!(controller.unlock(3_000), UnlockResult::Fault);
        outputs.fail_writes(false);
        assert!(controller.unlock(3_000).is_engaged());
    }
}
