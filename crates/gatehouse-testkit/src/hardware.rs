//! Door hardware doubles.

use gatehouse_core::effects::{CredentialReaderEffects, InputEffects, Output, OutputEffects};
use gatehouse_core::HardwareError;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

/// Outputs that remember every level they were driven to.
#[derive(Debug, Default)]
pub struct RecordingOutputs {
    transitions: Mutex<HashMap<Output, Vec<bool>>>,
    fail_writes: AtomicBool,
}

impl RecordingOutputs {
    /// Create outputs, all low
    pub fn new() -> Self {
        Self::default()
    }

    /// Current level of `output`
    pub fn level(&self, output: Output) -> bool {
        self.transitions
            .lock()
            .get(&output)
            .and_then(|levels| levels.last().copied())
            .unwrap_or(false)
    }

    /// Every level `output` was successfully driven to, in order
    pub fn transitions(&self, output: Output) -> Vec<bool> {
        self.transitions
            .lock()
            .get(&output)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of times `output` went high
    pub fn activations(&self, output: Output) -> usize {
        self.transitions(output).iter().filter(|high| **high).count()
    }

    /// Make every write fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl OutputEffects for RecordingOutputs {
    fn set_output(&self, output: Output, high: bool) -> Result<(), HardwareError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(HardwareError::Output {
                pin: output.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        self.transitions
            .lock()
            .entry(output)
            .or_default()
            .push(high);
        Ok(())
    }
}

/// Exit-request input whose level is set by the test.
#[derive(Debug, Default)]
pub struct ScriptedInput {
    level: AtomicBool,
    fail_reads: AtomicBool,
}

impl ScriptedInput {
    /// Create an input at `level`
    pub fn new(level: bool) -> Self {
        Self {
            level: AtomicBool::new(level),
            fail_reads: AtomicBool::new(false),
        }
    }

    /// Change the level
    pub fn set_level(&self, level: bool) {
        self.level.store(level, Ordering::SeqCst);
    }

    /// Make every read fail
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }
}

impl InputEffects for ScriptedInput {
    fn exit_request_level(&self) -> Result<bool, HardwareError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(HardwareError::Input {
                pin: "exit".to_string(),
                reason: "injected failure".to_string(),
            });
        }
        Ok(self.level.load(Ordering::SeqCst))
    }
}

/// Reader fed with scans by the test, one returned per poll.
#[derive(Debug, Default)]
pub struct QueuedReader {
    scans: Mutex<VecDeque<String>>,
}

impl QueuedReader {
    /// Create a reader with nothing presented
    pub fn new() -> Self {
        Self::default()
    }

    /// Present a credential
    pub fn present(&self, raw: impl Into<String>) {
        self.scans.lock().push_back(raw.into());
    }

    /// Scans not yet polled
    pub fn waiting(&self) -> usize {
        self.scans.lock().len()
    }
}

impl CredentialReaderEffects for QueuedReader {
    fn poll_scan(&self) -> Option<String> {
        self.scans.lock().pop_front()
    }
}
