//! Whole-node harness over the deterministic handlers.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use chrono::{NaiveDate, TimeZone, Utc};
use gatehouse_core::effects::TimeEffects;
use gatehouse_core::{AuditRecord, CredentialSet, DeviceId, Identifier, RemotePath};
use gatehouse_engine::{
    assemble, CommandDisposition, CommandKind, CycleReport, NodeEffects, NodeParts, NodeSettings,
    ScanOutcome,
};
use gatehouse_testkit::{
    ControllableClock, FixedSystemInfo, MemoryRegistryStorage, MemoryRemote, QueuedReader,
    RecordingOutputs, ScriptedInput,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const DEVICE: &str = "door-1";

/// Control-context period used when stepping time
pub const STEP_MS: u64 = 10;

pub struct Harness {
    pub dir: TempDir,
    pub clock: Arc<ControllableClock>,
    pub remote: Arc<MemoryRemote>,
    pub outputs: Arc<RecordingOutputs>,
    pub input: Arc<ScriptedInput>,
    pub reader: Arc<QueuedReader>,
    pub storage: Arc<MemoryRegistryStorage>,
    pub node: NodeParts,
}

pub fn device() -> DeviceId {
    DeviceId::new(DEVICE).unwrap()
}

pub fn id(raw: &str) -> Identifier {
    Identifier::parse(raw).unwrap()
}

/// Settings with commands polled every network cycle.
pub fn settings(dir: &TempDir) -> NodeSettings {
    let mut settings = NodeSettings {
        device: device(),
        firmware_version: "1.4.2".to_string(),
        audit_dir: dir.path().join("audit"),
        audit_retention_days: 30,
        lock_timeout: Duration::from_millis(50),
        actuation: Default::default(),
        exit: Default::default(),
        queues: Default::default(),
        processor: Default::default(),
        runtime: Default::default(),
    };
    settings.processor.command_poll = Duration::ZERO;
    settings
}

impl Harness {
    pub fn new() -> Self {
        Self::build(Arc::new(MemoryRegistryStorage::new()), |_| {})
    }

    /// Start from a pre-populated registry.
    pub fn with_storage(storage: Arc<MemoryRegistryStorage>) -> Self {
        Self::build(storage, |_| {})
    }

    pub fn build(
        storage: Arc<MemoryRegistryStorage>,
        configure: impl FnOnce(&mut NodeSettings),
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let wall = Utc.with_ymd_and_hms(2026, 10, 18, 8, 0, 0).unwrap();
        let clock = Arc::new(ControllableClock::with_wall_clock(1_000, wall));
        let remote = Arc::new(MemoryRemote::new());
        let outputs = Arc::new(RecordingOutputs::new());
        let input = Arc::new(ScriptedInput::new(false));
        let reader = Arc::new(QueuedReader::new());

        let mut settings = settings(&dir);
        configure(&mut settings);
        let node = assemble(
            settings,
            NodeEffects {
                time: clock.clone(),
                remote: remote.clone(),
                system: Arc::new(FixedSystemInfo::default()),
                outputs: outputs.clone(),
                input: input.clone(),
                reader: reader.clone(),
                storage: storage.clone(),
            },
        )
        .unwrap();

        Self {
            dir,
            clock,
            remote,
            outputs,
            input,
            reader,
            storage,
            node,
        }
    }

    /// Present a credential and run one control cycle.
    pub fn scan(&mut self, raw: &str) -> ScanOutcome {
        self.reader.present(raw);
        self.node.control.cycle().expect("scan consumed")
    }

    /// Run control cycles for `ms`, advancing the clock one step at a time.
    pub fn run_control(&mut self, ms: u64) {
        let mut elapsed = 0;
        while elapsed < ms {
            self.clock.advance_ms(STEP_MS);
            self.node.control.cycle();
            elapsed += STEP_MS;
        }
    }

    pub async fn network(&mut self) -> CycleReport {
        self.node.processor.run_cycle().await
    }

    /// Run one network cycle and return the single command it handled.
    pub async fn apply(&mut self, kind: &str, payload: Value) -> (CommandKind, CommandDisposition) {
        self.command(kind, payload);
        let mut report = self.network().await;
        assert_eq!(report.commands.len(), 1, "{report:?}");
        report.commands.remove(0)
    }

    /// Place a command in the inbox as the remote service would.
    pub fn command(&self, kind: &str, payload: Value) {
        self.remote.put(&self.command_path(kind), payload);
    }

    pub fn command_path(&self, kind: &str) -> RemotePath {
        RemotePath::command(&device(), kind)
    }

    pub fn entry_path(&self, set: CredentialSet, raw: &str) -> RemotePath {
        RemotePath::entry(&device(), set, &id(raw))
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.wall_clock().unwrap().date_naive()
    }

    /// Local audit records written today
    pub fn audit_today(&self) -> Vec<AuditRecord> {
        self.node.audit_log.read_day(self.today()).unwrap()
    }
}
