//! Remote Command Processor
//!
//! The only component that talks to the remote tree. Each connected cycle it
//!
//! 1. publishes the full registry once after start-up,
//! 2. polls the command inbox on the poll interval,
//! 3. mirrors a bounded batch of queued audit records and pending notices,
//!    and retries registry entries whose mirror write failed,
//! 4. publishes the health report on the status interval.
//!
//! Mirrored registry entries are re-read from the registry when they are
//! sent, so a late write never publishes a membership that no longer holds.
//!
//! # Commit protocol
//!
//! A valid command is removed from the inbox *before* it is applied. If the
//! removal fails the command is not applied this cycle. A command may be lost
//! on transport failure but is never applied twice. Submission markers add a
//! second guard: a re-delivered command whose marker is not newer than the
//! last applied one of its kind is removed without being applied.

use crate::audit_log::AuditTrail;
use crate::command::{parse_command, CommandKind, RemoteCommand, ValidationError};
use crate::config::{millis, ProcessorConfig};
use crate::control::ControlSignal;
use crate::decision::PendingNotice;
use crate::queue::{QueueDropCounters, QueueReceiver, QueueSender};
use crate::registry::{Assignment, CredentialRegistry, RegistryError};
use crate::watchdog::Watchdog;
use chrono::{DateTime, NaiveDate, Utc};
use gatehouse_core::effects::{RemoteEffects, SystemEffects, TimeEffects};
use gatehouse_core::{
    AuditOutcome, AuditRecord, CredentialSet, DeviceId, DeviceStatus, Identifier, Label,
    RemotePath, TransportError, REMOTE_UNLOCK_ID,
};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// What happened to one inbox command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandDisposition {
    /// Removed and applied
    Applied,
    /// Failed validation; reported and removed
    Rejected(ValidationError),
    /// Marker not newer than the last applied one; removed, not applied
    Stale,
    /// Removal failed; left in the inbox and not applied
    RemovalFailed,
    /// Removed, but the registry rejected the change
    ApplyFailed,
}

/// Summary of one processor cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Whether the remote was reachable
    pub connected: bool,
    /// Commands handled this cycle, in processing order
    pub commands: Vec<(CommandKind, CommandDisposition)>,
    /// Objects written to the mirror
    pub mirrored: usize,
    /// Whether a status report was published
    pub status_published: bool,
}

/// Handlers used by the processor
pub struct ProcessorEffects {
    /// Remote tree
    pub remote: Arc<dyn RemoteEffects>,
    /// Clock
    pub time: Arc<dyn TimeEffects>,
    /// Health indicators
    pub system: Arc<dyn SystemEffects>,
}

/// Queue ends owned by the network context
pub struct ProcessorQueues {
    /// Audit records to mirror
    pub audit: QueueReceiver<AuditRecord>,
    /// Pending notices to mirror
    pub pending: QueueReceiver<PendingNotice>,
    /// Signals to the control context
    pub control: QueueSender<ControlSignal>,
    /// Overflow counters of all three queues
    pub drops: QueueDropCounters,
}

#[derive(Debug, Clone)]
enum MirrorItem {
    Log(AuditRecord),
    /// New unknown credential; dropped if it has left the pending set
    Pending(PendingNotice),
    /// Entry whose remote copy may not match the registry
    Entry {
        set: CredentialSet,
        identifier: Identifier,
    },
}

/// Remote write for one backlog item
enum MirrorWrite {
    Put(RemotePath, Value),
    Remove(RemotePath),
    /// Nothing to publish
    Skip,
    /// Registry unreadable; retry next cycle
    Defer,
}

/// Bound a remote call by `timeout`.
async fn bounded<T>(
    timeout: Duration,
    operation: &'static str,
    call: impl Future<Output = Result<T, TransportError>>,
) -> Result<T, TransportError> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout {
            operation: operation.to_string(),
            timeout_ms: millis(timeout),
        }),
    }
}

/// Time-sortable unique key for log and error entries.
fn entry_key(time: Option<DateTime<Utc>>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    match time {
        Some(t) => format!("{:013}-{}", t.timestamp_millis(), &suffix[..12]),
        None => format!("unsynced-{suffix}"),
    }
}

fn entry_body(set: CredentialSet, label: &Label, since: Option<DateTime<Utc>>) -> Value {
    let since_field = match set {
        CredentialSet::Pending => "firstSeen",
        CredentialSet::Allow | CredentialSet::Deny => "addedAt",
    };
    let mut body = serde_json::Map::new();
    body.insert("label".to_string(), json!(label));
    body.insert(since_field.to_string(), json!(since));
    Value::Object(body)
}

fn due(last: Option<u64>, now_ms: u64, interval: Duration) -> bool {
    last.map_or(true, |at| now_ms.saturating_sub(at) >= millis(interval))
}

/// Network-context worker.
pub struct RemoteCommandProcessor {
    device: DeviceId,
    firmware_version: String,
    config: ProcessorConfig,
    remote: Arc<dyn RemoteEffects>,
    time: Arc<dyn TimeEffects>,
    system: Arc<dyn SystemEffects>,
    registry: Arc<CredentialRegistry>,
    audit: AuditTrail,
    queues: ProcessorQueues,
    watchdog: Option<Arc<Watchdog>>,
    started_at_ms: u64,
    online: bool,
    startup_mirrored: bool,
    last_poll_ms: Option<u64>,
    last_status_ms: Option<u64>,
    last_prune_day: Option<NaiveDate>,
    last_applied: HashMap<CommandKind, u64>,
    backlog: VecDeque<MirrorItem>,
}

impl std::fmt::Debug for RemoteCommandProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCommandProcessor")
            .field("device", &self.device)
            .field("online", &self.online)
            .field("backlog", &self.backlog.len())
            .finish_non_exhaustive()
    }
}

impl RemoteCommandProcessor {
    /// Create a processor for `device`.
    pub fn new(
        device: DeviceId,
        firmware_version: impl Into<String>,
        config: ProcessorConfig,
        effects: ProcessorEffects,
        registry: Arc<CredentialRegistry>,
        audit: AuditTrail,
        queues: ProcessorQueues,
    ) -> Self {
        let started_at_ms = effects.time.monotonic_ms();
        Self {
            device,
            firmware_version: firmware_version.into(),
            config,
            remote: effects.remote,
            time: effects.time,
            system: effects.system,
            registry,
            audit,
            queues,
            watchdog: None,
            started_at_ms,
            online: false,
            startup_mirrored: false,
            last_poll_ms: None,
            last_status_ms: None,
            last_prune_day: None,
            last_applied: HashMap::new(),
            backlog: VecDeque::new(),
        }
    }

    /// Include stale contexts from `watchdog` in status reports.
    pub fn with_watchdog(mut self, watchdog: Arc<Watchdog>) -> Self {
        self.watchdog = Some(watchdog);
        self
    }

    /// Whether the last cycle found the remote reachable
    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Run one network-context cycle.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();
        self.prune_if_due();
        if let Some(watchdog) = &self.watchdog {
            watchdog.check();
        }

        if !self.remote.is_connected() {
            if self.online {
                warn!("remote unreachable, mirroring suspended");
                self.online = false;
            }
            return report;
        }
        report.connected = true;
        if !self.online {
            info!(device = %self.device, "remote reachable");
            self.online = true;
        }

        if !self.startup_mirrored {
            match self.mirror_registry().await {
                Ok(count) => {
                    info!(entries = count, "registry mirrored");
                    self.startup_mirrored = true;
                    report.mirrored += count;
                }
                Err(err) => warn!(error = %err, "registry mirror failed, retrying next cycle"),
            }
        }

        let now = self.time.monotonic_ms();
        if due(self.last_poll_ms, now, self.config.command_poll) {
            self.last_poll_ms = Some(now);
            for kind in CommandKind::PROCESSING_ORDER {
                if let Some(disposition) = self.process_command(kind).await {
                    report.commands.push((kind, disposition));
                }
            }
        }

        report.mirrored += self.flush_mirror().await;

        if due(self.last_status_ms, now, self.config.status_interval) {
            self.last_status_ms = Some(now);
            match self.publish_status(true).await {
                Ok(()) => report.status_published = true,
                Err(err) => warn!(error = %err, "status report failed"),
            }
        }
        report
    }

    /// Publish a final offline status, best-effort.
    pub async fn shutdown(&mut self) {
        if !self.remote.is_connected() {
            return;
        }
        if let Err(err) = self.publish_status(false).await {
            warn!(error = %err, "final status report failed");
        }
        self.online = false;
    }

    fn prune_if_due(&mut self) {
        let Some(now) = self.time.wall_clock() else {
            return;
        };
        let today = now.date_naive();
        if self.last_prune_day == Some(today) {
            return;
        }
        self.last_prune_day = Some(today);
        match self.audit.log().prune(now) {
            Ok(removed) if !removed.is_empty() => {
                info!(days = removed.len(), "expired audit days pruned");
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "audit pruning failed"),
        }
    }

    async fn process_command(&mut self, kind: CommandKind) -> Option<CommandDisposition> {
        let timeout = self.config.remote_timeout;
        let path = RemotePath::command(&self.device, kind.as_str());
        let payload = match bounded(timeout, "receive", self.remote.receive(&path)).await {
            Ok(Some(payload)) => payload,
            Ok(None) => return None,
            Err(err) => {
                warn!(command = %kind, error = %err, "command fetch failed");
                return None;
            }
        };

        let envelope = match parse_command(kind, &payload)
            .and_then(|envelope| self.check_preconditions(&envelope.command).map(|()| envelope))
        {
            Ok(envelope) => envelope,
            Err(reason) => {
                self.reject(kind, &path, &payload, &reason).await;
                return Some(CommandDisposition::Rejected(reason));
            }
        };

        if let (Some(marker), Some(last)) =
            (envelope.submitted_at, self.last_applied.get(&kind).copied())
        {
            if marker <= last {
                info!(command = %kind, marker, last, "stale command discarded");
                if let Err(err) = bounded(timeout, "delete", self.remote.delete(&path)).await {
                    warn!(command = %kind, error = %err, "stale command not removed");
                }
                return Some(CommandDisposition::Stale);
            }
        }

        if let Err(err) = bounded(timeout, "delete", self.remote.delete(&path)).await {
            warn!(command = %kind, error = %err, "command removal failed, not applied");
            return Some(CommandDisposition::RemovalFailed);
        }
        if let Some(marker) = envelope.submitted_at {
            self.last_applied.insert(kind, marker);
        }

        match self.apply(envelope.command).await {
            Ok(()) => Some(CommandDisposition::Applied),
            Err(err) => {
                error!(command = %kind, error = %err, "command removed but not applied");
                self.report_error(kind, &payload, &err.to_string()).await;
                Some(CommandDisposition::ApplyFailed)
            }
        }
    }

    /// Checks that need registry state.
    fn check_preconditions(&self, command: &RemoteCommand) -> Result<(), ValidationError> {
        match command {
            RemoteCommand::Rename {
                set, identifier, ..
            } if !self.registry.contains(*set, identifier) => Err(ValidationError::NotInSet {
                set: *set,
                identifier: identifier.clone(),
            }),
            _ => Ok(()),
        }
    }

    async fn reject(
        &self,
        kind: CommandKind,
        path: &RemotePath,
        payload: &Value,
        reason: &ValidationError,
    ) {
        warn!(command = %kind, reason = %reason, "command rejected");
        self.report_error(kind, payload, &reason.to_string()).await;
        let timeout = self.config.remote_timeout;
        if let Err(err) = bounded(timeout, "delete", self.remote.delete(path)).await {
            warn!(command = %kind, error = %err, "rejected command not removed");
        }
    }

    /// Write a `commandErrors` entry and a local `Error` audit record.
    async fn report_error(&self, kind: CommandKind, payload: &Value, reason: &str) {
        let time = self.time.wall_clock();
        let body = json!({
            "command": kind.as_str(),
            "error": reason,
            "originalPayload": payload,
            "time": time,
        });
        let path = RemotePath::command_error(&self.device, &entry_key(time));
        if let Err(err) = bounded(self.config.remote_timeout, "send", self.remote.send(&path, body)).await {
            warn!(command = %kind, error = %err, "command error report failed");
        }

        let identifier = match kind {
            CommandKind::Unlock => REMOTE_UNLOCK_ID.to_string(),
            _ => payload
                .get("identifier")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        };
        self.audit.record(AuditRecord::remote(
            identifier,
            format!("{kind} rejected"),
            AuditOutcome::Error,
            time,
        ));
    }

    async fn apply(&mut self, command: RemoteCommand) -> Result<(), RegistryError> {
        let now = self.time.wall_clock();
        match command {
            RemoteCommand::Unlock { duration } => {
                let duration_ms = millis(duration);
                if !self.queues.control.push(ControlSignal::Unlock { duration_ms }) {
                    warn!(duration_ms, "remote unlock dropped");
                }
            }
            RemoteCommand::Add {
                set,
                identifier,
                label,
            } => {
                let assignment = self.registry.assign(set, &identifier, label, now)?;
                self.mirror_assignment(set, &identifier, &assignment).await;
                self.record_update(&identifier, &assignment.label, now);
            }
            RemoteCommand::Delete { set, identifier } => {
                match self.registry.remove(set, &identifier)? {
                    Some(entry) => {
                        self.mirror_delete(set, &identifier).await;
                        self.record_update(&identifier, &entry.label, now);
                    }
                    None => debug!(%set, identifier = %identifier, "already absent"),
                }
            }
            RemoteCommand::Move {
                from,
                to,
                identifier,
                label,
            } => {
                if !self.registry.contains(from, &identifier) {
                    warn!(%from, %to, identifier = %identifier, "not in source set, placing anyway");
                }
                let assignment = self.registry.assign(to, &identifier, label, now)?;
                self.mirror_assignment(to, &identifier, &assignment).await;
                self.record_update(&identifier, &assignment.label, now);
            }
            RemoteCommand::Rename {
                set,
                identifier,
                label,
            } => {
                self.registry.upsert(set, &identifier, label.clone(), now)?;
                let since = self.registry.entry(set, &identifier).and_then(|e| e.since);
                self.mirror_entry(set, &identifier, &label, since).await;
                self.record_update(&identifier, &label, now);
            }
        }
        Ok(())
    }

    fn record_update(&self, identifier: &Identifier, label: &Label, now: Option<DateTime<Utc>>) {
        info!(identifier = %identifier, label = %label, "registry updated");
        self.audit.record(AuditRecord::remote(
            identifier.as_str(),
            label.as_str(),
            AuditOutcome::Updated,
            now,
        ));
    }

    async fn mirror_assignment(
        &mut self,
        set: CredentialSet,
        id: &Identifier,
        assignment: &Assignment,
    ) {
        for removed in &assignment.removed_from {
            self.mirror_delete(*removed, id).await;
        }
        self.mirror_entry(set, id, &assignment.label, assignment.since)
            .await;
    }

    async fn mirror_entry(
        &mut self,
        set: CredentialSet,
        id: &Identifier,
        label: &Label,
        since: Option<DateTime<Utc>>,
    ) {
        let path = RemotePath::entry(&self.device, set, id);
        let call = self.remote.send(&path, entry_body(set, label, since));
        if let Err(err) = bounded(self.config.remote_timeout, "send", call).await {
            warn!(%set, identifier = %id, error = %err, "entry mirror failed, queued for retry");
            self.retry_entry(set, id);
        }
    }

    async fn mirror_delete(&mut self, set: CredentialSet, id: &Identifier) {
        let path = RemotePath::entry(&self.device, set, id);
        let call = self.remote.delete(&path);
        if let Err(err) = bounded(self.config.remote_timeout, "delete", call).await {
            warn!(%set, identifier = %id, error = %err, "entry mirror delete failed, queued for retry");
            self.retry_entry(set, id);
        }
    }

    fn retry_entry(&mut self, set: CredentialSet, id: &Identifier) {
        let queued = self.backlog.iter().any(|item| {
            matches!(item, MirrorItem::Entry { set: s, identifier } if *s == set && identifier == id)
        });
        if !queued {
            self.backlog.push_back(MirrorItem::Entry {
                set,
                identifier: id.clone(),
            });
        }
    }

    /// The write that brings the remote copy of `item` up to date.
    fn plan_write(&self, item: &MirrorItem) -> MirrorWrite {
        match item {
            MirrorItem::Log(record) => {
                let mut body = match serde_json::to_value(record) {
                    Ok(body) => body,
                    Err(err) => {
                        warn!(error = %err, "unencodable audit record skipped");
                        return MirrorWrite::Skip;
                    }
                };
                if let Some(fields) = body.as_object_mut() {
                    fields.insert("device".to_string(), json!(self.device.as_str()));
                }
                MirrorWrite::Put(RemotePath::log(&self.device, &entry_key(record.time)), body)
            }
            MirrorItem::Pending(notice) => {
                let set = CredentialSet::Pending;
                match self.registry.lookup(set, &notice.identifier) {
                    Ok(Some(entry)) => MirrorWrite::Put(
                        RemotePath::entry(&self.device, set, &notice.identifier),
                        entry_body(set, &entry.label, entry.since),
                    ),
                    Ok(None) => {
                        debug!(identifier = %notice.identifier, "no longer pending, notice dropped");
                        MirrorWrite::Skip
                    }
                    Err(err) => {
                        debug!(error = %err, "pending notice deferred");
                        MirrorWrite::Defer
                    }
                }
            }
            MirrorItem::Entry { set, identifier } => {
                let path = RemotePath::entry(&self.device, *set, identifier);
                match self.registry.lookup(*set, identifier) {
                    Ok(Some(entry)) => {
                        MirrorWrite::Put(path, entry_body(*set, &entry.label, entry.since))
                    }
                    Ok(None) => MirrorWrite::Remove(path),
                    Err(err) => {
                        debug!(error = %err, "entry mirror retry deferred");
                        MirrorWrite::Defer
                    }
                }
            }
        }
    }

    /// Publish every registry entry. Outward only.
    async fn mirror_registry(&self) -> Result<usize, String> {
        let mut count = 0;
        for set in CredentialSet::ALL {
            let entries = self.registry.entries(set).map_err(|e| e.to_string())?;
            for (id, entry) in &entries {
                let path = RemotePath::entry(&self.device, set, id);
                let body = entry_body(set, &entry.label, entry.since);
                bounded(self.config.remote_timeout, "send", self.remote.send(&path, body))
                    .await
                    .map_err(|e| e.to_string())?;
                count += 1;
            }
        }
        Ok(count)
    }

    /// Send queued audit records, pending notices and entry retries, oldest
    /// first. An item that fails to send stays at the front for the next
    /// cycle.
    async fn flush_mirror(&mut self) -> usize {
        let batch = self.config.mirror_batch.max(1);
        let capacity = batch * 2;

        let room = capacity.saturating_sub(self.backlog.len()).min(batch);
        self.backlog
            .extend(self.queues.audit.drain(room).into_iter().map(MirrorItem::Log));
        let room = capacity.saturating_sub(self.backlog.len()).min(batch);
        self.backlog.extend(
            self.queues
                .pending
                .drain(room)
                .into_iter()
                .map(MirrorItem::Pending),
        );

        let mut sent = 0;
        while sent < capacity {
            let Some(item) = self.backlog.front() else {
                break;
            };
            let timeout = self.config.remote_timeout;
            let result = match self.plan_write(item) {
                MirrorWrite::Skip => {
                    self.backlog.pop_front();
                    continue;
                }
                MirrorWrite::Defer => break,
                MirrorWrite::Put(path, body) => {
                    bounded(timeout, "send", self.remote.send(&path, body)).await
                }
                MirrorWrite::Remove(path) => {
                    bounded(timeout, "delete", self.remote.delete(&path)).await
                }
            };
            if let Err(err) = result {
                debug!(error = %err, backlog = self.backlog.len(), "mirror write failed");
                break;
            }
            self.backlog.pop_front();
            sent += 1;
        }
        sent
    }

    async fn publish_status(&self, online: bool) -> Result<(), TransportError> {
        let status = DeviceStatus {
            online,
            last_seen: self.time.wall_clock(),
            ip: self.system.network_address(),
            signal: self.system.signal_strength(),
            free_memory: self.system.free_memory(),
            uptime: self.time.monotonic_ms().saturating_sub(self.started_at_ms) / 1_000,
            queue_drops: self.queues.drops.snapshot(),
            firmware_version: self.firmware_version.clone(),
            stale_contexts: self
                .watchdog
                .as_ref()
                .map(|w| w.stale())
                .unwrap_or_default(),
        };
        let body =
            serde_json::to_value(&status).map_err(|e| TransportError::Payload(e.to_string()))?;
        let path = RemotePath::status(&self.device);
        bounded(self.config.remote_timeout, "send", self.remote.send(&path, body)).await?;
        debug!(online, "status published");
        Ok(())
    }
}
