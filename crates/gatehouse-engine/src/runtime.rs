//! Two-context node runtime.
//!
//! [`assemble`] builds every component from explicit handlers and settings;
//! nothing is a process-wide singleton. [`Node::start`] then spawns the
//! latency-sensitive control context and the network context as tasks that
//! share only the registry and the bounded queues, and stop on a watch flag.

use crate::actuation::ActuationController;
use crate::audit_log::{AuditLog, AuditTrail};
use crate::config::{
    millis, ActuationConfig, ExitMonitorConfig, ProcessorConfig, QueueConfig, RuntimeConfig,
};
use crate::control::{ControlEffects, ControlLoop};
use crate::decision::AccessDecisionEngine;
use crate::exit::ExitRequestMonitor;
use crate::processor::{ProcessorEffects, ProcessorQueues, RemoteCommandProcessor};
use crate::queue::{bounded, QueueDropCounters};
use crate::registry::CredentialRegistry;
use crate::watchdog::{Heartbeat, Watchdog};
use gatehouse_core::effects::{
    CredentialReaderEffects, InputEffects, OutputEffects, RegistryStorage, RemoteEffects,
    SystemEffects, TimeEffects,
};
use gatehouse_core::{DeviceId, GatehouseError};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Heartbeat name of the control context
pub const CONTROL_CONTEXT: &str = "control";
/// Heartbeat name of the network context
pub const NETWORK_CONTEXT: &str = "network";

/// Handlers the node runs against
#[derive(Clone)]
pub struct NodeEffects {
    /// Clock
    pub time: Arc<dyn TimeEffects>,
    /// Remote tree
    pub remote: Arc<dyn RemoteEffects>,
    /// Health indicators
    pub system: Arc<dyn SystemEffects>,
    /// Lock relay and buzzer
    pub outputs: Arc<dyn OutputEffects>,
    /// Request-to-exit input
    pub input: Arc<dyn InputEffects>,
    /// Credential reader
    pub reader: Arc<dyn CredentialReaderEffects>,
    /// Registry persistence
    pub storage: Arc<dyn RegistryStorage>,
}

/// Everything configurable about a node
#[derive(Debug, Clone)]
pub struct NodeSettings {
    /// Device identifier used in remote paths
    pub device: DeviceId,
    /// Reported in the health report
    pub firmware_version: String,
    /// Directory of the day-partitioned audit files
    pub audit_dir: PathBuf,
    /// Days of audit history kept
    pub audit_retention_days: u32,
    /// Bounded wait for registry and audit locks
    pub lock_timeout: Duration,
    /// Output timing
    pub actuation: ActuationConfig,
    /// Exit input debounce
    pub exit: ExitMonitorConfig,
    /// Queue capacities
    pub queues: QueueConfig,
    /// Network context scheduling
    pub processor: ProcessorConfig,
    /// Context periods
    pub runtime: RuntimeConfig,
}

/// Fully wired components, not yet running
pub struct NodeParts {
    /// Control context
    pub control: ControlLoop,
    /// Network context
    pub processor: RemoteCommandProcessor,
    /// Heartbeat fed by the network context
    pub network_heartbeat: Heartbeat,
    /// Shared registry
    pub registry: Arc<CredentialRegistry>,
    /// Local audit log
    pub audit_log: Arc<AuditLog>,
    /// Liveness watchdog
    pub watchdog: Arc<Watchdog>,
}

/// Build every component. Fails if the registry or the audit log cannot be
/// opened; no access decision can be made safely without them.
pub fn assemble(settings: NodeSettings, effects: NodeEffects) -> Result<NodeParts, GatehouseError> {
    let registry = CredentialRegistry::open(effects.storage.clone(), settings.lock_timeout)
        .map_err(|err| GatehouseError::internal(format!("credential registry: {err}")))?;
    let registry = Arc::new(registry);
    let audit_log = AuditLog::open(
        &settings.audit_dir,
        settings.audit_retention_days,
        settings.lock_timeout,
    )
    .map_err(|err| GatehouseError::internal(format!("audit log: {err}")))?;
    let audit_log = Arc::new(audit_log);

    let (audit_tx, audit_rx) = bounded("audit", settings.queues.audit_capacity);
    let (pending_tx, pending_rx) = bounded("pending", settings.queues.pending_capacity);
    let (control_tx, control_rx) = bounded("control", settings.queues.control_capacity);
    let drops = QueueDropCounters {
        audit: audit_tx.drops(),
        pending: pending_tx.drops(),
        control: control_tx.drops(),
    };
    let trail = AuditTrail::new(audit_log.clone(), audit_tx);

    let watchdog = Arc::new(Watchdog::new(
        effects.time.clone(),
        settings.runtime.watchdog_timeout,
    ));
    let control_heartbeat = watchdog.register(CONTROL_CONTEXT);
    let network_heartbeat = watchdog.register(NETWORK_CONTEXT);

    let actuation = ActuationController::new(
        effects.outputs.clone(),
        effects.time.clone(),
        settings.actuation,
    );
    let decision = AccessDecisionEngine::new(
        registry.clone(),
        trail.clone(),
        pending_tx,
        effects.time.clone(),
    );
    let exit = ExitRequestMonitor::new(
        effects.input.clone(),
        effects.time.clone(),
        trail.clone(),
        settings.exit,
    );
    let control = ControlLoop::new(
        ControlEffects {
            reader: effects.reader.clone(),
            time: effects.time.clone(),
        },
        decision,
        exit,
        actuation,
        trail.clone(),
        control_rx,
        control_heartbeat,
    );

    let processor = RemoteCommandProcessor::new(
        settings.device,
        settings.firmware_version,
        settings.processor,
        ProcessorEffects {
            remote: effects.remote,
            time: effects.time,
            system: effects.system,
        },
        registry.clone(),
        trail,
        ProcessorQueues {
            audit: audit_rx,
            pending: pending_rx,
            control: control_tx,
            drops,
        },
    )
    .with_watchdog(watchdog.clone());

    Ok(NodeParts {
        control,
        processor,
        network_heartbeat,
        registry,
        audit_log,
        watchdog,
    })
}

/// A running node.
#[derive(Debug)]
pub struct Node {
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    registry: Arc<CredentialRegistry>,
    audit_log: Arc<AuditLog>,
    watchdog: Arc<Watchdog>,
}

impl Node {
    /// Assemble and spawn both contexts on the current tokio runtime.
    pub fn start(settings: NodeSettings, effects: NodeEffects) -> Result<Self, GatehouseError> {
        let runtime = settings.runtime;
        let parts = assemble(settings, effects)?;
        let (shutdown_tx, _) = watch::channel(false);

        let control = spawn_control(
            parts.control,
            runtime.control_period,
            shutdown_tx.subscribe(),
        );
        let network = spawn_network(
            parts.processor,
            parts.network_heartbeat,
            runtime.network_period,
            shutdown_tx.subscribe(),
        );
        info!(
            control_period_ms = millis(runtime.control_period),
            network_period_ms = millis(runtime.network_period),
            "node started"
        );

        Ok(Self {
            shutdown_tx,
            handles: Mutex::new(vec![control, network]),
            registry: parts.registry,
            audit_log: parts.audit_log,
            watchdog: parts.watchdog,
        })
    }

    /// Shared registry
    pub fn registry(&self) -> &Arc<CredentialRegistry> {
        &self.registry
    }

    /// Local audit log
    pub fn audit_log(&self) -> &Arc<AuditLog> {
        &self.audit_log
    }

    /// Liveness watchdog
    pub fn watchdog(&self) -> &Arc<Watchdog> {
        &self.watchdog
    }

    /// Signal both contexts to stop and wait for them. The control context
    /// secures its outputs and the network context publishes a final offline
    /// status before exiting.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            if let Err(err) = handle.await {
                error!(error = %err, "context task failed");
            }
        }
        info!("node stopped");
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

fn spawn_control(
    mut control: ControlLoop,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = ticker(period);
        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                _ = ticker.tick() => {
                    control.cycle();
                }
            }
        }
        control.shutdown();
    })
}

fn spawn_network(
    mut processor: RemoteCommandProcessor,
    heartbeat: Heartbeat,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = ticker(period);
        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                _ = ticker.tick() => {
                    processor.run_cycle().await;
                    heartbeat.feed();
                }
            }
        }
        processor.shutdown().await;
    })
}
