//! Gatehouse Engine - Access Decisions and Command Reconciliation
//!
//! Domain logic of the node, written against the effect traits of
//! `gatehouse-core` so every component runs unchanged over production
//! handlers (`gatehouse-effects`) or deterministic ones (`gatehouse-testkit`).
//!
//! # Components
//!
//! - [`registry`]: the three-set credential registry, durable and locked per set
//! - [`audit_log`]: day-partitioned local audit records
//! - [`actuation`]: lock and buzzer state machines with cooldown
//! - [`decision`]: classification of scanned identifiers
//! - [`exit`]: debounced request-to-exit monitor
//! - [`command`] and [`processor`]: remote inbox validation, application and mirroring
//!
//! # Execution contexts
//!
//! The control context ([`control::ControlLoop`]) runs decisions, the exit
//! monitor and output deadlines on a short period. The network context
//! ([`processor::RemoteCommandProcessor`]) owns all remote I/O. They share the
//! registry and exchange everything else over bounded [`queue`]s that drop
//! on overflow. [`runtime::Node`] wires and spawns both.

#![forbid(unsafe_code)]

pub mod actuation;
pub mod audit_log;
pub mod command;
pub mod config;
pub mod control;
pub mod decision;
pub mod exit;
pub mod processor;
pub mod queue;
pub mod registry;
pub mod runtime;
pub mod watchdog;

pub use actuation::{ActuationController, ActuationState, OutputState, UnlockResult};
pub use audit_log::{AuditLog, AuditLogError, AuditTrail};
pub use command::{parse_command, CommandEnvelope, CommandKind, RemoteCommand, ValidationError};
pub use config::{ActuationConfig, ExitMonitorConfig, ProcessorConfig, QueueConfig, RuntimeConfig};
pub use control::{ControlLoop, ControlSignal};
pub use decision::{AccessDecisionEngine, PendingNotice, ScanOutcome};
pub use exit::ExitRequestMonitor;
pub use processor::{CommandDisposition, CycleReport, RemoteCommandProcessor};
pub use registry::{Assignment, CredentialRegistry, RegistryError};
pub use runtime::{assemble, Node, NodeEffects, NodeParts, NodeSettings};
pub use watchdog::{Heartbeat, Watchdog};
