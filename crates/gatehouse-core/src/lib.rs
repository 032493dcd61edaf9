//! Gatehouse Core - Access-Control Node Foundation
//!
//! This crate provides the foundational types and effect interfaces shared by
//! every layer of the Gatehouse node. It contains no I/O; handlers live in
//! `gatehouse-effects` (production) and `gatehouse-testkit` (deterministic).
//!
//! # Architecture Layers
//!
//! ## Domain Types
//! - `Identifier`: canonical uppercase-hex credential identifier
//! - `Label`: sanitized human label attached to a registry entry
//! - `CredentialSet`: the three registry partitions (allow, deny, pending)
//! - `AuditRecord`: append-only decision/management record
//! - `DeviceStatus`: periodic health report
//!
//! ## Effect Interfaces (Pure Signatures)
//! - `TimeEffects`: monotonic milliseconds, wall-clock timestamp
//! - `RemoteEffects`: send / receive / delete JSON at a remote path
//! - `OutputEffects`, `InputEffects`, `CredentialReaderEffects`: door hardware
//! - `SystemEffects`: network and memory indicators for the health report
//! - `RegistryStorage`: durable per-set persistence of the registry

#![forbid(unsafe_code)]

/// Audit records, outcomes and sources
pub mod audit;

/// Pure effect interfaces (no implementations)
pub mod effects;

/// Unified error handling
pub mod errors;

/// Credential identifiers, labels and set names
pub mod identifiers;

/// Remote tree path construction
pub mod paths;

/// Device health report
pub mod status;

pub use audit::{AuditOutcome, AuditRecord, AuditSource, EXIT_SENSOR_ID, REMOTE_UNLOCK_ID};
pub use errors::{
    GatehouseError, HardwareError, IdentifierError, Result, StorageError, TransportError,
};
pub use identifiers::{CredentialEntry, CredentialSet, DeviceId, Identifier, Label};
pub use paths::RemotePath;
pub use status::{DeviceStatus, QueueDrops};
