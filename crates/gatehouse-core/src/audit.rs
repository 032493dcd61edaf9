//! Audit records.
//!
//! One record is produced per access decision or management action. Records
//! are append-only: once written to the local log they are never mutated,
//! only pruned by age.

use crate::identifiers::{Identifier, Label};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier recorded for exit-request actuations.
pub const EXIT_SENSOR_ID: &str = "EXIT_SENSOR";
/// Identifier recorded for remote-issued unlocks.
pub const REMOTE_UNLOCK_ID: &str = "REMOTE_UNLOCK";

/// Result of a decision or management action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    /// Lock actuated
    Granted,
    /// Explicitly denied
    Denied,
    /// Unknown credential, recorded as pending
    Pending,
    /// The action failed or was rejected
    Error,
    /// A remote command changed the registry
    Updated,
}

impl AuditOutcome {
    /// Wire name of the outcome
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Granted => "granted",
            Self::Denied => "denied",
            Self::Pending => "pending",
            Self::Error => "error",
            Self::Updated => "updated",
        }
    }
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What triggered the recorded action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSource {
    /// A presented credential
    Credential,
    /// The request-to-exit input
    ExitRequest,
    /// A remote command
    Remote,
}

impl AuditSource {
    /// Wire name of the source
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credential => "credential",
            Self::ExitRequest => "exit_request",
            Self::Remote => "remote",
        }
    }
}

impl fmt::Display for AuditSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single audit line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Credential identifier, or a marker such as `EXIT_SENSOR`
    pub identifier: String,
    /// Label at decision time
    pub label: String,
    /// Wall-clock time; `None` before the clock was synchronized
    pub time: Option<DateTime<Utc>>,
    /// Decision outcome
    pub outcome: AuditOutcome,
    /// Trigger of the decision
    pub source: AuditSource,
}

impl AuditRecord {
    /// Record for a decision about a credential
    pub fn credential(
        identifier: &Identifier,
        label: &Label,
        outcome: AuditOutcome,
        time: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            identifier: identifier.to_string(),
            label: label.to_string(),
            time,
            outcome,
            source: AuditSource::Credential,
        }
    }

    /// Record for an exit-request actuation
    pub fn exit_request(time: Option<DateTime<Utc>>) -> Self {
        Self {
            identifier: EXIT_SENSOR_ID.to_string(),
            label: "Exit Request".to_string(),
            time,
            outcome: AuditOutcome::Granted,
            source: AuditSource::ExitRequest,
        }
    }

    /// Record for a remote action
    pub fn remote(
        identifier: impl Into<String>,
        label: impl Into<String>,
        outcome: AuditOutcome,
        time: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            label: label.into(),
            time,
            outcome,
            source: AuditSource::Remote,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_wire_format() {
        let id = Identifier::parse("AABBCCDD").unwrap();
        let record = AuditRecord::credential(&id, &Label::from("Alice"), AuditOutcome::Granted, None);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["identifier"], "AABBCCDD");
        assert_eq!(json["label"], "Alice");
        assert_eq!(json["outcome"], "granted");
        assert_eq!(json["source"], "credential");
        assert!(json["time"].is_null());

        let exit = serde_json::to_value(AuditRecord::exit_request(None)).unwrap();
        assert_eq!(exit["identifier"], EXIT_SENSOR_ID);
        assert_eq!(exit["source"], "exit_request");
    }
}
