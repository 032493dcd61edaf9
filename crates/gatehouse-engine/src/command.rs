//! Remote command parsing and validation.
//!
//! Each command kind has its own inbox slot at
//! `/devices/{id}/commands/{kind}`. Payloads are decoded into loose wire
//! structs first and then validated into [`RemoteCommand`], so that every
//! rejection carries a specific [`ValidationError`].

use crate::config::UNLOCK_DURATION_RANGE_SECS;
use gatehouse_core::{CredentialSet, Identifier, IdentifierError, Label};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Command kinds, in per-cycle processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CommandKind {
    /// Timed remote unlock
    Unlock,
    /// Add or relabel an identifier in a set
    Add,
    /// Remove an identifier from a set
    Delete,
    /// Relocate an identifier between sets
    Move,
    /// Relabel an identifier in place
    Rename,
}

impl CommandKind {
    /// Fixed per-cycle processing order
    pub const PROCESSING_ORDER: [CommandKind; 5] = [
        Self::Unlock,
        Self::Add,
        Self::Delete,
        Self::Move,
        Self::Rename,
    ];

    /// Inbox slot name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unlock => "unlock",
            Self::Add => "add",
            Self::Delete => "delete",
            Self::Move => "move",
            Self::Rename => "rename",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a command was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The identifier failed format validation
    #[error("malformed identifier '{value}': {source}")]
    MalformedIdentifier {
        /// Raw identifier from the payload
        value: String,
        /// Format violation
        #[source]
        source: IdentifierError,
    },
    /// The set name is not allow, deny or pending
    #[error("unknown set '{0}'")]
    UnknownSet(String),
    /// Unlock duration outside the accepted range
    #[error("duration {seconds}s outside {min}..={max}s")]
    DurationOutOfRange {
        /// Requested duration
        seconds: i64,
        /// Smallest accepted duration
        min: u64,
        /// Largest accepted duration
        max: u64,
    },
    /// A move whose source and destination are the same set
    #[error("move from {0} to itself")]
    NoOpMove(CredentialSet),
    /// A required field is absent
    #[error("missing field '{0}'")]
    MissingField(&'static str),
    /// The identifier is not in the set the command names
    #[error("{identifier} is not in the {set} set")]
    NotInSet {
        /// Named set
        set: CredentialSet,
        /// Identifier from the payload
        identifier: Identifier,
    },
    /// The payload is not an object of the expected shape
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

/// A validated remote command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCommand {
    /// Release the lock for `duration`
    Unlock {
        /// Requested release duration
        duration: Duration,
    },
    /// Place `identifier` in `set`
    Add {
        /// Target set
        set: CredentialSet,
        /// Identifier to add
        identifier: Identifier,
        /// Label; an existing one is kept if absent
        label: Option<Label>,
    },
    /// Remove `identifier` from `set`
    Delete {
        /// Set to remove from
        set: CredentialSet,
        /// Identifier to remove
        identifier: Identifier,
    },
    /// Relocate `identifier` from `from` to `to`
    Move {
        /// Source set
        from: CredentialSet,
        /// Destination set
        to: CredentialSet,
        /// Identifier to relocate
        identifier: Identifier,
        /// Replacement label; the existing one is kept if absent
        label: Option<Label>,
    },
    /// Relabel `identifier` in `set`
    Rename {
        /// Set holding the identifier
        set: CredentialSet,
        /// Identifier to relabel
        identifier: Identifier,
        /// New label
        label: Label,
    },
}

/// A validated command plus its submission marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEnvelope {
    /// The command
    pub command: RemoteCommand,
    /// Monotonic submission marker, when the submitter supplied one
    pub submitted_at: Option<u64>,
}

/// Submission marker: a non-negative integer, or a string holding one.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Marker {
    Number(u64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct UnlockWire {
    duration_seconds: Option<i64>,
    #[serde(rename = "submittedAt")]
    submitted_at: Option<Marker>,
}

#[derive(Debug, Deserialize)]
struct SetWire {
    set: Option<String>,
    identifier: Option<String>,
    label: Option<String>,
    #[serde(rename = "submittedAt")]
    submitted_at: Option<Marker>,
}

#[derive(Debug, Deserialize)]
struct MoveWire {
    from: Option<String>,
    to: Option<String>,
    identifier: Option<String>,
    label: Option<String>,
    #[serde(rename = "submittedAt")]
    submitted_at: Option<Marker>,
}

fn decode<T: DeserializeOwned>(payload: &Value) -> Result<T, ValidationError> {
    if !payload.is_object() {
        return Err(ValidationError::MalformedPayload(
            "expected a JSON object".to_string(),
        ));
    }
    T::deserialize(payload).map_err(|err| ValidationError::MalformedPayload(err.to_string()))
}

fn required<T>(value: Option<T>, field: &'static str) -> Result<T, ValidationError> {
    value.ok_or(ValidationError::MissingField(field))
}

fn parse_set(raw: Option<String>, field: &'static str) -> Result<CredentialSet, ValidationError> {
    let raw = required(raw, field)?;
    raw.parse()
        .map_err(|_| ValidationError::UnknownSet(raw.clone()))
}

fn parse_identifier(raw: Option<String>) -> Result<Identifier, ValidationError> {
    let raw = required(raw, "identifier")?;
    Identifier::parse(&raw).map_err(|source| ValidationError::MalformedIdentifier {
        value: raw.clone(),
        source,
    })
}

fn parse_marker(marker: Option<Marker>) -> Result<Option<u64>, ValidationError> {
    match marker {
        None => Ok(None),
        Some(Marker::Number(n)) => Ok(Some(n)),
        Some(Marker::Text(text)) => text.trim().parse().map(Some).map_err(|_| {
            ValidationError::MalformedPayload(format!("submittedAt '{text}' is not an integer"))
        }),
    }
}

/// Decode and validate the payload found in the `kind` inbox slot.
pub fn parse_command(kind: CommandKind, payload: &Value) -> Result<CommandEnvelope, ValidationError> {
    let (command, marker) = match kind {
        CommandKind::Unlock => {
            let wire: UnlockWire = decode(payload)?;
            let seconds = required(wire.duration_seconds, "duration_seconds")?;
            let in_range = u64::try_from(seconds)
                .ok()
                .filter(|s| UNLOCK_DURATION_RANGE_SECS.contains(s));
            let Some(seconds) = in_range else {
                return Err(ValidationError::DurationOutOfRange {
                    seconds,
                    min: *UNLOCK_DURATION_RANGE_SECS.start(),
                    max: *UNLOCK_DURATION_RANGE_SECS.end(),
                });
            };
            (
                RemoteCommand::Unlock {
                    duration: Duration::from_secs(seconds),
                },
                wire.submitted_at,
            )
        }
        CommandKind::Add => {
            let wire: SetWire = decode(payload)?;
            (
                RemoteCommand::Add {
                    set: parse_set(wire.set, "set")?,
                    identifier: parse_identifier(wire.identifier)?,
                    label: wire.label.as_deref().map(Label::sanitize),
                },
                wire.submitted_at,
            )
        }
        CommandKind::Delete => {
            let wire: SetWire = decode(payload)?;
            (
                RemoteCommand::Delete {
                    set: parse_set(wire.set, "set")?,
                    identifier: parse_identifier(wire.identifier)?,
                },
                wire.submitted_at,
            )
        }
        CommandKind::Move => {
            let wire: MoveWire = decode(payload)?;
            let from = parse_set(wire.from, "from")?;
            let to = parse_set(wire.to, "to")?;
            if from == to {
                return Err(ValidationError::NoOpMove(from));
            }
            (
                RemoteCommand::Move {
                    from,
                    to,
                    identifier: parse_identifier(wire.identifier)?,
                    label: wire.label.as_deref().map(Label::sanitize),
                },
                wire.submitted_at,
            )
        }
        CommandKind::Rename => {
            let wire: SetWire = decode(payload)?;
            (
                RemoteCommand::Rename {
                    set: parse_set(wire.set, "set")?,
                    identifier: parse_identifier(wire.identifier)?,
                    label: Label::sanitize(&required(wire.label, "label")?),
                },
                wire.submitted_at,
            )
        }
    };

    Ok(CommandEnvelope {
        command,
        submitted_at: parse_marker(marker)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn test_unlock_duration_range() {
        let ok = parse_command(CommandKind::Unlock, &json!({"duration_seconds": 300})).unwrap();
        assert_eq!(
            ok.command,
            RemoteCommand::Unlock {
                duration: Duration::from_secs(300)
            }
        );
        for seconds in [0, -5, 301] {
            assert_matches!(
                parse_command(CommandKind::Unlock, &json!({ "duration_seconds": seconds })),
                Err(ValidationError::DurationOutOfRange { .. })
            );
        }
        assert_matches!(
            parse_command(CommandKind::Unlock, &json!({})),
            Err(ValidationError::MissingField("duration_seconds"))
        );
    }

    #[test]
    fn test_add_normalizes_fields() {
        let envelope = parse_command(
            CommandKind::Add,
            &json!({"set": "ALLOW", "identifier": "aa:bb:cc:dd", "label": "  Alice  ", "submittedAt": 17}),
        )
        .unwrap();
        assert_eq!(envelope.submitted_at, Some(17));
        assert_eq!(
            envelope.command,
            RemoteCommand::Add {
                set: CredentialSet::Allow,
                identifier: Identifier::parse("AABBCCDD").unwrap(),
                label: Some(Label::from("Alice")),
            }
        );
    }

    #[test]
    fn test_add_without_label_keeps_none() {
        let envelope =
            parse_command(CommandKind::Add, &json!({"set": "deny", "identifier": "01020304"}))
                .unwrap();
        assert_matches!(envelope.command, RemoteCommand::Add { label: None, .. });
    }

    #[test]
    fn test_rejections() {
        assert_matches!(
            parse_command(CommandKind::Add, &json!({"set": "vip", "identifier": "01020304"})),
            Err(ValidationError::UnknownSet(name)) if name == "vip"
        );
        assert_matches!(
            parse_command(CommandKind::Delete, &json!({"set": "allow", "identifier": "ABC"})),
            Err(ValidationError::MalformedIdentifier { .. })
        );
        assert_matches!(
            parse_command(
                CommandKind::Move,
                &json!({"from": "pending", "to": "Pending", "identifier": "01020304"})
            ),
            Err(ValidationError::NoOpMove(CredentialSet::Pending))
        );
        assert_matches!(
            parse_command(CommandKind::Rename, &json!({"set": "allow", "identifier": "01020304"})),
            Err(ValidationError::MissingField("label"))
        );
        assert_matches!(
            parse_command(CommandKind::Add, &json!("add everything")),
            Err(ValidationError::MalformedPayload(_))
        );
        assert_matches!(
            parse_command(CommandKind::Add, &json!({"set": 3, "identifier": "01020304"})),
            Err(ValidationError::MalformedPayload(_))
        );
    }

    #[test]
    fn test_marker_accepts_numeric_string() {
        let envelope = parse_command(
            CommandKind::Delete,
            &json!({"set": "pending", "identifier": "01020304", "submittedAt": "42"}),
        )
        .unwrap();
        assert_eq!(envelope.submitted_at, Some(42));
        assert_matches!(
            parse_command(
                CommandKind::Delete,
                &json!({"set": "pending", "identifier": "01020304", "submittedAt": "soon"}),
            ),
            Err(ValidationError::MalformedPayload(_))
        );
    }

    #[test]
    fn test_processing_order() {
        let names: Vec<_> = CommandKind::PROCESSING_ORDER
            .iter()
            .map(CommandKind::as_str)
            .collect();
        assert_eq!(names, ["unlock", "add", "delete", "move", "rename"]);
    }
}
