//! Credential identifiers, labels and registry set names.
//!
//! Identifiers are the canonical hardware-reported token IDs: uppercase hex,
//! 8 to 20 digits (4 to 10 byte cards), even length. Every identifier that
//! reaches the registry or the remote tree has passed through
//! [`Identifier::parse`].

use crate::errors::{GatehouseError, IdentifierError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Shortest accepted identifier, in hex digits.
pub const MIN_IDENTIFIER_LEN: usize = 8;
/// Longest accepted identifier, in hex digits.
pub const MAX_IDENTIFIER_LEN: usize = 20;
/// Longest label kept, in characters.
pub const MAX_LABEL_CHARS: usize = 45;
/// Label used when none (or only whitespace) is supplied.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Canonical credential identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Normalize and validate a raw identifier.
    ///
    /// Surrounding whitespace and `:`, `-` or space separators are removed and
    /// the digits are uppercased before validation.
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        let normalized: String = raw
            .trim()
            .chars()
            .filter(|c| !matches!(c, ':' | '-' | ' '))
            .map(|c| c.to_ascii_uppercase())
            .collect();

        if normalized.is_empty() {
            return Err(IdentifierError::Empty);
        }
        if let Some(bad) = normalized.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(IdentifierError::NotHex(bad));
        }
        let len = normalized.len();
        if !(MIN_IDENTIFIER_LEN..=MAX_IDENTIFIER_LEN).contains(&len) {
            return Err(IdentifierError::Length {
                len,
                min: MIN_IDENTIFIER_LEN,
                max: MAX_IDENTIFIER_LEN,
            });
        }
        if len % 2 != 0 {
            return Err(IdentifierError::OddLength { len });
        }
        hex::decode(&normalized).map_err(|_| IdentifierError::OddLength { len })?;

        Ok(Self(normalized))
    }

    /// Build an identifier from the raw UID bytes reported by a reader.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdentifierError> {
        Self::parse(&hex::encode_upper(bytes))
    }

    /// Decode the identifier back into UID bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        // Validated on construction.
        hex::decode(&self.0).unwrap_or_default()
    }

    /// Get the identifier string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Identifier {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Identifier> for String {
    fn from(value: Identifier) -> Self {
        value.0
    }
}

impl FromStr for Identifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Sanitized label attached to a registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Label(String);

impl Label {
    /// Strip control characters, trim, cap the length and default empty
    /// labels to `"Unknown"`.
    pub fn sanitize(raw: &str) -> Self {
        let cleaned: String = raw.chars().filter(|c| !c.is_control()).collect();
        let capped: String = cleaned.trim().chars().take(MAX_LABEL_CHARS).collect();
        let capped = capped.trim_end();
        if capped.is_empty() {
            Self::unknown()
        } else {
            Self(capped.to_string())
        }
    }

    /// The default label
    pub fn unknown() -> Self {
        Self(UNKNOWN_LABEL.to_string())
    }

    /// Whether this is the default label
    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN_LABEL
    }

    /// Get the label string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Label {
    fn default() -> Self {
        Self::unknown()
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Label {
    fn from(value: String) -> Self {
        Self::sanitize(&value)
    }
}

impl From<&str> for Label {
    fn from(value: &str) -> Self {
        Self::sanitize(value)
    }
}

impl From<Label> for String {
    fn from(value: Label) -> Self {
        value.0
    }
}

/// The three registry partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialSet {
    /// Grants access
    Allow,
    /// Explicitly blocked
    Deny,
    /// Seen but not yet classified
    Pending,
}

impl CredentialSet {
    /// All sets, in decision tie-break order.
    pub const ALL: [CredentialSet; 3] = [Self::Allow, Self::Deny, Self::Pending];

    /// Path segment and storage name of the set
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
            Self::Pending => "pending",
        }
    }

    /// The sets other than `self`.
    pub fn others(&self) -> impl Iterator<Item = CredentialSet> + '_ {
        Self::ALL.into_iter().filter(move |set| set != self)
    }
}

impl fmt::Display for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set name outside {allow, deny, pending}.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown credential set {0:?}")]
pub struct UnknownSetError(pub String);

impl FromStr for CredentialSet {
    type Err = UnknownSetError;

    /// Set names are matched case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(Self::Allow),
            "deny" => Ok(Self::Deny),
            "pending" => Ok(Self::Pending),
            _ => Err(UnknownSetError(s.to_string())),
        }
    }
}

/// A registry entry as persisted and mirrored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialEntry {
    /// Human label
    pub label: Label,
    /// When the entry entered its current set, if the clock was synchronized
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
}

impl CredentialEntry {
    /// Create a new entry
    pub fn new(label: Label, since: Option<DateTime<Utc>>) -> Self {
        Self { label, since }
    }
}

/// Identifier of this device in the remote tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a device id; it must be a single non-empty path segment.
    pub fn new(id: impl Into<String>) -> Result<Self, GatehouseError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(GatehouseError::invalid("device id cannot be empty"));
        }
        if trimmed.contains('/') || trimmed.contains("..") {
            return Err(GatehouseError::invalid(format!(
                "device id {trimmed:?} must be a single path segment"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get the device id string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
