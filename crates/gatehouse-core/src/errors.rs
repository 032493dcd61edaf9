//! Unified error system for Gatehouse core
//!
//! `GatehouseError` is the single error type crossing crate boundaries. The
//! narrower enums below belong to individual effect interfaces and convert
//! into it.

use serde::{Deserialize, Serialize};

/// Unified error type for Gatehouse operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum GatehouseError {
    /// Invalid input or configuration
    #[error("Invalid: {message}")]
    Invalid {
        /// Error message describing the invalid input
        message: String,
    },

    /// Resource not found
    #[error("Not found: {message}")]
    NotFound {
        /// Error message describing what was not found
        message: String,
    },

    /// Durable storage operation failed
    #[error("Storage error: {message}")]
    Storage {
        /// Error message describing the storage failure
        message: String,
    },

    /// Remote transport failed
    #[error("Transport error: {message}")]
    Transport {
        /// Error message describing the transport failure
        message: String,
    },

    /// A bounded lock acquisition timed out
    #[error("Contention: {message}")]
    Contention {
        /// Error message naming the contended resource
        message: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message describing the serialization failure
        message: String,
    },

    /// Internal system error
    #[error("Internal error: {message}")]
    Internal {
        /// Error message describing the internal error
        message: String,
    },
}

impl GatehouseError {
    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a contention error
    pub fn contention(message: impl Into<String>) -> Self {
        Self::Contention {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Standard Result type for Gatehouse operations
pub type Result<T> = std::result::Result<T, GatehouseError>;

/// Reasons a raw credential identifier is rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    /// Identifier was empty after normalization
    #[error("identifier is empty")]
    Empty,
    /// Identifier length outside the accepted range
    #[error("identifier length {len} outside {min}..={max}")]
    Length {
        /// Normalized length
        len: usize,
        /// Minimum accepted length
        min: usize,
        /// Maximum accepted length
        max: usize,
    },
    /// Identifier has an odd number of hex digits
    #[error("identifier length {len} is odd")]
    OddLength {
        /// Normalized length
        len: usize,
    },
    /// Identifier contains a non-hex character
    #[error("identifier contains non-hex character {0:?}")]
    NotHex(char),
}

/// Durable storage errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Reading persisted state failed
    #[error("read failed: {0}")]
    ReadFailed(String),
    /// Writing persisted state failed
    #[error("write failed: {0}")]
    WriteFailed(String),
    /// Persisted state could not be decoded
    #[error("corrupt data: {0}")]
    Corrupt(String),
}

/// Remote transport errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The device currently has no connectivity
    #[error("remote unreachable")]
    Unreachable,
    /// The remote call exceeded its time bound
    #[error("operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout {
        /// The operation that timed out
        operation: String,
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },
    /// The remote rejected or failed the request
    #[error("request to {path} failed: {reason}")]
    RequestFailed {
        /// Remote path targeted by the request
        path: String,
        /// Reason for the failure
        reason: String,
    },
    /// A payload could not be encoded or decoded
    #[error("payload error: {0}")]
    Payload(String),
}

/// Hardware pin errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HardwareError {
    /// Driving an output failed
    #[error("failed to drive {pin}: {reason}")]
    Output {
        /// Pin name
        pin: String,
        /// Reason for the failure
        reason: String,
    },
    /// Sampling an input failed
    #[error("failed to read {pin}: {reason}")]
    Input {
        /// Pin name
        pin: String,
        /// Reason for the failure
        reason: String,
    },
}

impl From<StorageError> for GatehouseError {
    fn from(err: StorageError) -> Self {
        Self::storage(err.to_string())
    }
}

impl From<TransportError> for GatehouseError {
    fn from(err: TransportError) -> Self {
        Self::transport(err.to_string())
    }
}

impl From<IdentifierError> for GatehouseError {
    fn from(err: IdentifierError) -> Self {
        Self::invalid(err.to_string())
    }
}

impl From<HardwareError> for GatehouseError {
    fn from(err: HardwareError) -> Self {
        Self::internal(err.to_string())
    }
}

impl From<serde_json::Error> for GatehouseError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<std::io::Error> for GatehouseError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::not_found(err.to_string()),
            _ => Self::storage(err.to_string()),
        }
    }
}
