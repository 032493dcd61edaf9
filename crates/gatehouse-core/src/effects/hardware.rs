//! Door hardware effect trait definitions.
//!
//! Register-level drivers are out of scope; these traits are the whole
//! surface the engine needs from them.

use crate::errors::HardwareError;
use std::fmt;
use std::sync::Arc;

/// Digital outputs owned by the actuation controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Output {
    /// Lock relay; high releases the door
    Lock,
    /// Audible indicator
    Buzzer,
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lock => f.write_str("lock"),
            Self::Buzzer => f.write_str("buzzer"),
        }
    }
}

/// Drive digital outputs.
pub trait OutputEffects: Send + Sync {
    /// Set `output` high or low.
    fn set_output(&self, output: Output, high: bool) -> Result<(), HardwareError>;
}

/// Sample the request-to-exit input.
pub trait InputEffects: Send + Sync {
    /// Raw level of the exit-request input; `true` is asserted.
    fn exit_request_level(&self) -> Result<bool, HardwareError>;
}

/// Non-blocking access to the credential reader.
pub trait CredentialReaderEffects: Send + Sync {
    /// Next raw identifier presented since the last call, if any.
    fn poll_scan(&self) -> Option<String>;
}

impl<T: OutputEffects + ?Sized> OutputEffects for Arc<T> {
    fn set_output(&self, output: Output, high: bool) -> Result<(), HardwareError> {
        (**self).set_output(output, high)
    }
}

impl<T: InputEffects + ?Sized> InputEffects for Arc<T> {
    fn exit_request_level(&self) -> Result<bool, HardwareError> {
        (**self).exit_request_level()
    }
}

impl<T: CredentialReaderEffects + ?Sized> CredentialReaderEffects for Arc<T> {
    fn poll_scan(&self) -> Option<String> {
        (**self).poll_scan()
    }
}
