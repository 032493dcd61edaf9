//! Remote tree paths.
//!
//! Every remote node this device touches lives under `/devices/{device_id}`.

use crate::identifiers::{CredentialSet, DeviceId, Identifier};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Absolute, `/`-separated path into the remote tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RemotePath(String);

impl RemotePath {
    /// Root of this device's subtree
    pub fn device(device: &DeviceId) -> Self {
        Self(format!("/devices/{}", device.as_str()))
    }

    /// Append a path segment
    pub fn child(&self, segment: impl AsRef<str>) -> Self {
        Self(format!("{}/{}", self.0, segment.as_ref().trim_matches('/')))
    }

    /// Mirrored registry entry
    pub fn entry(device: &DeviceId, set: CredentialSet, id: &Identifier) -> Self {
        Self::device(device).child(set.as_str()).child(id.as_str())
    }

    /// Mirrored audit record
    pub fn log(device: &DeviceId, key: &str) -> Self {
        Self::device(device).child("logs").child(key)
    }

    /// Command inbox slot, e.g. `commands/unlock`
    pub fn command(device: &DeviceId, kind: &str) -> Self {
        Self::device(device).child("commands").child(kind)
    }

    /// Command error report
    pub fn command_error(device: &DeviceId, key: &str) -> Self {
        Self::device(device).child("commandErrors").child(key)
    }

    /// Device status object
    pub fn status(device: &DeviceId) -> Self {
        Self::device(device).child("status")
    }

    /// Path segments without the leading slash
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Get the path string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
