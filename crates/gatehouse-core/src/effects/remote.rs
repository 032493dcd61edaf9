//! Remote tree effect trait definitions.
//!
//! The remote side is a path-addressed JSON tree. The node only ever needs
//! three operations on it plus a non-blocking connectivity probe.
//!
//! # Effect Classification
//!
//! - **Category**: Infrastructure Effect
//! - **Implementation**: `gatehouse-effects` (Layer 3)
//! - **Usage**: Remote Command Processor only (network context)

use crate::errors::TransportError;
use crate::paths::RemotePath;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Access to the remote inbox and mirror.
#[async_trait]
pub trait RemoteEffects: Send + Sync {
    /// Whether the transport is currently usable. Must not block.
    fn is_connected(&self) -> bool;

    /// Write `value` at `path`, replacing whatever was there.
    async fn send(&self, path: &RemotePath, value: Value) -> Result<(), TransportError>;

    /// Read the object at `path`; `None` if the node does not exist.
    async fn receive(&self, path: &RemotePath) -> Result<Option<Value>, TransportError>;

    /// Delete the node at `path`. Deleting an absent node succeeds.
    async fn delete(&self, path: &RemotePath) -> Result<(), TransportError>;
}

#[async_trait]
impl<T: RemoteEffects + ?Sized> RemoteEffects for Arc<T> {
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    async fn send(&self, path: &RemotePath, value: Value) -> Result<(), TransportError> {
        (**self).send(path, value).await
    }

    async fn receive(&self, path: &RemotePath) -> Result<Option<Value>, TransportError> {
        (**self).receive(path).await
    }

    async fn delete(&self, path: &RemotePath) -> Result<(), TransportError> {
        (**self).delete(path).await
    }
}
