//! Registry storage effect trait definitions.
//!
//! # Effect Classification
//!
//! - **Category**: Infrastructure Effect
//! - **Implementation**: `gatehouse-effects` (Layer 3)
//! - **Usage**: `CredentialRegistry` in `gatehouse-engine`
//!
//! Each set is persisted as a whole. Calls are synchronous and are only made
//! while the registry holds the lock for that set.

use crate::errors::StorageError;
use crate::identifiers::{CredentialEntry, CredentialSet, Identifier};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Entries of one set, keyed by identifier
pub type SetEntries = BTreeMap<Identifier, CredentialEntry>;

/// Durable per-set registry persistence.
pub trait RegistryStorage: Send + Sync {
    /// Load a set; a set never persisted loads as empty.
    fn load(&self, set: CredentialSet) -> Result<SetEntries, StorageError>;

    /// Durably replace the persisted contents of a set.
    fn persist(&self, set: CredentialSet, entries: &SetEntries) -> Result<(), StorageError>;
}

impl<T: RegistryStorage + ?Sized> RegistryStorage for Arc<T> {
    fn load(&self, set: CredentialSet) -> Result<SetEntries, StorageError> {
        (**self).load(set)
    }

    fn persist(&self, set: CredentialSet, entries: &SetEntries) -> Result<(), StorageError> {
        (**self).persist(set, entries)
    }
}
