//! In-memory registry storage with failure injection.

use gatehouse_core::effects::{RegistryStorage, SetEntries};
use gatehouse_core::{CredentialEntry, CredentialSet, Identifier, Label, StorageError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Registry persistence held in memory
#[derive(Debug, Default)]
pub struct MemoryRegistryStorage {
    sets: Mutex<HashMap<CredentialSet, SetEntries>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    persists: AtomicUsize,
}

impl MemoryRegistryStorage {
    /// Create empty storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a set before the registry is opened.
    pub fn seed(&self, set: CredentialSet, id: &Identifier, label: &str) {
        self.sets
            .lock()
            .entry(set)
            .or_default()
            .insert(id.clone(), CredentialEntry::new(Label::sanitize(label), None));
    }

    /// Persisted contents of a set
    pub fn snapshot(&self, set: CredentialSet) -> SetEntries {
        self.sets.lock().get(&set).cloned().unwrap_or_default()
    }

    /// Successful persists so far
    pub fn persist_count(&self) -> usize {
        self.persists.load(Ordering::SeqCst)
    }

    /// Make every load fail
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every persist fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl RegistryStorage for MemoryRegistryStorage {
    fn load(&self, set: CredentialSet) -> Result<SetEntries, StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::ReadFailed(format!("{set}: injected failure")));
        }
        Ok(self.snapshot(set))
    }

    fn persist(&self, set: CredentialSet, entries: &SetEntries) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::WriteFailed(format!("{set}: injected failure")));
        }
        self.sets.lock().insert(set, entries.clone());
        self.persists.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
