//! Credential Registry
//!
//! Durable identifier → label mapping partitioned into the allow, deny and
//! pending sets. The registry is the single source of truth for access
//! decisions and is the only state touched directly by both execution
//! contexts.
//!
//! # Locking
//!
//! Each set has its own lock, acquired with a bounded wait. A read that
//! cannot acquire its lock fails closed (not a member); a write returns
//! [`RegistryError::Contention`] and the caller must not assume it happened.
//! No operation ever holds two set locks at once.
//!
//! # Partition invariant
//!
//! An identifier is in at most one set. Operations here are atomic per set
//! only; [`CredentialRegistry::assign`] removes from the other sets and then
//! inserts, so an interruption between those steps leaves the identifier in
//! no set at all. That window is accepted: it can lose a classification but
//! can never place an identifier in two sets.

use crate::config::millis;
use chrono::{DateTime, Utc};
use gatehouse_core::effects::{RegistryStorage, SetEntries};
use gatehouse_core::{CredentialEntry, CredentialSet, Identifier, Label, StorageError};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Registry failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The set lock was not acquired within the bounded wait
    #[error("{set} set lock not acquired within {waited_ms}ms")]
    Contention {
        /// Contended set
        set: CredentialSet,
        /// Bounded wait that elapsed
        waited_ms: u64,
    },
    /// Durable storage rejected the change
    #[error("{set} set storage failed: {source}")]
    Storage {
        /// Set being loaded or persisted
        set: CredentialSet,
        /// Underlying storage error
        #[source]
        source: StorageError,
    },
}

/// Result of [`CredentialRegistry::assign`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// Sets the identifier was removed from before insertion
    pub removed_from: Vec<CredentialSet>,
    /// Label the identifier now carries
    pub label: Label,
    /// When the identifier entered the target set
    pub since: Option<DateTime<Utc>>,
}

/// The three-set credential registry.
pub struct CredentialRegistry {
    sets: [Mutex<SetEntries>; 3],
    storage: Arc<dyn RegistryStorage>,
    lock_timeout: Duration,
}

impl std::fmt::Debug for CredentialRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRegistry")
            .field("lock_timeout", &self.lock_timeout)
            .finish_non_exhaustive()
    }
}

fn slot(set: CredentialSet) -> usize {
    match set {
        CredentialSet::Allow => 0,
        CredentialSet::Deny => 1,
        CredentialSet::Pending => 2,
    }
}

impl CredentialRegistry {
    /// Load every set from `storage`.
    ///
    /// An identifier found in more than one persisted set is kept only in the
    /// first by tie-break order (allow, deny, pending) and the others are
    /// rewritten.
    pub fn open(
        storage: Arc<dyn RegistryStorage>,
        lock_timeout: Duration,
    ) -> Result<Self, RegistryError> {
        let mut loaded: [SetEntries; 3] = Default::default();
        for set in CredentialSet::ALL {
            loaded[slot(set)] = storage
                .load(set)
                .map_err(|source| RegistryError::Storage { set, source })?;
        }

        for set in CredentialSet::ALL {
            let duplicates: Vec<Identifier> = loaded[slot(set)]
                .keys()
                .filter(|id| {
                    CredentialSet::ALL
                        .iter()
                        .take_while(|earlier| **earlier != set)
                        .any(|earlier| loaded[slot(*earlier)].contains_key(*id))
                })
                .cloned()
                .collect();
            if duplicates.is_empty() {
                continue;
            }
            warn!(%set, count = duplicates.len(), "dropping identifiers present in an earlier set");
            for id in &duplicates {
                loaded[slot(set)].remove(id);
            }
            storage
                .persist(set, &loaded[slot(set)])
                .map_err(|source| RegistryError::Storage { set, source })?;
        }

        let [allow, deny, pending] = loaded;
        debug!(
            allow = allow.len(),
            deny = deny.len(),
            pending = pending.len(),
            "credential registry loaded"
        );
        Ok(Self {
            sets: [Mutex::new(allow), Mutex::new(deny), Mutex::new(pending)],
            storage,
            lock_timeout,
        })
    }

    fn lock(&self, set: CredentialSet) -> Result<MutexGuard<'_, SetEntries>, RegistryError> {
        self.sets[slot(set)]
            .try_lock_for(self.lock_timeout)
            .ok_or_else(|| RegistryError::Contention {
                set,
                waited_ms: millis(self.lock_timeout),
            })
    }

    /// Membership test. Fails closed on contention.
    pub fn contains(&self, set: CredentialSet, id: &Identifier) -> bool {
        match self.lock(set) {
            Ok(entries) => entries.contains_key(id),
            Err(err) => {
                warn!(%set, identifier = %id, error = %err, "membership read failed closed");
                false
            }
        }
    }

    /// Label of `id` in `set`, `"Unknown"` if absent or unreadable.
    pub fn label_of(&self, id: &Identifier, set: CredentialSet) -> Label {
        self.entry(set, id).map(|e| e.label).unwrap_or_default()
    }

    /// Entry of `id` in `set`. Fails closed on contention.
    pub fn entry(&self, set: CredentialSet, id: &Identifier) -> Option<CredentialEntry> {
        match self.lookup(set, id) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(%set, identifier = %id, error = %err, "entry read failed closed");
                None
            }
        }
    }

    /// Entry of `id` in `set`, telling absence apart from contention.
    pub fn lookup(
        &self,
        set: CredentialSet,
        id: &Identifier,
    ) -> Result<Option<CredentialEntry>, RegistryError> {
        Ok(self.lock(set)?.get(id).cloned())
    }

    /// Insert or relabel `id` in `set`. Returns `true` if the entry is new.
    ///
    /// An existing entry keeps its `since` timestamp. Nothing is changed if
    /// the write cannot be persisted.
    pub fn upsert(
        &self,
        set: CredentialSet,
        id: &Identifier,
        label: Label,
        now: Option<DateTime<Utc>>,
    ) -> Result<bool, RegistryError> {
        let mut entries = self.lock(set)?;
        let previous = entries.get(id).cloned();
        if previous.as_ref().is_some_and(|p| p.label == label) {
            return Ok(false);
        }
        let since = previous.as_ref().map_or(now, |p| p.since);
        entries.insert(id.clone(), CredentialEntry::new(label, since));

        if let Err(source) = self.storage.persist(set, &entries) {
            match previous {
                Some(prev) => entries.insert(id.clone(), prev),
                None => entries.remove(id),
            };
            return Err(RegistryError::Storage { set, source });
        }
        Ok(previous.is_none())
    }

    /// Remove `id` from `set`, returning the removed entry if it was present.
    pub fn remove(
        &self,
        set: CredentialSet,
        id: &Identifier,
    ) -> Result<Option<CredentialEntry>, RegistryError> {
        let mut entries = self.lock(set)?;
        let Some(removed) = entries.remove(id) else {
            return Ok(None);
        };
        if let Err(source) = self.storage.persist(set, &entries) {
            entries.insert(id.clone(), removed);
            return Err(RegistryError::Storage { set, source });
        }
        Ok(Some(removed))
    }

    /// Place `id` in `target`, removing it from the other two sets first.
    ///
    /// With no `label`, the label is taken from the entry being relocated,
    /// then from an existing entry in `target`, then `"Unknown"`. Each step
    /// is separately atomic; see the module docs for the interruption window.
    pub fn assign(
        &self,
        target: CredentialSet,
        id: &Identifier,
        label: Option<Label>,
        now: Option<DateTime<Utc>>,
    ) -> Result<Assignment, RegistryError> {
        let mut removed_from = Vec::new();
        let mut carried: Option<Label> = None;
        for other in target.others() {
            if let Some(entry) = self.remove(other, id)? {
                removed_from.push(other);
                carried.get_or_insert(entry.label);
            }
        }

        let existing = self.entry(target, id);
        let label = label
            .or(carried)
            .or_else(|| existing.as_ref().map(|e| e.label.clone()))
            .unwrap_or_default();
        self.upsert(target, id, label.clone(), now)?;
        let since = self.entry(target, id).and_then(|e| e.since);

        Ok(Assignment {
            removed_from,
            label,
            since,
        })
    }

    /// Consistent copy of one set.
    pub fn entries(&self, set: CredentialSet) -> Result<SetEntries, RegistryError> {
        Ok(self.lock(set)?.clone())
    }

    /// Sets currently holding `id`. More than one means the partition
    /// invariant is broken.
    pub fn membership(&self, id: &Identifier) -> Vec<CredentialSet> {
        CredentialSet::ALL
            .into_iter()
            .filter(|set| self.contains(*set, id))
            .collect()
    }

    /// Number of entries in `set`, `None` on contention.
    pub fn len(&self, set: CredentialSet) -> Option<usize> {
        self.lock(set).ok().map(|entries| entries.len())
    }

    /// Hold the lock of `set` for `hold`, for contention tests.
    #[cfg(test)]
    pub(crate) fn hold_lock_for(&self, set: CredentialSet, hold: Duration) {
        let _guard = self.sets[slot(set)].lock();
        std::thread::sleep(hold);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_testkit::MemoryRegistryStorage;
    use proptest::prelude::*;

    fn id(raw: &str) -> Identifier {
        Identifier::parse(raw).unwrap()
    }

    fn registry() -> (Arc<MemoryRegistryStorage>, CredentialRegistry) {
        let storage = Arc::new(MemoryRegistryStorage::new());
        let registry =
            CredentialRegistry::open(storage.clone(), Duration::from_millis(20)).unwrap();
        (storage, registry)
    }

    #[test]
    fn test_upsert_persists_and_labels() {
        let (storage, registry) = registry();
        let alice = id("AABBCCDD");
        assert!(registry.upsert(CredentialSet::Allow, &alice, "Alice".into(), None).unwrap());
        assert!(registry.contains(CredentialSet::Allow, &alice));
        assert_eq!(registry.label_of(&alice, CredentialSet::Allow).as_str(), "Alice");
        assert_eq!(registry.label_of(&alice, CredentialSet::Deny).as_str(), "Unknown");
        assert!(storage.snapshot(CredentialSet::Allow).contains_key(&alice));

        assert!(!registry.upsert(CredentialSet::Allow, &alice, "Alice B".into(), None).unwrap());
        assert_eq!(registry.label_of(&alice, CredentialSet::Allow).as_str(), "Alice B");
    }

    #[test]
    fn test_failed_persist_rolls_back() {
        let (storage, registry) = registry();
        let card = id("01020304");
        storage.fail_writes(true);
        let err = registry.upsert(CredentialSet::Allow, &card, "X".into(), None).unwrap_err();
        assert!(matches!(err, RegistryError::Storage { .. }));
        assert!(!registry.contains(CredentialSet::Allow, &card));

        storage.fail_writes(false);
        registry.upsert(CredentialSet::Allow, &card, "X".into(), None).unwrap();
        storage.fail_writes(true);
        assert!(registry.remove(CredentialSet::Allow, &card).is_err());
        assert!(registry.contains(CredentialSet::Allow, &card));
    }

    #[test]
    fn test_remove_absent_is_none() {
        let (_storage, registry) = registry();
        assert_eq!(registry.remove(CredentialSet::Deny, &id("0A0B0C0D")).unwrap(), None);
    }

    #[test]
    fn test_assign_relocates_and_carries_label() {
        let (_storage, registry) = registry();
        let card = id("1234ABCD");
        registry.upsert(CredentialSet::Pending, &card, "Visitor".into(), None).unwrap();

        let assignment = registry.assign(CredentialSet::Allow, &card, None, None).unwrap();
        assert_eq!(assignment.removed_from, vec![CredentialSet::Pending]);
        assert_eq!(assignment.label.as_str(), "Visitor");
        assert_eq!(registry.membership(&card), vec![CredentialSet::Allow]);

        let assignment = registry
            .assign(CredentialSet::Deny, &card, Some("Former".into()), None)
            .unwrap();
        assert_eq!(assignment.removed_from, vec![CredentialSet::Allow]);
        assert_eq!(registry.label_of(&card, CredentialSet::Deny).as_str(), "Former");
        assert_eq!(registry.membership(&card), vec![CredentialSet::Deny]);
    }

    #[test]
    fn test_open_resolves_duplicates_by_tie_break() {
        let storage = Arc::new(MemoryRegistryStorage::new());
        let card = id("CAFEBABE");
        storage.seed(CredentialSet::Deny, &card, "Blocked");
        storage.seed(CredentialSet::Pending, &card, "Seen");
        let registry = CredentialRegistry::open(storage.clone(), Duration::from_millis(20)).unwrap();
        assert_eq!(registry.membership(&card), vec![CredentialSet::Deny]);
        assert!(storage.snapshot(CredentialSet::Pending).is_empty());
    }

    #[test]
    fn test_open_fails_on_unreadable_storage() {
        let storage = Arc::new(MemoryRegistryStorage::new());
        storage.fail_reads(true);
        assert!(CredentialRegistry::open(storage, Duration::from_millis(20)).is_err());
    }

    #[test]
    fn test_contention_fails_closed() {
        let (_storage, registry) = registry();
        let registry = Arc::new(registry);
        let card = id("AABBCCDD");
        registry.upsert(CredentialSet::Allow, &card, "Alice".into(), None).unwrap();

        let holder = {
            let registry = registry.clone();
            std::thread::spawn(move || {
                registry.hold_lock_for(CredentialSet::Allow, Duration::from_millis(200));
            })
        };
        std::thread::sleep(Duration::from_millis(50));

        assert!(!registry.contains(CredentialSet::Allow, &card));
        assert!(matches!(
            registry.lookup(CredentialSet::Allow, &card),
            Err(RegistryError::Contention { .. })
        ));
        let err = registry
            .upsert(CredentialSet::Allow, &card, "Other".into(), None)
            .unwrap_err();
        assert!(matches!(err, RegistryError::Contention { set: CredentialSet::Allow, .. }));
        holder.join().unwrap();
        assert!(registry.contains(CredentialSet::Allow, &card));
        assert_eq!(registry.label_of(&card, CredentialSet::Allow).as_str(), "Alice");
        assert_eq!(registry.lookup(CredentialSet::Deny, &card).unwrap(), None);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Upsert(CredentialSet, usize),
        Assign(CredentialSet, usize),
        Remove(CredentialSet, usize),
    }

    fn set_strategy() -> impl Strategy<Value = CredentialSet> {
        prop_oneof![
            Just(CredentialSet::Allow),
            Just(CredentialSet::Deny),
            Just(CredentialSet::Pending)
        ]
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (set_strategy(), 0..4usize).prop_map(|(s, i)| Op::Upsert(s, i)),
            (set_strategy(), 0..4usize).prop_map(|(s, i)| Op::Assign(s, i)),
            (set_strategy(), 0..4usize).prop_map(|(s, i)| Op::Remove(s, i)),
        ]
    }

    proptest! {
        #[test]
        fn prop_assign_and_remove_keep_sets_disjoint(ops in proptest::collection::vec(op_strategy(), 1..40)) {
            let (_storage, registry) = registry();
            let ids: Vec<Identifier> = ["00000001", "00000002", "ABCDEF0123", "FFFFFFFF"]
                .iter()
                .map(|raw| id(raw))
                .collect();
            for op in ops {
                match op {
                    // Plain upserts only target sets the identifier is not
                    // elsewhere in, mirroring how callers use them.
                    Op::Upsert(set, i) => {
                        if registry.membership(&ids[i]).iter().all(|s| *s == set) {
                            registry.upsert(set, &ids[i], Label::unknown(), None).unwrap();
                        }
                    }
                    Op::Assign(set, i) => {
                        registry.assign(set, &ids[i], None, None).unwrap();
                    }
                    Op::Remove(set, i) => {
                        registry.remove(set, &ids[i]).unwrap();
                    }
                }
                for card in &ids {
                    prop_assert!(registry.membership(card).len() <= 1);
                }
            }
        }
    }
}
