//! In-memory keyed collection backed by [`DashMap`].
//!
//! Every write made while a [`ChangeTracker`] capture frame is open is
//! applied to the map immediately (the optimistic update) and recorded as a
//! [`PendingMutation`] together with a handle able to undo it.

use std::fmt;
use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use pacer_core::{
    ClockSource, EntityKey, Fields, MutationType, PendingMutation, SystemClock, Value,
};
use tracing::warn;

use super::observer::{CollectionObserver, CompositeCollectionObserver};
use crate::error::CollectionError;
use crate::tracker::{ChangeTracker, Revert};
use crate::transaction::Transaction;

/// Concurrent keyed store of [`Fields`] rows.
///
/// Always handled through an `Arc`: the collection hands itself to the
/// tracker as the undo handle for each write it records.
pub struct Collection<K: EntityKey> {
    id: String,
    rows: DashMap<K, Fields>,
    tracker: ChangeTracker<K, Fields>,
    observers: CompositeCollectionObserver<K>,
    clock: Arc<dyn ClockSource>,
    this: Weak<Self>,
}

impl<K: EntityKey> fmt::Debug for Collection<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("id", &self.id)
            .field("rows", &self.rows.len())
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl<K: EntityKey> Collection<K> {
    /// Creates an empty collection that records writes into `tracker`.
    #[must_use]
    pub fn new(id: impl Into<String>, tracker: ChangeTracker<K, Fields>) -> Arc<Self> {
        Self::with_options(id, tracker, Vec::new(), Arc::new(SystemClock))
    }

    /// Creates an empty collection with observers.
    #[must_use]
    pub fn with_observers(
        id: impl Into<String>,
        tracker: ChangeTracker<K, Fields>,
        observers: Vec<Arc<dyn CollectionObserver<K>>>,
    ) -> Arc<Self> {
        Self::with_options(id, tracker, observers, Arc::new(SystemClock))
    }

    /// Creates an empty collection with observers and an explicit clock for
    /// stamping `created_at` on recorded mutations.
    #[must_use]
    pub fn with_options(
        id: impl Into<String>,
        tracker: ChangeTracker<K, Fields>,
        observers: Vec<Arc<dyn CollectionObserver<K>>>,
        clock: Arc<dyn ClockSource>,
    ) -> Arc<Self> {
        let id = id.into();
        Arc::new_cyclic(|this| Self {
            id,
            rows: DashMap::new(),
            tracker,
            observers: CompositeCollectionObserver::new(observers),
            clock,
            this: this.clone(),
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns a copy of the row stored under `key`.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<Fields> {
        self.rows.get(key).map(|r| r.clone())
    }

    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.rows.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Copies every `(key, row)` pair. Order is unspecified.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(K, Fields)> {
        self.rows
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Tracked writes
    // -----------------------------------------------------------------------

    /// Inserts a new row.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::Untracked`] outside a capture frame and
    /// [`CollectionError::DuplicateKey`] if `key` already exists.
    pub fn insert(&self, key: K, row: Fields) -> Result<(), CollectionError> {
        self.ensure_tracked()?;
        match self.rows.entry(key.clone()) {
            Entry::Occupied(_) => return Err(self.duplicate(&key)),
            Entry::Vacant(slot) => {
                slot.insert(row.clone());
            }
        }
        self.observers.on_insert(&key, &row);
        self.record(MutationType::Insert, key, row, None);
        Ok(())
    }

    /// Edits the row stored under `key` through a draft copy.
    ///
    /// Only fields that differ afterwards are recorded; a field removed from
    /// the draft is recorded as [`Value::Null`]. A draft left unchanged
    /// records nothing.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::Untracked`] outside a capture frame and
    /// [`CollectionError::KeyNotFound`] if `key` is absent.
    pub fn update(&self, key: &K, edit: impl FnOnce(&mut Fields)) -> Result<(), CollectionError> {
        self.ensure_tracked()?;
        let old = self.get(key).ok_or_else(|| self.not_found(key))?;
        let mut draft = old.clone();
        edit(&mut draft);

        let changes = diff(&old, &draft);
        if changes.is_empty() {
            return Ok(());
        }
        self.rows.insert(key.clone(), draft.clone());
        self.observers.on_update(key, &old, &draft);
        self.record(MutationType::Update, key.clone(), changes, Some(old));
        Ok(())
    }

    /// Removes the row stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::Untracked`] outside a capture frame and
    /// [`CollectionError::KeyNotFound`] if `key` is absent.
    pub fn delete(&self, key: &K) -> Result<(), CollectionError> {
        self.ensure_tracked()?;
        let (key, old) = self.rows.remove(key).ok_or_else(|| self.not_found(key))?;
        self.observers.on_delete(&key, &old);
        self.record(MutationType::Delete, key, old.clone(), Some(old));
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Untracked writes and recovery
    // -----------------------------------------------------------------------

    /// Writes server truth without recording a mutation. `None` removes the row.
    pub fn apply_synced(&self, key: K, row: Option<Fields>) {
        match &row {
            Some(row) => {
                self.rows.insert(key.clone(), row.clone());
            }
            None => {
                self.rows.remove(&key);
            }
        }
        self.observers.on_sync(&key, row.as_ref());
    }

    /// Reverts this collection's writes from `transaction`, newest first.
    ///
    /// Intended for recovery after a failed persistence call. Records that
    /// belong to other collections are skipped.
    pub fn rollback(&self, transaction: &Transaction<K, Fields>) {
        for mutation in transaction.mutations().iter().rev() {
            self.revert(mutation);
        }
    }

    fn ensure_tracked(&self) -> Result<(), CollectionError> {
        if self.tracker.is_capturing() {
            Ok(())
        } else {
            Err(CollectionError::Untracked {
                collection: self.id.clone(),
            })
        }
    }

    fn record(
        &self,
        mutation_type: MutationType,
        key: K,
        changes: Fields,
        previous: Option<Fields>,
    ) {
        let Some(this) = self.this.upgrade() else {
            return;
        };
        let mutation = PendingMutation::new(
            mutation_type,
            self.id.clone(),
            key,
            changes,
            previous,
            self.clock.now(),
        );
        if !self.tracker.record(mutation, this) {
            warn!(collection = %self.id, "capture frame closed before write was recorded");
        }
    }

    fn duplicate(&self, key: &K) -> CollectionError {
        CollectionError::DuplicateKey {
            collection: self.id.clone(),
            key: format!("{key:?}"),
        }
    }

    fn not_found(&self, key: &K) -> CollectionError {
        CollectionError::KeyNotFound {
            collection: self.id.clone(),
            key: format!("{key:?}"),
        }
    }
}

impl<K: EntityKey> Revert<K, Fields> for Collection<K> {
    fn revert(&self, mutation: &PendingMutation<K, Fields>) {
        if mutation.collection_id != self.id {
            return;
        }
        let key = &mutation.key;
        match &mutation.previous_values {
            None => {
                if let Some((key, old)) = self.rows.remove(key) {
                    self.observers.on_delete(&key, &old);
                }
            }
            Some(previous) => match self.rows.insert(key.clone(), previous.clone()) {
                Some(old) => self.observers.on_update(key, &old, previous),
                None => self.observers.on_insert(key, previous),
            },
        }
    }
}

/// Fields of `new` that differ from `old`, plus `Null` for fields `new` dropped.
fn diff(old: &Fields, new: &Fields) -> Fields {
    let mut changes: Fields = new
        .iter()
        .filter(|(name, value)| old.get(*name) != Some(*value))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    for name in old.keys() {
        if !new.contains_key(name) {
            changes.insert(name.clone(), Value::Null);
        }
    }
    changes
}
