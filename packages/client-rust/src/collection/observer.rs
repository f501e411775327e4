//! Collection observer trait and composite implementation.
//!
//! Defines [`CollectionObserver`] for reacting to row changes within a
//! [`Collection`](super::Collection), and [`CompositeCollectionObserver`]
//! which fans out notifications to multiple observers.

use std::sync::Arc;

use pacer_core::Fields;

/// Observer for row changes within a `Collection`.
///
/// Implementations can refresh derived views, maintain indexes, or log
/// changes. Optimistic writes and their reverts are reported the same way
/// as any other write; server-confirmed rows arrive through `on_sync`.
///
/// Used as `Arc<dyn CollectionObserver<K>>`.
pub trait CollectionObserver<K>: Send + Sync {
    /// Called after a row is inserted.
    fn on_insert(&self, key: &K, row: &Fields);

    /// Called after a row is changed in place.
    fn on_update(&self, key: &K, old_row: &Fields, new_row: &Fields);

    /// Called after a row is removed.
    fn on_delete(&self, key: &K, old_row: &Fields);

    /// Called after server truth is written. `None` means the row is gone.
    fn on_sync(&self, key: &K, row: Option<&Fields>);
}

/// Composite observer that fans out to multiple observers.
pub struct CompositeCollectionObserver<K> {
    observers: Vec<Arc<dyn CollectionObserver<K>>>,
}

impl<K> Default for CompositeCollectionObserver<K> {
    fn default() -> Self {
        Self {
            observers: Vec::new(),
        }
    }
}

impl<K> CompositeCollectionObserver<K> {
    /// Creates a composite observer with the given list of observers.
    #[must_use]
    pub fn new(observers: Vec<Arc<dyn CollectionObserver<K>>>) -> Self {
        Self { observers }
    }

    /// Adds an observer after construction.
    pub fn add(&mut self, observer: Arc<dyn CollectionObserver<K>>) {
        self.observers.push(observer);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl<K> CollectionObserver<K> for CompositeCollectionObserver<K> {
    fn on_insert(&self, key: &K, row: &Fields) {
        for observer in &self.observers {
            observer.on_insert(key, row);
        }
    }

    fn on_update(&self, key: &K, old_row: &Fields, new_row: &Fields) {
        for observer in &self.observers {
            observer.on_update(key, old_row, new_row);
        }
    }

    fn on_delete(&self, key: &K, old_row: &Fields) {
        for observer in &self.observers {
            observer.on_delete(key, old_row);
        }
    }

    fn on_sync(&self, key: &K, row: Option<&Fields>) {
        for observer in &self.observers {
            observer.on_sync(key, row);
        }
    }
}
