//! Pending mutation records.
//!
//! A [`PendingMutation`] describes one optimistic change to one keyed entity
//! in one collection. Records are immutable once created: the merge engine
//! ([`crate::merge`]) produces new records instead of editing old ones.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::Value;

/// Kind of change a mutation applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationType {
    /// Entity did not exist before; `changes` holds the full row.
    Insert,
    /// Entity existed; `changes` holds only the modified fields.
    Update,
    /// Entity is removed; `changes` holds the row as it was deleted.
    Delete,
}

impl fmt::Display for MutationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationType::Insert => write!(f, "insert"),
            MutationType::Update => write!(f, "update"),
            MutationType::Delete => write!(f, "delete"),
        }
    }
}

/// One change to one entity, as recorded by a local collection.
///
/// The merge identity of a record is its global key: the pair
/// `(collection_id, key)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMutation<K, C> {
    /// Unique identifier of this record. Refreshed by merges.
    pub mutation_id: Uuid,
    /// Kind of change.
    #[serde(rename = "type")]
    pub mutation_type: MutationType,
    /// Identifier of the collection that produced the record.
    pub collection_id: String,
    /// Key of the affected entity within its collection.
    pub key: K,
    /// Changed fields (full row for inserts).
    pub changes: C,
    /// Entity state before the enclosing transaction first touched it.
    /// `None` when the entity did not exist.
    pub previous_values: Option<C>,
    /// Optional caller metadata.
    pub metadata: Option<Value>,
    /// Wall-clock millis at which the record was created.
    pub created_at: u64,
}

impl<K, C> PendingMutation<K, C> {
    /// Creates a record with a fresh `mutation_id` and no metadata.
    pub fn new(
        mutation_type: MutationType,
        collection_id: impl Into<String>,
        key: K,
        changes: C,
        previous_values: Option<C>,
        created_at: u64,
    ) -> Self {
        Self {
            mutation_id: Uuid::new_v4(),
            mutation_type,
            collection_id: collection_id.into(),
            key,
            changes,
            previous_values,
            metadata: None,
            created_at,
        }
    }

    /// Attaches caller metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

impl<K: PartialEq, C> PendingMutation<K, C> {
    /// Returns `true` if both records target the same entity of the same collection.
    #[must_use]
    pub fn same_target(&self, other: &Self) -> bool {
        self.key == other.key && self.collection_id == other.collection_id
    }
}
