//! Mutation merge engine.
//!
//! Collapses mutations that target the same entity within one open
//! transaction into a single equivalent record.
//!
//! # Merge table
//!
//! | existing | incoming | result                                   |
//! |----------|----------|------------------------------------------|
//! | insert   | update   | insert, union of changes (incoming wins) |
//! | update   | update   | update, union of changes (incoming wins) |
//! | any      | delete   | delete                                   |
//! | other    | other    | incoming replaces existing               |
//!
//! In every case the merged record keeps the existing record's
//! `previous_values`: the entity state before the transaction first touched
//! it. Records for new global keys are appended in arrival order.

use tracing::trace;

use crate::mutation::{MutationType, PendingMutation};
use crate::types::Changes;

/// Merges `incoming` into `existing`, which must target the same entity.
#[must_use]
pub fn merge_pending<K, C>(
    existing: &PendingMutation<K, C>,
    incoming: PendingMutation<K, C>,
) -> PendingMutation<K, C>
where
    K: Clone,
    C: Changes,
{
    match (existing.mutation_type, incoming.mutation_type) {
        (MutationType::Insert | MutationType::Update, MutationType::Update) => {
            let mut changes = existing.changes.clone();
            changes.merge_from(&incoming.changes);
            PendingMutation {
                mutation_id: incoming.mutation_id,
                mutation_type: existing.mutation_type,
                collection_id: existing.collection_id.clone(),
                key: existing.key.clone(),
                changes,
                previous_values: existing.previous_values.clone(),
                metadata: incoming.metadata.or_else(|| existing.metadata.clone()),
                created_at: incoming.created_at,
            }
        }
        _ => PendingMutation {
            previous_values: existing.previous_values.clone(),
            ..incoming
        },
    }
}

/// Applies `incoming` records to `existing` in place.
///
/// Each record is merged with the existing record for its global key, or
/// appended when there is none.
pub fn apply_mutations<K, C, I>(existing: &mut Vec<PendingMutation<K, C>>, incoming: I)
where
    K: Clone + PartialEq,
    C: Changes,
    I: IntoIterator<Item = PendingMutation<K, C>>,
{
    for mutation in incoming {
        match existing.iter().position(|m| m.same_target(&mutation)) {
            Some(idx) => {
                trace!(
                    collection = %mutation.collection_id,
                    existing = %existing[idx].mutation_type,
                    incoming = %mutation.mutation_type,
                    "merging mutation into pending record"
                );
                let merged = merge_pending(&existing[idx], mutation);
                existing[idx] = merged;
            }
            None => existing.push(mutation),
        }
    }
}

/// Returns a new sequence with `incoming` merged into `existing`.
#[must_use]
pub fn merge<K, C>(
    existing: &[PendingMutation<K, C>],
    incoming: PendingMutation<K, C>,
) -> Vec<PendingMutation<K, C>>
where
    K: Clone + PartialEq,
    C: Changes,
{
    let mut out = existing.to_vec();
    apply_mutations(&mut out, std::iter::once(incoming));
    out
}
