//! Optimistic transactions.
//!
//! A [`Transaction`] batches merged [`PendingMutation`]s and carries them
//! through `pending → persisting → completed | failed`. Handles are cheap
//! clones of one shared transaction; equality is identity.
//!
//! Transactions are normally created and flushed by
//! [`PacedMutations`](crate::PacedMutations), but can also be driven by hand:
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use pacer_client::{mutation_fn, ChangeTracker, Transaction, TransactionConfig};
//! # use pacer_client::collection::Collection;
//! # use pacer_core::{fields, Fields, Value};
//! # async fn demo() -> anyhow::Result<()> {
//! let tracker: ChangeTracker<u64, Fields> = ChangeTracker::new();
//! let messages = Collection::new("messages", tracker.clone());
//!
//! let save = mutation_fn(|tx: Transaction<u64, Fields>| async move {
//!     println!("saving {} mutations", tx.len());
//!     Ok(())
//! });
//! let tx = Transaction::new(TransactionConfig::new(save));
//! tx.mutate(&tracker, || Ok(messages.insert(1, fields([("body", Value::from("hi"))]))?))?;
//! tx.commit().await?;
//! # Ok(())
//! # }
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use async_trait::async_trait;
use pacer_core::{apply_mutations, Changes, PendingMutation, Value};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::deferred::Deferred;
use crate::error::{PacedError, PersistError, TransactionError};
use crate::tracker::ChangeTracker;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

// ---------------------------------------------------------------------------
// MutationFn
// ---------------------------------------------------------------------------

/// Persistence callback invoked with a sealed transaction.
///
/// Implemented for any `Fn(Transaction<K, C>) -> impl Future<Output =
/// anyhow::Result<()>>`; see [`mutation_fn`](crate::mutation_fn).
#[async_trait]
pub trait MutationFn<K, C>: Send + Sync {
    /// Sends the transaction's mutations to the backend.
    async fn persist(&self, transaction: Transaction<K, C>) -> anyhow::Result<()>;
}

#[async_trait]
impl<K, C, F, Fut> MutationFn<K, C> for F
where
    F: Fn(Transaction<K, C>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    K: Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    async fn persist(&self, transaction: Transaction<K, C>) -> anyhow::Result<()> {
        (self)(transaction).await
    }
}

/// Wraps an async closure as a shared [`MutationFn`].
///
/// The returned `Arc` is the identity used by
/// [`MemoizedPacedMutations`](crate::MemoizedPacedMutations): create it once
/// and reuse it to keep getting the same coordinator.
pub fn mutation_fn<K, C, F, Fut>(f: F) -> Arc<dyn MutationFn<K, C>>
where
    F: Fn(Transaction<K, C>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    K: Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    Arc::new(f)
}

// ---------------------------------------------------------------------------
// TransactionState
// ---------------------------------------------------------------------------

/// Lifecycle state of a [`Transaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionState {
    /// Open: accepts new mutations.
    Pending,
    /// Sealed: the mutation function is running.
    Persisting,
    /// Terminal: the mutation function succeeded.
    Completed,
    /// Terminal: the mutation function failed or the transaction was rolled back.
    Failed,
}

impl TransactionState {
    /// Returns `true` for `Completed` and `Failed`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionState::Completed | TransactionState::Failed)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionState::Pending => "pending",
            TransactionState::Persisting => "persisting",
            TransactionState::Completed => "completed",
            TransactionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// TransactionConfig
// ---------------------------------------------------------------------------

/// Construction parameters for a [`Transaction`].
pub struct TransactionConfig<K, C> {
    /// Explicit id; a v4 UUID is generated when `None`.
    pub id: Option<Uuid>,
    /// Callback run by [`Transaction::commit`].
    pub mutation_fn: Arc<dyn MutationFn<K, C>>,
    /// Opaque caller data.
    pub metadata: Option<Value>,
    /// Wall-clock millis used for ordering.
    pub created_at: u64,
}

impl<K, C> TransactionConfig<K, C> {
    /// Config with a generated id, no metadata, and `created_at = 0`.
    pub fn new(mutation_fn: Arc<dyn MutationFn<K, C>>) -> Self {
        Self {
            id: None,
            mutation_fn,
            metadata: None,
            created_at: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

struct Body<K, C> {
    state: TransactionState,
    mutations: Vec<PendingMutation<K, C>>,
    error: Option<PersistError>,
}

struct Inner<K, C> {
    id: Uuid,
    created_at: u64,
    sequence_number: u64,
    metadata: Option<Value>,
    mutation_fn: Arc<dyn MutationFn<K, C>>,
    body: Mutex<Body<K, C>>,
    persisted: Deferred<(), PersistError>,
}

/// Shared handle to one batch of optimistic mutations.
pub struct Transaction<K, C> {
    inner: Arc<Inner<K, C>>,
}

impl<K, C> Clone for Transaction<K, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, C> PartialEq for Transaction<K, C> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<K, C> Eq for Transaction<K, C> {}

impl<K, C> fmt::Debug for Transaction<K, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = self.inner.body.lock();
        f.debug_struct("Transaction")
            .field("id", &self.inner.id)
            .field("state", &body.state)
            .field("mutations", &body.mutations.len())
            .field("sequence_number", &self.inner.sequence_number)
            .finish_non_exhaustive()
    }
}

impl<K, C> Transaction<K, C> {
    /// Creates a pending transaction with no mutations.
    pub fn new(config: TransactionConfig<K, C>) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: config.id.unwrap_or_else(Uuid::new_v4),
                created_at: config.created_at,
                sequence_number: SEQUENCE.fetch_add(1, AtomicOrdering::Relaxed),
                metadata: config.metadata,
                mutation_fn: config.mutation_fn,
                body: Mutex::new(Body {
                    state: TransactionState::Pending,
                    mutations: Vec::new(),
                    error: None,
                }),
                persisted: Deferred::new(),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.inner.body.lock().state
    }

    #[must_use]
    pub fn metadata(&self) -> Option<&Value> {
        self.inner.metadata.as_ref()
    }

    #[must_use]
    pub fn created_at(&self) -> u64 {
        self.inner.created_at
    }

    #[must_use]
    pub fn sequence_number(&self) -> u64 {
        self.inner.sequence_number
    }

    /// Number of merged mutations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.body.lock().mutations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The failure recorded when the transaction failed.
    #[must_use]
    pub fn error(&self) -> Option<PersistError> {
        self.inner.body.lock().error.clone()
    }

    /// Returns `true` if both handles refer to the same transaction.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Orders by creation time, then by creation sequence.
    #[must_use]
    pub fn cmp_created(&self, other: &Self) -> Ordering {
        self.inner
            .created_at
            .cmp(&other.inner.created_at)
            .then_with(|| self.inner.sequence_number.cmp(&other.inner.sequence_number))
    }

    /// Future resolving when the transaction completes, or failing when it fails.
    ///
    /// Any number of callers may await it; all observe the same outcome.
    pub fn is_persisted(&self) -> impl Future<Output = Result<(), PersistError>> + Send + 'static {
        self.inner.persisted.wait(PersistError::Abandoned)
    }

    /// Seals a pending transaction: `pending → persisting`.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::NotPendingCommit`] if the transaction was
    /// already sealed or settled.
    pub fn seal(&self) -> Result<(), TransactionError> {
        let mut body = self.inner.body.lock();
        if body.state != TransactionState::Pending {
            return Err(TransactionError::NotPendingCommit);
        }
        body.state = TransactionState::Persisting;
        Ok(())
    }

    /// Fails the transaction and rejects `is_persisted` with
    /// [`PersistError::RolledBack`].
    ///
    /// Rolling back an already failed transaction is a no-op. Local writes
    /// are not touched; see [`Collection::rollback`](crate::collection::Collection::rollback).
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::AlreadyCompletedRollback`] if the
    /// transaction already completed.
    pub fn rollback(&self) -> Result<(), TransactionError> {
        {
            let mut body = self.inner.body.lock();
            match body.state {
                TransactionState::Completed => {
                    return Err(TransactionError::AlreadyCompletedRollback);
                }
                TransactionState::Failed => return Ok(()),
                TransactionState::Pending | TransactionState::Persisting => {
                    body.state = TransactionState::Failed;
                    body.error = Some(PersistError::RolledBack);
                }
            }
        }
        debug!(transaction_id = %self.inner.id, "transaction rolled back");
        self.inner.persisted.settle(Err(PersistError::RolledBack));
        Ok(())
    }

    /// Runs the mutation function for a sealed transaction and settles it.
    ///
    /// Transactions with no mutations complete without calling the
    /// mutation function. If the transaction was rolled back while the
    /// mutation function ran, the rollback stands.
    pub(crate) async fn persist(&self) -> Result<(), PersistError> {
        if self.is_empty() {
            return self.finish(Ok(()));
        }
        let outcome = self
            .inner
            .mutation_fn
            .persist(self.clone())
            .await
            .map_err(|e| PersistError::MutationFn(Arc::new(e)));
        self.finish(outcome)
    }

    fn finish(&self, outcome: Result<(), PersistError>) -> Result<(), PersistError> {
        {
            let mut body = self.inner.body.lock();
            if body.state.is_terminal() {
                return body.error.clone().map_or(Ok(()), Err);
            }
            match &outcome {
                Ok(()) => body.state = TransactionState::Completed,
                Err(e) => {
                    body.state = TransactionState::Failed;
                    body.error = Some(e.clone());
                }
            }
        }
        self.inner.persisted.settle(outcome.clone());
        outcome
    }
}

impl<K, C> Transaction<K, C>
where
    K: Clone + PartialEq,
    C: Changes,
{
    /// Snapshot of the merged mutations, in merge order.
    #[must_use]
    pub fn mutations(&self) -> Vec<PendingMutation<K, C>> {
        self.inner.body.lock().mutations.clone()
    }

    /// Merges `incoming` into this transaction's mutations.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::NotPendingMutate`] once the transaction
    /// has been sealed.
    pub fn apply_mutations(
        &self,
        incoming: Vec<PendingMutation<K, C>>,
    ) -> Result<(), TransactionError> {
        let mut body = self.inner.body.lock();
        if body.state != TransactionState::Pending {
            return Err(TransactionError::NotPendingMutate);
        }
        apply_mutations(&mut body.mutations, incoming);
        Ok(())
    }

    /// Runs `f` under `tracker` and merges the writes it performs.
    ///
    /// # Errors
    ///
    /// Returns [`PacedError::Transaction`] if the transaction is not pending
    /// (before `f` runs) and [`PacedError::OptimisticApply`] if `f` fails, in
    /// which case its writes are reverted.
    pub fn mutate<R>(
        &self,
        tracker: &ChangeTracker<K, C>,
        f: impl FnOnce() -> anyhow::Result<R>,
    ) -> Result<R, PacedError> {
        if self.state() != TransactionState::Pending {
            return Err(TransactionError::NotPendingMutate.into());
        }
        let (value, captured) = tracker.capture(f).map_err(PacedError::OptimisticApply)?;
        self.apply_mutations(captured)?;
        Ok(value)
    }

    /// Seals the transaction and runs its mutation function.
    ///
    /// # Errors
    ///
    /// Returns [`PacedError::Transaction`] if the transaction is not pending
    /// and [`PacedError::Persist`] if persistence fails.
    pub async fn commit(&self) -> Result<(), PacedError> {
        self.seal()?;
        self.persist().await?;
        Ok(())
    }
}
