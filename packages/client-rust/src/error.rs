use std::sync::Arc;

use pacer_core::ConfigError;

/// Errors returned by [`PacedMutations::mutate`](crate::PacedMutations::mutate)
/// and coordinator construction.
#[derive(Debug, thiserror::Error)]
pub enum PacedError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("optimistic update failed: {0}")]
    OptimisticApply(#[source] anyhow::Error),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("coordinator is shut down")]
    Closed,
}

/// Lifecycle violations on a [`Transaction`](crate::Transaction).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransactionError {
    #[error("transaction is no longer pending, cannot apply mutations")]
    NotPendingMutate,
    #[error("transaction is no longer pending, cannot commit")]
    NotPendingCommit,
    #[error("transaction already completed, cannot roll back")]
    AlreadyCompletedRollback,
}

/// Failure delivered to every awaiter of
/// [`Transaction::is_persisted`](crate::Transaction::is_persisted).
#[derive(Debug, Clone, thiserror::Error)]
pub enum PersistError {
    #[error("mutation function failed: {0}")]
    MutationFn(Arc<anyhow::Error>),
    #[error("transaction was rolled back")]
    RolledBack,
    #[error("transaction was dropped before it settled")]
    Abandoned,
}

/// Errors from local [`Collection`](crate::collection::Collection) writes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollectionError {
    #[error("{collection}: key {key} already exists")]
    DuplicateKey { collection: String, key: String },
    #[error("{collection}: key {key} not found")]
    KeyNotFound { collection: String, key: String },
    #[error("{collection}: write outside of a transaction")]
    Untracked { collection: String },
}
