//! Pacer client: paced optimistic mutations on tokio.
//!
//! Local [`collection::Collection`] writes made inside a coordinator's
//! `on_mutate` callback are applied immediately, merged into a
//! [`Transaction`], and persisted in batches according to a
//! [`Strategy`](pacer_core::Strategy).

pub mod collection;
pub mod config;
mod deferred;
pub mod error;
pub mod logging;
pub mod memo;
pub mod metrics;
pub mod paced;
mod pacer;
pub mod tracker;
pub mod transaction;

pub use config::ClientConfig;
pub use error::{CollectionError, PacedError, PersistError, TransactionError};
pub use memo::MemoizedPacedMutations;
pub use paced::{on_mutate, OnMutate, PacedMutations, PacedMutationsConfig};
pub use tracker::{ChangeTracker, Revert};
pub use transaction::{mutation_fn, MutationFn, Transaction, TransactionConfig, TransactionState};
