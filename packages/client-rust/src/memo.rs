//! Stable coordinator identity across repeated construction.
//!
//! UI-style callers rebuild their configuration on every render.
//! [`MemoizedPacedMutations`] hands back the coordinator it built last time
//! as long as nothing meaningful changed, so the caller keeps one stable
//! `mutate` entry point and in-flight batching is not lost.

use arc_swap::ArcSwapOption;
use pacer_core::Changes;
use tracing::debug;

use crate::error::PacedError;
use crate::paced::{Inner, PacedMutations, PacedMutationsConfig};

/// Caches the last coordinator built from a config.
pub struct MemoizedPacedMutations<V, K, C> {
    current: ArcSwapOption<Inner<V, K, C>>,
}

impl<V, K, C> Default for MemoizedPacedMutations<V, K, C> {
    fn default() -> Self {
        Self {
            current: ArcSwapOption::empty(),
        }
    }
}

impl<V, K, C> MemoizedPacedMutations<V, K, C>
where
    V: 'static,
    K: Clone + PartialEq + Send + Sync + 'static,
    C: Changes,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached coordinator if `config` matches the one it was
    /// built from, otherwise builds, caches and returns a new one.
    ///
    /// Callbacks and the tracker match by identity (the same `Arc`s);
    /// strategy, metadata and client settings match by value. A replaced
    /// coordinator is not stopped: its armed timers still fire.
    ///
    /// # Errors
    ///
    /// Returns the construction error of [`PacedMutations::new`]; the
    /// cached coordinator is kept in that case.
    pub fn get(
        &self,
        config: PacedMutationsConfig<V, K, C>,
    ) -> Result<PacedMutations<V, K, C>, PacedError> {
        if let Some(current) = self.current.load_full() {
            let current = PacedMutations::from_shared(current);
            if current.built_from(&config) {
                return Ok(current);
            }
            debug!(strategy = config.strategy.name(), "config changed, rebuilding coordinator");
        }
        let built = PacedMutations::new(config)?;
        self.current.store(Some(built.shared()));
        Ok(built)
    }

    /// Drops the cached coordinator.
    pub fn clear(&self) {
        self.current.store(None);
    }
}
