//! Runtime side of timing strategies.
//!
//! Debounce and throttle are small synchronous state machines
//! ([`PacingPolicy`]) driven by the coordinator's mutation path and by a
//! single timer task. Queue is a dedicated worker task
//! ([`queue::QueueWorker`]) that dispatches transactions one at a time.

pub(crate) mod debounce;
pub(crate) mod queue;
pub(crate) mod throttle;

use std::sync::Arc;
use std::time::Duration;

use pacer_core::Strategy;
use tokio::time::Instant;
use tracing::{info_span, warn, Instrument};

use crate::config::ClientConfig;
use crate::metrics;
use crate::transaction::Transaction;

use self::debounce::Debounce;
use self::throttle::Throttle;

// ---------------------------------------------------------------------------
// PacingPolicy
// ---------------------------------------------------------------------------

/// Timer-driven flush decision for debounce and throttle.
///
/// Both hooks return `true` when the active transaction should be flushed
/// now. The coordinator keeps one timer task sleeping until
/// [`deadline`](Self::deadline) while it is `Some`.
pub(crate) trait PacingPolicy: Send {
    /// A mutation was merged into the active transaction at `now`.
    fn on_mutation(&mut self, now: Instant) -> bool;

    /// The current deadline has been reached.
    fn on_deadline(&mut self, now: Instant) -> bool;

    /// When the timer should next fire, if at all.
    fn deadline(&self) -> Option<Instant>;
}

/// Builds the policy for a timer-driven strategy. `None` for queue.
pub(crate) fn policy_for(strategy: &Strategy) -> Option<Box<dyn PacingPolicy>> {
    match strategy {
        Strategy::Debounce(options) => Some(Box::new(Debounce::new(*options))),
        Strategy::Throttle(options) => Some(Box::new(Throttle::new(*options))),
        Strategy::Queue(_) => None,
    }
}

// ---------------------------------------------------------------------------
// Flusher
// ---------------------------------------------------------------------------

/// Runs a sealed transaction's mutation function with logging and metrics.
#[derive(Debug, Clone)]
pub(crate) struct Flusher {
    strategy: &'static str,
    client_id: String,
    slow_persist: Duration,
}

impl Flusher {
    pub(crate) fn new(strategy: &Strategy, config: &ClientConfig) -> Arc<Self> {
        Arc::new(Self {
            strategy: strategy.name(),
            client_id: config.client_id.clone(),
            slow_persist: Duration::from_millis(config.slow_persist_warn_ms),
        })
    }

    /// Persists `transaction`, which must already be sealed.
    pub(crate) async fn persist<K, C>(&self, transaction: Transaction<K, C>)
    where
        K: Send + Sync + 'static,
        C: Send + Sync + 'static,
    {
        let span = info_span!(
            "persist",
            client_id = %self.client_id,
            transaction_id = %transaction.id(),
            strategy = self.strategy,
            mutations = transaction.len(),
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        async move {
            metrics::record_flush(self.strategy);
            let start = std::time::Instant::now();
            let result = transaction.persist().await;
            let elapsed = start.elapsed();

            let outcome = match &result {
                Ok(()) => "ok",
                Err(_) => "error",
            };
            #[allow(clippy::cast_possible_truncation)]
            let duration_ms = elapsed.as_millis() as u64;
            tracing::Span::current().record("duration_ms", duration_ms);
            tracing::Span::current().record("outcome", outcome);
            metrics::record_persist(self.strategy, elapsed, result.is_ok());

            match result {
                Ok(()) if elapsed >= self.slow_persist => {
                    warn!(duration_ms, "slow persistence");
                }
                Ok(()) => {
                    tracing::info!(duration_ms, outcome, "flush complete");
                }
                Err(error) => {
                    warn!(%error, duration_ms, "persistence failed");
                }
            }
        }
        .instrument(span)
        .await;
    }
}
