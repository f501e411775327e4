//! Sequential dispatch worker for the queue strategy.
//!
//! Each `mutate()` call produces its own transaction, which is pushed onto
//! an unbounded channel. A single task drains the channel, waiting at least
//! `wait` after one flush settles before starting the next.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use super::Flusher;
use crate::error::PacedError;
use crate::transaction::Transaction;

// ---------------------------------------------------------------------------
// QueueWorker
// ---------------------------------------------------------------------------

/// Handle to the dispatch task. The task exits once every handle is dropped
/// and the channel has drained.
pub(crate) struct QueueWorker<K, C> {
    tx: mpsc::UnboundedSender<Transaction<K, C>>,
}

impl<K, C> QueueWorker<K, C>
where
    K: Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    /// Spawns the dispatch task on `runtime`.
    pub(crate) fn start(runtime: &Handle, wait: Duration, flusher: Arc<Flusher>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        runtime.spawn(run(rx, wait, flusher));
        Self { tx }
    }

    /// Enqueues a pending transaction for dispatch.
    pub(crate) fn submit(&self, transaction: Transaction<K, C>) -> Result<(), PacedError> {
        self.tx.send(transaction).map_err(|_| PacedError::Closed)
    }
}

async fn run<K, C>(
    mut rx: mpsc::UnboundedReceiver<Transaction<K, C>>,
    wait: Duration,
    flusher: Arc<Flusher>,
) where
    K: Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    let mut last_settled: Option<Instant> = None;

    while let Some(transaction) = rx.recv().await {
        if let Some(settled) = last_settled {
            sleep_until(settled + wait).await;
        }
        if let Err(error) = transaction.seal() {
            // Rolled back while waiting in the queue.
            debug!(transaction_id = %transaction.id(), %error, "skipping queued transaction");
            continue;
        }
        flusher.persist(transaction).await;
        last_settled = Some(Instant::now());
    }

    debug!("queue worker stopped");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
