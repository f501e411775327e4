//! Settable one-shot completion signal with any number of awaiters.
//!
//! Built on a `tokio::sync::watch` channel holding `Option<Result<T, E>>`.
//! The first [`Deferred::settle`] wins; later calls are ignored.

use std::future::Future;

use tokio::sync::watch;

/// Single-producer, single-resolution, multi-consumer completion signal.
#[derive(Debug)]
pub struct Deferred<T, E> {
    tx: watch::Sender<Option<Result<T, E>>>,
}

impl<T, E> Deferred<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Creates an unsettled signal.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Settles the signal. Returns `false` if it was already settled.
    pub fn settle(&self, outcome: Result<T, E>) -> bool {
        let mut outcome = Some(outcome);
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = outcome.take();
            true
        })
    }

    /// Returns a future resolving to the outcome.
    ///
    /// The future owns its receiver, so it outlives `self`. If the signal is
    /// dropped unsettled, the future yields `on_drop`.
    pub fn wait(&self, on_drop: E) -> impl Future<Output = Result<T, E>> + Send + 'static {
        let mut rx = self.tx.subscribe();
        async move {
            match rx.wait_for(Option::is_some).await {
                Ok(outcome) => outcome.clone().unwrap_or(Err(on_drop)),
                Err(_closed) => Err(on_drop),
            }
        }
    }
}

impl<T, E> Default for Deferred<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
