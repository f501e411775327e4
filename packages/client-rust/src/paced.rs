//! The paced mutation coordinator.
//!
//! [`PacedMutations`] applies every call's optimistic update immediately,
//! merges the resulting records into a shared transaction, and lets a
//! [`Strategy`] decide when that transaction is flushed to the mutation
//! function.

use std::fmt;
use std::sync::Arc;

use pacer_core::{Changes, ClockSource, ConfigError, Strategy, SystemClock, Value};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::PacedError;
use crate::pacer::queue::QueueWorker;
use crate::pacer::{policy_for, Flusher, PacingPolicy};
use crate::tracker::ChangeTracker;
use crate::transaction::{MutationFn, Transaction, TransactionConfig, TransactionState};

/// Shared optimistic-update callback.
pub type OnMutate<V> = Arc<dyn Fn(V) -> anyhow::Result<()> + Send + Sync>;

/// Wraps a closure as a shared [`OnMutate`] callback.
///
/// Like [`mutation_fn`](crate::mutation_fn), the returned `Arc` is the
/// identity checked by [`MemoizedPacedMutations`](crate::MemoizedPacedMutations).
pub fn on_mutate<V, F>(f: F) -> OnMutate<V>
where
    F: Fn(V) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

// ---------------------------------------------------------------------------
// PacedMutationsConfig
// ---------------------------------------------------------------------------

/// Construction parameters for [`PacedMutations`].
pub struct PacedMutationsConfig<V, K, C> {
    /// Applies the optimistic update for one call. Runs synchronously inside
    /// a capture frame of `tracker`.
    pub on_mutate: OnMutate<V>,
    /// Persists a flushed transaction.
    pub mutation_fn: Arc<dyn MutationFn<K, C>>,
    pub strategy: Strategy,
    /// Copied onto every transaction the coordinator creates.
    pub metadata: Option<Value>,
    pub tracker: ChangeTracker<K, C>,
    pub client_config: ClientConfig,
    /// Source of `created_at` for new transactions.
    pub clock: Arc<dyn ClockSource>,
}

impl<V, K, C> PacedMutationsConfig<V, K, C> {
    /// Config with no metadata, default client settings and the system clock.
    pub fn new(
        on_mutate: OnMutate<V>,
        mutation_fn: Arc<dyn MutationFn<K, C>>,
        strategy: Strategy,
        tracker: ChangeTracker<K, C>,
    ) -> Self {
        Self {
            on_mutate,
            mutation_fn,
            strategy,
            metadata: None,
            tracker,
            client_config: ClientConfig::default(),
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    #[must_use]
    pub fn with_client_config(mut self, client_config: ClientConfig) -> Self {
        self.client_config = client_config;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn ClockSource>) -> Self {
        self.clock = clock;
        self
    }
}

impl<V, K, C> Clone for PacedMutationsConfig<V, K, C> {
    fn clone(&self) -> Self {
        Self {
            on_mutate: Arc::clone(&self.on_mutate),
            mutation_fn: Arc::clone(&self.mutation_fn),
            strategy: self.strategy,
            metadata: self.metadata.clone(),
            tracker: self.tracker.clone(),
            client_config: self.client_config.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}

// ---------------------------------------------------------------------------
// PacedMutations
// ---------------------------------------------------------------------------

struct PacedState<K, C> {
    active: Option<Transaction<K, C>>,
    policy: Box<dyn PacingPolicy>,
    timer_armed: bool,
}

enum Dispatch<K, C> {
    Paced(Mutex<PacedState<K, C>>),
    Queue(QueueWorker<K, C>),
}

pub(crate) struct Inner<V, K, C> {
    config: PacedMutationsConfig<V, K, C>,
    runtime: Handle,
    flusher: Arc<Flusher>,
    dispatch: Dispatch<K, C>,
}

/// Coordinator turning a stream of `mutate()` calls into paced transactions.
///
/// Cheap to clone; clones share all state. Armed timers hold a handle too,
/// so a coordinator stays alive until its last pending flush has fired.
pub struct PacedMutations<V, K, C> {
    inner: Arc<Inner<V, K, C>>,
}

impl<V, K, C> Clone for PacedMutations<V, K, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V, K, C> fmt::Debug for PacedMutations<V, K, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacedMutations")
            .field("strategy", &self.inner.config.strategy)
            .field("metadata", &self.inner.config.metadata)
            .finish_non_exhaustive()
    }
}

impl<V, K, C> PacedMutations<V, K, C> {
    /// Returns `true` if both handles refer to the same coordinator.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    #[must_use]
    pub fn strategy(&self) -> &Strategy {
        &self.inner.config.strategy
    }

    #[must_use]
    pub fn metadata(&self) -> Option<&Value> {
        self.inner.config.metadata.as_ref()
    }

    /// Whether a coordinator built from `config` would behave identically:
    /// same callback and tracker instances, equal strategy, metadata and
    /// client settings.
    pub(crate) fn from_shared(inner: Arc<Inner<V, K, C>>) -> Self {
        Self { inner }
    }

    pub(crate) fn shared(&self) -> Arc<Inner<V, K, C>> {
        Arc::clone(&self.inner)
    }

    pub(crate) fn built_from(&self, config: &PacedMutationsConfig<V, K, C>) -> bool {
        let ours = &self.inner.config;
        Arc::ptr_eq(&ours.on_mutate, &config.on_mutate)
            && Arc::ptr_eq(&ours.mutation_fn, &config.mutation_fn)
            && Arc::ptr_eq(&ours.clock, &config.clock)
            && ours.tracker.ptr_eq(&config.tracker)
            && ours.strategy == config.strategy
            && ours.metadata == config.metadata
            && ours.client_config == config.client_config
    }
}

impl<V, K, C> PacedMutations<V, K, C>
where
    V: 'static,
    K: Clone + PartialEq + Send + Sync + 'static,
    C: Changes,
{
    /// Validates `config` and starts the coordinator on the current runtime.
    ///
    /// # Errors
    ///
    /// Returns [`PacedError::Config`] for invalid strategy options or when
    /// called outside a tokio runtime.
    pub fn new(config: PacedMutationsConfig<V, K, C>) -> Result<Self, PacedError> {
        config.strategy.validate()?;
        let runtime = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;
        let flusher = Flusher::new(&config.strategy, &config.client_config);

        let dispatch = match policy_for(&config.strategy) {
            Some(policy) => Dispatch::Paced(Mutex::new(PacedState {
                active: None,
                policy,
                timer_armed: false,
            })),
            None => Dispatch::Queue(QueueWorker::start(
                &runtime,
                config.strategy.wait(),
                Arc::clone(&flusher),
            )),
        };

        debug!(strategy = config.strategy.name(), "paced mutations started");
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                runtime,
                flusher,
                dispatch,
            }),
        })
    }

    /// Applies `variables` optimistically and schedules persistence.
    ///
    /// Calls that land in the same batching window return the same
    /// transaction. With the queue strategy every call gets its own.
    ///
    /// # Errors
    ///
    /// Returns [`PacedError::OptimisticApply`] if `on_mutate` fails; its
    /// local writes are reverted and no transaction is touched.
    /// Returns [`PacedError::Closed`] if the queue worker is gone.
    pub fn mutate(&self, variables: V) -> Result<Transaction<K, C>, PacedError> {
        let inner = &self.inner;
        let ((), captured) = inner
            .config
            .tracker
            .capture(|| (inner.config.on_mutate)(variables))
            .map_err(PacedError::OptimisticApply)?;

        match &inner.dispatch {
            Dispatch::Queue(worker) => {
                let transaction = inner.new_transaction();
                transaction.apply_mutations(captured)?;
                worker.submit(transaction.clone())?;
                Ok(transaction)
            }
            Dispatch::Paced(state) => {
                let now = Instant::now();
                let (transaction, flushed, arm) = {
                    let mut state = state.lock();
                    // A caller may have rolled back the open transaction by hand.
                    if state
                        .active
                        .as_ref()
                        .is_some_and(|t| t.state() != TransactionState::Pending)
                    {
                        state.active = None;
                    }
                    let transaction = state
                        .active
                        .get_or_insert_with(|| inner.new_transaction())
                        .clone();
                    transaction.apply_mutations(captured)?;

                    let flushed = if state.policy.on_mutation(now) {
                        state.active.take()
                    } else {
                        None
                    };
                    let arm = !state.timer_armed && state.policy.deadline().is_some();
                    if arm {
                        state.timer_armed = true;
                    }
                    (transaction, flushed, arm)
                };

                if let Some(flushed) = flushed {
                    inner.flush(flushed);
                }
                if arm {
                    let timer = Arc::clone(inner);
                    inner.runtime.spawn(timer.run_timer());
                }
                Ok(transaction)
            }
        }
    }

    /// The open transaction collecting mutations, if any. Always `None`
    /// for the queue strategy.
    #[must_use]
    pub fn active_transaction(&self) -> Option<Transaction<K, C>> {
        match &self.inner.dispatch {
            Dispatch::Paced(state) => state.lock().active.clone(),
            Dispatch::Queue(_) => None,
        }
    }
}

impl<V, K, C> Inner<V, K, C>
where
    V: 'static,
    K: Clone + PartialEq + Send + Sync + 'static,
    C: Changes,
{
    fn new_transaction(&self) -> Transaction<K, C> {
        Transaction::new(TransactionConfig {
            id: None,
            mutation_fn: Arc::clone(&self.config.mutation_fn),
            metadata: self.config.metadata.clone(),
            created_at: self.config.clock.now(),
        })
    }

    /// Seals `transaction` now and persists it in the background.
    fn flush(&self, transaction: Transaction<K, C>) {
        if let Err(error) = transaction.seal() {
            debug!(
                transaction_id = %transaction.id(),
                %error,
                "transaction no longer pending, not flushing"
            );
            return;
        }
        let flusher = Arc::clone(&self.flusher);
        self.runtime.spawn(async move { flusher.persist(transaction).await });
    }

    /// Sleeps until each successive policy deadline and applies it. Exits,
    /// disarming itself, once the policy has no deadline left.
    async fn run_timer(self: Arc<Self>) {
        let Dispatch::Paced(state) = &self.dispatch else {
            return;
        };
        loop {
            let deadline = {
                let mut state = state.lock();
                match state.policy.deadline() {
                    Some(deadline) => deadline,
                    None => {
                        state.timer_armed = false;
                        return;
                    }
                }
            };

            sleep_until(deadline).await;

            let flushed = {
                let mut state = state.lock();
                let now = Instant::now();
                // The deadline may have moved while we slept.
                let due = state.policy.deadline().is_some_and(|d| d <= now);
                if due && state.policy.on_deadline(now) {
                    state.active.take()
                } else {
                    None
                }
            };
            if let Some(flushed) = flushed {
                self.flush(flushed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use pacer_core::{fields, Fields, ManualClock, MutationType};

    use super::*;
    use crate::collection::Collection;
    use crate::error::PersistError;
    use crate::mutation_fn;

    type Tx = Transaction<u64, Fields>;

    /// One chat message row being edited over and over.
    struct Harness {
        tracker: ChangeTracker<u64, Fields>,
        messages: Arc<Collection<u64>>,
        calls: Arc<Mutex<Vec<(Instant, Vec<pacer_core::PendingMutation<u64, Fields>>)>>>,
    }

    impl Harness {
        fn new() -> Self {
            let tracker = ChangeTracker::new();
            let messages = Collection::new("messages", tracker.clone());
            messages.apply_synced(1, Some(fields([("body", Value::from(""))])));
            Self {
                tracker,
                messages,
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn config(&self, strategy: Strategy) -> PacedMutationsConfig<String, u64, Fields> {
            let messages = Arc::clone(&self.messages);
            let calls = Arc::clone(&self.calls);
            PacedMutationsConfig::new(
                on_mutate(move |body: String| {
                    messages.update(&1, |row| {
                        row.insert("body".into(), Value::from(body));
                    })?;
                    Ok(())
                }),
                mutation_fn(move |tx: Tx| {
                    calls.lock().push((Instant::now(), tx.mutations()));
                    async { Ok(()) }
                }),
                strategy,
                self.tracker.clone(),
            )
        }

        fn coordinator(&self, strategy: Strategy) -> PacedMutations<String, u64, Fields> {
            PacedMutations::new(self.config(strategy)).unwrap()
        }

        fn call_count(&self) -> usize {
            self.calls.lock().len()
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    async fn advance(n: u64) {
        tokio::time::sleep(ms(n)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_batches_calls_into_one_transaction() {
        let h = Harness::new();
        let paced = h.coordinator(Strategy::debounce(50));
        let start = Instant::now();

        let tx1 = paced.mutate("h".into()).unwrap();
        advance(10).await;
        let tx2 = paced.mutate("he".into()).unwrap();
        advance(10).await;
        let tx3 = paced.mutate("hey".into()).unwrap();

        assert!(tx1.ptr_eq(&tx2) && tx2 == tx3);
        assert_eq!(tx1.state(), TransactionState::Pending);
        // Optimistic state is visible before persistence.
        assert_eq!(h.messages.get(&1).unwrap()["body"], Value::from("hey"));

        tx1.is_persisted().await.unwrap();

        let calls = h.calls.lock();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].0 - start >= ms(70));
        assert_eq!(calls[0].1.len(), 1);
        assert_eq!(calls[0].1[0].changes["body"], Value::from("hey"));
        assert_eq!(tx1.state(), TransactionState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_timer_resets_on_each_call() {
        let h = Harness::new();
        let paced = h.coordinator(Strategy::debounce(50));
        let start = Instant::now();

        let tx = paced.mutate("a".into()).unwrap();
        advance(40).await;
        paced.mutate("ab".into()).unwrap();
        advance(40).await;
        assert_eq!(h.call_count(), 0);

        tx.is_persisted().await.unwrap();
        assert_eq!(h.call_count(), 1);
        assert!(h.calls.lock()[0].0 - start >= ms(90));
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_single_call_flushes_after_wait() {
        let h = Harness::new();
        let paced = h.coordinator(Strategy::debounce(50));
        let start = Instant::now();

        let tx = paced.mutate("a".into()).unwrap();
        tx.is_persisted().await.unwrap();

        let calls = h.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0 - start, ms(50));
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_leading_flushes_immediately() {
        let h = Harness::new();
        let paced = h.coordinator(Strategy::debounce(50).leading(true));

        let first = paced.mutate("a".into()).unwrap();
        assert_eq!(first.state(), TransactionState::Persisting);
        let second = paced.mutate("ab".into()).unwrap();
        assert!(!first.ptr_eq(&second));
        assert_eq!(second.state(), TransactionState::Pending);

        second.is_persisted().await.unwrap();
        assert_eq!(h.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn leading_only_tail_waits_for_a_further_call() {
        let h = Harness::new();
        let strategy = Strategy::debounce(50).leading(true).trailing(false);
        assert!(!strategy.flushes_when_idle());
        let paced = h.coordinator(strategy);

        let first = paced.mutate("a".into()).unwrap();
        let tail = paced.mutate("ab".into()).unwrap();
        advance(200).await;
        first.is_persisted().await.unwrap();
        assert_eq!(h.call_count(), 1);

        let open = paced.active_transaction().unwrap();
        assert!(open.ptr_eq(&tail));
        assert_eq!(open.state(), TransactionState::Pending);

        open.rollback().unwrap();
        h.messages.rollback(&open);
        assert_eq!(h.messages.get(&1).unwrap()["body"], Value::from("a"));
        let err = tail.is_persisted().await.unwrap_err();
        assert!(matches!(err, PersistError::RolledBack));
        assert_eq!(h.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_flushes_leading_and_trailing() {
        let h = Harness::new();
        let paced = h.coordinator(Strategy::throttle(50));
        let start = Instant::now();

        let leading = paced.mutate("a".into()).unwrap();
        advance(10).await;
        let trailing = paced.mutate("ab".into()).unwrap();
        advance(10).await;
        let trailing_again = paced.mutate("abc".into()).unwrap();

        assert!(!leading.ptr_eq(&trailing));
        assert!(trailing.ptr_eq(&trailing_again));

        trailing.is_persisted().await.unwrap();
        advance(200).await;

        let calls = h.calls.lock();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0 - start, ms(0));
        assert!(calls[1].0 - start >= ms(50));
        assert_eq!(calls[1].1[0].changes["body"], Value::from("abc"));
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_without_leading_waits_for_window_end() {
        let h = Harness::new();
        let paced = h.coordinator(Strategy::throttle(50).leading(false));
        let start = Instant::now();

        let tx = paced.mutate("a".into()).unwrap();
        assert_eq!(tx.state(), TransactionState::Pending);
        tx.is_persisted().await.unwrap();
        assert!(h.calls.lock()[0].0 - start >= ms(50));
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_failure_does_not_jam_later_flushes() {
        let h = Harness::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let (a, calls) = (attempts.clone(), Arc::clone(&h.calls));
        let mut config = h.config(Strategy::throttle(50));
        config.mutation_fn = mutation_fn(move |tx: Tx| {
            calls.lock().push((Instant::now(), tx.mutations()));
            let n = a.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    anyhow::bail!("503 from backend");
                }
                Ok(())
            }
        });
        let paced = PacedMutations::new(config).unwrap();
        let start = Instant::now();

        let leading = paced.mutate("a".into()).unwrap();
        advance(10).await;
        let trailing = paced.mutate("ab".into()).unwrap();
        assert!(!leading.ptr_eq(&trailing));

        let err = leading.is_persisted().await.unwrap_err();
        assert!(matches!(err, PersistError::MutationFn(_)));
        trailing.is_persisted().await.unwrap();
        assert_eq!(trailing.state(), TransactionState::Completed);

        // Once the window closes, the next call flushes on the leading edge.
        advance(100).await;
        let next = paced.mutate("abc".into()).unwrap();
        assert_eq!(next.state(), TransactionState::Persisting);
        next.is_persisted().await.unwrap();

        let calls = h.calls.lock();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].0 - start, ms(0));
        assert!(calls[1].0 - start >= ms(50));
        assert!(calls[2].0 - start >= ms(150));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn queue_runs_one_transaction_per_call_in_order() {
        let tracker: ChangeTracker<u64, Fields> = ChangeTracker::new();
        let messages = Collection::new("messages", tracker.clone());
        let order = Arc::new(Mutex::new(Vec::new()));
        let in_flight = Arc::new(AtomicUsize::new(0));

        let (o, f) = (order.clone(), in_flight.clone());
        let writer = Arc::clone(&messages);
        let paced = PacedMutations::new(PacedMutationsConfig::new(
            on_mutate(move |key: u64| {
                writer.insert(key, fields([("n", Value::Int(1))]))?;
                Ok(())
            }),
            mutation_fn(move |tx: Tx| {
                let (o, f) = (o.clone(), f.clone());
                async move {
                    assert_eq!(f.fetch_add(1, Ordering::SeqCst), 0, "flushes overlapped");
                    tokio::time::sleep(ms(25)).await;
                    o.lock().push(tx.mutations()[0].key);
                    f.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
            Strategy::queue(10),
            tracker,
        ))
        .unwrap();

        let txs: Vec<_> = (1..=3).map(|k| paced.mutate(k).unwrap()).collect();
        assert!(!txs[0].ptr_eq(&txs[1]) && !txs[1].ptr_eq(&txs[2]));
        assert!(paced.active_transaction().is_none());

        let results =
            futures_util::future::join_all(txs.iter().map(Transaction::is_persisted)).await;
        assert!(results.iter().all(Result::is_ok));
        assert_eq!(*order.lock(), vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_does_not_jam_the_coordinator() {
        let tracker: ChangeTracker<u64, Fields> = ChangeTracker::new();
        let messages = Collection::new("messages", tracker.clone());
        let attempts = Arc::new(AtomicUsize::new(0));
        let a = attempts.clone();
        let writer = Arc::clone(&messages);

        let paced = PacedMutations::new(PacedMutationsConfig::new(
            on_mutate(move |key: u64| {
                writer.insert(key, fields([("n", Value::Int(1))]))?;
                Ok(())
            }),
            mutation_fn(move |_tx: Tx| {
                let n = a.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        anyhow::bail!("503 from backend");
                    }
                    Ok(())
                }
            }),
            Strategy::debounce(20),
            tracker,
        ))
        .unwrap();

        let failed = paced.mutate(1).unwrap();
        let err = failed.is_persisted().await.unwrap_err();
        assert!(matches!(err, PersistError::MutationFn(_)));
        assert_eq!(failed.state(), TransactionState::Failed);
        // Optimistic writes stay until the caller decides to roll back.
        assert!(messages.contains_key(&1));

        let next = paced.mutate(2).unwrap();
        assert!(!next.ptr_eq(&failed));
        next.is_persisted().await.unwrap();
        assert_eq!(next.state(), TransactionState::Completed);

        messages.rollback(&failed);
        assert!(!messages.contains_key(&1));
        assert!(messages.contains_key(&2));
    }

    #[tokio::test(start_paused = true)]
    async fn optimistic_failure_creates_no_transaction() {
        let h = Harness::new();
        let messages = Arc::clone(&h.messages);
        let paced = PacedMutations::new(PacedMutationsConfig::new(
            on_mutate(move |body: String| {
                messages.update(&1, |row| {
                    row.insert("body".into(), Value::from(body.clone()));
                })?;
                if body.is_empty() {
                    anyhow::bail!("empty message");
                }
                Ok(())
            }),
            mutation_fn(|_tx: Tx| async { Ok(()) }),
            Strategy::debounce(50),
            h.tracker.clone(),
        ))
        .unwrap();

        paced.mutate("draft".into()).unwrap();
        let active = paced.active_transaction().unwrap();

        let err = paced.mutate(String::new()).unwrap_err();
        assert!(matches!(err, PacedError::OptimisticApply(_)));
        assert_eq!(h.messages.get(&1).unwrap()["body"], Value::from("draft"));
        assert_eq!(active.len(), 1);
        assert_eq!(active.mutations()[0].changes["body"], Value::from("draft"));
    }

    #[tokio::test(start_paused = true)]
    async fn merged_records_keep_first_previous_values() {
        let h = Harness::new();
        let paced = h.coordinator(Strategy::debounce(50));

        let tx = paced.mutate("a".into()).unwrap();
        paced.mutate("ab".into()).unwrap();

        let muts = tx.mutations();
        assert_eq!(muts.len(), 1);
        assert_eq!(muts[0].mutation_type, MutationType::Update);
        assert_eq!(
            muts[0].previous_values,
            Some(fields([("body", Value::from(""))]))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rolled_back_active_transaction_is_replaced() {
        let h = Harness::new();
        let paced = h.coordinator(Strategy::debounce(50));

        let first = paced.mutate("a".into()).unwrap();
        first.rollback().unwrap();
        let second = paced.mutate("ab".into()).unwrap();

        assert!(!first.ptr_eq(&second));
        second.is_persisted().await.unwrap();
        assert_eq!(h.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transactions_carry_metadata_and_clock() {
        let h = Harness::new();
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let paced = PacedMutations::new(
            h.config(Strategy::debounce(10))
                .with_metadata(Value::from("composer"))
                .with_clock(clock),
        )
        .unwrap();

        let tx = paced.mutate("x".into()).unwrap();
        assert_eq!(tx.metadata(), Some(&Value::from("composer")));
        assert_eq!(tx.created_at(), 1_700_000_000_000);
    }

    #[tokio::test]
    async fn invalid_strategy_is_rejected() {
        let h = Harness::new();
        let never = Strategy::debounce(10).trailing(false).leading(false);
        let err = PacedMutations::new(h.config(never)).unwrap_err();
        assert!(matches!(
            err,
            PacedError::Config(ConfigError::InvalidOptions {
                strategy: "debounce",
                ..
            })
        ));
    }

    #[test]
    fn construction_outside_runtime_fails() {
        let h = Harness::new();
        let err = PacedMutations::new(h.config(Strategy::debounce(10))).unwrap_err();
        assert!(matches!(err, PacedError::Config(ConfigError::NoRuntime)));
    }
}
