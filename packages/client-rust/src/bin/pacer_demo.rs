//! Simulated chat composer: streams keystroke edits of one message through a
//! paced coordinator and a fake backend, logging every flush.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures_util::future::join_all;
use pacer_client::collection::Collection;
use pacer_client::logging::{init_tracing, LogFormat};
use pacer_client::{
    mutation_fn, on_mutate, ChangeTracker, ClientConfig, PacedMutations, PacedMutationsConfig,
    Transaction,
};
use pacer_core::{fields, Fields, MutationBatch, Strategy, Value};
use tracing::{info, warn};

const MESSAGE: &str = "on my way, running about ten minutes late, save me a seat";

#[derive(Parser, Debug)]
#[command(name = "pacer-demo")]
#[command(about = "Drive paced message edits against a simulated backend", long_about = None)]
struct Args {
    /// Strategy as JSON, e.g. {"type":"throttle","options":{"wait":100}}
    #[arg(
        long,
        env = "PACER_STRATEGY",
        default_value = r#"{"type":"debounce","options":{"wait":50}}"#
    )]
    strategy: String,

    /// Number of edits to send
    #[arg(long, env = "PACER_EDITS", default_value_t = 30)]
    edits: usize,

    /// Delay between edits in milliseconds
    #[arg(long, env = "PACER_INTERVAL_MS", default_value_t = 15)]
    interval_ms: u64,

    /// Simulated backend latency in milliseconds
    #[arg(long, env = "PACER_LATENCY_MS", default_value_t = 40)]
    latency_ms: u64,

    /// Reject every Nth backend call (0 never rejects)
    #[arg(long, env = "PACER_FAIL_EVERY", default_value_t = 0)]
    fail_every: u32,

    /// Log output format (pretty, json)
    #[arg(long, env = "PACER_LOG_FORMAT", default_value = "pretty")]
    log_format: LogFormat,
}

struct Backend {
    calls: AtomicU32,
    latency: Duration,
    fail_every: u32,
}

impl Backend {
    async fn save(&self, tx: &Transaction<u64, Fields>) -> anyhow::Result<()> {
        let batch = MutationBatch {
            transaction_id: tx.id(),
            metadata: tx.metadata().cloned(),
            mutations: tx.mutations(),
        };
        let frame = batch.to_msgpack()?;
        tokio::time::sleep(self.latency).await;

        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_every > 0 && n % self.fail_every == 0 {
            anyhow::bail!("backend rejected batch {n}");
        }
        info!(transaction_id = %tx.id(), bytes = frame.len(), "backend accepted batch");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing("info,pacer_client=debug", args.log_format);
    pacer_client::metrics::describe();

    let strategy = Strategy::from_json(&args.strategy)?;
    info!(strategy = strategy.name(), wait_ms = ?strategy.wait(), edits = args.edits, "starting");

    let tracker = ChangeTracker::new();
    let messages = Collection::new("messages", tracker.clone());
    messages.apply_synced(
        1,
        Some(fields([("author", Value::from("sam")), ("body", Value::from(""))])),
    );

    let backend = Arc::new(Backend {
        calls: AtomicU32::new(0),
        latency: Duration::from_millis(args.latency_ms),
        fail_every: args.fail_every,
    });

    let writer = Arc::clone(&messages);
    let config = PacedMutationsConfig::new(
        on_mutate(move |body: String| {
            writer.update(&1, |row| {
                row.insert("body".into(), Value::from(body));
            })?;
            Ok(())
        }),
        mutation_fn(move |tx: Transaction<u64, Fields>| {
            let backend = Arc::clone(&backend);
            async move { backend.save(&tx).await }
        }),
        strategy,
        tracker,
    )
    .with_metadata(Value::from("composer"))
    .with_client_config(ClientConfig {
        client_id: "pacer-demo".to_string(),
        ..ClientConfig::default()
    });
    let paced = PacedMutations::new(config)?;

    let mut transactions: Vec<Transaction<u64, Fields>> = Vec::new();
    let chars: Vec<char> = MESSAGE.chars().collect();
    for i in 1..=args.edits {
        let body: String = chars[..i.min(chars.len())].iter().collect();
        let tx = paced.mutate(body)?;
        if !transactions.iter().any(|t| t.ptr_eq(&tx)) {
            transactions.push(tx);
        }
        tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
    }

    // Without a trailing edge the last batch only flushes on a further edit.
    let mut unflushed = 0usize;
    if !strategy.flushes_when_idle() {
        if let Some(open) = paced.active_transaction() {
            unflushed = open.len();
            warn!(
                transaction_id = %open.id(),
                mutations = unflushed,
                "strategy has no trailing edge, rolling back unflushed edits"
            );
            open.rollback()?;
            messages.rollback(&open);
            transactions.retain(|t| !t.ptr_eq(&open));
        }
    }

    let outcomes = join_all(transactions.iter().map(Transaction::is_persisted)).await;
    let mut failed = 0usize;
    for (tx, outcome) in transactions.iter().zip(outcomes) {
        match outcome {
            Ok(()) => info!(transaction_id = %tx.id(), mutations = tx.len(), "persisted"),
            Err(error) => {
                failed += 1;
                warn!(transaction_id = %tx.id(), %error, "not persisted");
            }
        }
    }

    let body = messages
        .get(&1)
        .and_then(|row| row.get("body").cloned())
        .unwrap_or(Value::Null);
    info!(
        edits = args.edits,
        transactions = transactions.len(),
        failed,
        unflushed,
        body = ?body,
        "done"
    );
    Ok(())
}
