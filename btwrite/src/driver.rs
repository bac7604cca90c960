//! Orchestration of a complete workload run.
//!
//! A run generates the whole workload into a [`JobQueue`], starts a pool of [`Worker`]s that
//! share one [`RateLimiter`], and collects one latency sample per completed write. The run
//! succeeds only if exactly one sample per requested record arrives. The first failing worker
//! cancels all others and its error is returned.

use std::sync::Arc;
use std::time::Duration;

use btwrite_store::{Provisioned, SharedStore, Store};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::collector::ResultCollector;
use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::ratelimit::RateLimiter;
use crate::report::Report;
use crate::worker::{Worker, WorkerContext, WorkerSummary};
use crate::workload::WorkloadGenerator;

/// Ensures the counter table and column family exist before any write is issued.
pub async fn provision(store: &dyn Store) -> Result<Provisioned> {
    let provisioned = store
        .ensure_table()
        .await
        .map_err(|cause| Error::Provisioning {
            store: store.name(),
            cause,
        })?;

    match provisioned {
        Provisioned::Created => tracing::info!(store = store.name(), "created counter table"),
        Provisioned::Existing => tracing::debug!(store = store.name(), "counter table exists"),
    }
    Ok(provisioned)
}

/// Runs the configured workload against `store` and returns its [`Report`].
///
/// The store must already be provisioned, see [`provision`].
pub async fn run(store: SharedStore, config: &RunConfig) -> Result<Report> {
    let start = Instant::now();

    let queue = WorkloadGenerator::new(config.keyspace, config.seed).fill(config.records)?;
    tracing::debug!(records = config.records, keyspace = %config.keyspace, "generated workload");

    let limiter = RateLimiter::with_burst(config.rps, config.burst);
    let cancel = CancellationToken::new();
    let (results_tx, results) = mpsc::channel(config.records.max(1));

    let context = WorkerContext {
        store,
        queue: Arc::new(queue),
        limiter: Arc::new(limiter),
        results: results_tx,
        cancel: cancel.clone(),
        write_timeout: config.write_timeout,
        timestamped_keys: config.timestamped_keys,
    };

    let mut workers = JoinSet::new();
    for id in 1..=config.workers.get() {
        workers.spawn(Worker::new(id, context.clone()).run());
    }
    // Only workers hold senders now, so the channel closes once all of them are gone.
    drop(context);

    tracing::info!(
        records = config.records,
        workers = config.workers.get(),
        rps = config.rps.get(),
        "starting writes"
    );

    let collector = ResultCollector::new(config.records as u64);
    let report = collect(workers, results, &cancel, collector, start).await?;
    tracing::info!(
        samples = report.samples(),
        elapsed = ?report.elapsed(),
        "all writes complete"
    );
    Ok(report)
}

/// Records samples until every worker has dropped its sender, then checks the exact count.
///
/// The first failing worker cancels `cancel` and its error is returned without waiting for the
/// remaining workers, which are aborted when `workers` is dropped.
async fn collect(
    mut workers: JoinSet<Result<WorkerSummary>>,
    mut results: mpsc::Receiver<Duration>,
    cancel: &CancellationToken,
    mut collector: ResultCollector,
    start: Instant,
) -> Result<Report> {
    let mut summaries = Vec::with_capacity(workers.len());
    loop {
        tokio::select! {
            sample = results.recv() => match sample {
                Some(sample) => collector.record(sample),
                None => break,
            },
            Some(joined) = workers.join_next() => {
                if let Err(error) = collect_worker(joined, &mut summaries) {
                    cancel.cancel();
                    return Err(error);
                }
            }
        }
    }

    let elapsed = start.elapsed();
    while let Some(joined) = workers.join_next().await {
        if let Err(error) = collect_worker(joined, &mut summaries) {
            cancel.cancel();
            return Err(error);
        }
    }

    for summary in &summaries {
        tracing::debug!(worker = summary.id, writes = summary.writes, "worker summary");
    }

    collector.finish(elapsed)
}

fn collect_worker(
    joined: Result<Result<WorkerSummary>, tokio::task::JoinError>,
    summaries: &mut Vec<WorkerSummary>,
) -> Result<()> {
    summaries.push(joined??);
    Ok(())
}
