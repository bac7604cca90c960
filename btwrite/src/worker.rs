//! Workers draining the job queue into the store.

use std::sync::Arc;
use std::time::Duration;

use btwrite_store::{BoxedConnection, SharedStore, StoreResult};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::ratelimit::RateLimiter;
use crate::workload::{JobQueue, WriteRequest};

/// Everything a worker shares with its peers.
#[derive(Clone, Debug)]
pub(crate) struct WorkerContext {
    pub store: SharedStore,
    pub queue: Arc<JobQueue>,
    pub limiter: Arc<RateLimiter>,
    pub results: mpsc::Sender<Duration>,
    pub cancel: CancellationToken,
    pub write_timeout: Option<Duration>,
    pub timestamped_keys: bool,
}

/// What a worker did before it terminated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct WorkerSummary {
    pub id: usize,
    pub writes: u64,
}

/// A single execution unit with its own store connection.
#[derive(Debug)]
pub(crate) struct Worker {
    id: usize,
    context: WorkerContext,
}

impl Worker {
    pub fn new(id: usize, context: WorkerContext) -> Self {
        Self { id, context }
    }

    /// Drains the queue until it is empty or the run is cancelled.
    ///
    /// The first failed write cancels the run for all workers and is returned as error.
    pub async fn run(self) -> Result<WorkerSummary> {
        let Self { id, context } = self;
        let mut summary = WorkerSummary { id, writes: 0 };

        tracing::debug!(worker = id, "starting write worker");
        let connection = tokio::select! {
            biased;
            _ = context.cancel.cancelled() => return Ok(summary),
            connection = context.store.connect() => connection,
        };
        let mut connection = match connection {
            Ok(connection) => connection,
            Err(cause) => {
                context.cancel.cancel();
                return Err(Error::Connect { worker: id, cause });
            }
        };

        while let Some(request) = next_job(&context).await {
            let row_key = request.row_key(context.timestamped_keys);

            let start = Instant::now();
            let outcome = tokio::select! {
                biased;
                _ = context.cancel.cancelled() => break,
                outcome = write(&mut connection, &row_key, context.write_timeout) => outcome,
            };
            let elapsed = start.elapsed();

            if let Err(error) = outcome {
                context.cancel.cancel();
                tracing::debug!(worker = id, job = %request, "write failed");
                return Err(error);
            }

            tracing::debug!(worker = id, job = %request, ?elapsed, "job complete");
            summary.writes += 1;
            if context.results.send(elapsed).await.is_err() {
                // The collector is gone, nobody is waiting for more samples.
                break;
            }
        }

        tracing::debug!(worker = id, writes = summary.writes, "write worker finished");
        Ok(summary)
    }
}

/// Takes the next job and waits for the rate limiter to admit it.
async fn next_job(context: &WorkerContext) -> Option<WriteRequest> {
    let admit = async {
        let request = context.queue.pop().await?;
        context.limiter.acquire().await;
        Some(request)
    };

    tokio::select! {
        biased;
        _ = context.cancel.cancelled() => None,
        request = admit => request,
    }
}

async fn write(
    connection: &mut BoxedConnection,
    row_key: &str,
    timeout: Option<Duration>,
) -> Result<i64> {
    let increment = connection.increment(row_key, 1);
    let outcome: StoreResult<i64> = match timeout {
        Some(timeout) => match tokio::time::timeout(timeout, increment).await {
            Ok(outcome) => outcome,
            Err(_) => {
                return Err(Error::WriteTimeout {
                    row_key: row_key.to_owned(),
                    timeout,
                });
            }
        },
        None => increment.await,
    };

    outcome.map_err(|cause| Error::Write {
        row_key: row_key.to_owned(),
        cause,
    })
}
