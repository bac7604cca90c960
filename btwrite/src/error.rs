//! Error types for workload runs.

use std::time::Duration;

use btwrite_store::StoreError;
use thiserror::Error;

/// Errors that abort a workload run.
///
/// Every variant is fatal. Configuration, range and provisioning errors surface before any
/// write is issued, the remaining variants abort a run that is already in progress.
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration could not be loaded from its sources.
    #[error("failed to load configuration")]
    LoadConfig(#[from] Box<figment::Error>),

    /// A configuration value is missing or out of range.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The network range is malformed or has no usable addresses.
    #[error("invalid network range `{range}`: {reason}")]
    InvalidRange { range: String, reason: &'static str },

    /// The table, column family or GC policy could not be set up.
    #[error("failed to provision {store} table")]
    Provisioning {
        store: &'static str,
        #[source]
        cause: StoreError,
    },

    /// A worker could not open its connection to the store.
    #[error("worker {worker} failed to connect")]
    Connect {
        worker: usize,
        #[source]
        cause: StoreError,
    },

    /// A single write failed.
    #[error("write to `{row_key}` failed")]
    Write {
        row_key: String,
        #[source]
        cause: StoreError,
    },

    /// A single write did not complete in time.
    #[error("write to `{row_key}` timed out after {timeout:?}")]
    WriteTimeout { row_key: String, timeout: Duration },

    /// The job queue rejected a request although it was sized for the whole workload.
    #[error("job queue is full at capacity {capacity}")]
    QueueFull { capacity: usize },

    /// All workers terminated before the expected number of samples was collected.
    #[error("workers stalled after {received} of {expected} samples")]
    Stalled { expected: u64, received: u64 },

    /// A worker task panicked or was aborted.
    #[error("worker task failed")]
    Worker(#[from] tokio::task::JoinError),
}

/// Result type for workload runs.
pub type Result<T, E = Error> = std::result::Result<T, E>;
