//! A fault-injecting store for workload tests.
//!
//! ```
//! use std::time::Duration;
//! use btwrite_test::store::TestStore;
//!
//! // Every write takes 5ms, and the third write fails.
//! let store = TestStore::new()
//!     .with_latency(Duration::from_millis(5))
//!     .fail_on_write(3);
//! ```

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use btwrite_store::{
    BoxedConnection, Connection, CounterRow, InMemoryStore, Provisioned, Store, StoreError,
    StoreResult,
};

/// A [`Store`] wrapping an [`InMemoryStore`] with configurable latency and failures.
///
/// The store is [`Clone`], all clones share counters and the write attempt counter.
#[derive(Clone, Debug, Default)]
pub struct TestStore {
    inner: InMemoryStore,
    latency: Duration,
    fail_on_write: Option<u64>,
    fail_connect: bool,
    attempts: Arc<AtomicU64>,
}

impl TestStore {
    /// Creates an unprovisioned store without latency or failures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every write by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fails the `n`-th write attempt across all connections, counting from 1.
    pub fn fail_on_write(mut self, n: u64) -> Self {
        self.fail_on_write = Some(n);
        self
    }

    /// Fails every call to [`Store::connect`].
    pub fn fail_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    /// The underlying in-memory store holding all successful writes.
    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    /// Returns the number of write attempts, including failed ones.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }
}

fn injected(context: &str) -> StoreError {
    StoreError::generic(context, io::Error::other("injected failure"))
}

#[async_trait::async_trait]
impl Store for TestStore {
    fn name(&self) -> &'static str {
        "test"
    }

    async fn ensure_table(&self) -> StoreResult<Provisioned> {
        self.inner.ensure_table().await
    }

    async fn connect(&self) -> StoreResult<BoxedConnection> {
        if self.fail_connect {
            return Err(injected("failed to connect"));
        }

        Ok(Box::new(TestConnection {
            inner: self.inner.connect().await?,
            latency: self.latency,
            fail_on_write: self.fail_on_write,
            attempts: Arc::clone(&self.attempts),
        }))
    }

    async fn read_counters(&self, key: &str) -> StoreResult<Vec<CounterRow>> {
        self.inner.read_counters(key).await
    }
}

#[derive(Debug)]
struct TestConnection {
    inner: BoxedConnection,
    latency: Duration,
    fail_on_write: Option<u64>,
    attempts: Arc<AtomicU64>,
}

#[async_trait::async_trait]
impl Connection for TestConnection {
    async fn increment(&mut self, row_key: &str, amount: i64) -> StoreResult<i64> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_write == Some(attempt) {
            return Err(injected(&format!("failed to increment `{row_key}`")));
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.inner.increment(row_key, amount).await
    }
}
