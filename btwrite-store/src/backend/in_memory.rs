//! In-memory store for tests and dry runs.
//!
//! This provides a [`Store`] backed by a `BTreeMap`, removing the need for a Bigtable instance
//! or emulator. The store is [`Clone`] so tests can hold a handle for direct inspection while
//! the workload owns a shared copy.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::common::{BoxedConnection, Connection, CounterRow, Provisioned, Store, is_counter_row};
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Default)]
struct State {
    provisioned: bool,
    counters: BTreeMap<String, i64>,
    writes: u64,
    connections: usize,
}

/// A [`Store`] keeping all counters in memory.
#[derive(Clone, Debug, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    /// Creates an empty, unprovisioned store.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    /// Returns the counter stored at the exact row key, if present.
    pub fn counter(&self, row_key: &str) -> Option<i64> {
        self.state().counters.get(row_key).copied()
    }

    /// Returns a snapshot of all counters.
    pub fn counters(&self) -> BTreeMap<String, i64> {
        self.state().counters.clone()
    }

    /// Returns the number of successful increments across all connections.
    pub fn total_writes(&self) -> u64 {
        self.state().writes
    }

    /// Returns the number of connections opened so far.
    pub fn connections(&self) -> usize {
        self.state().connections
    }

    /// Returns `true` once [`Store::ensure_table`] has been called.
    pub fn is_provisioned(&self) -> bool {
        self.state().provisioned
    }
}

#[async_trait::async_trait]
impl Store for InMemoryStore {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn ensure_table(&self) -> StoreResult<Provisioned> {
        let mut state = self.state();
        if state.provisioned {
            return Ok(Provisioned::Existing);
        }
        state.provisioned = true;
        Ok(Provisioned::Created)
    }

    async fn connect(&self) -> StoreResult<BoxedConnection> {
        self.state().connections += 1;
        Ok(Box::new(InMemoryConnection {
            state: Arc::clone(&self.state),
        }))
    }

    async fn read_counters(&self, key: &str) -> StoreResult<Vec<CounterRow>> {
        let state = self.state();
        let rows = state
            .counters
            .range(key.to_owned()..)
            .take_while(|(row_key, _)| row_key.starts_with(key))
            .filter(|(row_key, _)| is_counter_row(key, row_key))
            .map(|(row_key, value)| CounterRow::new(row_key.as_str(), *value))
            .collect();
        Ok(rows)
    }
}

#[derive(Debug)]
struct InMemoryConnection {
    state: Arc<Mutex<State>>,
}

#[async_trait::async_trait]
impl Connection for InMemoryConnection {
    async fn increment(&mut self, row_key: &str, amount: i64) -> StoreResult<i64> {
        let mut state = lock(&self.state);
        if !state.provisioned {
            return Err(StoreError::TableNotFound("in-memory".to_owned()));
        }

        let counter = state.counters.entry(row_key.to_owned()).or_default();
        *counter += amount;
        let value = *counter;
        state.writes += 1;
        Ok(value)
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    // The state stays consistent across panics, every update is a single assignment.
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
