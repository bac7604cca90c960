use std::fmt::Debug;
use std::sync::Arc;

use crate::error::{StoreError, StoreResult};

/// Column qualifier holding the counter within the configured column family.
pub const COUNTER_COLUMN: &str = "ips";

/// Separator between the address and the timestamp in timestamped row keys.
pub const ROW_KEY_SEPARATOR: char = '#';

/// A shared, type-erased [`Store`] instance.
pub type SharedStore = Arc<dyn Store>;

/// A type-erased [`Connection`] instance, exclusively owned by one writer.
pub type BoxedConnection = Box<dyn Connection>;

/// A wide-column store holding one counter per row.
///
/// The store itself only covers administrative and read access. Writes go through a
/// [`Connection`], which every writer opens for itself via [`connect`](Self::connect).
#[async_trait::async_trait]
pub trait Store: Debug + Send + Sync + 'static {
    /// The store name, used for diagnostics.
    fn name(&self) -> &'static str;

    /// Makes sure the table and its column family exist.
    ///
    /// A missing table is created together with its column family and a garbage collection
    /// policy. An existing table is left untouched.
    async fn ensure_table(&self) -> StoreResult<Provisioned>;

    /// Opens a new connection for writing counters.
    async fn connect(&self) -> StoreResult<BoxedConnection>;

    /// Reads all counters stored for `key`, both the plain row and its timestamped rows.
    async fn read_counters(&self, key: &str) -> StoreResult<Vec<CounterRow>>;
}

/// A single writer's connection to a [`Store`].
#[async_trait::async_trait]
pub trait Connection: Debug + Send + 'static {
    /// Atomically increments the counter in `row_key` by `amount` and returns the new value.
    async fn increment(&mut self, row_key: &str, amount: i64) -> StoreResult<i64>;
}

/// Outcome of [`Store::ensure_table`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provisioned {
    /// The table already existed and was not modified.
    Existing,
    /// The table, its column family and GC policy were created.
    Created,
}

/// A counter read back from the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CounterRow {
    /// The full row key.
    pub row_key: String,
    /// The unix timestamp encoded in the row key, if any.
    pub timestamp: Option<i64>,
    /// The current counter value.
    pub value: i64,
}

impl CounterRow {
    /// Creates a counter row, parsing the timestamp suffix of the row key.
    pub fn new(row_key: impl Into<String>, value: i64) -> Self {
        let row_key = row_key.into();
        let timestamp = row_key
            .split_once(ROW_KEY_SEPARATOR)
            .and_then(|(_, suffix)| suffix.parse().ok());

        Self {
            row_key,
            timestamp,
            value,
        }
    }
}

/// Returns `true` if `row_key` stores a counter for `key`.
///
/// This matches the plain key as well as timestamped keys of the form `<key>#<timestamp>`.
pub fn is_counter_row(key: &str, row_key: &str) -> bool {
    match row_key.strip_prefix(key) {
        Some("") => true,
        Some(rest) => rest.starts_with(ROW_KEY_SEPARATOR),
        None => false,
    }
}

/// Decodes a counter cell, which stores a 64-bit big-endian integer.
pub fn decode_counter(row_key: &str, value: &[u8]) -> StoreResult<i64> {
    let bytes = <[u8; 8]>::try_from(value).map_err(|_| StoreError::MalformedCounter {
        row_key: row_key.to_owned(),
        len: value.len(),
    })?;
    Ok(i64::from_be_bytes(bytes))
}
