use thiserror::Error;

/// Errors raised by a [`Store`](crate::Store) or one of its connections.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Errors from the Bigtable data API, such as failed connections or rejected mutations.
    #[error("bigtable error: {context}")]
    BigTable {
        context: String,
        #[source]
        cause: bigtable_rs::bigtable::Error,
    },

    /// A counter cell did not hold a 64-bit big-endian integer.
    #[error("malformed counter in row `{row_key}`: expected 8 bytes, got {len}")]
    MalformedCounter { row_key: String, len: usize },

    /// The table does not exist in the store. Run provisioning first.
    #[error("table `{0}` does not exist")]
    TableNotFound(String),

    /// Any other error stemming from a store, which might be specific to that store or to a
    /// certain operation. Admin API failures end up here.
    #[error("storage backend error: {context}")]
    Generic {
        context: String,
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl StoreError {
    /// Wraps an arbitrary error with a description of the operation that failed.
    pub fn generic(
        context: impl Into<String>,
        cause: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Generic {
            context: context.into(),
            cause: cause.into(),
        }
    }

    pub(crate) fn bigtable(context: impl Into<String>, cause: bigtable_rs::bigtable::Error) -> Self {
        Self::BigTable {
            context: context.into(),
            cause,
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
