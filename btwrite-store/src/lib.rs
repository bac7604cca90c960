//! The store layer provides counter storage in a wide-column database.
//!
//! It is designed as a library crate to be used by the `btwrite` workload generator. A
//! [`Store`] covers table provisioning and reads, while writes go through a [`Connection`] that
//! each writer opens and owns for itself.
//!
//! Two stores are available:
//!
//! - [`BigTableStore`] talks to Google Cloud Bigtable, or to the emulator if
//!   `BIGTABLE_EMULATOR_HOST` is set.
//! - [`InMemoryStore`] keeps counters in memory for tests and dry runs.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

mod backend;
mod error;

pub use backend::*;
pub use error::{StoreError, StoreResult};
