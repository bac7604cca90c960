mod bigtable;
mod common;
mod in_memory;

pub use bigtable::{BigTableConfig, BigTableStore};
pub use common::*;
pub use in_memory::InMemoryStore;
