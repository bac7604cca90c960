//! A synthetic write workload generator for Bigtable counters.
//!
//! A run samples row keys uniformly from the host addresses of a CIDR range, buffers the whole
//! workload in a [`JobQueue`], and lets a pool of workers drain it. Every write atomically
//! increments the counter stored under its row key. All workers share one [`RateLimiter`],
//! which caps the aggregate write rate.
//!
//! The run is fail-fast: the first failed write cancels the remaining workers and is returned
//! as an [`Error`]. A successful run yields a [`Report`] with exactly one latency sample per
//! requested write.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod cli;
pub mod collector;
pub mod config;
pub mod driver;
pub mod error;
pub mod keyspace;
pub mod observability;
pub mod ratelimit;
pub mod report;
mod worker;
pub mod workload;

pub use crate::config::RunConfig;
pub use crate::driver::{provision, run};
pub use crate::error::{Error, Result};
pub use crate::keyspace::KeySpace;
pub use crate::ratelimit::RateLimiter;
pub use crate::report::Report;
pub use crate::workload::{JobQueue, WorkloadGenerator, WriteRequest};
