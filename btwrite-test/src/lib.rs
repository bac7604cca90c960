//! Test utilities for btwrite and its store layer.
//!
//! This crate provides utilities to facilitate testing of workload runs without a Bigtable
//! instance. See the modules for all available utilities.

pub mod store;
pub mod tracing;
