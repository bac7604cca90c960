//! Runs a rate-limited write workload against Bigtable counters.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

fn main() -> anyhow::Result<()> {
    btwrite::cli::execute()
}
