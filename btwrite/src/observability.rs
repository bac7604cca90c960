//! Logging setup for the btwrite binary.

use std::env;

use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, prelude::*};

/// Installs the global tracing subscriber, logging to stderr.
///
/// `verbose` raises the default level from `INFO` to `DEBUG`, which logs every job. An explicit
/// `RUST_LOG` takes precedence.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { Level::DEBUG } else { Level::INFO };
    let (level, env_filter) = parse_rust_log(default_level);
    let format = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    tracing_subscriber::registry()
        .with(format.with_filter(LevelFilter::from(level)))
        .with(env_filter)
        .init();
}

/// Resolves the log level and the per-crate filter from `RUST_LOG`.
pub fn parse_rust_log(default_level: Level) -> (Level, EnvFilter) {
    // Try to parse RUST_LOG as a simple level filter and apply default levels internally.
    // Otherwise, use it literally if the user knows which overrides they want to run.
    let level = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(value) => match value.parse::<Level>() {
            Ok(level) => level,
            Err(_) => return (Level::TRACE, EnvFilter::new(value)),
        },
        Err(_) => default_level,
    };

    // This is the maximum verbosity that will be logged, we filter this down to `level`.
    let env_filter = EnvFilter::new(
        "INFO,\
        h2=WARN,\
        tower=WARN,\
        btwrite=TRACE,\
        btwrite_store=TRACE,\
        ",
    );

    (level, env_filter)
}
