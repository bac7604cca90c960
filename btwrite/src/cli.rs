//! Command line entry point of btwrite.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use argh::FromArgs;
use btwrite_store::{BigTableStore, InMemoryStore, SharedStore, Store};
use yansi::Paint;

use crate::config::{Config, Overrides};
use crate::{driver, observability};

/// Synthetic write workload against Bigtable counters.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option)]
    config: Option<PathBuf>,

    /// GCP project containing the instance (env: BT_PROJECT)
    #[argh(option, short = 'p')]
    project: Option<String>,

    /// bigtable instance name (env: BT_INSTANCE, default: timeseries)
    #[argh(option, short = 'i')]
    instance: Option<String>,

    /// bigtable table name (env: BT_DATABASE, default: metrics)
    #[argh(option, short = 'd')]
    database: Option<String>,

    /// column family within the table (env: BT_TABLE, default: stats)
    #[argh(option, short = 't')]
    table: Option<String>,

    /// log every job (env: BT_VERBOSE)
    #[argh(switch, short = 'v')]
    verbose: bool,

    #[argh(subcommand)]
    command: Command,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Run(RunCommand),
    Read(ReadCommand),
    Version(VersionCommand),
}

/// run the write workload
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "run")]
struct RunCommand {
    /// maximum writes per second across all workers (env: BT_RPS, default: 1000)
    #[argh(option, short = 'r')]
    rps: Option<u32>,

    /// total number of writes (env: BT_RECORDS, default: 10000)
    #[argh(option, short = 'w')]
    records: Option<usize>,

    /// number of concurrent workers (env: BT_THREADS, default: 30)
    #[argh(option, short = 'z')]
    threads: Option<usize>,

    /// network range to sample row keys from (env: BT_CIDR, default: 10.0.0.0/8)
    #[argh(option, short = 'c')]
    cidr: Option<String>,

    /// slots the rate limiter may catch up on after idling (env: BT_BURST, default: 0)
    #[argh(option)]
    burst: Option<u32>,

    /// seed for key sampling (env: BT_SEED)
    #[argh(option)]
    seed: Option<u64>,

    /// maximum duration of a single write, e.g. `500ms` (env: BT_WRITE_TIMEOUT)
    #[argh(option)]
    write_timeout: Option<String>,

    /// write to `<ip>#<unix-seconds>` row keys (env: BT_TIMESTAMPED_KEYS)
    #[argh(switch)]
    timestamped_keys: bool,

    /// write to an in-memory store instead of Bigtable
    #[argh(switch)]
    dry_run: bool,
}

/// print the counters stored for an address
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "read")]
struct ReadCommand {
    /// the address whose counters to print
    #[argh(positional)]
    key: String,
}

/// print the btwrite version
#[derive(Default, Debug, FromArgs)]
#[argh(subcommand, name = "version")]
struct VersionCommand {}

impl Args {
    fn overrides(&self) -> Overrides {
        let mut overrides = Overrides {
            project: self.project.clone(),
            instance: self.instance.clone(),
            database: self.database.clone(),
            table: self.table.clone(),
            verbose: self.verbose.then_some(true),
            ..Default::default()
        };

        if let Command::Run(run) = &self.command {
            overrides.rps = run.rps;
            overrides.records = run.records;
            overrides.threads = run.threads;
            overrides.cidr = run.cidr.clone();
            overrides.burst = run.burst;
            overrides.seed = run.seed;
            overrides.write_timeout = run.write_timeout.clone();
            overrides.timestamped_keys = run.timestamped_keys.then_some(true);
        }

        overrides
    }
}

/// Bootstrap the runtime and execute the CLI command.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();

    // Special switch to just print the version and exit.
    if let Command::Version(_) = args.command {
        println!("btwrite {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = Config::load(args.config.as_deref(), &args.overrides())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("btwrite-rt")
        .enable_all()
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::init_tracing(config.verbose);
    tracing::debug!(?config);

    let result = runtime.block_on(async move {
        match args.command {
            Command::Run(RunCommand { dry_run, .. }) => run(config, dry_run).await,
            Command::Read(ReadCommand { key }) => read(config, &key).await,
            Command::Version(VersionCommand {}) => unreachable!(),
        }
    });

    if let Err(ref error) = result {
        tracing::error!("{error:#}");
    }
    result
}

async fn run(config: Config, dry_run: bool) -> Result<()> {
    let run_config = config.run_config()?;

    let store: SharedStore = if dry_run {
        Arc::new(InMemoryStore::new())
    } else {
        config.validate_location()?;
        let store = BigTableStore::new(config.bigtable())
            .await
            .context("failed to create Bigtable admin client")?;
        Arc::new(store)
    };

    driver::provision(store.as_ref()).await?;
    let report = driver::run(store, &run_config).await?;
    report.print();

    Ok(())
}

async fn read(config: Config, key: &str) -> Result<()> {
    config.validate_location()?;
    let store = BigTableStore::new(config.bigtable())
        .await
        .context("failed to create Bigtable admin client")?;

    let rows = store
        .read_counters(key)
        .await
        .with_context(|| format!("failed to read counters for `{key}`"))?;

    if rows.is_empty() {
        println!("no counters for {}", key.bold());
        return Ok(());
    }

    let mut total = 0;
    for row in &rows {
        match row.timestamp {
            Some(timestamp) => println!("{}  @{timestamp}  {}", row.row_key, row.value.bold()),
            None => println!("{}  {}", row.row_key, row.value.bold()),
        }
        total += row.value;
    }
    println!("{} {}", "total:".bold(), total.bold());

    Ok(())
}
