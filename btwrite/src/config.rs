//! Configuration for btwrite.
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Command line flags
//! 2. Environment variables (prefixed with `BT_`)
//! 3. YAML configuration file (specified via the `--config` flag)
//! 4. Defaults
//!
//! # Environment Variables
//!
//! Every field of [`Config`] can be set through an environment variable of the same name in
//! upper case, prefixed with `BT_`. For example:
//!
//! - `BT_PROJECT=my-project` sets the GCP project
//! - `BT_RPS=500` caps the write rate at 500 writes per second
//! - `BT_WRITE_TIMEOUT=2s` fails the run if a single write takes longer than two seconds
//!
//! # YAML Configuration File
//!
//! The above configuration in YAML format would look like this:
//!
//! ```yaml
//! project: my-project
//! rps: 500
//! write_timeout: 2s
//! ```

use std::num::{NonZeroU32, NonZeroUsize};
use std::path::Path;
use std::time::Duration;

use btwrite_store::BigTableConfig;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::keyspace::KeySpace;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "BT_";

/// Complete configuration of a btwrite invocation.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// GCP project containing the Bigtable instance.
    ///
    /// Required unless running against the in-memory store.
    pub project: String,

    /// Bigtable instance to write to.
    ///
    /// # Default
    ///
    /// `"timeseries"`
    pub instance: String,

    /// Name of the Bigtable table holding the counters.
    ///
    /// # Default
    ///
    /// `"metrics"`
    pub database: String,

    /// Column family holding the counters within the table.
    ///
    /// # Default
    ///
    /// `"stats"`
    pub table: String,

    /// Maximum number of writes per second across all workers.
    ///
    /// # Default
    ///
    /// `1000`
    pub rps: u32,

    /// Number of slots the rate limiter may catch up on after being idle.
    ///
    /// # Default
    ///
    /// `0`
    pub burst: u32,

    /// Total number of writes to perform.
    ///
    /// # Default
    ///
    /// `10000`
    pub records: usize,

    /// Number of concurrent workers, each with its own connection.
    ///
    /// # Default
    ///
    /// `30`
    pub threads: usize,

    /// Network range in CIDR notation whose host addresses are used as row keys.
    ///
    /// # Default
    ///
    /// `"10.0.0.0/8"`
    pub cidr: String,

    /// Seed for key sampling. A random seed is used if unset.
    pub seed: Option<u64>,

    /// Maximum duration of a single write. Unlimited if unset.
    #[serde(with = "humantime_serde")]
    pub write_timeout: Option<Duration>,

    /// Writes to `<address>#<unix-seconds>` row keys instead of plain addresses.
    pub timestamped_keys: bool,

    /// Logs every job and the setup steps of the run.
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: String::new(),
            instance: "timeseries".to_owned(),
            database: "metrics".to_owned(),
            table: "stats".to_owned(),
            rps: 1000,
            burst: 0,
            records: 10_000,
            threads: 30,
            cidr: "10.0.0.0/8".to_owned(),
            seed: None,
            write_timeout: None,
            timestamped_keys: false,
            verbose: false,
        }
    }
}

/// Values given on the command line, overriding all other sources.
///
/// Fields left at `None` do not override anything.
#[derive(Debug, Default, Serialize)]
pub struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub burst: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// A humantime duration such as `500ms`, parsed along with the other sources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamped_keys: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verbose: Option<bool>,
}

/// The validated parameters of a single workload run.
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// Maximum number of writes per second across all workers.
    pub rps: NonZeroU32,
    /// Burst allowance of the rate limiter.
    pub burst: u32,
    /// Total number of writes.
    pub records: usize,
    /// Number of concurrent workers.
    pub workers: NonZeroUsize,
    /// Addresses to sample row keys from.
    pub keyspace: KeySpace,
    /// Seed for key sampling.
    pub seed: Option<u64>,
    /// Maximum duration of a single write.
    pub write_timeout: Option<Duration>,
    /// Whether row keys carry the request timestamp.
    pub timestamped_keys: bool,
}

impl Config {
    /// Loads configuration from defaults, an optional YAML file, the environment and the
    /// command line, in increasing order of precedence.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The YAML configuration file cannot be read or parsed
    /// - Environment variables or flags contain invalid values
    pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file_exact(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(Serialized::defaults(overrides))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }

    /// Checks that a Bigtable location is configured.
    ///
    /// The store itself is only contacted later, this only rejects empty names.
    pub fn validate_location(&self) -> Result<()> {
        let required = [
            ("project", &self.project),
            ("instance", &self.instance),
            ("database", &self.database),
            ("table", &self.table),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                let env = name.to_uppercase();
                return Err(Error::Config(format!(
                    "`{name}` must be set (--{name} or {ENV_PREFIX}{env})"
                )));
            }
        }
        Ok(())
    }

    /// Validates the workload parameters and returns them as a [`RunConfig`].
    pub fn run_config(&self) -> Result<RunConfig> {
        let rps = NonZeroU32::new(self.rps)
            .ok_or_else(|| Error::Config("`rps` must be greater than 0".to_owned()))?;
        let workers = NonZeroUsize::new(self.threads)
            .ok_or_else(|| Error::Config("`threads` must be at least 1".to_owned()))?;
        let keyspace = KeySpace::parse(&self.cidr)?;

        Ok(RunConfig {
            rps,
            burst: self.burst,
            records: self.records,
            workers,
            keyspace,
            seed: self.seed,
            write_timeout: self.write_timeout,
            timestamped_keys: self.timestamped_keys,
        })
    }

    /// The location of the counter table in Bigtable.
    ///
    /// `database` names the table and `table` names the column family within it.
    pub fn bigtable(&self) -> BigTableConfig {
        BigTableConfig {
            project_id: self.project.clone(),
            instance_name: self.instance.clone(),
            table_name: self.database.clone(),
            column_family: self.table.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = Config::load(None, &Overrides::default()).unwrap();
            assert_eq!(config.project, "");
            assert_eq!(config.instance, "timeseries");
            assert_eq!(config.database, "metrics");
            assert_eq!(config.table, "stats");
            assert_eq!(config.rps, 1000);
            assert_eq!(config.records, 10_000);
            assert_eq!(config.threads, 30);
            assert_eq!(config.cidr, "10.0.0.0/8");
            assert!(!config.verbose);
            assert_eq!(config.write_timeout, None);

            let run = config.run_config().unwrap();
            assert_eq!(run.keyspace.len(), (1 << 24) - 2);
            Ok(())
        });
    }

    #[test]
    fn configurable_via_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("BT_PROJECT", "my-project");
            jail.set_env("BT_DATABASE", "counters");
            jail.set_env("BT_RPS", "250");
            jail.set_env("BT_THREADS", "4");
            jail.set_env("BT_VERBOSE", "true");
            jail.set_env("BT_CIDR", "192.168.0.0/16");
            jail.set_env("BT_WRITE_TIMEOUT", "1s 500ms");

            let config = Config::load(None, &Overrides::default()).unwrap();
            assert_eq!(config.project, "my-project");
            assert_eq!(config.database, "counters");
            assert_eq!(config.rps, 250);
            assert_eq!(config.threads, 4);
            assert!(config.verbose);
            assert_eq!(config.cidr, "192.168.0.0/16");
            assert_eq!(config.write_timeout, Some(Duration::from_millis(1500)));

            let location = config.bigtable();
            assert_eq!(location.table_name, "counters");
            assert_eq!(location.column_family, "stats");
            Ok(())
        });
    }

    #[test]
    fn configurable_via_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            project: yaml-project
            records: 42
            seed: 7
            timestamped_keys: true
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|_jail| {
            let config = Config::load(Some(tempfile.path()), &Overrides::default()).unwrap();
            assert_eq!(config.project, "yaml-project");
            assert_eq!(config.records, 42);
            assert_eq!(config.seed, Some(7));
            assert!(config.timestamped_keys);
            Ok(())
        });
    }

    #[test]
    fn flags_override_env_and_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile.write_all(b"rps: 10\nthreads: 2\n").unwrap();

        figment::Jail::expect_with(|jail| {
            jail.set_env("BT_RPS", "20");
            jail.set_env("BT_PROJECT", "env-project");

            let overrides = Overrides {
                rps: Some(30),
                write_timeout: Some("250ms".to_owned()),
                ..Default::default()
            };
            let config = Config::load(Some(tempfile.path()), &overrides).unwrap();

            // Flags win over env, env wins over yaml.
            assert_eq!(config.rps, 30);
            assert_eq!(config.threads, 2);
            assert_eq!(config.project, "env-project");
            assert_eq!(config.write_timeout, Some(Duration::from_millis(250)));
            Ok(())
        });
    }

    #[test]
    fn missing_yaml_file_fails() {
        figment::Jail::expect_with(|_jail| {
            let err = Config::load(Some(Path::new("does-not-exist.yml")), &Overrides::default())
                .unwrap_err();
            assert!(matches!(err, Error::LoadConfig(_)));
            Ok(())
        });
    }

    #[test]
    fn malformed_values_fail() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("BT_RPS", "fast");
            let err = Config::load(None, &Overrides::default()).unwrap_err();
            assert!(matches!(err, Error::LoadConfig(_)));
            Ok(())
        });
    }

    #[test]
    fn project_is_required() {
        let config = Config::default();
        let err = config.validate_location().unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("BT_PROJECT")), "{err}");

        let config = Config {
            project: "my-project".to_owned(),
            ..Default::default()
        };
        config.validate_location().unwrap();
    }

    #[test]
    fn rejects_invalid_workloads() {
        let config = Config {
            rps: 0,
            ..Default::default()
        };
        assert!(matches!(config.run_config(), Err(Error::Config(_))));

        let config = Config {
            threads: 0,
            ..Default::default()
        };
        assert!(matches!(config.run_config(), Err(Error::Config(_))));

        let config = Config {
            cidr: "10.0.0.0/31".to_owned(),
            ..Default::default()
        };
        assert!(matches!(
            config.run_config(),
            Err(Error::InvalidRange { .. })
        ));
    }

    #[test]
    fn run_config_carries_workload_values() {
        let config = Config {
            rps: 250,
            burst: 3,
            records: 42,
            threads: 4,
            cidr: "10.1.2.3/24".to_owned(),
            seed: Some(9),
            write_timeout: Some(Duration::from_secs(1)),
            timestamped_keys: true,
            ..Default::default()
        };
        let run = config.run_config().unwrap();

        assert_eq!(run.rps.get(), 250);
        assert_eq!(run.burst, 3);
        assert_eq!(run.records, 42);
        assert_eq!(run.workers.get(), 4);
        assert_eq!(run.keyspace.to_string(), "10.1.2.0/24");
        assert_eq!(run.seed, Some(9));
        assert_eq!(run.write_timeout, Some(Duration::from_secs(1)));
        assert!(run.timestamped_keys);
    }

    #[test]
    fn zero_records_is_valid() {
        let config = Config {
            records: 0,
            ..Default::default()
        };
        assert_eq!(config.run_config().unwrap().records, 0);
    }
}
