//! Configuration for the benchmark harness.
//!
//! Configuration can be loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Command line flags (`--files`, `--routines`, `--cores`, `--name`)
//! 2. Environment variables (prefixed with `S3BENCH__`)
//! 3. YAML configuration file (specified via `-c` or `--config` flag)
//! 4. Defaults
//!
//! # Environment Variables
//!
//! Environment variables use `S3BENCH__` as a prefix and double underscores (`__`) to denote
//! nested configuration structures. For example:
//!
//! - `S3BENCH__FILES=5000` sets the number of objects
//! - `S3BENCH__STORAGE__TYPE=s3` selects the S3 backend
//! - `S3BENCH__STORAGE__BUCKET=my-bucket` sets the bucket
//!
//! # YAML Configuration File
//!
//! ```yaml
//! files: 5000
//! routines: 200
//! payload_size: 1MiB
//! write_timeout: 2m
//!
//! storage:
//!   type: s3
//!   bucket: my-bucket
//!   region: eu-central-1
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::{Result, bail};
use bytesize::ByteSize;
use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use s3bench_storage::S3Config;
use serde::{Deserialize, Deserializer};

/// Prefix of every environment variable read into [`Config`].
const ENV_PREFIX: &str = "S3BENCH__";

/// Default object size, 1332 KiB.
const DEFAULT_PAYLOAD_SIZE: u64 = 1332 * 1024;

/// Default capacity of the key queue between producer and workers.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Default upper bound for a single write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Where objects are stored.
///
/// Selected by `storage.type` in YAML, or `S3BENCH__STORAGE__TYPE` in the environment.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Storage {
    /// Amazon S3 or an S3-compatible service (type `"s3"`).
    ///
    /// Credentials are resolved through the default AWS provider chain, e.g. the
    /// `AWS_ACCESS_KEY_ID` and `AWS_SECRET_ACCESS_KEY` environment variables or an IAM role.
    S3 {
        /// Bucket that receives all objects. It must exist before the run.
        #[serde(default = "default_bucket")]
        bucket: String,

        /// First path segment of every key.
        #[serde(default = "default_prefix")]
        prefix: String,

        /// AWS region of the bucket.
        #[serde(default = "default_region")]
        region: String,

        /// Custom endpoint, e.g. `http://localhost:9000` for MinIO.
        #[serde(default)]
        endpoint: Option<String>,

        /// Use path-style addressing. Most S3-compatible services need this.
        #[serde(default)]
        force_path_style: bool,

        /// Prepend `prefix` a second time, producing keys like `s3-tests3-test/run/00000`.
        ///
        /// Only needed to read back objects written by older versions of this tool.
        #[serde(default)]
        legacy_double_prefix: bool,
    },

    /// Keep objects in process memory (type `"memory"`).
    ///
    /// Measures the overhead of the harness itself without any network involved.
    Memory {
        /// First path segment of every key.
        #[serde(default = "default_prefix")]
        prefix: String,
    },
}

impl Storage {
    /// The first path segment of every generated key.
    pub fn prefix(&self) -> &str {
        match self {
            Storage::S3 { prefix, .. } | Storage::Memory { prefix } => prefix,
        }
    }

    /// Returns the S3 connection settings, or `None` for the in-memory backend.
    pub fn s3_config(&self) -> Option<S3Config> {
        match self {
            Storage::S3 {
                bucket,
                prefix,
                region,
                endpoint,
                force_path_style,
                legacy_double_prefix,
            } => Some(S3Config {
                bucket: bucket.clone(),
                region: region.clone(),
                endpoint: endpoint.clone(),
                force_path_style: *force_path_style,
                key_prefix: legacy_double_prefix.then(|| prefix.clone()),
            }),
            Storage::Memory { .. } => None,
        }
    }
}

impl Default for Storage {
    fn default() -> Self {
        Storage::S3 {
            bucket: default_bucket(),
            prefix: default_prefix(),
            region: default_region(),
            endpoint: None,
            force_path_style: false,
            legacy_double_prefix: false,
        }
    }
}

fn default_bucket() -> String {
    "bu-prod01".to_owned()
}

fn default_prefix() -> String {
    "s3-test".to_owned()
}

fn default_region() -> String {
    "us-west-2".to_owned()
}

/// Accepts run names given as integers, which is how generated names look.
fn deserialize_name<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Name {
        Text(String),
        Unsigned(u64),
        Signed(i64),
    }

    Ok(match Name::deserialize(deserializer)? {
        Name::Text(name) => name,
        Name::Unsigned(name) => name.to_string(),
        Name::Signed(name) => name.to_string(),
    })
}

/// Main configuration struct for the benchmark.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Total number of objects written and then read back.
    ///
    /// # Default
    ///
    /// `1000`
    pub files: usize,

    /// Number of concurrent workers, each with its own storage sessions.
    ///
    /// # Default
    ///
    /// `1000`
    pub routines: usize,

    /// Number of runtime worker threads. `0` keeps the runtime default (one per CPU core).
    ///
    /// # Default
    ///
    /// `0`
    pub cores: usize,

    /// Run identifier used as the second key segment. A random integer is used when empty.
    ///
    /// # Default
    ///
    /// `""`
    #[serde(deserialize_with = "deserialize_name")]
    pub name: String,

    /// Size of every written object. Accepts plain byte counts or units like `4KiB`.
    ///
    /// # Default
    ///
    /// `1332 KiB`
    pub payload_size: ByteSize,

    /// Capacity of the bounded key queue.
    ///
    /// # Default
    ///
    /// `10000`
    pub queue_capacity: usize,

    /// Upper bound for a single write. Writes exceeding it are canceled and counted as failed.
    ///
    /// # Default
    ///
    /// `10m`
    #[serde(with = "humantime_serde")]
    pub write_timeout: Duration,

    /// Optional upper bound for a single read.
    ///
    /// # Default
    ///
    /// `None` (reads may take as long as the storage client allows)
    #[serde(with = "humantime_serde")]
    pub read_timeout: Option<Duration>,

    /// The storage backend under test.
    pub storage: Storage,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            files: 1000,
            routines: 1000,
            cores: 0,
            name: String::new(),
            payload_size: ByteSize::b(DEFAULT_PAYLOAD_SIZE),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            read_timeout: None,
            storage: Storage::default(),
        }
    }
}

/// Values from the command line that override the loaded configuration.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    /// Overrides [`Config::files`].
    pub files: Option<usize>,
    /// Overrides [`Config::routines`].
    pub routines: Option<usize>,
    /// Overrides [`Config::cores`].
    pub cores: Option<usize>,
    /// Overrides [`Config::name`].
    pub name: Option<String>,
}

impl Config {
    /// Reads the configuration file and environment.
    ///
    /// Later sources win: built-in defaults, then the YAML file at `path`, then `S3BENCH__*`
    /// variables. CLI flags are layered on top with [`Config::apply`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }

    /// Applies command line overrides on top of the loaded values.
    pub fn apply(mut self, overrides: Overrides) -> Self {
        if let Some(files) = overrides.files {
            self.files = files;
        }
        if let Some(routines) = overrides.routines {
            self.routines = routines;
        }
        if let Some(cores) = overrides.cores {
            self.cores = cores;
        }
        if let Some(name) = overrides.name {
            self.name = name;
        }
        self
    }

    /// Rejects configurations that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<()> {
        if self.files == 0 {
            bail!("`files` must be at least 1");
        }
        if self.routines == 0 {
            bail!("`routines` must be at least 1");
        }
        if self.queue_capacity == 0 {
            bail!("`queue_capacity` must be at least 1");
        }
        if self.write_timeout.is_zero() {
            bail!("`write_timeout` must be positive");
        }
        if let Storage::S3 { bucket, region, .. } = &self.storage {
            if bucket.is_empty() {
                bail!("`storage.bucket` must not be empty");
            }
            if region.is_empty() {
                bail!("`storage.region` must not be empty");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_match_the_reference_run() {
        figment::Jail::expect_with(|_jail| {
            let config = Config::load(None).unwrap();

            assert_eq!(config, Config::default());
            assert_eq!(config.files, 1000);
            assert_eq!(config.routines, 1000);
            assert_eq!(config.payload_size.as_u64(), 1_363_968);
            assert_eq!(config.write_timeout, Duration::from_secs(600));
            assert_eq!(config.read_timeout, None);
            assert_eq!(config.storage.prefix(), "s3-test");

            Ok(())
        });
    }

    #[test]
    fn configurable_via_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("S3BENCH__FILES", "250");
            jail.set_env("S3BENCH__PAYLOAD_SIZE", "4KiB");
            jail.set_env("S3BENCH__READ_TIMEOUT", "30s");
            jail.set_env("S3BENCH__STORAGE__TYPE", "s3");
            jail.set_env("S3BENCH__STORAGE__BUCKET", "whatever");
            jail.set_env("S3BENCH__STORAGE__ENDPOINT", "http://localhost:9000");

            let config = Config::load(None).unwrap();

            assert_eq!(config.files, 250);
            assert_eq!(config.payload_size, ByteSize::kib(4));
            assert_eq!(config.read_timeout, Some(Duration::from_secs(30)));

            let s3 = config.storage.s3_config().unwrap();
            assert_eq!(s3.bucket, "whatever");
            assert_eq!(s3.region, "us-west-2");
            assert_eq!(s3.endpoint.as_deref(), Some("http://localhost:9000"));
            assert_eq!(s3.key_prefix, None);

            Ok(())
        });
    }

    #[test]
    fn numeric_name_via_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("S3BENCH__NAME", "42");

            let config = Config::load(None).unwrap();
            assert_eq!(config.name, "42");

            Ok(())
        });
    }

    #[test]
    fn numeric_name_via_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile.write_all(b"name: 1234567890\n").unwrap();

        figment::Jail::expect_with(|_jail| {
            let config = Config::load(Some(tempfile.path())).unwrap();
            assert_eq!(config.name, "1234567890");

            Ok(())
        });
    }

    #[test]
    fn configured_with_env_and_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            files: 10
            write_timeout: 5s
            storage:
                type: s3
                bucket: from-yaml
                legacy_double_prefix: true
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|jail| {
            jail.set_env("S3BENCH__FILES", "20");

            let config = Config::load(Some(tempfile.path())).unwrap();

            // The environment wins over the file.
            assert_eq!(config.files, 20);
            assert_eq!(config.write_timeout, Duration::from_secs(5));

            let s3 = config.storage.s3_config().unwrap();
            assert_eq!(s3.bucket, "from-yaml");
            assert_eq!(s3.key_prefix.as_deref(), Some("s3-test"));

            Ok(())
        });
    }

    #[test]
    fn memory_storage_via_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            storage:
                type: memory
                prefix: dry
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|_jail| {
            let config = Config::load(Some(tempfile.path())).unwrap();
            assert_eq!(
                config.storage,
                Storage::Memory {
                    prefix: "dry".to_owned()
                }
            );
            assert!(config.storage.s3_config().is_none());
            Ok(())
        });
    }

    #[test]
    fn overrides_win() {
        let config = Config::default().apply(Overrides {
            files: Some(100),
            routines: Some(10),
            cores: None,
            name: Some("t1".to_owned()),
        });

        assert_eq!(config.files, 100);
        assert_eq!(config.routines, 10);
        assert_eq!(config.cores, 0);
        assert_eq!(config.name, "t1");
    }

    #[test]
    fn validation_rejects_empty_runs() {
        let config = Config {
            files: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            routines: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            storage: Storage::S3 {
                bucket: String::new(),
                prefix: default_prefix(),
                region: default_region(),
                endpoint: None,
                force_path_style: false,
                legacy_double_prefix: false,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());

        assert!(Config::default().validate().is_ok());
    }
}
