//! Configuration management.

use anyhow::{bail, Context, Result};
use sensor_exporter_hw::source::{DEFAULT_HWMON_ROOT, DEFAULT_POWER_SUPPLY_ROOT};
use sensor_exporter_hw::{CommandSource, Exclusive, FileSource, ReadingSource, SysfsSource};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Configuration file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "sensor-exporter.toml";

/// Path of the health endpoint, which the metrics path must not shadow.
pub const HEALTH_PATH: &str = "/healthz";

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Listen address (e.g., "0.0.0.0" or "::1")
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// HTTP path serving metrics
    #[serde(default = "default_path")]
    pub path: String,

    /// Upper bound on one scrape, in milliseconds
    #[serde(default = "default_scrape_timeout")]
    pub scrape_timeout: u64,

    /// Where readings come from
    #[serde(default)]
    pub source: SourceConfig,
}

/// Reading source selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    /// Linux hwmon and power supply classes.
    Sysfs {
        #[serde(default = "default_hwmon_root")]
        hwmon_root: PathBuf,

        #[serde(default = "default_power_supply_root")]
        power_supply_root: PathBuf,

        /// Report batteries from the power supply class
        #[serde(default = "default_true")]
        batteries: bool,
    },

    /// External program printing a JSON snapshot.
    Command {
        program: String,

        #[serde(default)]
        args: Vec<String>,

        /// Run at most one instance at a time
        #[serde(default = "default_true")]
        exclusive: bool,
    },

    /// JSON snapshot file, re-read on every scrape.
    File { path: PathBuf },
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Sysfs {
            hwmon_root: default_hwmon_root(),
            power_supply_root: default_power_supply_root(),
            batteries: true,
        }
    }
}

// Default value functions
fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9101
}

fn default_path() -> String {
    "/metrics".to_string()
}

fn default_scrape_timeout() -> u64 {
    10_000
}

fn default_hwmon_root() -> PathBuf {
    PathBuf::from(DEFAULT_HWMON_ROOT)
}

fn default_power_supply_root() -> PathBuf {
    PathBuf::from(DEFAULT_POWER_SUPPLY_ROOT)
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read configuration file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse configuration")?;
        Ok(config)
    }

    /// Loads the given file, or the default file in the working directory if
    /// present, or falls back to defaults. Returns the file that was used.
    pub fn discover(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            let config = Self::load(path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            return Ok((config, Some(path.to_path_buf())));
        }

        let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
        if fallback.is_file() {
            let config = Self::load(&fallback)
                .with_context(|| format!("Failed to load {}", fallback.display()))?;
            return Ok((config, Some(fallback)));
        }

        debug!("No configuration file found, using defaults");
        Ok((Self::default(), None))
    }

    /// Checks values that serde cannot.
    pub fn validate(&self) -> Result<()> {
        if !self.path.starts_with('/') {
            bail!("Metrics path {:?} must start with '/'", self.path);
        }
        if self.path == "/" || self.path == HEALTH_PATH {
            bail!("Metrics path {:?} is reserved", self.path);
        }
        if self.scrape_timeout == 0 {
            bail!("Scrape timeout must be greater than zero");
        }
        self.socket_addr()?;
        Ok(())
    }

    /// Returns the address to bind.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .listen
            .parse()
            .with_context(|| format!("Invalid listen address {:?}", self.listen))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Returns the scrape timeout.
    pub fn scrape_timeout(&self) -> Duration {
        Duration::from_millis(self.scrape_timeout)
    }
}

impl SourceConfig {
    /// Builds the configured reading source. Commands are killed once they
    /// run longer than `timeout`.
    pub fn build(&self, timeout: Duration) -> Arc<dyn ReadingSource> {
        match self {
            SourceConfig::Sysfs {
                hwmon_root,
                power_supply_root,
                batteries,
            } => Arc::new(SysfsSource::new(
                hwmon_root,
                batteries.then(|| power_supply_root.clone()),
            )),
            SourceConfig::Command {
                program,
                args,
                exclusive,
            } => {
                let source =
                    CommandSource::new(program.clone(), args.clone()).with_timeout(timeout);
                if *exclusive {
                    Arc::new(Exclusive::new(source))
                } else {
                    Arc::new(source)
                }
            }
            SourceConfig::File { path } => Arc::new(FileSource::new(path)),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
            path: default_path(),
            scrape_timeout: default_scrape_timeout(),
            source: SourceConfig::default(),
        }
    }
}
