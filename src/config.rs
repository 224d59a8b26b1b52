//! Client configuration.
//!
//! Values are layered, lowest priority first: built-in defaults, a JSON
//! config file, then command-line options or their `PLCWEB_*` environment
//! variables (see [`ConfigArgs`]).
//!
//! ```json
//! {
//!   "base_url": "https://192.168.0.1",
//!   "max_request_size": 65536,
//!   "request_timeout_secs": 30,
//!   "split_strategy": "exact"
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser};
use serde::{Deserialize, Serialize};

use crate::bulk::{SplitStrategy, DEFAULT_ID_LENGTH, MAX_ID_LENGTH, MIN_ID_LENGTH};

/// Default device address (factory setting of the PN interface).
pub const DEFAULT_BASE_URL: &str = "https://192.168.0.1";

/// Default maximum request body size in bytes.
pub const DEFAULT_MAX_REQUEST_SIZE: usize = 64 * 1024;

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default time budget for correlation id assignment.
pub const DEFAULT_ID_TIMEOUT_MS: u64 = 5_000;

/// Settings for [`crate::client::WebApiClient`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the device web server.
    pub base_url: String,
    /// Largest request body the device accepts, in bytes.
    pub max_request_size: usize,
    /// Timeout for one chunk exchange, in seconds.
    pub request_timeout_secs: u64,
    /// Length of generated correlation ids.
    pub id_length: usize,
    /// Time budget for assigning ids to one batch, in milliseconds.
    pub id_timeout_ms: u64,
    /// How the planner measures calls.
    pub split_strategy: SplitStrategy,
    /// Accept self-signed device certificates.
    pub accept_invalid_certs: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            max_request_size: DEFAULT_MAX_REQUEST_SIZE,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            id_length: DEFAULT_ID_LENGTH,
            id_timeout_ms: DEFAULT_ID_TIMEOUT_MS,
            split_strategy: SplitStrategy::default(),
            accept_invalid_certs: false,
        }
    }
}

impl ClientConfig {
    /// Build the configuration: defaults, then the JSON file named by
    /// `args.config` (or [`default_config_path`] when that file exists),
    /// then the overrides in `args`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or the result
    /// fails [`ClientConfig::validate`].
    pub fn load(args: &ConfigArgs) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = default_config_path();
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        args.apply_to(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Like [`ClientConfig::load`], taking overrides from `PLCWEB_*`
    /// environment variables only.
    pub fn from_env() -> Result<Self> {
        Self::load(&ConfigArgs::from_env()?)
    }

    /// Read a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Reject settings the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_request_size == 0 {
            bail!("max_request_size must be greater than zero");
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be greater than zero");
        }
        if !(MIN_ID_LENGTH..=MAX_ID_LENGTH).contains(&self.id_length) {
            bail!(
                "id_length must be between {} and {}, got {}",
                MIN_ID_LENGTH,
                MAX_ID_LENGTH,
                self.id_length
            );
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn id_timeout(&self) -> Duration {
        Duration::from_millis(self.id_timeout_ms)
    }
}

/// Command-line and environment overrides for [`ClientConfig`].
///
/// Every option can also be set through the environment variable named
/// next to it. Unset options leave the file or default value in place.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigArgs {
    /// JSON config file.
    ///
    /// Environment variable: `PLCWEB_CONFIG`
    #[arg(short, long, env = "PLCWEB_CONFIG")]
    pub config: Option<PathBuf>,

    /// Base URL of the device web server.
    ///
    /// Environment variable: `PLCWEB_URL`
    #[arg(long, env = "PLCWEB_URL")]
    pub url: Option<String>,

    /// Largest request body the device accepts, in bytes.
    ///
    /// Environment variable: `PLCWEB_MAX_REQUEST_SIZE`
    #[arg(long, env = "PLCWEB_MAX_REQUEST_SIZE")]
    pub max_request_size: Option<usize>,

    /// Timeout for one request, in seconds.
    ///
    /// Environment variable: `PLCWEB_TIMEOUT_SECS`
    #[arg(long, env = "PLCWEB_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Length of generated correlation ids.
    ///
    /// Environment variable: `PLCWEB_ID_LENGTH`
    #[arg(long, env = "PLCWEB_ID_LENGTH")]
    pub id_length: Option<usize>,

    /// Time budget for assigning ids to one batch, in milliseconds.
    ///
    /// Environment variable: `PLCWEB_ID_TIMEOUT_MS`
    #[arg(long, env = "PLCWEB_ID_TIMEOUT_MS")]
    pub id_timeout_ms: Option<u64>,

    /// How request bodies are measured: `exact` or `approximate`.
    ///
    /// Environment variable: `PLCWEB_SPLIT_STRATEGY`
    #[arg(long, env = "PLCWEB_SPLIT_STRATEGY")]
    pub split_strategy: Option<SplitStrategy>,

    /// Accept self-signed device certificates.
    ///
    /// Environment variable: `PLCWEB_ACCEPT_INVALID_CERTS`
    #[arg(long, env = "PLCWEB_ACCEPT_INVALID_CERTS")]
    pub accept_invalid_certs: bool,
}

/// Parser for [`ConfigArgs`] without any command-line arguments.
#[derive(Parser)]
#[command(name = "plcweb-bulk")]
struct EnvOnly {
    #[command(flatten)]
    args: ConfigArgs,
}

impl ConfigArgs {
    /// Read the overrides from the environment.
    pub fn from_env() -> Result<Self> {
        let parsed = EnvOnly::try_parse_from(["plcweb-bulk"])
            .context("Invalid PLCWEB_* environment variable")?;
        Ok(parsed.args)
    }

    /// Write every set override into `config`.
    pub fn apply_to(&self, config: &mut ClientConfig) {
        if let Some(url) = &self.url {
            config.base_url = url.clone();
        }
        if let Some(size) = self.max_request_size {
            config.max_request_size = size;
        }
        if let Some(secs) = self.timeout_secs {
            config.request_timeout_secs = secs;
        }
        if let Some(length) = self.id_length {
            config.id_length = length;
        }
        if let Some(ms) = self.id_timeout_ms {
            config.id_timeout_ms = ms;
        }
        if let Some(strategy) = self.split_strategy {
            config.split_strategy = strategy;
        }
        if self.accept_invalid_certs {
            config.accept_invalid_certs = true;
        }
    }
}

/// Resolve the default config file path.
///
/// Resolution order:
/// 1. `$XDG_CONFIG_HOME/plcweb/config.json`
/// 2. platform config dir (`~/Library/Application Support/plcweb/config.json` on macOS)
/// 3. `./plcweb.json` (fallback)
pub fn default_config_path() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join("plcweb").join("config.json");
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("plcweb").join("config.json");
    }

    PathBuf::from("plcweb.json")
}
