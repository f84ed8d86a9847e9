//! Instance configuration
//!
//! Read from `procfleet.toml` in the working directory (or the path given on
//! the command line). Every field has a default so a missing file still
//! yields a usable configuration.

use anyhow::{Context, Result};
use procfleet_shared::defaults;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Config file looked up in the working directory
pub const CONFIG_FILENAME: &str = "procfleet.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    /// File holding this instance's device identity
    pub identity_file: PathBuf,
    /// Prefix marking a line as a command
    pub command_prefix: String,
    /// Start the workload once the first hub connection is up
    pub start_on_boot: bool,
    pub hub: HubConfig,
    pub files: FilesConfig,
    pub shell: ShellConfig,
    pub workload: WorkloadConfig,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            identity_file: PathBuf::from("id.txt"),
            command_prefix: defaults::COMMAND_PREFIX.into(),
            start_on_boot: false,
            hub: HubConfig::default(),
            files: FilesConfig::default(),
            shell: ShellConfig::default(),
            workload: WorkloadConfig::default(),
        }
    }
}

/// Control channel connection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub address: String,
    pub connect_timeout_secs: u64,
    /// Initial reconnection delay, doubled on every failure
    pub reconnect_delay_secs: u64,
    pub max_reconnect_delay_secs: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            address: defaults::HUB_ADDRESS.into(),
            connect_timeout_secs: 5,
            reconnect_delay_secs: 1,
            max_reconnect_delay_secs: 30,
        }
    }
}

impl HubConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.max_reconnect_delay_secs)
    }
}

/// File transfer settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    /// Directory received files are written to and fetched from
    pub root: PathBuf,
    /// Names that can never be overwritten by a received file
    pub reserved: Vec<String>,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            reserved: vec![
                CONFIG_FILENAME.into(),
                "id.txt".into(),
                env!("CARGO_PKG_NAME").into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    pub working_dir: Option<PathBuf>,
}

/// Worker processes launched on `start`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// One shell-quoted command line per worker process
    pub commands: Vec<String>,
    /// Run before workers are terminated
    pub pre_stop: Option<String>,
    /// Run after all workers have been asked to terminate
    pub post_stop: Option<String>,
    pub working_dir: Option<PathBuf>,
}

/// Load config from the given path
pub fn load_config(path: &Path) -> Result<InstanceConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_config(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

/// Load the explicit path if given, else `./procfleet.toml`, else defaults
pub fn discover_and_load(explicit: Option<&Path>) -> Result<InstanceConfig> {
    if let Some(path) = explicit {
        return load_config(path);
    }

    let local = Path::new(CONFIG_FILENAME);
    if local.exists() {
        debug!(path = %local.display(), "loading config");
        return load_config(local);
    }

    debug!("no config file found, using defaults");
    Ok(InstanceConfig::default())
}

fn parse_config(raw: &str) -> Result<InstanceConfig> {
    Ok(toml::from_str(raw)?)
}
