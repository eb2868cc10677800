use crate::error::{IngestError, Result};
use common::CounterMapping;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// WireGuard interface to meter
    #[serde(default)]
    pub interface: String,

    /// SQLite database holding the usage samples
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Directory watched for `<interface>.up` and `<interface>.down` files
    #[serde(default)]
    pub watch_dir: Option<String>,

    /// Marker file whose content `1` announces an interface restart
    #[serde(default)]
    pub restart_marker: Option<String>,

    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    #[serde(default = "default_marker_poll_interval_secs")]
    pub marker_poll_interval_secs: u64,

    /// Program used to read live counters (`<wg_command> show <interface> dump`)
    #[serde(default = "default_wg_command")]
    pub wg_command: String,

    #[serde(default)]
    pub counter_mapping: CounterMapping,

    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log directory for file-based logging; stdout when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    #[serde(default = "default_log_file")]
    pub log_file: String,

    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_database_path() -> String {
    "data/usage.db".to_string()
}

fn default_tick_interval_secs() -> u64 {
    5
}

fn default_marker_poll_interval_secs() -> u64 {
    1
}

fn default_wg_command() -> String {
    "wg".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "ingest.log".to_string()
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            interface: String::new(),
            database_path: default_database_path(),
            watch_dir: None,
            restart_marker: None,
            tick_interval_secs: default_tick_interval_secs(),
            marker_poll_interval_secs: default_marker_poll_interval_secs(),
            wg_command: default_wg_command(),
            counter_mapping: CounterMapping::default(),
            log_level: default_log_level(),
            log_dir: None,
            log_file: default_log_file(),
            log_format: LogFormat::default(),
        }
    }
}

impl IngestConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| IngestError::Configuration(format!("Failed to parse config: {}", e)))
    }

    /// Like [`IngestConfig::load`], but a missing file yields the defaults so
    /// that the service can be configured from flags and environment alone.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        match fs::metadata(path.as_ref()) {
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            _ => Self::load(path),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.interface.trim().is_empty() {
            return Err(IngestError::Configuration(
                "interface is required and cannot be empty".to_string(),
            ));
        }
        if self.tick_interval_secs == 0 {
            return Err(IngestError::Configuration(
                "tick_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.restart_marker.is_some() && self.marker_poll_interval_secs == 0 {
            return Err(IngestError::Configuration(
                "marker_poll_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.wg_command.trim().is_empty() {
            return Err(IngestError::Configuration(
                "wg_command cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn marker_poll_interval(&self) -> Duration {
        Duration::from_secs(self.marker_poll_interval_secs)
    }

    pub fn watch_dir(&self) -> Option<PathBuf> {
        self.watch_dir.as_ref().map(PathBuf::from)
    }

    pub fn restart_marker(&self) -> Option<PathBuf> {
        self.restart_marker.as_ref().map(PathBuf::from)
    }
}
