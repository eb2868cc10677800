use crate::config::IngestConfig;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "wireuse-ingest")]
#[command(about = "Per-peer WireGuard usage ingestion", long_about = None)]
pub struct Args {
    /// Config file path
    #[arg(short, long, default_value = "ingest.toml")]
    pub config: String,

    /// WireGuard interface
    #[arg(short, long, env = "WIREUSE_INTERFACE")]
    pub interface: Option<String>,

    /// SQLite database path
    #[arg(long, env = "WIREUSE_DATABASE_PATH")]
    pub database_path: Option<String>,

    /// Directory watched for interface up and dump files
    #[arg(short, long, env = "WIREUSE_WATCH_DIR")]
    pub watch_dir: Option<String>,

    /// Restart-mark file name
    #[arg(short, long, env = "WIREUSE_RESTART_MARKER")]
    pub restart_marker: Option<String>,

    /// Seconds between counter samples
    #[arg(long, env = "WIREUSE_TICK_INTERVAL_SECS")]
    pub tick_interval_secs: Option<u64>,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(long, env = "WIREUSE_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Override log directory
    #[arg(long)]
    pub log_dir: Option<String>,
}

impl Args {
    pub fn apply_to(&self, cfg: &mut IngestConfig) {
        if let Some(interface) = &self.interface {
            cfg.interface = interface.clone();
        }
        if let Some(database_path) = &self.database_path {
            cfg.database_path = database_path.clone();
        }
        if let Some(watch_dir) = &self.watch_dir {
            cfg.watch_dir = Some(watch_dir.clone());
        }
        if let Some(restart_marker) = &self.restart_marker {
            cfg.restart_marker = Some(restart_marker.clone());
        }
        if let Some(tick_interval_secs) = self.tick_interval_secs {
            cfg.tick_interval_secs = tick_interval_secs;
        }
        if let Some(log_level) = &self.log_level {
            cfg.log_level = log_level.clone();
        }
        if let Some(log_dir) = &self.log_dir {
            cfg.log_dir = Some(log_dir.clone());
        }
    }
}
