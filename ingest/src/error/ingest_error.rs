use thiserror::Error;

/// Failure to read live counters from the interface.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The interface does not exist, which is expected around a restart.
    #[error("WireGuard device not found: {0}")]
    DeviceNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command `{command}` failed ({status}): {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("Dump error: {0}")]
    Dump(#[from] dump::DumpError),
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Ingestion cancelled")]
    Cancelled,

    #[error("Signal channel closed: {0}")]
    SignalChannelClosed(&'static str),
}

impl IngestError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, IngestError::Cancelled)
    }
}
