use crate::error::SourceError;
use async_trait::async_trait;
use common::{CounterMapping, PeerUsage};
use dump::DumpPeerRecord;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Yields the live per-peer counters of the interface.
#[async_trait]
pub trait CounterSource: Send + Sync {
    async fn read_usage(&self) -> Result<Vec<PeerUsage>, SourceError>;
}

/// Reads counters by running `wg show <interface> dump`.
pub struct WgCommandSource {
    program: String,
    interface: String,
    mapping: CounterMapping,
}

impl WgCommandSource {
    pub fn new<S1: Into<String>, S2: Into<String>>(
        program: S1,
        interface: S2,
        mapping: CounterMapping,
    ) -> Self {
        Self {
            program: program.into(),
            interface: interface.into(),
            mapping,
        }
    }

    fn command_line(&self) -> String {
        format!("{} show {} dump", self.program, self.interface)
    }
}

#[async_trait]
impl CounterSource for WgCommandSource {
    #[instrument(skip(self), fields(interface = %self.interface))]
    async fn read_usage(&self) -> Result<Vec<PeerUsage>, SourceError> {
        let output = Command::new(&self.program)
            .arg("show")
            .arg(&self.interface)
            .arg("dump")
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if is_missing_device(&stderr) {
                return Err(SourceError::DeviceNotFound(self.interface.clone()));
            }
            return Err(SourceError::Command {
                command: self.command_line(),
                status: output.status.to_string(),
                stderr,
            });
        }

        let device = dump::parse_device_dump(&output.stdout)?;
        debug!("Read counters of {} peers", device.peers.len());
        Ok(records_to_usage(&device.peers, self.mapping))
    }
}

pub fn records_to_usage(records: &[DumpPeerRecord], mapping: CounterMapping) -> Vec<PeerUsage> {
    records.iter().map(|r| r.to_usage(mapping)).collect()
}

fn is_missing_device(stderr: &str) -> bool {
    stderr.contains("No such device") || stderr.contains("Unable to access interface")
}
