use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A marker file holding the byte `0x01` or the text `1` announces a restart.
fn is_restart_mark(content: &[u8]) -> bool {
    content == [1u8] || content.trim_ascii() == b"1"
}

/// Read the marker; a missing file means no restart happened.
async fn check_marker(path: &Path) -> std::io::Result<bool> {
    match tokio::fs::read(path).await {
        Ok(content) => Ok(is_restart_mark(&content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Poll the restart marker every `period`, emitting one restart per marker
/// seen and removing the marker afterwards.
pub async fn run_marker_poller(
    path: PathBuf,
    period: Duration,
    tx: UnboundedSender<()>,
    cancel: CancellationToken,
) {
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!("Polling restart marker {} every {:?}", path.display(), period);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Restart marker poller cancelled");
                return;
            }
            _ = interval.tick() => {}
        }

        match check_marker(&path).await {
            Ok(true) => {
                info!("Restart marker found at {}", path.display());
                if tx.send(()).is_err() {
                    debug!("Restart receiver dropped, stopping marker poller");
                    return;
                }
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    if e.kind() != ErrorKind::NotFound {
                        warn!("Failed to remove restart marker {}: {}", path.display(), e);
                    }
                }
            }
            Ok(false) => {}
            Err(e) => warn!("Failed to read restart marker {}: {}", path.display(), e),
        }
    }
}
