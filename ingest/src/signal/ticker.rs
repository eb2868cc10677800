use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Emit a tick every `period` until cancelled. The first tick fires one
/// period after start. Ticks never block: if the engine has not consumed the
/// previous one yet, the new one is dropped.
pub async fn run_ticker(period: Duration, tx: mpsc::Sender<()>, cancel: CancellationToken) {
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Ticker stopped");
                return;
            }
            _ = interval.tick() => {
                match tx.try_send(()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(())) => debug!("Previous tick still pending, skipping"),
                    Err(TrySendError::Closed(())) => {
                        info!("Tick receiver dropped, ticker exiting");
                        return;
                    }
                }
            }
        }
    }
}
