//! Producers of the events that drive the engine.

mod marker;
mod ticker;
mod watcher;

pub use marker::run_marker_poller;
pub use ticker::run_ticker;
pub use watcher::{InterfaceFiles, start_watcher};

use crate::config::IngestConfig;
use crate::error::Result;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// A captured `wg show <iface> dump` taken right before the interface went
/// down, with the instant it represents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEvent {
    pub path: PathBuf,
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Tick,
    RestartDetected,
    PreShutdownSnapshot(SnapshotEvent),
}

/// Receiving ends of the signal channels consumed by the engine.
///
/// Restart and snapshot channels are optional; an absent channel is never
/// polled and never reported as closed.
pub struct Signals {
    pub ticks: mpsc::Receiver<()>,
    pub restarts: Option<mpsc::UnboundedReceiver<()>>,
    pub snapshots: Option<mpsc::UnboundedReceiver<SnapshotEvent>>,
}

/// Sending ends matching [`Signals`], used to wire producers.
pub struct SignalSenders {
    pub ticks: mpsc::Sender<()>,
    pub restarts: Option<mpsc::UnboundedSender<()>>,
    pub snapshots: Option<mpsc::UnboundedSender<SnapshotEvent>>,
}

impl Signals {
    /// Channels for a deployment with or without restart and snapshot
    /// producers. Ticks are coalesced: a tick arriving while one is pending
    /// is dropped.
    pub fn channel(with_restarts: bool, with_snapshots: bool) -> (SignalSenders, Signals) {
        let (tick_tx, tick_rx) = mpsc::channel(1);
        let (restart_tx, restart_rx) = if with_restarts {
            let (tx, rx) = mpsc::unbounded_channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };
        let (snapshot_tx, snapshot_rx) = if with_snapshots {
            let (tx, rx) = mpsc::unbounded_channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        (
            SignalSenders {
                ticks: tick_tx,
                restarts: restart_tx,
                snapshots: snapshot_tx,
            },
            Signals {
                ticks: tick_rx,
                restarts: restart_rx,
                snapshots: snapshot_rx,
            },
        )
    }
}

/// Start every producer the configuration asks for.
///
/// Producers stop when `cancel` fires. The directory watcher is the only
/// source of snapshot events; restarts come from the watcher, the marker
/// file, or both.
pub fn spawn_producers(
    cfg: &IngestConfig,
    cancel: CancellationToken,
) -> Result<(Signals, JoinSet<()>)> {
    let watch_dir = cfg.watch_dir();
    let marker = cfg.restart_marker();
    let (senders, signals) = Signals::channel(
        watch_dir.is_some() || marker.is_some(),
        watch_dir.is_some(),
    );

    let mut tasks = JoinSet::new();
    tasks.spawn(run_ticker(cfg.tick_interval(), senders.ticks, cancel.clone()));

    if let (Some(dir), Some(restarts), Some(snapshots)) =
        (watch_dir, senders.restarts.clone(), senders.snapshots)
    {
        let files = InterfaceFiles::new(&cfg.interface);
        tasks.spawn(start_watcher(&dir, files, restarts, snapshots, cancel.clone())?);
    }

    if let (Some(path), Some(restarts)) = (marker, senders.restarts) {
        tasks.spawn(run_marker_poller(
            path,
            cfg.marker_poll_interval(),
            restarts,
            cancel,
        ));
    }

    Ok((signals, tasks))
}
