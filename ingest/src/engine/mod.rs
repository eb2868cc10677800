//! The reconciling dispatch loop.
//!
//! One [`Engine`] owns the reconciliation state and processes one signal at a
//! time; producers run concurrently and only talk to it through channels.

use crate::error::{IngestError, SourceError};
use crate::signal::{Signal, Signals, SnapshotEvent};
use crate::source::{CounterSource, records_to_usage};
use crate::store::Store;
use chrono::Utc;
use common::{CounterMapping, UsageMap, index_by_key, into_sorted_vec, merge};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Baseline held between signals.
#[derive(Debug, Default)]
struct ReconciliationState {
    baseline: Option<UsageMap>,
    baseline_stale: bool,
}

/// How a tick relates to the last restart. Only used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TickKind {
    Normal,
    PostRestart,
}

impl fmt::Display for TickKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickKind::Normal => write!(f, "normal"),
            TickKind::PostRestart => write!(f, "post-restart"),
        }
    }
}

pub struct Engine {
    source: Arc<dyn CounterSource>,
    store: Arc<dyn Store>,
    mapping: CounterMapping,
    state: ReconciliationState,
}

impl Engine {
    /// The baseline starts absent: until the first restart is seen, live
    /// counters are written as they are.
    pub fn new(
        source: Arc<dyn CounterSource>,
        store: Arc<dyn Store>,
        mapping: CounterMapping,
    ) -> Self {
        Self {
            source,
            store,
            mapping,
            state: ReconciliationState::default(),
        }
    }

    /// Dispatch signals until cancelled or until a signal channel closes.
    ///
    /// Cancellation wins over any signal that is ready at the same time.
    /// Among ready signals, snapshots go before restarts and restarts before
    /// ticks, which is the order an interface restart produces them in.
    /// Restarts pending together are handled as one. A signal already being
    /// handled runs to completion.
    pub async fn run(mut self, cancel: CancellationToken, mut signals: Signals) -> IngestError {
        info!("Engine started");
        loop {
            let signal = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Engine cancelled");
                    return IngestError::Cancelled;
                }
                snapshot = recv_optional(&mut signals.snapshots) => match snapshot {
                    Some(event) => Signal::PreShutdownSnapshot(event),
                    None => return IngestError::SignalChannelClosed("snapshot"),
                },
                restart = recv_optional(&mut signals.restarts) => match restart {
                    Some(()) => {
                        let collapsed = drain_pending(&mut signals.restarts);
                        if collapsed > 0 {
                            debug!("Collapsed {} duplicate restart signals", collapsed);
                        }
                        Signal::RestartDetected
                    }
                    None => return IngestError::SignalChannelClosed("restart"),
                },
                tick = signals.ticks.recv() => match tick {
                    Some(()) => Signal::Tick,
                    None => return IngestError::SignalChannelClosed("tick"),
                },
            };
            self.handle(signal).await;
        }
    }

    /// Process a single signal. Data-path failures are logged and absorbed.
    pub async fn handle(&mut self, signal: Signal) {
        match signal {
            Signal::Tick => self.on_tick().await,
            Signal::RestartDetected => {
                info!("Restart detected, reloading baseline");
                self.reload_baseline().await;
            }
            Signal::PreShutdownSnapshot(event) => self.on_snapshot(event).await,
        }
    }

    async fn reload_baseline(&mut self) -> bool {
        match self.store.load_baseline().await {
            Ok(baseline) => {
                info!("Loaded baseline for {} peers", baseline.len());
                self.state.baseline = Some(baseline);
                self.state.baseline_stale = false;
                true
            }
            Err(e) => {
                error!("Failed to load baseline: {}", e);
                self.state.baseline_stale = true;
                false
            }
        }
    }

    async fn on_tick(&mut self) {
        let kind = if self.state.baseline_stale {
            TickKind::PostRestart
        } else {
            TickKind::Normal
        };
        if kind == TickKind::PostRestart && !self.reload_baseline().await {
            match self.state.baseline {
                Some(_) => warn!("Baseline still stale, merging with the previous one"),
                None => warn!("Baseline still unavailable, writing raw counters"),
            }
        }

        let observed = match self.source.read_usage().await {
            Ok(usage) => usage,
            Err(SourceError::DeviceNotFound(iface)) => {
                warn!("Could not find WireGuard device {}, skipping tick", iface);
                return;
            }
            Err(e) => {
                error!("Failed to read peer counters, skipping tick: {}", e);
                return;
            }
        };

        let merged = merge(&index_by_key(observed), self.state.baseline.as_ref());
        if merged.is_empty() {
            debug!("No peers to record ({} tick)", kind);
            return;
        }

        let count = merged.len();
        let as_of = Utc::now();
        match self.store.write_usage(&into_sorted_vec(merged), as_of).await {
            Ok(()) => debug!("Recorded usage of {} peers as of {} ({} tick)", count, as_of, kind),
            Err(e) => error!("Failed to write peer usage: {}", e),
        }
    }

    async fn on_snapshot(&mut self, event: SnapshotEvent) {
        let raw = match tokio::fs::read(&event.path).await {
            Ok(raw) => raw,
            Err(e) => {
                error!("Failed to open dump {}: {}", event.path.display(), e);
                return;
            }
        };
        let records = match dump::parse(&raw) {
            Ok(records) => records,
            Err(e) => {
                error!("Failed to parse dump {}: {}", event.path.display(), e);
                return;
            }
        };
        if records.is_empty() {
            debug!("Dump {} holds no peers", event.path.display());
            return;
        }

        let usage = records_to_usage(&records, self.mapping);
        match self.store.write_usage(&usage, event.as_of).await {
            Ok(()) => info!(
                "Recorded pre-shutdown usage of {} peers as of {}",
                usage.len(),
                event.as_of
            ),
            Err(e) => error!("Failed to write pre-shutdown usage: {}", e),
        }
    }
}

/// Discard the messages already queued on an optional channel, returning
/// how many were dropped. A closed channel is left for the next receive to
/// report.
fn drain_pending<T>(rx: &mut Option<mpsc::UnboundedReceiver<T>>) -> usize {
    let Some(rx) = rx else {
        return 0;
    };
    let mut drained = 0;
    while rx.try_recv().is_ok() {
        drained += 1;
    }
    drained
}

/// Receive from a channel that may not be configured. An absent channel
/// never yields.
async fn recv_optional<T>(rx: &mut Option<mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
