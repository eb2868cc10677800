use super::SnapshotEvent;
use crate::error::Result;
use chrono::{DateTime, Utc};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What a file in the watched directory announces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSignal {
    /// `<iface>.up`: the interface came back up.
    Up,
    /// `<iface>.down`: a dump captured right before teardown.
    Down(PathBuf),
}

/// File name suffixes the interface hooks write into the watched directory.
#[derive(Debug, Clone)]
pub struct InterfaceFiles {
    up_suffix: String,
    down_suffix: String,
}

impl InterfaceFiles {
    pub fn new(interface: &str) -> Self {
        Self {
            up_suffix: format!("{}.up", interface),
            down_suffix: format!("{}.down", interface),
        }
    }

    pub fn classify(&self, path: &Path) -> Option<FileSignal> {
        let name = path.file_name()?.to_str()?;
        if name.ends_with(&self.up_suffix) {
            Some(FileSignal::Up)
        } else if name.ends_with(&self.down_suffix) {
            Some(FileSignal::Down(path.to_path_buf()))
        } else {
            None
        }
    }
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Both))
    )
}

/// The dump's modification time, or now if it cannot be read.
fn snapshot_as_of(path: &Path) -> DateTime<Utc> {
    match fs::metadata(path).and_then(|m| m.modified()) {
        Ok(modified) => DateTime::<Utc>::from(modified),
        Err(e) => {
            warn!(
                "Failed to stat dump file {}, using current time: {}",
                path.display(),
                e
            );
            Utc::now()
        }
    }
}

/// One hook write to the up file raises several events (create, then data).
const UP_DEBOUNCE: Duration = Duration::from_secs(1);

struct Dispatcher {
    files: InterfaceFiles,
    restarts: UnboundedSender<()>,
    snapshots: UnboundedSender<SnapshotEvent>,
    last_up: Option<Instant>,
}

impl Dispatcher {
    fn new(
        files: InterfaceFiles,
        restarts: UnboundedSender<()>,
        snapshots: UnboundedSender<SnapshotEvent>,
    ) -> Self {
        Self {
            files,
            restarts,
            snapshots,
            last_up: None,
        }
    }

    /// Whether an up event at `now` belongs to the restart already signalled.
    fn is_repeated_up(&mut self, now: Instant) -> bool {
        let repeated = self
            .last_up
            .is_some_and(|last| now.duration_since(last) < UP_DEBOUNCE);
        if !repeated {
            self.last_up = Some(now);
        }
        repeated
    }

    fn handle(&mut self, res: notify::Result<Event>) {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                error!("Directory watcher error: {}", e);
                return;
            }
        };
        if !is_relevant(&event.kind) {
            debug!("Ignoring event with irrelevant kind: {:?}", event.kind);
            return;
        }

        for path in &event.paths {
            match self.files.classify(path) {
                Some(FileSignal::Up) => {
                    if self.is_repeated_up(Instant::now()) {
                        debug!("Ignoring repeated event for {}", path.display());
                        continue;
                    }
                    info!("Interface up file changed: {}", path.display());
                    if self.restarts.send(()).is_err() {
                        debug!("Restart receiver dropped");
                    }
                }
                Some(FileSignal::Down(path)) => {
                    let as_of = snapshot_as_of(&path);
                    info!("Interface dump file changed: {} (as of {})", path.display(), as_of);
                    if self.snapshots.send(SnapshotEvent { path, as_of }).is_err() {
                        debug!("Snapshot receiver dropped");
                    }
                }
                None => {}
            }
        }
    }
}

/// Watch `dir` for the interface's up and down files.
///
/// The watcher is created eagerly so that a missing directory fails startup;
/// the returned future keeps it alive until `cancel` fires.
pub fn start_watcher(
    dir: &Path,
    files: InterfaceFiles,
    restarts: UnboundedSender<()>,
    snapshots: UnboundedSender<SnapshotEvent>,
    cancel: CancellationToken,
) -> Result<impl Future<Output = ()> + Send + 'static> {
    let mut dispatcher = Dispatcher::new(files, restarts, snapshots);
    let mut watcher =
        notify::recommended_watcher(move |res: notify::Result<Event>| dispatcher.handle(res))?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    info!("Watching directory {}", dir.display());

    Ok(async move {
        cancel.cancelled().await;
        drop(watcher);
        info!("Directory watcher stopped");
    })
}
