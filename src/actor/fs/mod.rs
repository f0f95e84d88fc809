//! FileSystem Actor
//!
//! Watches every project directory of the graph and sends debounced batches
//! to the ReloadActor. The watcher is created before the backends are
//! initialized so edits made during startup are buffered, not lost.
//!
//! ```text
//! Watcher → Debouncer (timing, dedup) → EventClassifier → ReloadMsg
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use notify::RecommendedWatcher;
use tokio::sync::mpsc;

use super::coordinator::watch_paths::collect_watch_paths;
use super::messages::ReloadMsg;
use crate::core::ProjectGraph;

// Existence correction, filtering and routing.
mod classifier;
// Pure timing and deduplication.
mod debouncer;
// Watch root attach/re-attach lifecycle.
mod watch_roots;


use classifier::EventClassifier;
use debouncer::Debouncer;
pub use debouncer::Timing;
use watch_roots::WatchRoots;

/// Watcher tuning passed down from configuration.
#[derive(Debug, Clone, Default)]
pub struct WatchSettings {
    pub timing: Timing,
    /// Absolute directories whose changes are ignored (asset output).
    pub excluded: Vec<PathBuf>,
}

pub struct FsActor {
    /// Sync side of the notify bridge.
    notify_rx: std::sync::mpsc::Receiver<notify::Result<notify::Event>>,
    /// Must stay alive for events to flow.
    watcher: RecommendedWatcher,
    watch_roots: WatchRoots,
    reload_tx: mpsc::Sender<ReloadMsg>,
    debouncer: Debouncer,
    graph: Arc<ArcSwap<ProjectGraph>>,
    excluded: Vec<PathBuf>,
}

impl FsActor {
    /// Start watching immediately; events buffer until [`FsActor::run`].
    pub fn new(
        graph: Arc<ArcSwap<ProjectGraph>>,
        settings: WatchSettings,
        reload_tx: mpsc::Sender<ReloadMsg>,
    ) -> notify::Result<Self> {
        let (notify_tx, notify_rx) = std::sync::mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = notify_tx.send(res);
        })?;

        let mut watch_roots = WatchRoots::new(collect_watch_paths(&graph.load()));
        watch_roots.attach_existing(&mut watcher)?;

        Ok(Self {
            notify_rx,
            watcher,
            watch_roots,
            reload_tx,
            debouncer: Debouncer::new(settings.timing),
            graph,
            excluded: settings.excluded,
        })
    }

    /// Run until the ReloadActor hangs up.
    pub async fn run(self) {
        let Self {
            notify_rx,
            mut watcher,
            mut watch_roots,
            reload_tx,
            mut debouncer,
            graph,
            excluded,
        } = self;

        let (async_tx, mut async_rx) = mpsc::channel::<notify::Event>(64);
        std::thread::spawn(move || {
            while let Ok(result) = notify_rx.recv() {
                match result {
                    Ok(event) => {
                        if async_tx.blocking_send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => crate::log!("watch"; "notify error: {}", e),
                }
            }
        });

        let mut watched = graph.load_full();
        loop {
            tokio::select! {
                biased;
                Some(event) = async_rx.recv() => debouncer.add_event(&event),
                _ = tokio::time::sleep(debouncer.sleep_duration()) => {
                    let current = graph.load_full();
                    if !Arc::ptr_eq(&current, &watched) {
                        watch_roots.set_desired(collect_watch_paths(&current), &mut watcher);
                        watched = current;
                    }
                    watch_roots.maintain(&mut watcher);

                    if process_changes(&mut debouncer, &reload_tx, &watched, &excluded)
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            }
        }
    }
}

/// Returns `Err(())` once the ReloadActor is gone.
async fn process_changes(
    debouncer: &mut Debouncer,
    reload_tx: &mpsc::Sender<ReloadMsg>,
    graph: &ProjectGraph,
    excluded: &[PathBuf],
) -> Result<(), ()> {
    let Some(raw) = debouncer.take_if_ready() else {
        return Ok(());
    };

    for msg in EventClassifier::new(graph, excluded).classify(raw) {
        crate::debug!("watch"; "{}", msg);
        reload_tx.send(msg).await.map_err(|_| ())?;
    }
    Ok(())
}
