//! Reload Actor
//!
//! Owns the [`HotReload`] orchestrator and feeds it one batch at a time,
//! which is what serializes dispatch for the session.

use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::messages::ReloadMsg;
use crate::core::{FileChange, ProjectGraph};
use crate::dispatch::HotReload;
use crate::logger::WatchStatus;
use crate::report::SharedReporter;

pub struct ReloadActor {
    rx: mpsc::Receiver<ReloadMsg>,
    hot_reload: Arc<HotReload>,
    /// Shared with the FsActor so routing follows graph reloads.
    graph: Arc<ArcSwap<ProjectGraph>>,
    reporter: SharedReporter,
    cancel: CancellationToken,
    status: WatchStatus,
}

impl ReloadActor {
    pub fn new(
        rx: mpsc::Receiver<ReloadMsg>,
        hot_reload: Arc<HotReload>,
        graph: Arc<ArcSwap<ProjectGraph>>,
        reporter: SharedReporter,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            rx,
            hot_reload,
            graph,
            reporter,
            cancel,
            status: WatchStatus::new(),
        }
    }

    /// Process messages until shutdown, then dispose every backend.
    pub async fn run(mut self) {
        loop {
            let msg = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                msg = self.rx.recv() => msg,
            };
            match msg {
                Some(ReloadMsg::Changes(changes)) => self.handle_changes(changes).await,
                Some(ReloadMsg::ProjectChanged(paths)) => self.handle_project_changed(paths).await,
                Some(ReloadMsg::Shutdown) | None => break,
            }
        }

        crate::debug!("reload"; "disposing backends");
        self.hot_reload.dispose().await;
    }

    async fn handle_changes(&mut self, changes: Vec<FileChange>) {
        let cancel = self.cancel.child_token();
        match self.hot_reload.try_handle_file_change(&changes, &cancel).await {
            Ok(true) => self.status.success(&summary(&changes)),
            Ok(false) => {
                for change in &changes {
                    self.reporter.output(
                        "watch",
                        &format!("unhandled change: {}", change.path.display()),
                    );
                }
            }
            Err(e) if e.is_cancelled() => {
                crate::debug!("reload"; "batch cancelled");
            }
            Err(e) => self.status.error("hot reload failed", &e.to_string()),
        }
    }

    async fn handle_project_changed(&mut self, paths: Vec<PathBuf>) {
        for path in &paths {
            crate::debug!("reload"; "project file changed: {}", path.display());
        }

        let root = self.hot_reload.graph().root().path().to_path_buf();
        let loaded = tokio::task::spawn_blocking(move || crate::project::load_graph(&root)).await;
        let graph = match loaded {
            Ok(Ok(graph)) => graph,
            Ok(Err(e)) => {
                self.status.error("failed to reload project", &e.to_string());
                return;
            }
            Err(e) => {
                self.status.error("failed to reload project", &e.to_string());
                return;
            }
        };

        let cancel = self.cancel.child_token();
        match self.hot_reload.reload_project(graph, &cancel).await {
            Ok(true) => self.status.success("project reloaded"),
            Ok(false) => self.status.unchanged("project unchanged"),
            Err(e) => self.status.error("failed to rebuild session", &e.to_string()),
        }
        self.graph.store(self.hot_reload.graph());
    }
}

fn summary(changes: &[FileChange]) -> String {
    match changes {
        [single] => format!(
            "reloaded {}",
            single
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        ),
        _ => format!("reloaded {} files", changes.len()),
    }
}
