//! Actor Coordinator - wires up watch mode
//!
//! Creates the channel, starts the watcher before the backends initialize,
//! then runs both actors until the cancellation token fires.

mod runtime;
pub(crate) mod watch_paths;

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use arc_swap::ArcSwap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::fs::{FsActor, WatchSettings};
use super::messages::ReloadMsg;
use super::reload::ReloadActor;
use crate::dispatch::HotReload;
use crate::report::{ConsoleReporter, SharedReporter};

const CHANNEL_BUFFER: usize = 32;

pub struct Coordinator {
    hot_reload: Arc<HotReload>,
    settings: WatchSettings,
    reporter: SharedReporter,
    cancel: CancellationToken,
}

impl Coordinator {
    pub fn new(hot_reload: Arc<HotReload>) -> Self {
        Self {
            hot_reload,
            settings: WatchSettings::default(),
            reporter: ConsoleReporter::shared(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_settings(mut self, settings: WatchSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_reporter(mut self, reporter: SharedReporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Token whose cancellation stops watch mode.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run watch mode. Returns once cancelled, or early with an error when
    /// the backends cannot be initialized.
    pub async fn run(self) -> Result<()> {
        let graph = Arc::new(ArcSwap::new(self.hot_reload.graph()));
        let (reload_tx, reload_rx) = mpsc::channel::<ReloadMsg>(CHANNEL_BUFFER);

        let fs_actor = FsActor::new(graph.clone(), self.settings, reload_tx.clone())
            .map_err(|e| anyhow!("watcher failed: {}", e))?;

        let root = graph.load().root().identity.name().to_string();
        if let Err(e) = self.hot_reload.initialize(&self.cancel).await {
            self.hot_reload.dispose().await;
            return Err(e).with_context(|| format!("failed to start hot reload for {root}"));
        }
        crate::log!("watch"; "watching {} ({} project(s))", root, graph.load().nodes().len());

        let reload_actor = ReloadActor::new(
            reload_rx,
            self.hot_reload,
            graph,
            self.reporter,
            self.cancel.clone(),
        );

        crate::debug!("actor"; "start");
        runtime::run_actors(fs_actor, reload_actor, reload_tx, self.cancel).await;
        crate::debug!("actor"; "stopped");
        Ok(())
    }
}
