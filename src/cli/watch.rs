//! `deltawatch watch`: assemble the orchestrator and run watch mode.
//!
//! ```text
//! WatchConfig ─► load_graph ─► assemble ─► Coordinator::run
//!                               ├─ agent / browser channels
//!                               ├─ content handlers
//!                               └─ backends
//! ```

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio_util::sync::CancellationToken;

use crate::actor::Coordinator;
use crate::applier::{AgentClient, ApplierFactory, BrowserHub, RuntimeProfile};
use crate::backend::{CommandRebuilder, IncrementalBackend, RecompileBackend};
use crate::capabilities::CapabilityNegotiator;
use crate::classify::{BackendKind, ProjectClassifier};
use crate::config::WatchConfig;
use crate::core::{ProjectGraph, register_root_token};
use crate::dispatch::HotReload;
use crate::handlers::{BrowserRefresh, ScopedCssHandler, StaticAssetHandler};
use crate::log;
use crate::report::{ConsoleReporter, SharedReporter};
use crate::session::{SessionProvider, WorkspaceHost};

/// Channels opened by [`assemble`]. Appliers only attach to them, so they
/// stay open across session rebuilds until [`Channels::close`].
pub struct Channels {
    pub agent: Arc<AgentClient>,
    pub browser: Option<Arc<BrowserHub>>,
}

impl Channels {
    pub async fn close(&self) {
        if let Some(hub) = &self.browser {
            hub.close();
        }
        self.agent.close().await;
    }
}

/// Build a [`HotReload`] for `graph` from configuration.
///
/// `workspace` supplies the incremental compiler. Without it, every project
/// in the graph must classify to the recompile backend.
pub fn assemble(
    config: &WatchConfig,
    graph: ProjectGraph,
    workspace: Option<Arc<dyn WorkspaceHost>>,
    reporter: SharedReporter,
) -> Result<(HotReload, Channels)> {
    let classifier = ProjectClassifier::new(&config.backend.recompile_markers);
    if workspace.is_none()
        && let Some(node) = graph
            .nodes()
            .iter()
            .find(|node| classifier.classify(&node.identity) == BackendKind::Incremental)
    {
        bail!(
            "{} needs the incremental compiler, which the command-line watcher cannot host; \
             embed deltawatch with a WorkspaceHost, or add its marker to [backend] recompile_markers",
            node.identity.name()
        );
    }

    let agent = Arc::new(AgentClient::new(
        config.runtime.agent.clone(),
        config.runtime.agent_timeout(),
    ));
    let mut factory = ApplierFactory::new()
        .with_profile(config.runtime.profile.forced())
        .with_agent(agent.clone());

    let profile = factory.profile_for(&graph);
    crate::debug!("watch"; "runtime profile: {}", profile);
    let browser = if profile == RuntimeProfile::Process {
        None
    } else {
        let hub = BrowserHub::start(config.runtime.browser_port)
            .context("failed to start the browser WebSocket server")?;
        log!("browser"; "waiting for browsers on ws://127.0.0.1:{}", hub.port());
        factory = factory.with_browser(hub.clone());
        Some(hub)
    };

    let mut assets = StaticAssetHandler::new(&config.assets.static_dir, &config.assets.output);
    let mut scoped = ScopedCssHandler::new(&config.assets.output);
    if let Some(hub) = &browser {
        let refresh: Arc<dyn BrowserRefresh> = hub.clone();
        assets = assets.with_refresh(refresh.clone());
        scoped = scoped.with_refresh(refresh);
    }

    let rebuilder = Arc::new(CommandRebuilder::new(config.rebuild.command.clone()));
    let mut builder = HotReload::builder(graph)
        .classifier(classifier)
        .reporter(reporter.clone())
        .handler(Arc::new(assets))
        .handler(Arc::new(scoped))
        .backend(Arc::new(RecompileBackend::new(
            rebuilder,
            config.backend.source_extensions.clone(),
            factory.clone(),
            reporter.clone(),
        )));

    if let Some(host) = workspace {
        let provider = Arc::new(SessionProvider::new(host, reporter.clone()));
        let negotiator = CapabilityNegotiator::new(config.capabilities.timeout(), reporter.clone());
        builder = builder.backend(Arc::new(IncrementalBackend::new(
            provider, negotiator, factory, reporter,
        )));
    }

    Ok((builder.build(), Channels { agent, browser }))
}

/// Run watch mode until Ctrl+C.
pub fn run_watch(config: &WatchConfig) -> Result<()> {
    let graph = crate::project::load_graph(config.project_path())?;
    let settings = config.watch_settings(&graph);
    let reporter = ConsoleReporter::shared();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    rt.block_on(async {
        let (hot_reload, channels) = assemble(config, graph, None, reporter.clone())?;
        let cancel = register_root_token(CancellationToken::new());

        let result = Coordinator::new(Arc::new(hot_reload))
            .with_settings(settings)
            .with_reporter(reporter)
            .with_cancel(cancel)
            .run()
            .await;
        channels.close().await;
        result
    })
}
