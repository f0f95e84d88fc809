//! File change dispatcher.
//!
//! [`HotReload`] owns the content handlers, the classifier and one backend
//! per [`BackendKind`]. A batch flows through it like this:
//!
//! ```text
//! batch (newest last)
//!   │
//!   ├─ newest → oldest: static asset handler, then scoped css handler
//!   │
//!   └─ partition by owning project (first appearance order)
//!        └─ classify → backend.try_handle(project, partition)
//!              (skipped when every file of the partition was consumed above)
//! ```
//!
//! The caller serializes dispatches; `HotReload` is not re-entrant per session.


use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio_util::sync::CancellationToken;

use crate::backend::CompilationBackend;
use crate::classify::{BackendKind, ProjectClassifier};
use crate::core::{FileChange, HandlerOutcome, ProjectGraph, ProjectIdentity, ProjectNode};
use crate::error::{HotReloadError, Result};
use crate::handlers::ContentHandler;
use crate::report::{ConsoleReporter, SharedReporter};

const MODULE: &str = "hotreload";

/// Hot reload orchestrator for one watched project graph.
pub struct HotReload {
    graph: ArcSwap<ProjectGraph>,
    classifier: ProjectClassifier,
    handlers: Vec<Arc<dyn ContentHandler>>,
    backends: FxHashMap<BackendKind, Arc<dyn CompilationBackend>>,
    reporter: SharedReporter,
}

/// Builder for [`HotReload`].
pub struct HotReloadBuilder {
    graph: ProjectGraph,
    classifier: ProjectClassifier,
    handlers: Vec<Arc<dyn ContentHandler>>,
    backends: FxHashMap<BackendKind, Arc<dyn CompilationBackend>>,
    reporter: SharedReporter,
}

impl HotReloadBuilder {
    pub fn classifier(mut self, classifier: ProjectClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Append a content handler. Handlers are tried in insertion order.
    pub fn handler(mut self, handler: Arc<dyn ContentHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Register a backend under its own kind, replacing any previous one.
    pub fn backend(mut self, backend: Arc<dyn CompilationBackend>) -> Self {
        self.backends.insert(backend.kind(), backend);
        self
    }

    pub fn reporter(mut self, reporter: SharedReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn build(self) -> HotReload {
        HotReload {
            graph: ArcSwap::from_pointee(self.graph),
            classifier: self.classifier,
            handlers: self.handlers,
            backends: self.backends,
            reporter: self.reporter,
        }
    }
}

impl HotReload {
    pub fn builder(graph: ProjectGraph) -> HotReloadBuilder {
        HotReloadBuilder {
            graph,
            classifier: ProjectClassifier::default(),
            handlers: Vec::new(),
            backends: FxHashMap::default(),
            reporter: ConsoleReporter::shared(),
        }
    }

    /// Current project graph.
    pub fn graph(&self) -> Arc<ProjectGraph> {
        self.graph.load_full()
    }

    pub fn classifier(&self) -> &ProjectClassifier {
        &self.classifier
    }

    /// Backend kinds needed by the graph, root first.
    pub fn required_backends(&self) -> Vec<BackendKind> {
        let graph = self.graph.load();
        let mut kinds = Vec::new();
        for node in graph.nodes() {
            let kind = self.classifier.classify(&node.identity);
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        kinds
    }

    /// Initialize every backend the graph needs.
    ///
    /// Fails with [`HotReloadError::MissingBackend`] when a project
    /// classifies to a kind nobody registered.
    pub async fn initialize(&self, cancel: &CancellationToken) -> Result<()> {
        let graph = self.graph.load_full();
        for kind in self.required_backends() {
            let backend = self.backend(kind)?;
            crate::debug!(MODULE; "initializing {} backend for {}", kind, graph.root().identity.name());
            backend.initialize(&graph, cancel).await?;
        }
        Ok(())
    }

    /// Offer a batch to the content handlers and the owning backends.
    ///
    /// Returns whether anything handled it. An empty batch is a no-op.
    pub async fn try_handle_file_change(
        &self,
        changes: &[FileChange],
        cancel: &CancellationToken,
    ) -> Result<bool> {
        if changes.is_empty() {
            return Ok(false);
        }

        self.reporter.verbose(MODULE, "start (main)");
        let result = self.dispatch(changes, cancel).await;
        self.reporter.verbose(MODULE, "end (main)");
        result
    }

    async fn dispatch(&self, changes: &[FileChange], cancel: &CancellationToken) -> Result<bool> {
        let graph = self.graph.load_full();
        let mut handled = false;
        let mut consumed = FxHashSet::default();

        for (index, change) in changes.iter().enumerate().rev() {
            if cancel.is_cancelled() {
                return Err(HotReloadError::Cancelled);
            }
            let project = &owner(&graph, change).identity;
            if self.offer_to_handlers(project, change, cancel).await {
                handled = true;
                consumed.insert(index);
            }
        }

        for (node, batch) in partition(&graph, changes) {
            if batch.iter().all(|(index, _)| consumed.contains(index)) {
                continue;
            }
            if cancel.is_cancelled() {
                return Err(HotReloadError::Cancelled);
            }

            let kind = self.classifier.classify(&node.identity);
            let backend = self.backend(kind)?;
            let batch: Vec<FileChange> = batch.into_iter().map(|(_, c)| c.clone()).collect();
            crate::debug!(MODULE; "{} file(s) → {} backend for {}", batch.len(), kind, node.identity.name());

            let outcome = backend.try_handle(node, &batch, cancel).await?;
            self.report_outcome(node, &outcome);
            handled |= outcome.handled;
        }

        Ok(handled)
    }

    /// Static asset handler first, then the scoped style handler; the first
    /// match wins. Handler errors are reported and count as not handled.
    async fn offer_to_handlers(
        &self,
        project: &ProjectIdentity,
        change: &FileChange,
        cancel: &CancellationToken,
    ) -> bool {
        for handler in &self.handlers {
            match handler.try_handle(project, change, cancel).await {
                Ok(true) => {
                    crate::debug!(MODULE; "{} handled {}", handler.name(), change.path.display());
                    return true;
                }
                Ok(false) => {}
                Err(err) => self.reporter.error(
                    MODULE,
                    &format!("{} failed for {}: {err:#}", handler.name(), change.path.display()),
                ),
            }
        }
        false
    }

    fn report_outcome(&self, node: &ProjectNode, outcome: &HandlerOutcome) {
        let Some(diagnostic) = &outcome.diagnostic else {
            return;
        };
        let message = format!("{}: {diagnostic}", node.identity.name());
        if outcome.handled {
            self.reporter.error(MODULE, &message);
        } else {
            self.reporter.warn(MODULE, &message);
        }
    }

    /// Swap in a reloaded graph.
    ///
    /// When the topology changed, the classification cache is dropped and
    /// every backend is disposed and initialized again. Returns whether a
    /// rebuild happened.
    pub async fn reload_project(&self, graph: ProjectGraph, cancel: &CancellationToken) -> Result<bool> {
        let previous = self.graph.load_full();
        if previous.fingerprint() == graph.fingerprint() {
            self.graph.store(Arc::new(graph));
            return Ok(false);
        }

        self.reporter.output(
            MODULE,
            &format!("project graph of {} changed, rebuilding session", graph.root().identity.name()),
        );
        self.dispose().await;
        self.classifier.clear();
        self.graph.store(Arc::new(graph));
        self.initialize(cancel).await?;
        Ok(true)
    }

    /// Dispose every registered backend. Safe to call repeatedly.
    pub async fn dispose(&self) {
        for kind in [BackendKind::Incremental, BackendKind::Recompile] {
            if let Some(backend) = self.backends.get(&kind) {
                backend.dispose().await;
            }
        }
    }

    fn backend(&self, kind: BackendKind) -> Result<&Arc<dyn CompilationBackend>> {
        self.backends
            .get(&kind)
            .ok_or(HotReloadError::MissingBackend(kind))
    }
}

/// Project owning a change: the recorded project if it is in the graph,
/// else the graph's best match, else the root.
fn owner<'g>(graph: &'g ProjectGraph, change: &FileChange) -> &'g ProjectNode {
    change
        .project
        .as_deref()
        .and_then(|path| graph.get(path))
        .or_else(|| graph.owner_of(&change.path))
        .unwrap_or_else(|| graph.root())
}

/// Group changes by owning project, keeping first-appearance order of
/// projects and batch order within each group.
fn partition<'g, 'c>(
    graph: &'g ProjectGraph,
    changes: &'c [FileChange],
) -> Vec<(&'g ProjectNode, Vec<(usize, &'c FileChange)>)> {
    let mut groups: Vec<(&ProjectNode, Vec<(usize, &FileChange)>)> = Vec::new();
    let mut slots: FxHashMap<PathBuf, usize> = FxHashMap::default();

    for (index, change) in changes.iter().enumerate() {
        let node = owner(graph, change);
        let slot = *slots.entry(node.path().to_path_buf()).or_insert_with(|| {
            groups.push((node, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push((index, change));
    }
    groups
}
