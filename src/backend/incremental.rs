//! Incremental session backend.
//!
//! Construction of the session starts on `initialize` so that loading and
//! warming overlap with application startup; the first batch awaits it.

use std::sync::Arc;

use async_trait::async_trait;
use rustc_hash::FxHashSet;
use tokio_util::sync::CancellationToken;

use super::{ApplierSlot, CompilationBackend, MODULE};
use crate::applier::ApplierFactory;
use crate::capabilities::{CapabilityFuture, CapabilityNegotiator};
use crate::classify::BackendKind;
use crate::core::{FileChange, HandlerOutcome, ProjectGraph, ProjectIdentity, ProjectNode};
use crate::error::{HotReloadError, Result};
use crate::report::SharedReporter;
use crate::session::{EmitResult, SessionProvider};

#[derive(Clone)]
struct Active {
    root: ProjectIdentity,
    capabilities: CapabilityFuture,
}

pub struct IncrementalBackend {
    provider: Arc<SessionProvider>,
    negotiator: CapabilityNegotiator,
    slot: ApplierSlot<Active>,
    reporter: SharedReporter,
}

impl IncrementalBackend {
    pub fn new(
        provider: Arc<SessionProvider>,
        negotiator: CapabilityNegotiator,
        factory: ApplierFactory,
        reporter: SharedReporter,
    ) -> Self {
        Self {
            provider,
            negotiator,
            slot: ApplierSlot::new(factory),
            reporter,
        }
    }

    pub fn provider(&self) -> &Arc<SessionProvider> {
        &self.provider
    }
}

#[async_trait]
impl CompilationBackend for IncrementalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Incremental
    }

    async fn initialize(&self, graph: &ProjectGraph, cancel: &CancellationToken) -> Result<()> {
        let Some(applier) = self.slot.connect(graph, cancel).await? else {
            return Ok(());
        };
        let capabilities = self.negotiator.resolve(applier.clone(), cancel.clone());
        let root = graph.root().identity.clone();

        // Start construction now; the first batch joins it.
        let _ = self
            .provider
            .create_session(&root, capabilities.clone(), cancel);
        self.slot.store(applier, Active { root, capabilities });
        Ok(())
    }

    async fn try_handle(
        &self,
        _project: &ProjectNode,
        changes: &[FileChange],
        cancel: &CancellationToken,
    ) -> Result<HandlerOutcome> {
        let (applier, active) = self
            .slot
            .get()
            .ok_or(HotReloadError::NotInitialized("incremental"))?;

        let pending = self
            .provider
            .create_session(&active.root, active.capabilities.clone(), cancel);
        // The construction may be shared with `initialize`; only this batch
        // stops waiting.
        let session = tokio::select! {
            _ = cancel.cancelled() => return Err(HotReloadError::Cancelled),
            session = pending => session?,
        };

        let documents: FxHashSet<_> = session.workspace().documents().into_iter().collect();
        let known: Vec<FileChange> = changes
            .iter()
            .filter(|change| documents.contains(&change.path))
            .cloned()
            .collect();
        if known.is_empty() {
            return Ok(HandlerOutcome::unhandled());
        }

        let updates = tokio::select! {
            _ = cancel.cancelled() => return Err(HotReloadError::Cancelled),
            emitted = session.emit_updates(&known, cancel) => emitted?,
        };

        match updates {
            EmitResult::NoChanges => {
                self.reporter.verbose(MODULE, "No hot reload changes to apply.");
                Ok(HandlerOutcome::handled())
            }
            EmitResult::Blocked(diagnostics) => {
                Ok(HandlerOutcome::unhandled_with(diagnostics.join("\n")))
            }
            EmitResult::Updates(records) => {
                let count = records.len();
                if applier.apply(&records, cancel).await? {
                    self.reporter.output(MODULE, "🔥 Hot reload of changes succeeded.");
                    crate::debug!(MODULE; "applied {} update(s)", count);
                    Ok(HandlerOutcome::handled())
                } else {
                    Ok(HandlerOutcome::failed(
                        "the running application rejected the hot reload update",
                    ))
                }
            }
        }
    }

    async fn dispose(&self) {
        if let Some(active) = self.slot.release().await {
            self.provider.invalidate(&active.root.path);
        }
    }
}
