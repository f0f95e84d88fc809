//! Compilation backends.
//!
//! A backend turns a batch of changed files into update records and pushes
//! them through the delta applier it owns.
//!
//! # Module Structure
//!
//! ```text
//! backend/
//! ├── incremental.rs  # Long-lived session, method-level deltas
//! ├── recompile.rs    # Full rebuild, whole-module replacement
//! └── mod.rs          # CompilationBackend trait (this file)
//! ```

mod incremental;
mod recompile;

#[cfg(test)]
mod tests;

pub use incremental::IncrementalBackend;
pub use recompile::{CommandRebuilder, RebuildRequest, Rebuilder, RecompileBackend};

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::applier::{ApplierFactory, DeltaApplier};
use crate::classify::BackendKind;
use crate::core::{FileChange, HandlerOutcome, ProjectGraph, ProjectNode};
use crate::error::Result;

const MODULE: &str = "hotreload";

/// One compilation strategy.
#[async_trait]
pub trait CompilationBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Create and connect the applier. Calling it again is a no-op until
    /// the backend is disposed.
    async fn initialize(&self, graph: &ProjectGraph, cancel: &CancellationToken) -> Result<()>;

    /// Offer the changes owned by `project`.
    async fn try_handle(
        &self,
        project: &ProjectNode,
        changes: &[FileChange],
        cancel: &CancellationToken,
    ) -> Result<HandlerOutcome>;

    /// Release the applier and any scratch state. Safe to call repeatedly.
    async fn dispose(&self);
}

/// Applier slot shared by both backends.
struct ApplierSlot<T> {
    factory: ApplierFactory,
    active: Mutex<Option<(Arc<DeltaApplier>, T)>>,
}

impl<T: Clone> ApplierSlot<T> {
    fn new(factory: ApplierFactory) -> Self {
        Self {
            factory,
            active: Mutex::new(None),
        }
    }

    fn get(&self) -> Option<(Arc<DeltaApplier>, T)> {
        self.active.lock().clone()
    }

    /// Build and connect an applier for `graph`, unless one is active.
    async fn connect(
        &self,
        graph: &ProjectGraph,
        cancel: &CancellationToken,
    ) -> Result<Option<Arc<DeltaApplier>>> {
        if self.active.lock().is_some() {
            return Ok(None);
        }
        let applier = Arc::new(self.factory.create(graph)?);
        crate::debug!(MODULE; "using {} applier", applier.profile());
        applier.initialize(cancel).await?;
        Ok(Some(applier))
    }

    fn store(&self, applier: Arc<DeltaApplier>, state: T) {
        *self.active.lock() = Some((applier, state));
    }

    async fn release(&self) -> Option<T> {
        let taken = self.active.lock().take();
        match taken {
            Some((applier, state)) => {
                applier.dispose().await;
                Some(state)
            }
            None => None,
        }
    }
}
