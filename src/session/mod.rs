//! Compilation sessions.
//!
//! # Module Structure
//!
//! ```text
//! session/
//! ├── workspace.rs   # Host, workspace and session traits
//! ├── provider.rs    # Coalesced, pre-warmed session construction
//! └── mod.rs         # CompilationSession (this file)
//! ```

mod provider;
mod workspace;


pub use provider::{SessionFuture, SessionProvider, SessionResult};
pub use workspace::{
    DiagnosticKind, EmitResult, FaultSink, HotReloadSession, Workspace, WorkspaceDiagnostic,
    WorkspaceHost,
};

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::core::{CapabilitySet, FileChange, ProjectIdentity};

/// A warmed workspace and its hot reload session, bound to the capability
/// set they were constructed with.
///
/// Emission is serialized: at most one batch is in flight per session.
/// Dropping the last reference ends the session.
pub struct CompilationSession {
    project: ProjectIdentity,
    workspace: Arc<dyn Workspace>,
    session: Box<dyn HotReloadSession>,
    capabilities: CapabilitySet,
    in_flight: tokio::sync::Mutex<()>,
}

impl CompilationSession {
    pub(crate) fn new(
        project: ProjectIdentity,
        workspace: Arc<dyn Workspace>,
        session: Box<dyn HotReloadSession>,
        capabilities: CapabilitySet,
    ) -> Self {
        Self {
            project,
            workspace,
            session,
            capabilities,
            in_flight: tokio::sync::Mutex::new(()),
        }
    }

    pub fn project(&self) -> &ProjectIdentity {
        &self.project
    }

    pub fn workspace(&self) -> &Arc<dyn Workspace> {
        &self.workspace
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    pub async fn emit_updates(
        &self,
        changes: &[FileChange],
        cancel: &CancellationToken,
    ) -> anyhow::Result<EmitResult> {
        let _guard = self.in_flight.lock().await;
        self.session.emit_updates(changes, cancel).await
    }
}

impl Drop for CompilationSession {
    fn drop(&mut self) {
        self.session.end();
    }
}

impl std::fmt::Debug for CompilationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompilationSession")
            .field("project", &self.project.path)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}
