//! Collaborator seams for the incremental compiler.
//!
//! The engine never analyses source itself. An embedding host supplies a
//! [`WorkspaceHost`] that opens projects into a [`Workspace`], which in turn
//! starts a stateful [`HotReloadSession`] producing update records.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::{CapabilitySet, FileChange, ProjectIdentity, UpdateRecord};

/// Severity of a diagnostic raised while a project loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Logged verbosely, never fails construction.
    Warning,
    /// Fails the whole construction.
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceDiagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

/// Where a host reports project-load diagnostics.
///
/// Reporting after construction finished is harmless.
#[derive(Debug, Clone)]
pub struct FaultSink(mpsc::UnboundedSender<WorkspaceDiagnostic>);

impl FaultSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WorkspaceDiagnostic>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }

    pub fn report(&self, kind: DiagnosticKind, message: impl Into<String>) {
        let _ = self.0.send(WorkspaceDiagnostic {
            kind,
            message: message.into(),
        });
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.report(DiagnosticKind::Warning, message);
    }

    pub fn failure(&self, message: impl Into<String>) {
        self.report(DiagnosticKind::Failure, message);
    }
}

/// Opens projects into workspaces.
#[async_trait]
pub trait WorkspaceHost: Send + Sync {
    async fn open_project(
        &self,
        project: &ProjectIdentity,
        faults: FaultSink,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Arc<dyn Workspace>>;
}

/// In-memory view of a project graph.
#[async_trait]
pub trait Workspace: Send + Sync {
    /// Project files in the workspace.
    fn projects(&self) -> Vec<PathBuf>;

    /// Every document, source and non-source.
    fn documents(&self) -> Vec<PathBuf>;

    async fn load_text(&self, document: &Path, cancel: &CancellationToken) -> anyhow::Result<()>;

    /// Full compile of one project.
    async fn compile(&self, project: &Path, cancel: &CancellationToken) -> anyhow::Result<()>;

    async fn start_session(
        &self,
        capabilities: &CapabilitySet,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Box<dyn HotReloadSession>>;
}

/// What a session produced for a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmitResult {
    Updates(Vec<UpdateRecord>),
    /// The edit compiled to nothing observable.
    NoChanges,
    /// The edit cannot be applied; diagnostics say why.
    Blocked(Vec<String>),
}

/// Stateful incremental session bound to one capability set.
#[async_trait]
pub trait HotReloadSession: Send + Sync {
    /// Capabilities the session was started with.
    fn capabilities(&self) -> &CapabilitySet;

    async fn emit_updates(
        &self,
        changes: &[FileChange],
        cancel: &CancellationToken,
    ) -> anyhow::Result<EmitResult>;

    fn end(&self);
}
