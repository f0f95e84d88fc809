//! Coalesced session construction.
//!
//! One construction per project path, shared by every caller through a
//! single [`SessionFuture`]. Construction runs on its own task so it makes
//! progress even when no caller is polling, and every failure path resolves
//! the shared future.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared, try_join_all};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

use super::{
    CompilationSession, DiagnosticKind, FaultSink, WorkspaceDiagnostic, WorkspaceHost,
};
use crate::capabilities::CapabilityFuture;
use crate::core::ProjectIdentity;
use crate::error::SessionError;
use crate::report::SharedReporter;

const MODULE: &str = "session";

pub type SessionResult = Result<Arc<CompilationSession>, Arc<SessionError>>;
pub type SessionFuture = Shared<BoxFuture<'static, SessionResult>>;

/// Builds and caches compilation sessions keyed by project path.
pub struct SessionProvider {
    host: Arc<dyn WorkspaceHost>,
    reporter: SharedReporter,
    sessions: Mutex<FxHashMap<PathBuf, SessionFuture>>,
}

impl SessionProvider {
    pub fn new(host: Arc<dyn WorkspaceHost>, reporter: SharedReporter) -> Self {
        Self {
            host,
            reporter,
            sessions: Mutex::new(FxHashMap::default()),
        }
    }

    /// Get or start the session for `project`.
    ///
    /// Concurrent callers receive clones of the same future. A construction
    /// that already failed is replaced by a fresh attempt. The first caller's
    /// `cancel` governs the shared construction.
    ///
    /// Must be called within a Tokio runtime.
    pub fn create_session(
        &self,
        project: &ProjectIdentity,
        capabilities: CapabilityFuture,
        cancel: &CancellationToken,
    ) -> SessionFuture {
        let mut sessions = self.sessions.lock();
        if let Some(existing) = sessions.get(&project.path)
            && !matches!(existing.peek(), Some(Err(_)))
        {
            return existing.clone();
        }

        crate::debug!(MODULE; "constructing session for {}", project.path.display());
        let task = tokio::spawn(construct(
            Arc::clone(&self.host),
            project.clone(),
            capabilities,
            cancel.clone(),
            Arc::clone(&self.reporter),
        ));
        let future = async move {
            match task.await {
                Ok(result) => result,
                Err(join) => Err(Arc::new(SessionError::Aborted(join.to_string()))),
            }
        }
        .boxed()
        .shared();

        sessions.insert(project.path.clone(), future.clone());
        future
    }

    /// Convenience: create (or join) and await.
    pub async fn session(
        &self,
        project: &ProjectIdentity,
        capabilities: CapabilityFuture,
        cancel: &CancellationToken,
    ) -> SessionResult {
        self.create_session(project, capabilities, cancel).await
    }

    /// Whether a construction (in flight or finished) is cached for `path`.
    pub fn is_cached(&self, path: &Path) -> bool {
        self.sessions.lock().contains_key(path)
    }

    /// Drop the cached session for one project. Returns whether one existed.
    pub fn invalidate(&self, path: &Path) -> bool {
        self.sessions.lock().remove(path).is_some()
    }

    /// Drop every cached session.
    pub fn clear(&self) {
        self.sessions.lock().clear();
    }
}

/// Open, negotiate, start, warm. Every error resolves the result.
async fn construct(
    host: Arc<dyn WorkspaceHost>,
    project: ProjectIdentity,
    capabilities: CapabilityFuture,
    cancel: CancellationToken,
    reporter: SharedReporter,
) -> SessionResult {
    let (sink, mut faults) = FaultSink::channel();

    let work = async {
        let (workspace, capabilities) = tokio::join!(
            host.open_project(&project, sink.clone(), &cancel),
            capabilities
        );
        let workspace = workspace.map_err(|err| SessionError::ProjectLoad {
            path: project.path.clone(),
            message: format!("{err:#}"),
        })?;

        let session = workspace
            .start_session(&capabilities, &cancel)
            .await
            .map_err(|err| SessionError::host(&err))?;
        if session.capabilities() != &capabilities {
            let bound = session.capabilities().clone();
            session.end();
            return Err(SessionError::CapabilityMismatch {
                bound,
                resolved: capabilities,
            });
        }
        let compilation = CompilationSession::new(
            project.clone(),
            Arc::clone(&workspace),
            session,
            capabilities,
        );

        let documents = workspace.documents();
        try_join_all(documents.iter().map(|doc| workspace.load_text(doc, &cancel)))
            .await
            .map_err(|err| SessionError::host(&err))?;

        let projects = workspace.projects();
        try_join_all(projects.iter().map(|p| workspace.compile(p, &cancel)))
            .await
            .map_err(|err| SessionError::host(&err))?;

        reporter.verbose(
            MODULE,
            &format!(
                "session ready for {} ({} documents, {} projects)",
                project.name(),
                documents.len(),
                projects.len()
            ),
        );
        Ok(compilation)
    };

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SessionError::Cancelled),
        fault = first_failure(&project, &mut faults, &reporter) => Err(fault),
        result = work => result,
    };
    drop(sink);

    // Failures reported right before the work finished still count.
    let result = result.and_then(|session| match drain(&project, &mut faults, &reporter) {
        Some(fault) => Err(fault),
        None => Ok(session),
    });

    result.map(Arc::new).map_err(|err| {
        reporter.verbose(MODULE, &format!("session construction failed: {err}"));
        Arc::new(err)
    })
}

/// Resolves with the first non-warning diagnostic; warnings are logged.
async fn first_failure(
    project: &ProjectIdentity,
    faults: &mut UnboundedReceiver<WorkspaceDiagnostic>,
    reporter: &SharedReporter,
) -> SessionError {
    while let Some(diagnostic) = faults.recv().await {
        if let Some(fault) = classify_fault(project, diagnostic, reporter) {
            return fault;
        }
    }
    std::future::pending().await
}

fn drain(
    project: &ProjectIdentity,
    faults: &mut UnboundedReceiver<WorkspaceDiagnostic>,
    reporter: &SharedReporter,
) -> Option<SessionError> {
    while let Ok(diagnostic) = faults.try_recv() {
        if let Some(fault) = classify_fault(project, diagnostic, reporter) {
            return Some(fault);
        }
    }
    None
}

fn classify_fault(
    project: &ProjectIdentity,
    diagnostic: WorkspaceDiagnostic,
    reporter: &SharedReporter,
) -> Option<SessionError> {
    match diagnostic.kind {
        DiagnosticKind::Warning => {
            reporter.verbose(MODULE, &diagnostic.message);
            None
        }
        DiagnosticKind::Failure => Some(SessionError::ProjectLoad {
            path: project.path.clone(),
            message: diagnostic.message,
        }),
    }
}
