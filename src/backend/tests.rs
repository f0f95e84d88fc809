use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::applier::{DeltaChannel, RuntimeProfile};
use crate::capabilities::CapabilityNegotiator;
use crate::core::{CapabilitySet, ProjectIdentity, UpdateRecord};
use crate::error::{HotReloadError, TransportError};
use crate::image::{TYPE_DEF_TOKEN, fixture};
use crate::report::{Level, MemoryReporter};
use crate::session::{
    EmitResult, FaultSink, HotReloadSession, SessionProvider, Workspace, WorkspaceHost,
};

const MVID: [u8; 16] = [
    0x78, 0x56, 0x34, 0x12, 0xbc, 0x9a, 0xf0, 0xde, 0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef,
];

/// Channel recording every batch it receives.
struct RecordingChannel {
    verdict: bool,
    batches: Mutex<Vec<Vec<UpdateRecord>>>,
}

impl RecordingChannel {
    fn new(verdict: bool) -> Arc<Self> {
        Arc::new(Self {
            verdict,
            batches: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl DeltaChannel for RecordingChannel {
    fn name(&self) -> &'static str {
        "agent"
    }

    async fn connect(&self, _: &CancellationToken) -> std::result::Result<(), TransportError> {
        Ok(())
    }

    async fn capabilities(&self) -> std::result::Result<CapabilitySet, TransportError> {
        Ok(CapabilitySet::parse("Baseline AddMethodToExistingType"))
    }

    async fn apply(&self, updates: &[UpdateRecord]) -> std::result::Result<bool, TransportError> {
        self.batches.lock().push(updates.to_vec());
        Ok(self.verdict)
    }
}

fn factory(channel: &Arc<RecordingChannel>) -> ApplierFactory {
    ApplierFactory::new()
        .with_profile(Some(RuntimeProfile::Process))
        .with_agent(channel.clone())
}

// ============================================================================
// Recompile backend
// ============================================================================

/// Writes a synthesized module (and optionally its symbols) to the output.
struct FixtureRebuilder {
    type_defs: u32,
    write_pdb: bool,
    requests: Mutex<Vec<RebuildRequest>>,
}

impl FixtureRebuilder {
    fn new(type_defs: u32, write_pdb: bool) -> Arc<Self> {
        Arc::new(Self {
            type_defs,
            write_pdb,
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Rebuilder for FixtureRebuilder {
    async fn rebuild(
        &self,
        request: &RebuildRequest,
        _: &CancellationToken,
    ) -> anyhow::Result<()> {
        self.requests.lock().push(request.clone());
        fs::write(&request.output, fixture::build_image(MVID, self.type_defs))?;
        if self.write_pdb {
            fs::write(request.output.with_extension("pdb"), b"BSJB-pdb")?;
        }
        Ok(())
    }
}

/// Produces output on the first rebuild only, then succeeds silently.
struct FirstBuildOnly {
    inner: Arc<FixtureRebuilder>,
    calls: AtomicUsize,
}

#[async_trait]
impl Rebuilder for FirstBuildOnly {
    async fn rebuild(
        &self,
        request: &RebuildRequest,
        cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            self.inner.rebuild(request, cancel).await?;
        }
        Ok(())
    }
}

struct FailingRebuilder;

#[async_trait]
impl Rebuilder for FailingRebuilder {
    async fn rebuild(&self, _: &RebuildRequest, _: &CancellationToken) -> anyhow::Result<()> {
        anyhow::bail!("Program.fs(3,5): error FS0039: The value 'prnt' is not defined")
    }
}

fn fsharp_project(dir: &Path) -> ProjectNode {
    fs::write(dir.join("App.fsproj"), "<Project />").unwrap();
    fs::write(dir.join("Program.fs"), "printfn \"hi\"").unwrap();
    fs::write(dir.join("Lib.fs"), "module Lib").unwrap();
    fs::write(dir.join("notes.md"), "# notes").unwrap();
    let mut identity = ProjectIdentity::from_path(dir.join("App.fsproj"));
    identity.run_command = Some("dotnet run".into());
    identity.target_framework = Some("6.0".into());
    ProjectNode::new(identity)
}

fn recompile(
    rebuilder: Arc<dyn Rebuilder>,
    channel: &Arc<RecordingChannel>,
) -> (RecompileBackend, Arc<MemoryReporter>) {
    let reporter = MemoryReporter::new();
    let backend = RecompileBackend::new(
        rebuilder,
        vec!["fs".into()],
        factory(channel),
        reporter.clone(),
    );
    (backend, reporter)
}

#[tokio::test]
async fn test_recompile_emits_one_full_module_record() {
    let dir = TempDir::new().unwrap();
    let node = fsharp_project(dir.path());
    let graph = ProjectGraph::single(node.clone());
    let channel = RecordingChannel::new(true);
    let rebuilder = FixtureRebuilder::new(4, true);
    let (backend, reporter) = recompile(rebuilder.clone(), &channel);
    let cancel = CancellationToken::new();

    backend.initialize(&graph, &cancel).await.unwrap();
    let change = FileChange::modified(dir.path().join("Program.fs"));
    let outcome = backend.try_handle(&node, &[change], &cancel).await.unwrap();

    assert_eq!(outcome, HandlerOutcome::handled());
    let batches = channel.batches.lock();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 1);
    let record = &batches[0][0];
    assert_eq!(record.module_id, uuid::Uuid::from_bytes_le(MVID));
    assert_eq!(record.updated_types.len(), 4);
    assert_eq!(record.updated_types[0], TYPE_DEF_TOKEN | 1);
    assert!(!record.il_delta.is_empty());
    assert!(record.metadata_delta.is_empty());
    assert_eq!(record.pdb_delta, b"BSJB-pdb");

    let request = &rebuilder.requests.lock()[0];
    let names: Vec<_> = request
        .sources
        .iter()
        .map(|p| p.file_name().unwrap().to_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Lib.fs", "Program.fs"]);

    let output = reporter.messages(Level::Output);
    assert_eq!(
        output,
        vec![
            format!("**cwd:{}", dir.path().display()),
            "**cmd:dotnet run".to_string(),
            "**ver:6.0".to_string(),
            "**apply success: true".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_recompile_prefers_explicit_compile_items() {
    let dir = TempDir::new().unwrap();
    let mut node = fsharp_project(dir.path());
    node.compile_items = vec![dir.path().join("Program.fs")];
    let channel = RecordingChannel::new(true);
    let rebuilder = FixtureRebuilder::new(1, true);
    let (backend, _) = recompile(rebuilder.clone(), &channel);
    let cancel = CancellationToken::new();

    backend
        .initialize(&ProjectGraph::single(node.clone()), &cancel)
        .await
        .unwrap();
    backend.try_handle(&node, &[], &cancel).await.unwrap();

    assert_eq!(
        rebuilder.requests.lock()[0].sources,
        vec![dir.path().join("Program.fs")]
    );
}

#[tokio::test]
async fn test_recompile_failure_is_handled_with_diagnostic() {
    let dir = TempDir::new().unwrap();
    let node = fsharp_project(dir.path());
    let channel = RecordingChannel::new(true);
    let (backend, reporter) = recompile(Arc::new(FailingRebuilder), &channel);
    let cancel = CancellationToken::new();

    backend
        .initialize(&ProjectGraph::single(node.clone()), &cancel)
        .await
        .unwrap();
    let outcome = backend.try_handle(&node, &[], &cancel).await.unwrap();

    assert!(outcome.handled);
    assert!(outcome.diagnostic.unwrap().contains("FS0039"));
    assert!(channel.batches.lock().is_empty());
    assert!(!reporter.contains("**apply success"));
}

#[tokio::test]
async fn test_recompile_never_reuses_previous_output() {
    let dir = TempDir::new().unwrap();
    let node = fsharp_project(dir.path());
    let channel = RecordingChannel::new(true);
    let rebuilder = Arc::new(FirstBuildOnly {
        inner: FixtureRebuilder::new(1, true),
        calls: AtomicUsize::new(0),
    });
    let (backend, _) = recompile(rebuilder, &channel);
    let cancel = CancellationToken::new();

    backend
        .initialize(&ProjectGraph::single(node.clone()), &cancel)
        .await
        .unwrap();
    let first = backend.try_handle(&node, &[], &cancel).await.unwrap();
    assert_eq!(first, HandlerOutcome::handled());

    let second = backend.try_handle(&node, &[], &cancel).await.unwrap();
    assert!(second.handled);
    assert!(second.diagnostic.unwrap().contains("failed to read rebuilt module"));
    assert_eq!(channel.batches.lock().len(), 1);
}

#[tokio::test]
async fn test_recompile_missing_symbols_is_a_failure() {
    let dir = TempDir::new().unwrap();
    let node = fsharp_project(dir.path());
    let channel = RecordingChannel::new(true);
    let (backend, _) = recompile(FixtureRebuilder::new(2, false), &channel);
    let cancel = CancellationToken::new();

    backend
        .initialize(&ProjectGraph::single(node.clone()), &cancel)
        .await
        .unwrap();
    let outcome = backend.try_handle(&node, &[], &cancel).await.unwrap();

    assert!(outcome.handled);
    assert!(outcome.diagnostic.unwrap().contains("symbol file"));
    assert!(channel.batches.lock().is_empty());
}

#[tokio::test]
async fn test_recompile_rejected_apply_reports_false() {
    let dir = TempDir::new().unwrap();
    let node = fsharp_project(dir.path());
    let channel = RecordingChannel::new(false);
    let (backend, reporter) = recompile(FixtureRebuilder::new(1, true), &channel);
    let cancel = CancellationToken::new();

    backend
        .initialize(&ProjectGraph::single(node.clone()), &cancel)
        .await
        .unwrap();
    let outcome = backend.try_handle(&node, &[], &cancel).await.unwrap();

    assert!(outcome.handled);
    assert!(outcome.diagnostic.is_some());
    assert!(reporter.contains("**apply success: false"));
}

#[tokio::test]
async fn test_recompile_scratch_dir_removed_on_dispose() {
    let dir = TempDir::new().unwrap();
    let node = fsharp_project(dir.path());
    let channel = RecordingChannel::new(true);
    let (backend, _) = recompile(FixtureRebuilder::new(1, true), &channel);
    let cancel = CancellationToken::new();

    backend
        .initialize(&ProjectGraph::single(node.clone()), &cancel)
        .await
        .unwrap();
    let scratch = backend.scratch_dir().unwrap();
    assert!(scratch.is_dir());

    backend.dispose().await;
    backend.dispose().await;
    assert!(!scratch.exists());

    let err = backend.try_handle(&node, &[], &cancel).await.unwrap_err();
    assert!(matches!(err, HotReloadError::NotInitialized("recompile")));
}

#[test]
fn test_command_template_expansion() {
    let rebuilder = CommandRebuilder::new(
        ["dotnet", "fsc", "-o", "{output}", "--debug:full", "-a", "{sources}"]
            .map(String::from)
            .to_vec(),
    );
    let request = RebuildRequest {
        project: PathBuf::from("/src/App/App.fsproj"),
        sources: vec![PathBuf::from("/src/App/A.fs"), PathBuf::from("/src/App/B.fs")],
        output: PathBuf::from("/tmp/x/App.dll"),
    };
    assert_eq!(
        rebuilder.command(&request).display(),
        "dotnet fsc -o /tmp/x/App.dll --debug:full -a /src/App/A.fs /src/App/B.fs"
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_command_rebuilder_end_to_end() {
    let dir = TempDir::new().unwrap();
    let node = fsharp_project(dir.path());
    // The "compiler" copies a prebuilt module and writes symbols beside it.
    let prebuilt = dir.path().join("prebuilt.bin");
    fs::write(&prebuilt, fixture::build_image(MVID, 3)).unwrap();
    let script = format!(
        "cp '{}' \"$0\" && printf pdb > \"${{0%.dll}}.pdb\"",
        prebuilt.display()
    );
    let rebuilder = CommandRebuilder::new(vec!["sh".into(), "-c".into(), script, "{output}".into()]);

    let channel = RecordingChannel::new(true);
    let (backend, _) = recompile(Arc::new(rebuilder), &channel);
    let cancel = CancellationToken::new();
    backend
        .initialize(&ProjectGraph::single(node.clone()), &cancel)
        .await
        .unwrap();
    let outcome = backend.try_handle(&node, &[], &cancel).await.unwrap();

    assert_eq!(outcome, HandlerOutcome::handled());
    let batches = channel.batches.lock();
    assert_eq!(batches[0][0].updated_types.len(), 3);
    assert_eq!(batches[0][0].pdb_delta, b"pdb");
}

// ============================================================================
// Incremental backend
// ============================================================================

struct ScriptedHost {
    documents: Vec<PathBuf>,
    result: EmitResult,
    opened: AtomicUsize,
    open_delay: Duration,
}

#[async_trait]
impl WorkspaceHost for ScriptedHost {
    async fn open_project(
        &self,
        project: &ProjectIdentity,
        _: FaultSink,
        _: &CancellationToken,
    ) -> anyhow::Result<Arc<dyn Workspace>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.open_delay).await;
        Ok(Arc::new(ScriptedWorkspace {
            project: project.path.clone(),
            documents: self.documents.clone(),
            result: self.result.clone(),
        }))
    }
}

struct ScriptedWorkspace {
    project: PathBuf,
    documents: Vec<PathBuf>,
    result: EmitResult,
}

#[async_trait]
impl Workspace for ScriptedWorkspace {
    fn projects(&self) -> Vec<PathBuf> {
        vec![self.project.clone()]
    }

    fn documents(&self) -> Vec<PathBuf> {
        self.documents.clone()
    }

    async fn load_text(&self, _: &Path, _: &CancellationToken) -> anyhow::Result<()> {
        Ok(())
    }

    async fn compile(&self, _: &Path, _: &CancellationToken) -> anyhow::Result<()> {
        Ok(())
    }

    async fn start_session(
        &self,
        capabilities: &CapabilitySet,
        _: &CancellationToken,
    ) -> anyhow::Result<Box<dyn HotReloadSession>> {
        Ok(Box::new(ScriptedSession {
            capabilities: capabilities.clone(),
            result: self.result.clone(),
        }))
    }
}

struct ScriptedSession {
    capabilities: CapabilitySet,
    result: EmitResult,
}

#[async_trait]
impl HotReloadSession for ScriptedSession {
    fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    async fn emit_updates(
        &self,
        _: &[FileChange],
        _: &CancellationToken,
    ) -> anyhow::Result<EmitResult> {
        Ok(self.result.clone())
    }

    fn end(&self) {}
}

fn incremental(
    result: EmitResult,
    channel: &Arc<RecordingChannel>,
) -> (IncrementalBackend, Arc<ScriptedHost>, ProjectNode) {
    let node = ProjectNode::new(ProjectIdentity::from_path("/work/App/App.csproj"));
    let host = Arc::new(ScriptedHost {
        documents: vec![PathBuf::from("/work/App/Program.cs")],
        result,
        opened: AtomicUsize::new(0),
        open_delay: Duration::ZERO,
    });
    let reporter = MemoryReporter::new();
    let provider = Arc::new(SessionProvider::new(host.clone(), reporter.clone()));
    let negotiator = CapabilityNegotiator::new(Duration::from_secs(1), reporter.clone());
    let backend = IncrementalBackend::new(provider, negotiator, factory(channel), reporter);
    (backend, host, node)
}

#[tokio::test]
async fn test_incremental_applies_emitted_updates() {
    let channel = RecordingChannel::new(true);
    let records = vec![UpdateRecord::new(uuid::Uuid::nil()); 2];
    let (backend, host, node) = incremental(EmitResult::Updates(records), &channel);
    let cancel = CancellationToken::new();

    backend
        .initialize(&ProjectGraph::single(node.clone()), &cancel)
        .await
        .unwrap();
    let change = FileChange::modified("/work/App/Program.cs");
    let outcome = backend.try_handle(&node, &[change], &cancel).await.unwrap();

    assert_eq!(outcome, HandlerOutcome::handled());
    assert_eq!(channel.batches.lock()[0].len(), 2);
    assert_eq!(host.opened.load(Ordering::SeqCst), 1);

    let session = backend
        .provider()
        .create_session(
            &node.identity,
            crate::capabilities::resolved(CapabilitySet::defaults()),
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(
        session.capabilities(),
        &CapabilitySet::parse("Baseline AddMethodToExistingType")
    );
}

#[tokio::test]
async fn test_incremental_ignores_files_outside_workspace() {
    let channel = RecordingChannel::new(true);
    let (backend, _, node) = incremental(EmitResult::NoChanges, &channel);
    let cancel = CancellationToken::new();
    backend
        .initialize(&ProjectGraph::single(node.clone()), &cancel)
        .await
        .unwrap();

    let change = FileChange::modified("/work/App/README.md");
    let outcome = backend.try_handle(&node, &[change], &cancel).await.unwrap();
    assert_eq!(outcome, HandlerOutcome::unhandled());
}

#[tokio::test]
async fn test_incremental_blocked_edit_is_declined_with_reason() {
    let channel = RecordingChannel::new(true);
    let blocked = EmitResult::Blocked(vec!["ENC0020: renaming a method requires a restart".into()]);
    let (backend, _, node) = incremental(blocked, &channel);
    let cancel = CancellationToken::new();
    backend
        .initialize(&ProjectGraph::single(node.clone()), &cancel)
        .await
        .unwrap();

    let change = FileChange::modified("/work/App/Program.cs");
    let outcome = backend.try_handle(&node, &[change], &cancel).await.unwrap();
    assert!(!outcome.handled);
    assert!(outcome.diagnostic.unwrap().contains("ENC0020"));
    assert!(channel.batches.lock().is_empty());
}

#[tokio::test]
async fn test_incremental_batch_cancelled_while_session_loads() {
    let node = ProjectNode::new(ProjectIdentity::from_path("/work/App/App.csproj"));
    let host = Arc::new(ScriptedHost {
        documents: vec![PathBuf::from("/work/App/Program.cs")],
        result: EmitResult::NoChanges,
        opened: AtomicUsize::new(0),
        open_delay: Duration::from_secs(30),
    });
    let reporter = MemoryReporter::new();
    let channel = RecordingChannel::new(true);
    let backend = IncrementalBackend::new(
        Arc::new(SessionProvider::new(host, reporter.clone())),
        CapabilityNegotiator::new(Duration::from_secs(1), reporter.clone()),
        factory(&channel),
        reporter,
    );
    backend
        .initialize(&ProjectGraph::single(node.clone()), &CancellationToken::new())
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });
    let change = FileChange::modified("/work/App/Program.cs");
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        backend.try_handle(&node, &[change], &cancel),
    )
    .await
    .unwrap();
    assert!(matches!(result, Err(HotReloadError::Cancelled)));
    backend.dispose().await;
}

#[tokio::test]
async fn test_incremental_requires_initialize() {
    let channel = RecordingChannel::new(true);
    let (backend, _, node) = incremental(EmitResult::NoChanges, &channel);
    let err = backend
        .try_handle(&node, &[], &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, HotReloadError::NotInitialized("incremental")));
}

#[tokio::test]
async fn test_incremental_dispose_drops_session() {
    let channel = RecordingChannel::new(true);
    let (backend, _, node) = incremental(EmitResult::NoChanges, &channel);
    let cancel = CancellationToken::new();
    backend
        .initialize(&ProjectGraph::single(node.clone()), &cancel)
        .await
        .unwrap();
    assert!(backend.provider().is_cached(node.path()));

    backend.dispose().await;
    assert!(!backend.provider().is_cached(node.path()));
}
