//! Recompile-and-diff backend.
//!
//! Rebuilds the whole project into a scratch directory and ships the fresh
//! module as one full replacement record:
//!
//! ```text
//! sources ─► rebuild ─► <scratch>/App.dll + App.pdb ─► UpdateRecord ─► applier
//! ```
//!
//! A failed rebuild or apply still counts as handled: the batch is terminal
//! and the outcome carries the diagnostic.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use super::{ApplierSlot, CompilationBackend, MODULE};
use crate::applier::{ApplierFactory, DeltaApplier};
use crate::classify::BackendKind;
use crate::core::{FileChange, HandlerOutcome, ProjectGraph, ProjectNode, UpdateRecord};
use crate::error::{HotReloadError, Result};
use crate::image::ModuleImage;
use crate::project::DEFAULT_RUN_COMMAND;
use crate::report::SharedReporter;
use crate::utils::exec::Cmd;

/// Inputs for one full rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildRequest {
    pub project: PathBuf,
    pub sources: Vec<PathBuf>,
    /// Where the module must be written; the symbol file goes next to it
    /// with a `.pdb` extension.
    pub output: PathBuf,
}

/// External full-rebuild collaborator.
#[async_trait]
pub trait Rebuilder: Send + Sync {
    async fn rebuild(&self, request: &RebuildRequest, cancel: &CancellationToken)
    -> anyhow::Result<()>;
}

/// Runs a configured command line.
///
/// Placeholders: `{output}`, `{project}`, and `{sources}` which, as a whole
/// argument, expands to one argument per source file.
#[derive(Debug, Clone)]
pub struct CommandRebuilder {
    template: Vec<String>,
}

impl CommandRebuilder {
    pub fn new(template: Vec<String>) -> Self {
        Self { template }
    }

    pub fn command(&self, request: &RebuildRequest) -> Cmd {
        let output = request.output.to_string_lossy();
        let project = request.project.to_string_lossy();

        let mut args = Vec::with_capacity(self.template.len() + request.sources.len());
        for part in &self.template {
            if part == "{sources}" {
                args.extend(
                    request
                        .sources
                        .iter()
                        .map(|s| s.to_string_lossy().into_owned()),
                );
            } else {
                args.push(
                    part.replace("{output}", &output)
                        .replace("{project}", &project),
                );
            }
        }

        let cmd = Cmd::from_slice(&args);
        match request.project.parent() {
            Some(dir) => cmd.cwd(dir),
            None => cmd,
        }
    }
}

#[async_trait]
impl Rebuilder for CommandRebuilder {
    async fn rebuild(
        &self,
        request: &RebuildRequest,
        cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        let cmd = self.command(request);
        crate::debug!("rebuild"; "{}", cmd.display());
        cmd.run(cancel).await?;
        Ok(())
    }
}

pub struct RecompileBackend {
    rebuilder: Arc<dyn Rebuilder>,
    source_extensions: Vec<String>,
    slot: ApplierSlot<Arc<TempDir>>,
    reporter: SharedReporter,
}

impl RecompileBackend {
    pub fn new(
        rebuilder: Arc<dyn Rebuilder>,
        source_extensions: Vec<String>,
        factory: ApplierFactory,
        reporter: SharedReporter,
    ) -> Self {
        Self {
            rebuilder,
            source_extensions: source_extensions
                .into_iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            slot: ApplierSlot::new(factory),
            reporter,
        }
    }

    /// Scratch directory of the active session, if initialized.
    pub fn scratch_dir(&self) -> Option<PathBuf> {
        self.slot.get().map(|(_, scratch)| scratch.path().to_path_buf())
    }

    fn emit_launch_info(&self, project: &ProjectNode) {
        let identity = &project.identity;
        self.reporter
            .output(MODULE, &format!("**cwd:{}", identity.working_dir.display()));
        self.reporter.output(
            MODULE,
            &format!(
                "**cmd:{}",
                identity.run_command.as_deref().unwrap_or(DEFAULT_RUN_COMMAND)
            ),
        );
        self.reporter.output(
            MODULE,
            &format!("**ver:{}", identity.target_framework.as_deref().unwrap_or_default()),
        );
    }

    async fn rebuild_and_apply(
        &self,
        project: &ProjectNode,
        applier: &DeltaApplier,
        scratch: &Path,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let sources = collect_sources(project, &self.source_extensions).await?;
        if sources.is_empty() {
            return Err(anyhow!("no source files found for {}", project.identity.name()).into());
        }

        let request = RebuildRequest {
            project: project.path().to_path_buf(),
            sources,
            output: scratch.join(format!("{}.dll", project.identity.name())),
        };
        remove_previous_output(&request.output).await?;
        self.rebuilder.rebuild(&request, cancel).await?;

        let record = read_update(&request.output).await?;
        crate::debug!(MODULE; "module {} with {} type(s)", record.module_id, record.updated_types.len());
        applier.apply(std::slice::from_ref(&record), cancel).await
    }
}

#[async_trait]
impl CompilationBackend for RecompileBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Recompile
    }

    async fn initialize(&self, graph: &ProjectGraph, cancel: &CancellationToken) -> Result<()> {
        let Some(applier) = self.slot.connect(graph, cancel).await? else {
            return Ok(());
        };
        let scratch = tempfile::Builder::new()
            .prefix("deltawatch-")
            .tempdir()
            .context("failed to create scratch directory")?;
        crate::debug!(MODULE; "scratch directory {}", scratch.path().display());
        self.slot.store(applier, Arc::new(scratch));
        Ok(())
    }

    async fn try_handle(
        &self,
        project: &ProjectNode,
        _changes: &[FileChange],
        cancel: &CancellationToken,
    ) -> Result<HandlerOutcome> {
        let (applier, scratch) = self
            .slot
            .get()
            .ok_or(HotReloadError::NotInitialized("recompile"))?;

        self.emit_launch_info(project);

        match self
            .rebuild_and_apply(project, &applier, scratch.path(), cancel)
            .await
        {
            Ok(success) => {
                self.reporter
                    .output(MODULE, &format!("**apply success: {success}"));
                if success {
                    Ok(HandlerOutcome::handled())
                } else {
                    Ok(HandlerOutcome::failed(
                        "the running application rejected the rebuilt module",
                    ))
                }
            }
            Err(_) if cancel.is_cancelled() => Err(HotReloadError::Cancelled),
            Err(err) => Ok(HandlerOutcome::failed(format!("{:#}", anyhow!(err)))),
        }
    }

    async fn dispose(&self) {
        if let Some(scratch) = self.slot.release().await {
            crate::debug!(MODULE; "removing {}", scratch.path().display());
        }
    }
}

/// Explicit compile items, or every source file in the project directory.
async fn collect_sources(project: &ProjectNode, extensions: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    if !project.compile_items.is_empty() {
        return Ok(project.compile_items.clone());
    }

    let dir = project.identity.dir();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("failed to list {}", dir.display()))?;

    let mut sources = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)));
        if matches && entry.file_type().await.is_ok_and(|t| t.is_file()) {
            sources.push(path);
        }
    }
    sources.sort();
    Ok(sources)
}

/// The scratch paths are reused every cycle; a rebuild that writes nothing
/// must not pick up the last cycle's module.
async fn remove_previous_output(output: &Path) -> anyhow::Result<()> {
    for path in [output.to_path_buf(), output.with_extension("pdb")] {
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("failed to remove {}", path.display()));
            }
        }
    }
    Ok(())
}

/// Read the rebuilt module and its symbols into a full-replacement record.
async fn read_update(output: &Path) -> anyhow::Result<UpdateRecord> {
    let module = output.to_path_buf();
    let image = tokio::task::spawn_blocking(move || ModuleImage::read(&module))
        .await
        .context("image reader task failed")?
        .with_context(|| format!("failed to read rebuilt module {}", output.display()))?;

    let pdb = output.with_extension("pdb");
    if !tokio::fs::try_exists(&pdb).await.unwrap_or(false) {
        bail!("rebuild produced no symbol file at {}", pdb.display());
    }
    let pdb_delta = tokio::fs::read(&pdb)
        .await
        .with_context(|| format!("failed to read {}", pdb.display()))?;

    let mut record = UpdateRecord::new(image.module_id);
    record.il_delta = image.code;
    record.pdb_delta = pdb_delta;
    record.updated_types = image.type_tokens;
    Ok(record)
}
