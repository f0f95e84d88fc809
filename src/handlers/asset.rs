//! Static asset handler.
//!
//! ```text
//! App/wwwroot/css/site.css  →  <output>/css/site.css   (refresh /css/site.css)
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;
use tokio_util::sync::CancellationToken;

use super::{BrowserRefresh, ContentHandler, output_dir};
use crate::core::{ChangeKind, FileChange, ProjectIdentity};
use crate::utils::hash;
use crate::utils::path::relative_slash;

pub struct StaticAssetHandler {
    static_dir: PathBuf,
    output: PathBuf,
    refresh: Option<Arc<dyn BrowserRefresh>>,
}

impl StaticAssetHandler {
    /// `static_dir` is relative to the project directory; `output` may be
    /// relative to it too.
    pub fn new(static_dir: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            static_dir: static_dir.into(),
            output: output.into(),
            refresh: None,
        }
    }

    pub fn with_refresh(mut self, refresh: Arc<dyn BrowserRefresh>) -> Self {
        self.refresh = Some(refresh);
        self
    }

    fn notify(&self, url: &str) {
        if let Some(refresh) = &self.refresh {
            refresh.refresh_asset(url);
        }
    }
}

#[async_trait]
impl ContentHandler for StaticAssetHandler {
    fn name(&self) -> &'static str {
        "static-asset"
    }

    async fn try_handle(
        &self,
        project: &ProjectIdentity,
        change: &FileChange,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let root = project.dir().join(&self.static_dir);
        if !change.is_under(&root) || cancel.is_cancelled() {
            return Ok(false);
        }
        let Some(rel) = relative_slash(&change.path, &root) else {
            return Ok(false);
        };
        let dest = output_dir(project, &self.output).join(&rel);

        if change.kind == ChangeKind::Deleted {
            if fs::try_exists(&dest).await.unwrap_or(false) {
                fs::remove_file(&dest)
                    .await
                    .with_context(|| format!("failed to remove {}", dest.display()))?;
            }
        } else {
            if !is_file(&change.path).await {
                return Ok(false);
            }
            copy_if_changed(&change.path, &dest).await?;
        }

        self.notify(&format!("/{rel}"));
        Ok(true)
    }
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path).await.is_ok_and(|m| m.is_file())
}

/// Copy unless `dest` already holds identical bytes.
async fn copy_if_changed(source: &Path, dest: &Path) -> Result<()> {
    let bytes = fs::read(source)
        .await
        .with_context(|| format!("failed to read {}", source.display()))?;

    if let Ok(existing) = fs::read(dest).await
        && hash::compute(&existing) == hash::compute(&bytes)
    {
        return Ok(());
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(dest, bytes)
        .await
        .with_context(|| format!("failed to write {}", dest.display()))
}
