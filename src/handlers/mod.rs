//! Content handlers.
//!
//! Offered one file at a time before the compilation backend sees the batch.
//! They copy or transform files on disk and never touch compilation state.

mod asset;
mod scoped;

pub use asset::StaticAssetHandler;
pub use scoped::{ScopedCssHandler, scope_css};

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::{FileChange, ProjectIdentity};

/// A handler that may consume a single changed file.
#[async_trait]
pub trait ContentHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns `true` when the file was recognized and processed.
    async fn try_handle(
        &self,
        project: &ProjectIdentity,
        change: &FileChange,
        cancel: &CancellationToken,
    ) -> Result<bool>;
}

/// Notified after a served file changed on disk.
pub trait BrowserRefresh: Send + Sync {
    /// `url` is the site-relative path, e.g. `/css/site.css`.
    fn refresh_asset(&self, url: &str);
}

/// Resolve a configured output directory against the project directory.
fn output_dir(project: &ProjectIdentity, output: &Path) -> PathBuf {
    if output.is_absolute() {
        output.to_path_buf()
    } else {
        project.dir().join(output)
    }
}
