//! Messages between the watch-mode actors.

use std::fmt;
use std::path::PathBuf;

use crate::core::FileChange;

/// FsActor → ReloadActor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadMsg {
    /// Debounced batch, oldest first.
    Changes(Vec<FileChange>),
    /// One or more project files of the graph changed.
    ProjectChanged(Vec<PathBuf>),
    /// Dispose backends and stop.
    Shutdown,
}

impl fmt::Display for ReloadMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Changes(changes) => write!(f, "changes: {} file(s)", changes.len()),
            Self::ProjectChanged(paths) => write!(f, "project changed: {} file(s)", paths.len()),
            Self::Shutdown => f.write_str("shutdown"),
        }
    }
}
