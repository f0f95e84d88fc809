//! Project classification.
//!
//! Picks the compilation backend that governs a project from its toolchain
//! marker. Results are cached per project path for the lifetime of a session
//! and only dropped by an explicit invalidation.

use std::fmt;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::core::ProjectIdentity;

/// Compilation backend family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Long-lived incremental session producing method-level deltas.
    Incremental,
    /// Full rebuild, replacing the whole module.
    Recompile,
}

impl BackendKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Incremental => "incremental",
            Self::Recompile => "recompile",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Marker-based classifier with a per-project cache.
#[derive(Debug)]
pub struct ProjectClassifier {
    recompile_markers: Vec<String>,
    cache: DashMap<PathBuf, BackendKind>,
}

impl ProjectClassifier {
    /// Projects whose marker matches one of `recompile_markers` use the
    /// recompile backend; everything else is incremental.
    pub fn new<I, S>(recompile_markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            recompile_markers: recompile_markers
                .into_iter()
                .map(|m| m.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            cache: DashMap::new(),
        }
    }

    pub fn classify(&self, project: &ProjectIdentity) -> BackendKind {
        *self
            .cache
            .entry(project.path.clone())
            .or_insert_with(|| self.decide(project))
    }

    fn decide(&self, project: &ProjectIdentity) -> BackendKind {
        if self
            .recompile_markers
            .iter()
            .any(|marker| project.marker.matches(marker))
        {
            BackendKind::Recompile
        } else {
            BackendKind::Incremental
        }
    }

    /// Cached classification, if `classify` has run for `path`.
    pub fn cached(&self, path: &Path) -> Option<BackendKind> {
        self.cache.get(path).map(|kind| *kind)
    }

    pub fn invalidate(&self, path: &Path) {
        self.cache.remove(path);
    }

    pub fn clear(&self) {
        self.cache.clear();
    }
}

impl Default for ProjectClassifier {
    fn default() -> Self {
        Self::new(["fsproj"])
    }
}
