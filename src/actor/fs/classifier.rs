use std::path::{Path, PathBuf};

use crate::actor::messages::ReloadMsg;
use crate::core::{ChangeKind, FileChange, ProjectGraph};

/// Build output directories never worth reloading for.
const IGNORED_DIRS: &[&str] = &["bin", "obj", "node_modules", ".git", ".vs"];

/// Turns debounced raw changes into reload messages.
///
/// Pipeline: correct_by_existence → filter_actionable → route
pub(super) struct EventClassifier<'a> {
    graph: &'a ProjectGraph,
    excluded: &'a [PathBuf],
}

impl<'a> EventClassifier<'a> {
    pub(super) fn new(graph: &'a ProjectGraph, excluded: &'a [PathBuf]) -> Self {
        Self { graph, excluded }
    }

    pub(super) fn classify(&self, raw: Vec<(PathBuf, ChangeKind)>) -> Vec<ReloadMsg> {
        let mut changes = raw;
        Self::correct_by_existence(&mut changes);
        self.filter_actionable(&mut changes);
        self.route(changes)
    }

    /// Reconcile kinds with what is on disk now.
    ///
    /// Atomic saves report Deleted for a file that exists again, and a
    /// short-lived file may be Added and gone before the batch is released.
    pub(super) fn correct_by_existence(changes: &mut Vec<(PathBuf, ChangeKind)>) {
        changes.retain_mut(|(path, kind)| {
            let exists = path.exists();
            match *kind {
                ChangeKind::Added if !exists => {
                    crate::debug!("watch"; "discard added (gone): {}", path.display());
                    false
                }
                ChangeKind::Modified if !exists => {
                    crate::debug!("watch"; "upgrade modified->deleted: {}", path.display());
                    *kind = ChangeKind::Deleted;
                    true
                }
                ChangeKind::Deleted if exists => {
                    crate::debug!("watch"; "downgrade deleted->modified: {}", path.display());
                    *kind = ChangeKind::Modified;
                    true
                }
                _ => true,
            }
        });
    }

    /// Drop directories, build output and anything outside the graph.
    pub(super) fn filter_actionable(&self, changes: &mut Vec<(PathBuf, ChangeKind)>) {
        changes.retain(|(path, kind)| {
            if *kind != ChangeKind::Deleted && !path.is_file() {
                return false;
            }
            if self.excluded.iter().any(|dir| path.starts_with(dir)) {
                return false;
            }
            let Some(owner) = self.graph.owner_of(path) else {
                crate::debug!("watch"; "outside project graph: {}", path.display());
                return false;
            };
            !in_ignored_dir(owner.identity.dir(), path)
        });
    }

    /// Project files become one `ProjectChanged`, everything else one
    /// `Changes` batch tagged with its owning project.
    fn route(&self, changes: Vec<(PathBuf, ChangeKind)>) -> Vec<ReloadMsg> {
        let mut projects = Vec::new();
        let mut files = Vec::new();

        for (path, kind) in changes {
            if self.graph.is_project_file(&path) {
                projects.push(path);
                continue;
            }
            if let Some(owner) = self.graph.owner_of(&path) {
                files.push(FileChange::new(path, kind).with_project(owner.path()));
            }
        }

        let mut messages = Vec::with_capacity(2);
        if !projects.is_empty() {
            messages.push(ReloadMsg::ProjectChanged(projects));
        }
        if !files.is_empty() {
            messages.push(ReloadMsg::Changes(files));
        }
        messages
    }
}

fn in_ignored_dir(project_dir: &Path, path: &Path) -> bool {
    path.strip_prefix(project_dir)
        .map(|rel| {
            rel.components()
                .any(|c| IGNORED_DIRS.iter().any(|d| c.as_os_str() == *d))
        })
        .unwrap_or(false)
}
