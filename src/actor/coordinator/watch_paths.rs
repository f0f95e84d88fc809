use std::path::{Path, PathBuf};

use crate::core::ProjectGraph;

/// Directories to watch: one recursive root per project directory.
pub(crate) fn collect_watch_paths(graph: &ProjectGraph) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = Vec::with_capacity(graph.nodes().len());
    for node in graph.nodes() {
        let dir = node.identity.dir().to_path_buf();
        if !paths.contains(&dir) {
            paths.push(dir);
        }
    }
    dedupe_nested(&mut paths);
    paths
}

/// Drop roots already covered by a recursive watch on an ancestor.
fn dedupe_nested(paths: &mut Vec<PathBuf>) {
    let snapshot = paths.clone();
    paths.retain(|path| !snapshot.iter().any(|other| is_strict_ancestor(other, path)));
}

fn is_strict_ancestor(ancestor: &Path, path: &Path) -> bool {
    path != ancestor && path.starts_with(ancestor)
}
