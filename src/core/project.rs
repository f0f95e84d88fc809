//! Project identity and the loaded project graph.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};

/// Lowercased extension of a project file (`fsproj`, `csproj`, ...).
///
/// Selects the compilation backend family for the project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolchainMarker(String);

impl ToolchainMarker {
    pub fn new(marker: &str) -> Self {
        Self(marker.trim_start_matches('.').to_ascii_lowercase())
    }

    /// Marker of a project file path; empty when the path has no extension.
    pub fn from_path(path: &Path) -> Self {
        Self::new(path.extension().and_then(|e| e.to_str()).unwrap_or_default())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison against a configured marker.
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other.trim_start_matches('.'))
    }
}

impl fmt::Display for ToolchainMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable description of the project being watched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectIdentity {
    /// Path to the project file.
    pub path: PathBuf,
    pub marker: ToolchainMarker,
    /// Directory the application is launched from.
    pub working_dir: PathBuf,
    /// Launch command, when the project file declares one.
    pub run_command: Option<String>,
    /// Target framework version (`6.0` for `net6.0`).
    pub target_framework: Option<String>,
}

impl ProjectIdentity {
    /// Identity with defaults derived from the project path alone.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let working_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self {
            marker: ToolchainMarker::from_path(&path),
            path,
            working_dir,
            run_command: None,
            target_framework: None,
        }
    }

    /// Project file name without extension, used for build outputs.
    pub fn name(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("project")
    }

    /// Directory containing the project file.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }
}

/// One project in the loaded graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectNode {
    pub identity: ProjectIdentity,
    /// `Sdk` attribute of the project element.
    pub sdk: Option<String>,
    /// Referenced project files, resolved to absolute paths.
    pub references: Vec<PathBuf>,
    /// Explicit `Compile Include` items, in declaration order.
    pub compile_items: Vec<PathBuf>,
}

impl ProjectNode {
    pub fn new(identity: ProjectIdentity) -> Self {
        Self {
            identity,
            sdk: None,
            references: Vec::new(),
            compile_items: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.identity.path
    }

    pub fn has_sdk(&self, sdk: &str) -> bool {
        self.sdk.as_deref().is_some_and(|s| s.eq_ignore_ascii_case(sdk))
    }
}

/// The root project plus everything it references, root first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectGraph {
    nodes: Vec<ProjectNode>,
}

impl ProjectGraph {
    /// Build a graph. The first node is the root.
    ///
    /// Returns `None` for an empty node list.
    pub fn new(nodes: Vec<ProjectNode>) -> Option<Self> {
        if nodes.is_empty() {
            None
        } else {
            Some(Self { nodes })
        }
    }

    /// Graph of a single project with no references.
    pub fn single(node: ProjectNode) -> Self {
        Self { nodes: vec![node] }
    }

    pub fn root(&self) -> &ProjectNode {
        &self.nodes[0]
    }

    pub fn nodes(&self) -> &[ProjectNode] {
        &self.nodes
    }

    pub fn get(&self, path: &Path) -> Option<&ProjectNode> {
        self.nodes.iter().find(|n| n.path() == path)
    }

    /// Project owning `file`: explicit compile item first, then the deepest
    /// project directory containing it.
    pub fn owner_of(&self, file: &Path) -> Option<&ProjectNode> {
        if let Some(node) = self
            .nodes
            .iter()
            .find(|n| n.compile_items.iter().any(|item| item == file))
        {
            return Some(node);
        }
        self.nodes
            .iter()
            .filter(|n| file.starts_with(n.identity.dir()))
            .max_by_key(|n| n.identity.dir().components().count())
    }

    /// Whether `path` is one of the project files in the graph.
    pub fn is_project_file(&self, path: &Path) -> bool {
        self.get(path).is_some()
    }

    /// Structural fingerprint; changes whenever a project, reference or
    /// compile item is added or removed.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = FxHasher::default();
        for node in &self.nodes {
            node.identity.path.hash(&mut hasher);
            node.sdk.hash(&mut hasher);
            node.identity.target_framework.hash(&mut hasher);
            node.references.hash(&mut hasher);
            node.compile_items.hash(&mut hasher);
        }
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(path: &str) -> ProjectNode {
        ProjectNode::new(ProjectIdentity::from_path(path))
    }

    #[test]
    fn test_marker_is_lowercased() {
        let id = ProjectIdentity::from_path("/src/App/App.FSPROJ");
        assert_eq!(id.marker.as_str(), "fsproj");
        assert!(id.marker.matches(".FsProj"));
        assert_eq!(id.name(), "App");
        assert_eq!(id.working_dir, PathBuf::from("/src/App"));
    }

    #[test]
    fn test_owner_prefers_deepest_directory() {
        let graph = ProjectGraph::new(vec![node("/src/App.csproj"), node("/src/Lib/Lib.csproj")])
            .unwrap();
        assert_eq!(
            graph.owner_of(Path::new("/src/Lib/Types.cs")).unwrap().path(),
            Path::new("/src/Lib/Lib.csproj")
        );
        assert_eq!(
            graph.owner_of(Path::new("/src/Program.cs")).unwrap().path(),
            Path::new("/src/App.csproj")
        );
        assert!(graph.owner_of(Path::new("/elsewhere/x.cs")).is_none());
    }

    #[test]
    fn test_owner_prefers_compile_items() {
        let mut lib = node("/src/Lib/Lib.fsproj");
        lib.compile_items.push(PathBuf::from("/shared/Common.fs"));
        let graph = ProjectGraph::new(vec![node("/shared/App.fsproj"), lib]).unwrap();
        assert_eq!(
            graph.owner_of(Path::new("/shared/Common.fs")).unwrap().path(),
            Path::new("/src/Lib/Lib.fsproj")
        );
    }

    #[test]
    fn test_fingerprint_tracks_structure() {
        let a = ProjectGraph::single(node("/src/App.fsproj"));
        let mut changed = node("/src/App.fsproj");
        changed.compile_items.push(PathBuf::from("/src/New.fs"));
        let b = ProjectGraph::single(changed);
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_empty_graph_rejected() {
        assert!(ProjectGraph::new(Vec::new()).is_none());
    }
}
