//! Project graph loading.
//!
//! Reads the root project file and everything it references into a
//! [`ProjectGraph`], and infers which runtime shape the root runs as.

mod profile;
mod reader;

pub use profile::{BROWSER_SDK, WEB_SDK, infer_profile};
pub use reader::{ProjectFile, framework_version, parse};

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::core::{ProjectGraph, ProjectIdentity, ProjectNode, ToolchainMarker};
use crate::utils::path::{normalize_path, resolve_include};

/// Launch command used when a project declares none.
pub const DEFAULT_RUN_COMMAND: &str = "dotnet run";

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("failed to read project `{path}`")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid project file `{path}` at byte {position}: {message}")]
    Xml {
        path: PathBuf,
        position: u64,
        message: String,
    },
}

/// Load one project file into a node.
pub fn load_node(path: &Path) -> Result<ProjectNode, ProjectError> {
    let path = normalize_path(path);
    let content = std::fs::read_to_string(&path).map_err(|source| ProjectError::Io {
        path: path.clone(),
        source,
    })?;
    let file = parse(&content).map_err(|(position, message)| ProjectError::Xml {
        path: path.clone(),
        position,
        message,
    })?;
    Ok(node_from_file(path, file))
}

/// Resolve a parsed project against its location.
pub fn node_from_file(path: PathBuf, file: ProjectFile) -> ProjectNode {
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

    let working_dir = file
        .run_working_directory
        .as_deref()
        .map(|d| resolve_include(&dir, d))
        .unwrap_or_else(|| dir.clone());
    let command = file.run_command.as_deref().unwrap_or(DEFAULT_RUN_COMMAND);
    let run_command = match file.run_arguments.as_deref() {
        Some(args) => format!("{command} {args}"),
        None => command.to_string(),
    };

    let identity = ProjectIdentity {
        marker: ToolchainMarker::from_path(&path),
        path,
        working_dir,
        run_command: Some(run_command),
        target_framework: file.target_framework.as_deref().and_then(framework_version),
    };

    ProjectNode {
        identity,
        sdk: file.sdk,
        references: file
            .references
            .iter()
            .map(|r| resolve_include(&dir, r))
            .collect(),
        compile_items: file
            .compile_items
            .iter()
            .filter(|item| !item.contains('*'))
            .map(|item| resolve_include(&dir, item))
            .collect(),
    }
}

/// Load `root` and every project reachable through references, root first.
///
/// Reference cycles are followed once.
pub fn load_graph(root: &Path) -> Result<ProjectGraph, ProjectError> {
    let mut seen = FxHashSet::default();
    let mut queue = VecDeque::from([normalize_path(root)]);
    let mut nodes = Vec::new();

    while let Some(path) = queue.pop_front() {
        if !seen.insert(path.clone()) {
            continue;
        }
        let node = load_node(&path)?;
        crate::debug!("project"; "loaded {} ({} references)", node.identity.name(), node.references.len());
        queue.extend(node.references.iter().cloned());
        nodes.push(node);
    }

    ProjectGraph::new(nodes).ok_or_else(|| ProjectError::Io {
        path: root.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "no project loaded"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, rel: &str, content: &str) -> PathBuf {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_graph_follows_references_once() {
        let dir = tempfile::tempdir().unwrap();
        let app = write(
            dir.path(),
            "App/App.fsproj",
            r#"<Project Sdk="Microsoft.NET.Sdk">
  <PropertyGroup><TargetFramework>net6.0</TargetFramework></PropertyGroup>
  <ItemGroup>
    <Compile Include="Program.fs" />
    <ProjectReference Include="..\Lib\Lib.fsproj" />
  </ItemGroup>
</Project>"#,
        );
        write(
            dir.path(),
            "Lib/Lib.fsproj",
            r#"<Project Sdk="Microsoft.NET.Sdk">
  <ItemGroup><ProjectReference Include="../App/App.fsproj" /></ItemGroup>
</Project>"#,
        );
        write(dir.path(), "App/Program.fs", "printfn \"hello\"");

        let graph = load_graph(&app).unwrap();
        assert_eq!(graph.nodes().len(), 2);

        let root = graph.root();
        assert_eq!(root.identity.name(), "App");
        assert_eq!(root.identity.marker.as_str(), "fsproj");
        assert_eq!(root.identity.target_framework.as_deref(), Some("6.0"));
        assert_eq!(root.identity.run_command.as_deref(), Some(DEFAULT_RUN_COMMAND));
        assert_eq!(root.identity.working_dir, normalize_path(&dir.path().join("App")));
        assert_eq!(root.compile_items, vec![normalize_path(&dir.path().join("App/Program.fs"))]);
        assert_eq!(graph.nodes()[1].identity.name(), "Lib");
    }

    #[test]
    fn test_run_properties() {
        let file = ProjectFile {
            run_command: Some("bin/app".into()),
            run_arguments: Some("--port 8080".into()),
            run_working_directory: Some("out".into()),
            ..Default::default()
        };
        let node = node_from_file(PathBuf::from("/nonexistent/App/App.csproj"), file);
        assert_eq!(node.identity.run_command.as_deref(), Some("bin/app --port 8080"));
        assert_eq!(node.identity.working_dir, PathBuf::from("/nonexistent/App/out"));
        assert_eq!(node.identity.target_framework, None);
    }

    #[test]
    fn test_missing_reference_fails() {
        let dir = tempfile::tempdir().unwrap();
        let app = write(
            dir.path(),
            "App.csproj",
            r#"<Project><ItemGroup><ProjectReference Include="Missing.csproj" /></ItemGroup></Project>"#,
        );
        assert!(matches!(load_graph(&app), Err(ProjectError::Io { .. })));
    }

    #[test]
    fn test_invalid_xml_reports_position() {
        let dir = tempfile::tempdir().unwrap();
        let app = write(dir.path(), "App.csproj", "<Project><PropertyGroup></Project>");
        let err = load_node(&app).unwrap_err();
        assert!(matches!(err, ProjectError::Xml { .. }));
        assert!(err.to_string().contains("App.csproj"));
    }
}
