//! `deltawatch classify`: show how each project will be reloaded.

use anyhow::Result;

use crate::classify::ProjectClassifier;
use crate::config::WatchConfig;
use crate::core::ProjectGraph;
use crate::log;

pub fn run_classify(config: &WatchConfig) -> Result<()> {
    let graph = crate::project::load_graph(config.project_path())?;
    for line in describe(config, &graph) {
        log!("classify"; "{}", line);
    }
    Ok(())
}

/// One line per project, root first, then the runtime profile.
fn describe(config: &WatchConfig, graph: &ProjectGraph) -> Vec<String> {
    let classifier = ProjectClassifier::new(&config.backend.recompile_markers);
    let mut lines: Vec<String> = graph
        .nodes()
        .iter()
        .map(|node| {
            format!(
                "{} → {}",
                node.identity.name(),
                classifier.classify(&node.identity)
            )
        })
        .collect();

    let profile = config
        .runtime
        .profile
        .forced()
        .unwrap_or_else(|| crate::project::infer_profile(graph));
    lines.push(format!("runtime profile: {profile}"));
    lines
}
