//! `[backend]`, `[rebuild]` and `[capabilities]` sections.
//!
//! ```toml
//! [backend]
//! recompile_markers = ["fsproj"]
//! source_extensions = ["fs"]
//!
//! [rebuild]
//! command = ["dotnet", "fsc", "-o", "{output}", "--debug:full", "-a", "{sources}"]
//!
//! [capabilities]
//! timeout_ms = 10000
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Backend routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Toolchain markers routed to the one-shot recompile backend.
    pub recompile_markers: Vec<String>,
    /// Source files collected when a project lists no compile items.
    pub source_extensions: Vec<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            recompile_markers: vec!["fsproj".into()],
            source_extensions: vec!["fs".into()],
        }
    }
}

/// One-shot full rebuild command.
///
/// `{output}` and `{project}` are substituted in place; a `{sources}`
/// argument expands to one argument per source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RebuildConfig {
    pub command: Vec<String>,
}

impl Default for RebuildConfig {
    fn default() -> Self {
        Self {
            command: ["dotnet", "fsc", "-o", "{output}", "--debug:full", "-a", "{sources}"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl RebuildConfig {
    pub fn has_output_placeholder(&self) -> bool {
        self.command.iter().any(|arg| arg.contains("{output}"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilitiesConfig {
    /// Upper bound on capability negotiation.
    pub timeout_ms: u64,
}

impl Default for CapabilitiesConfig {
    fn default() -> Self {
        Self { timeout_ms: 10_000 }
    }
}

impl CapabilitiesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
