//! `[project]` and `[assets]` sections.
//!
//! ```toml
//! [project]
//! path = "src/App/App.fsproj"
//!
//! [assets]
//! static_dir = "wwwroot"
//! output = "obj/deltawatch/wwwroot"
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Project to watch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Root project file, relative to the config file.
    pub path: PathBuf,
}

/// Static asset copy and scoped style bundle output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    /// Static asset root, relative to each project directory.
    pub static_dir: PathBuf,
    /// Destination for copied assets and the scoped bundle. Relative paths
    /// resolve against each project directory.
    pub output: PathBuf,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            static_dir: PathBuf::from("wwwroot"),
            output: PathBuf::from("obj/deltawatch/wwwroot"),
        }
    }
}
