//! Configuration management for `deltawatch.toml`.
//!
//! ```text
//! config/
//! ├── section/   # [project] [assets] [backend] [rebuild] [capabilities] [runtime] [watch]
//! ├── error      # ConfigError
//! ├── util       # config discovery and path resolution
//! └── mod.rs     # WatchConfig (this file)
//! ```
//!
//! | Section          | Purpose                                          |
//! |------------------|--------------------------------------------------|
//! | `[project]`      | Root project file to watch                       |
//! | `[assets]`       | Static asset root and copy destination           |
//! | `[backend]`      | Which projects use the one-shot rebuild backend  |
//! | `[rebuild]`      | Full rebuild command line                        |
//! | `[capabilities]` | Capability negotiation timeout                   |
//! | `[runtime]`      | Applier profile and channel endpoints            |
//! | `[watch]`        | Debounce and cooldown                            |

pub mod section;
mod error;
mod util;

pub use error::ConfigError;
pub use section::{
    AssetsConfig, BackendConfig, CapabilitiesConfig, ProfileSetting, ProjectConfig, RebuildConfig,
    RuntimeConfig, WatchSection,
};
pub use util::{find_config_file, resolve_path};

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::actor::fs::WatchSettings;
use crate::cli::Cli;
use crate::core::ProjectGraph;
use crate::log;

/// Root configuration structure representing `deltawatch.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Absolute path to the config file, empty when running without one.
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Directory relative paths resolve against.
    #[serde(skip)]
    pub root: PathBuf,

    #[serde(default)]
    pub project: ProjectConfig,

    #[serde(default)]
    pub assets: AssetsConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub rebuild: RebuildConfig,

    #[serde(default)]
    pub capabilities: CapabilitiesConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub watch: WatchSection,
}

impl WatchConfig {
    /// Load configuration for a CLI invocation.
    ///
    /// Searches upward from the working directory for the config file. Without
    /// one, defaults apply and `--project` becomes mandatory.
    pub fn load(cli: &Cli) -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current working directory")?;

        let mut config = match find_config_file(&cli.config, &cwd) {
            Some(path) => {
                let mut config = Self::from_path(&path)?;
                let root = path.parent().map(Path::to_path_buf).unwrap_or_default();
                config.config_path = path;
                config.finalize(&root);
                config
            }
            None if cli.project().is_some() => {
                let mut config = Self::default();
                config.finalize(&cwd);
                config
            }
            None => bail!(
                "config file '{}' not found; create one or pass --project",
                cli.config.display()
            ),
        };

        if let Some(project) = cli.project() {
            config.project.path = resolve_path(&cwd, project);
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string, ignoring unknown fields.
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load from a file, warning about unknown fields.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }
        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {} are ignored: {}", display_path, fields.join(", "));
    }

    /// Resolve paths against the config directory.
    fn finalize(&mut self, root: &Path) {
        self.root = root.to_path_buf();
        if !self.project.path.as_os_str().is_empty() {
            self.project.path = resolve_path(root, &self.project.path);
        }
        // Relative output stays relative: it resolves per project directory.
        let output = self.assets.output.to_string_lossy();
        self.assets.output = PathBuf::from(shellexpand::tilde(&output).as_ref());
    }

    /// Check the loaded configuration, reporting every problem at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.project.path.as_os_str().is_empty() {
            errors.push("[project] path is required".to_string());
        } else if !self.project.path.is_file() {
            errors.push(format!(
                "[project] path `{}` does not exist",
                self.project.path.display()
            ));
        }
        if self.rebuild.command.is_empty() {
            errors.push("[rebuild] command must not be empty".to_string());
        } else if !self.rebuild.has_output_placeholder() {
            errors.push("[rebuild] command must contain the `{output}` placeholder".to_string());
        }
        if self.capabilities.timeout_ms == 0 {
            errors.push("[capabilities] timeout_ms must be greater than zero".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    pub fn project_path(&self) -> &Path {
        &self.project.path
    }

    /// Watcher settings: configured timing, and the asset output of every
    /// project excluded so copied files do not feed back into the watcher.
    pub fn watch_settings(&self, graph: &ProjectGraph) -> WatchSettings {
        let mut excluded = Vec::new();
        for node in graph.nodes() {
            let output = resolve_path(node.identity.dir(), &self.assets.output);
            if !excluded.contains(&output) {
                excluded.push(output);
            }
        }
        WatchSettings {
            timing: self.watch.timing(),
            excluded,
        }
    }
}

/// Parse a config string for section tests.
#[cfg(test)]
pub(crate) fn test_parse_config(content: &str) -> WatchConfig {
    WatchConfig::from_str(content).unwrap()
}
