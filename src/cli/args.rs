//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Hot reload for running applications: turns edited sources into live updates
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path (default: deltawatch.toml)
    #[arg(short = 'C', long, global = true, default_value = "deltawatch.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Show debug and verbose messages
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Watch the project and hot reload changes into the running application
    #[command(visible_alias = "w")]
    Watch {
        /// Project file to watch (overrides [project] path)
        #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
        project: Option<PathBuf>,
    },

    /// Print the backend and runtime profile selected for each project
    #[command(visible_alias = "c")]
    Classify {
        /// Project file (overrides [project] path)
        #[arg(value_hint = clap::ValueHint::FilePath)]
        project: Option<PathBuf>,
    },

    /// Print the module id, code size and type count of a built module
    Inspect {
        /// Built module image (.dll)
        #[arg(value_hint = clap::ValueHint::FilePath)]
        image: PathBuf,
    },
}

impl Cli {
    /// Project given on the command line, if any.
    pub fn project(&self) -> Option<&Path> {
        match &self.command {
            Commands::Watch { project } | Commands::Classify { project } => project.as_deref(),
            Commands::Inspect { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_with_project() {
        let cli = Cli::parse_from(["deltawatch", "-v", "watch", "--project", "App.fsproj"]);
        assert!(cli.verbose);
        assert_eq!(cli.project(), Some(Path::new("App.fsproj")));
        assert_eq!(cli.config, Path::new("deltawatch.toml"));
    }

    #[test]
    fn test_inspect_has_no_project() {
        let cli = Cli::parse_from(["deltawatch", "inspect", "bin/App.dll"]);
        assert_eq!(cli.project(), None);
    }

    #[test]
    fn test_global_config_flag_after_subcommand() {
        let cli = Cli::parse_from(["deltawatch", "classify", "-C", "other.toml"]);
        assert_eq!(cli.config, Path::new("other.toml"));
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
