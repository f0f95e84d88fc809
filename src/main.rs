//! deltawatch - hot reload for running applications.

use anyhow::Result;
use clap::{ColorChoice, Parser};
use deltawatch::cli::{Cli, Commands, classify, inspect, watch};
use deltawatch::config::WatchConfig;

fn main() -> Result<()> {
    // Before anything blocks: exits directly until watch mode registers its token.
    deltawatch::core::setup_shutdown_handler()?;

    let cli = Cli::parse();

    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {}
    }
    deltawatch::logger::set_verbose(cli.verbose);

    match &cli.command {
        Commands::Inspect { image } => inspect::run_inspect(image),
        Commands::Classify { .. } => classify::run_classify(&WatchConfig::load(&cli)?),
        Commands::Watch { .. } => watch::run_watch(&WatchConfig::load(&cli)?),
    }
}
