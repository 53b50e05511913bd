//! layerfs CLI Binary
//!
//! Command-line interface for layered XML configuration filesystems.

use anyhow::Context;
use clap::Parser;
use layerfs::logging::init_logging;
use layerfs::tooling::cli::{Cli, CliContext};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let context = CliContext::new(cli.workspace.clone(), cli.config.clone())
        .with_context(|| format!("initializing workspace {}", cli.workspace.display()))?;

    let logging = cli.logging_config(context.config().logging.clone());
    init_logging(Some(&logging)).context("initializing logging")?;

    let output = context.execute(&cli.command)?;
    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}
