mod cli;
mod registry;
mod runner;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use tensorport_core::{ModelConfig, SingleProcess};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log);

    match cli.command {
        Command::Describe { config } => describe(&config),
        Command::Run(args) => runner::run(args),
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn describe(path: &Path) -> Result<()> {
    let config = ModelConfig::from_file(path)
        .with_context(|| format!("cannot load config {}", path.display()))?;
    println!("{config}");

    let factory = registry::default_factory();
    let mut model = registry::build_model(&factory, config, Arc::new(SingleProcess))?;
    model.open().context("cannot open model")?;
    println!("{}", model.describe());
    model.close()?;
    Ok(())
}
