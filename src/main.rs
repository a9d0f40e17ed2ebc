#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::info;

use fqfilter_rs::config::Cli;

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    info!("Running fqfilter version {}", env!("CARGO_PKG_VERSION"));

    fqfilter_rs::run(&cli).with_context(|| format!("Failed to filter '{}'", cli.in1.display()))?;
    Ok(())
}
