#![doc = include_str!("../README.md")]

mod cli;

use clap::Parser;
use cli::config::{CliArgs, Config};
use cli::telemetry::init_telemetry;

fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = Config::try_from(args)?;

    init_telemetry()?;
    tracing::debug!(state = %config.state.display(), command = ?config.command, "running");

    let output = cli::run(config)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
