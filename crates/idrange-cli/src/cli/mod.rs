pub mod commands;
pub mod config;
pub mod snapshot;
pub mod telemetry;

use idrange::Allocator;
use serde_json::Value;

use crate::cli::config::Config;

/// Loads the state file, runs the configured command and saves the state
/// again if the command may have changed it.
///
/// Commands that may change the state hold [`snapshot::StateLock`] across
/// load and save, so parallel processes never work from the same snapshot.
pub fn run(config: Config) -> anyhow::Result<Value> {
    let _lock = if config.command.mutates() {
        Some(snapshot::StateLock::acquire(
            &config.state,
            config.store.lock_timeout,
        )?)
    } else {
        None
    };
    let store = snapshot::load(&config.state, config.store)?;
    let allocator = Allocator::new(store, config.allocator);
    let output = commands::execute(&allocator, &config.command)?;
    if config.command.mutates() {
        snapshot::save(&config.state, allocator.store())?;
    }
    Ok(output)
}
