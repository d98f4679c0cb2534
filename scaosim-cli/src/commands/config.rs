//! Config command - print the effective configuration.

use anyhow::{Context, Result};
use scaosim_core::config::ScaoConfig;

/// Run the config command.
pub fn run(config: &ScaoConfig) -> Result<()> {
    let yaml = config.to_yaml().context("Failed to serialize configuration")?;
    print!("{yaml}");
    Ok(())
}
