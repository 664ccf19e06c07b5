//! `dae engines`.

use std::path::Path;

use anyhow::{Context, Result};
use dae_core::{DaeConfig, EngineRegistry};

/// Prints each configured engine with its state and rules.
pub fn run(config_path: &Path) -> Result<()> {
    let config = DaeConfig::from_file(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let registry = EngineRegistry::from_config(&config)?;
    for engine in registry.engines() {
        let state = if engine.enabled { "enabled" } else { "disabled" };
        println!("{} {} ({state})", engine.name, engine.version);
        for rule in &engine.rules {
            println!("  {rule}");
        }
    }
    Ok(())
}
