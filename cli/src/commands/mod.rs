pub mod config;
pub mod health;
pub mod locate;
pub mod run;
pub mod serve;

use std::path::PathBuf;

use anyhow::{Context, Result};
use llama_launcher_core::{BinaryKind, BinaryLocation, Config, Locator, ParameterSet};

/// Pick the binary: `--binary` first, then the config file, then detection.
pub fn resolve_binary(kind: BinaryKind, manual: Option<PathBuf>, config: &Config) -> Option<BinaryLocation> {
    let configured = match kind {
        BinaryKind::Cli => config.binaries.cli.clone(),
        BinaryKind::Server => config.binaries.server.clone(),
    };

    match manual.or(configured) {
        Some(path) => Some(BinaryLocation::manual(path)),
        None => Locator::from_env().locate(kind),
    }
}

/// Apply `key=value` overrides given with `--set`
pub fn apply_overrides<P: ParameterSet>(params: &mut P, overrides: &[String]) -> Result<()> {
    for entry in overrides {
        let (key, value) = entry
            .split_once('=')
            .with_context(|| format!("Expected key=value, got {:?}", entry))?;
        params.set(key.trim(), value)?;
    }
    Ok(())
}
