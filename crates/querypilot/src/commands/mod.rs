//! CLI command handlers.

pub mod check_key;
pub mod schema;
pub mod serve;

use std::path::PathBuf;

use anyhow::Result;
use querypilot_config::{LoadedConfig, load_config_with_options};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Overrides the user config directory.
    pub config_dir: Option<PathBuf>,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Load the layered configuration and surface its warnings.
    pub fn load_config(&self) -> Result<LoadedConfig> {
        let loaded = load_config_with_options(None, self.config_dir.as_deref())?;

        for warning in &loaded.warnings {
            eprintln!("warning: {}", warning);
        }
        if self.verbose {
            for path in loaded.loaded_from() {
                eprintln!("Loaded config from {}", path.display());
            }
        }

        Ok(loaded)
    }
}
