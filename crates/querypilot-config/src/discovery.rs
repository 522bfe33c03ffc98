//! Finding and layering config files.
//!
//! Two layers are read, the second winning field by field:
//! 1. `config.toml` in the user config dir (`~/.config/querypilot/` by default)
//! 2. `querypilot.toml` in the project dir (the working directory by default)
//!
//! Command-line flags are applied on top by the binary.

use std::path::{Path, PathBuf};

use crate::{ConfigError, QueryPilotConfig, Result};

const PROJECT_CONFIG_FILE: &str = "querypilot.toml";

const USER_CONFIG_FILE: &str = "config.toml";

const APP_NAME: &str = "querypilot";

/// Replaces the platform config dir when set and non-empty.
const CONFIG_DIR_ENV: &str = "QUERYPILOT_CONFIG_DIR";

/// One layer that was looked for.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub path: PathBuf,
    /// False when the file was absent or failed to parse.
    pub loaded: bool,
}

/// The merged configuration and how it came together.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: QueryPilotConfig,
    /// Every layer looked for, lowest precedence first.
    pub sources: Vec<ConfigSource>,
    /// Things the operator should see before the server starts.
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Layers that contributed to the result.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }
}

/// Load both layers from their default locations.
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None)
}

/// Load both layers, with `config_dir` standing in for the user config dir.
///
/// A layer that fails to read or parse is skipped with a warning. Validation
/// runs on the merged result, so conflicts between layers still fail.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    let mut config = QueryPilotConfig::new();
    let mut sources = Vec::new();
    let mut warnings = Vec::new();

    let user_config_path = match config_dir {
        Some(dir) => Some(dir.join(USER_CONFIG_FILE)),
        None => xdg_config_path(),
    };
    if let Some(path) = user_config_path {
        sources.push(load_layer(&mut config, &path, &mut warnings));
    }

    let project_path = project_dir
        .map(|d| d.join(PROJECT_CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));
    sources.push(load_layer(&mut config, &project_path, &mut warnings));

    config.validate()?;

    if let Some(assistant) = &config.assistant
        && assistant.has_plaintext_api_key()
    {
        warnings.push(
            "[assistant] contains a plaintext API key. \
             Consider the ANTHROPIC_API_KEY environment variable instead."
                .to_string(),
        );
    }

    Ok(LoadedConfig {
        config,
        sources,
        warnings,
    })
}

/// Parse one config file.
pub fn load_config_file(path: &Path) -> Result<QueryPilotConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    QueryPilotConfig::from_toml(&contents)
}

/// `config.toml` inside [`xdg_config_dir`].
pub fn xdg_config_path() -> Option<PathBuf> {
    xdg_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// `QUERYPILOT_CONFIG_DIR`, else the platform config dir plus `querypilot`.
/// Log files live under this directory too.
pub fn xdg_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Merge `path` into `config` if it exists, noting the outcome.
fn load_layer(config: &mut QueryPilotConfig, path: &Path, warnings: &mut Vec<String>) -> ConfigSource {
    if !path.is_file() {
        return ConfigSource {
            path: path.to_path_buf(),
            loaded: false,
        };
    }

    let loaded = match load_config_file(path) {
        Ok(layer) => {
            config.merge(layer);
            true
        }
        Err(e) => {
            warnings.push(format!("Skipped {}: {}", path.display(), e));
            false
        }
    };

    ConfigSource {
        path: path.to_path_buf(),
        loaded,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
