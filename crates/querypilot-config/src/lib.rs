//! Configuration system for querypilot.
//!
//! Provides TOML-based configuration with:
//! - Assistant settings (`[assistant]`) with environment fallbacks
//! - Server settings (`[server]`)
//! - Data source declarations (`[[data_source]]`)
//! - Config file layering (XDG user config + project-local overrides)

pub mod discovery;
pub mod error;
pub mod settings;
pub mod types;

pub use discovery::{
    ConfigSource, LoadedConfig, load_config, load_config_file, load_config_with_options,
    xdg_config_dir, xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use settings::{API_KEY_ENV, AssistantSettings, ENABLED_ENV, SecretSource};
pub use types::*;
