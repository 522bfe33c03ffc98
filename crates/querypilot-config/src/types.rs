//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [assistant]              # model access and loop limits
//! [server]                 # HTTP server settings
//! [[data_source]]          # one entry per queryable database
//! ```

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Default model for the assistant.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
/// Default token budget per model turn.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
/// Default cap on model turns per exchange.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;
/// Default server bind address.
pub const DEFAULT_BIND: &str = "127.0.0.1:5050";
/// Default lifetime of a stored approval decision.
pub const DEFAULT_APPROVAL_TTL_SECS: u64 = 900;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryPilotConfig {
    /// Assistant configuration.
    pub assistant: Option<AssistantConfig>,

    /// Server configuration.
    pub server: Option<ServerConfig>,

    /// Data sources, in declaration order.
    #[serde(rename = "data_source")]
    pub data_sources: Vec<DataSourceConfig>,
}

impl QueryPilotConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML string and validate it.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Assistant and server fields merge individually; data sources merge by
    /// id, with new ids appended in order.
    pub fn merge(&mut self, other: QueryPilotConfig) {
        if let Some(over) = other.assistant {
            self.assistant.get_or_insert_with(Default::default).merge(over);
        }

        if let Some(over) = other.server {
            self.server.get_or_insert_with(Default::default).merge(over);
        }

        for source in other.data_sources {
            match self.data_sources.iter_mut().find(|s| s.id == source.id) {
                Some(existing) => *existing = source,
                None => self.data_sources.push(source),
            }
        }
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for source in &self.data_sources {
            if source.id.trim().is_empty() {
                return Err(ConfigError::MissingField {
                    field: "id".to_string(),
                    context: "[[data_source]]".to_string(),
                });
            }
            if !seen.insert(source.id.as_str()) {
                return Err(ConfigError::DuplicateDataSource(source.id.clone()));
            }
        }

        if let Some(server) = &self.server
            && let Some(bind) = &server.bind
            && bind.parse::<std::net::SocketAddr>().is_err()
        {
            return Err(ConfigError::InvalidValue {
                field: "server.bind".to_string(),
                reason: format!("'{}' is not a socket address", bind),
            });
        }

        Ok(())
    }

    /// The assistant section, or defaults.
    pub fn assistant(&self) -> AssistantConfig {
        self.assistant.clone().unwrap_or_default()
    }

    /// The server section, or defaults.
    pub fn server(&self) -> ServerConfig {
        self.server.clone().unwrap_or_default()
    }

    /// Look up a data source by id.
    pub fn data_source(&self, id: &str) -> Option<&DataSourceConfig> {
        self.data_sources.iter().find(|s| s.id == id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Assistant
// ─────────────────────────────────────────────────────────────────────────────

/// `[assistant]`: model access and loop limits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Whether the assistant endpoints are available.
    pub enabled: Option<bool>,
    /// Anthropic API key (prefer the environment; warns if set here).
    pub api_key: Option<String>,
    /// Model identifier.
    pub model: Option<String>,
    /// Maximum tokens per model turn.
    pub max_tokens: Option<u32>,
    /// Maximum model turns per exchange.
    pub max_iterations: Option<u32>,
    /// Custom API base URL (for proxies, custom endpoints).
    pub base_url: Option<String>,
}

impl AssistantConfig {
    fn merge(&mut self, other: AssistantConfig) {
        if other.enabled.is_some() {
            self.enabled = other.enabled;
        }
        if other.api_key.is_some() {
            self.api_key = other.api_key;
        }
        if other.model.is_some() {
            self.model = other.model;
        }
        if other.max_tokens.is_some() {
            self.max_tokens = other.max_tokens;
        }
        if other.max_iterations.is_some() {
            self.max_iterations = other.max_iterations;
        }
        if other.base_url.is_some() {
            self.base_url = other.base_url;
        }
    }

    /// Returns true if an API key is stored directly in the config file.
    pub fn has_plaintext_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    pub fn effective_model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn effective_max_tokens(&self) -> u32 {
        self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)
    }

    pub fn effective_max_iterations(&self) -> u32 {
        self.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server
// ─────────────────────────────────────────────────────────────────────────────

/// `[server]`: HTTP server settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind: Option<String>,
    /// Seconds a stored approval decision stays valid.
    pub approval_ttl_secs: Option<u64>,
    /// Allowed CORS origins; empty means same-origin only.
    pub cors_origins: Option<Vec<String>>,
}

impl ServerConfig {
    fn merge(&mut self, other: ServerConfig) {
        if other.bind.is_some() {
            self.bind = other.bind;
        }
        if other.approval_ttl_secs.is_some() {
            self.approval_ttl_secs = other.approval_ttl_secs;
        }
        if other.cors_origins.is_some() {
            self.cors_origins = other.cors_origins;
        }
    }

    pub fn effective_bind(&self) -> &str {
        self.bind.as_deref().unwrap_or(DEFAULT_BIND)
    }

    pub fn effective_approval_ttl_secs(&self) -> u64 {
        self.approval_ttl_secs.unwrap_or(DEFAULT_APPROVAL_TTL_SECS)
    }

    pub fn effective_cors_origins(&self) -> &[String] {
        self.cors_origins.as_deref().unwrap_or(&[])
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Data Sources
// ─────────────────────────────────────────────────────────────────────────────

/// Supported data source engines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSourceKind {
    #[default]
    Sqlite,
}

impl DataSourceKind {
    /// The engine name shown to users and the model.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSourceKind::Sqlite => "sqlite",
        }
    }
}

impl std::fmt::Display for DataSourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `[[data_source]]`: one queryable database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceConfig {
    /// Identifier clients use to address the source.
    pub id: String,
    /// Display name; defaults to the id.
    #[serde(default)]
    pub name: Option<String>,
    /// Engine type.
    #[serde(default)]
    pub kind: DataSourceKind,
    /// Database file.
    pub path: PathBuf,
    /// Free-form ontology or business metadata for the model.
    #[serde(default)]
    pub ontology: Option<String>,
    /// JSON schema description that replaces introspection.
    #[serde(default)]
    pub schema_file: Option<PathBuf>,
}

impl DataSourceConfig {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}
