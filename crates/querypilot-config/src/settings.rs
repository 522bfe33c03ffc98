//! Effective assistant settings.
//!
//! Each value comes from the config file first and the environment second:
//! `enabled` from `[assistant].enabled` then `QUERYPILOT_AI_ENABLED`, the API
//! key from `[assistant].api_key` then `ANTHROPIC_API_KEY`.

use crate::types::{AssistantConfig, QueryPilotConfig};

/// Environment variable that enables the assistant when the config is silent.
pub const ENABLED_ENV: &str = "QUERYPILOT_AI_ENABLED";

/// Environment variable holding the Anthropic API key.
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Where the API key was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    /// Config file (plaintext).
    ConfigFile,
    /// Environment variable.
    EnvVar(&'static str),
}

impl std::fmt::Display for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretSource::ConfigFile => write!(f, "config file (plaintext)"),
            SecretSource::EnvVar(var) => write!(f, "env var {}", var),
        }
    }
}

/// Resolved assistant settings consumed by the server.
#[derive(Clone, PartialEq, Eq)]
pub struct AssistantSettings {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub api_key_source: Option<SecretSource>,
    pub model: String,
    pub max_tokens: u32,
    pub max_iterations: u32,
    pub base_url: Option<String>,
}

impl AssistantSettings {
    /// Resolve settings against the process environment.
    pub fn resolve(config: &QueryPilotConfig) -> Self {
        Self::resolve_with(config, |name| std::env::var(name).ok())
    }

    /// Resolve settings with an explicit environment lookup.
    pub fn resolve_with(config: &QueryPilotConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let assistant: AssistantConfig = config.assistant();

        let enabled = assistant
            .enabled
            .unwrap_or_else(|| env(ENABLED_ENV).is_some_and(|v| parse_bool(&v)));

        let (api_key, api_key_source) = match assistant.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => {
                (Some(key.trim().to_string()), Some(SecretSource::ConfigFile))
            }
            _ => match env(API_KEY_ENV) {
                Some(key) if !key.trim().is_empty() => (
                    Some(key.trim().to_string()),
                    Some(SecretSource::EnvVar(API_KEY_ENV)),
                ),
                _ => (None, None),
            },
        };

        Self {
            enabled,
            api_key,
            api_key_source,
            model: assistant.effective_model().to_string(),
            max_tokens: assistant.effective_max_tokens(),
            max_iterations: assistant.effective_max_iterations(),
            base_url: assistant.base_url.clone(),
        }
    }

    /// Whether an API key is available.
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

impl std::fmt::Debug for AssistantSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssistantSettings")
            .field("enabled", &self.enabled)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_key_source", &self.api_key_source)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("max_iterations", &self.max_iterations)
            .field("base_url", &self.base_url)
            .finish()
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
