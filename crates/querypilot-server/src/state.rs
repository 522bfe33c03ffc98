//! Application state shared across handlers.

use std::sync::Arc;

use querypilot_agent::AgentConfig;
use querypilot_config::AssistantSettings;
use querypilot_llm::{AnthropicConfig, SharedBackend, create_shared_backend};

use crate::approvals::ApprovalStore;
use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::sources::DataSourceRegistry;

/// Builds a model backend for an API key.
///
/// Keys can differ per request (the key check endpoint takes one in its
/// body), so backends are created on demand rather than held in state.
pub type BackendFactory =
    Arc<dyn Fn(&str) -> querypilot_llm::Result<SharedBackend> + Send + Sync>;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Resolved assistant settings.
    pub settings: Arc<AssistantSettings>,

    /// Server configuration.
    pub config: Arc<ServerConfig>,

    /// Configured data sources.
    pub data_sources: Arc<DataSourceRegistry>,

    /// Approval decisions recorded between exchanges.
    pub approvals: Arc<ApprovalStore>,

    backend_factory: BackendFactory,
}

impl AppState {
    /// Create application state backed by the Anthropic API.
    pub fn new(
        settings: AssistantSettings,
        config: ServerConfig,
        data_sources: DataSourceRegistry,
    ) -> Self {
        let backend_factory = anthropic_factory(settings.base_url.clone());
        Self {
            settings: Arc::new(settings),
            approvals: Arc::new(ApprovalStore::new(config.approval_ttl)),
            config: Arc::new(config),
            data_sources: Arc::new(data_sources),
            backend_factory,
        }
    }

    /// Replace how model backends are built.
    pub fn with_backend_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&str) -> querypilot_llm::Result<SharedBackend> + Send + Sync + 'static,
    {
        self.backend_factory = Arc::new(factory);
        self
    }

    /// Build a backend for `api_key`.
    pub fn backend(&self, api_key: &str) -> querypilot_llm::Result<SharedBackend> {
        (self.backend_factory)(api_key)
    }

    /// Agent loop settings for one exchange.
    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig::new(&self.settings.model)
            .with_max_tokens(self.settings.max_tokens)
            .with_max_iterations(self.settings.max_iterations)
    }

    /// Fail with `403` unless the assistant is enabled.
    pub fn require_enabled(&self) -> Result<()> {
        if self.settings.enabled {
            Ok(())
        } else {
            Err(ServerError::Forbidden(
                "AI assistant is not enabled.".to_string(),
            ))
        }
    }

    /// The configured API key, or `503` when there is none.
    pub fn require_api_key(&self) -> Result<&str> {
        self.settings.api_key.as_deref().ok_or_else(|| {
            ServerError::ServiceUnavailable(
                "AI assistant is not configured. Please set up the API key.".to_string(),
            )
        })
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("settings", &self.settings)
            .field("config", &self.config)
            .field("data_sources", &self.data_sources.len())
            .field("approvals", &self.approvals)
            .finish()
    }
}

fn anthropic_factory(base_url: Option<String>) -> BackendFactory {
    Arc::new(move |api_key: &str| {
        let mut config = AnthropicConfig::new(api_key);
        if let Some(url) = &base_url {
            config = config.with_base_url(url);
        }
        create_shared_backend(config)
    })
}
