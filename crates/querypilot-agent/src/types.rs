//! Runtime configuration for the agent loop.

use serde::{Deserialize, Serialize};

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Configuration for one exchange of the agent loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Model to use for completions.
    pub model: String,
    /// Maximum tokens per model turn.
    pub max_tokens: u32,
    /// Maximum model turns before the exchange is abandoned.
    pub max_iterations: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 4096,
            max_iterations: 10,
        }
    }
}

impl AgentConfig {
    /// Create a config with the given model and default limits.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}
