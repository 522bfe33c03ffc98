//! Failures of the agent loop and its tools.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(#[from] querypilot_llm::LlmError),

    /// A tool failed in a way the model should hear about.
    #[error("Tool error: {0}")]
    Tool(String),

    /// The model named a tool that was never declared.
    #[error("Unknown tool: {0}")]
    ToolNotFound(String),

    /// Shown to the model as-is.
    #[error("{0}")]
    InvalidToolParams(String),

    /// The model answered but the reply was unusable.
    #[error("Empty response from model")]
    EmptyResponse,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    /// The client went away mid-exchange.
    #[error("Task cancelled")]
    Cancelled,

    /// The model kept calling tools past the configured turn limit.
    #[error("Maximum iterations exceeded: {0}")]
    MaxIterations(u32),
}

impl AgentError {
    pub fn tool(msg: impl Into<String>) -> Self {
        Self::Tool(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Message suitable for a tool result the model will read.
    pub fn tool_message(&self) -> String {
        match self {
            Self::Tool(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}
