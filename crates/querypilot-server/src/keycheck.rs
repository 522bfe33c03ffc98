//! API key verification with a minimal completion.

use querypilot_llm::{CompletionRequest, LlmError, Message, SharedBackend};
use serde::{Deserialize, Serialize};

/// Token budget for the probe request.
const PROBE_MAX_TOKENS: u32 = 10;

/// Outcome of a key check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyCheck {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl KeyCheck {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            model: None,
        }
    }

    /// The answer when there is no key to test.
    pub fn missing_key() -> Self {
        Self::failed("No API key provided or configured.")
    }

    /// Map a failed probe onto the message shown to the user.
    pub fn from_error(err: &LlmError) -> Self {
        match err {
            LlmError::Auth(_) => Self::failed("Invalid API key. Please check your key and try again."),
            LlmError::RateLimit(_) => {
                Self::failed("Rate limit exceeded. The API key appears valid but is rate limited.")
            }
            e if e.is_api() => Self::failed(format!("API error: {}", e.detail())),
            e => Self::failed(format!("Failed to test API key: {}", e.detail())),
        }
    }
}

/// Send a one-word prompt and report whether the key was accepted.
pub async fn check_api_key(backend: &SharedBackend, model: &str) -> KeyCheck {
    let request = CompletionRequest::new(model, vec![Message::user("Hi")], PROBE_MAX_TOKENS);

    match backend.complete(request).await {
        Ok(response) => {
            tracing::info!(model = %response.model, "API key check succeeded");
            KeyCheck {
                success: true,
                message: "API key is valid.".to_string(),
                model: Some(response.model),
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "API key check failed");
            KeyCheck::from_error(&e)
        }
    }
}
