//! Error types for the model endpoint crate.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using the LLM error type.
pub type Result<T> = std::result::Result<T, LlmError>;

// ─────────────────────────────────────────────────────────────────────────────
// Rate Limit Info
// ─────────────────────────────────────────────────────────────────────────────

/// Details of a 429 answer.
#[derive(Debug, Clone)]
pub struct RateLimitInfo {
    pub message: String,
    pub retry_after: Option<Duration>,
}

impl RateLimitInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retry_after: None,
        }
    }

    /// Only the delta-seconds form of `Retry-After` is understood.
    pub fn from_header(message: &str, retry_after_header: Option<&str>) -> Self {
        Self {
            message: message.to_string(),
            retry_after: retry_after_header.and_then(parse_retry_after_header),
        }
    }
}

impl std::fmt::Display for RateLimitInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(retry_after) = self.retry_after {
            write!(f, " (retry after {:.2}s)", retry_after.as_secs_f64())?;
        }
        Ok(())
    }
}

fn parse_retry_after_header(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM Error
// ─────────────────────────────────────────────────────────────────────────────

/// Failures talking to the model provider.
///
/// The variants line up with how the assistant reports them: credentials,
/// throttling, a provider-side failure, or something local.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The provider answered with a failure (5xx, overloaded, in-band error).
    #[error("Backend error: {0}")]
    Backend(String),

    /// The request never got a usable answer. The only retried variant.
    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The provider rejected the request shape (4xx other than auth and 429).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(RateLimitInfo),

    /// 401 or 403.
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LlmError {
    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::RateLimit(RateLimitInfo::new(message))
    }

    /// The provider's `Retry-After`, when it sent one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit(info) => info.retry_after,
            _ => None,
        }
    }

    /// Rate limits are not retried here; they go back to the user.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// A failure reported by (or on the way to) the provider, as opposed to
    /// one raised locally.
    pub fn is_api(&self) -> bool {
        matches!(
            self,
            Self::Backend(_) | Self::InvalidRequest(_) | Self::Network(_)
        )
    }

    /// The underlying message without the variant prefix.
    pub fn detail(&self) -> String {
        match self {
            Self::Backend(m)
            | Self::Network(m)
            | Self::Serialization(m)
            | Self::InvalidRequest(m)
            | Self::Auth(m)
            | Self::Internal(m) => m.clone(),
            Self::RateLimit(info) => info.to_string(),
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Network(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            LlmError::Network(format!("Connection failed: {}", err))
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        assert!(LlmError::Network("timeout".to_string()).is_retryable());
        assert!(!LlmError::rate_limit("rate limited").is_retryable());
        assert!(!LlmError::Auth("unauthorized".to_string()).is_retryable());
        assert!(!LlmError::Backend("server error".to_string()).is_retryable());
    }

    #[test]
    fn test_classification() {
        assert!(LlmError::Auth("bad key".into()).is_auth());
        assert!(matches!(LlmError::rate_limit("slow down"), LlmError::RateLimit(_)));
        assert!(LlmError::Backend("overloaded".into()).is_api());
        assert!(!LlmError::Internal("bug".into()).is_api());
    }

    #[test]
    fn test_rate_limit_from_header() {
        let info = RateLimitInfo::from_header("Too many requests", Some(" 12 "));
        assert_eq!(info.retry_after, Some(Duration::from_secs(12)));

        let info = RateLimitInfo::from_header("Too many requests", Some("soon"));
        assert!(info.retry_after.is_none());

        let err = LlmError::RateLimit(RateLimitInfo::from_header("x", Some("3")));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_rate_limit_info_display() {
        let info = RateLimitInfo::new("Rate limited");
        assert_eq!(info.to_string(), "Rate limited");

        let info = RateLimitInfo {
            message: "Rate limited".into(),
            retry_after: Some(Duration::from_secs_f64(6.5)),
        };
        assert!(info.to_string().contains("retry after 6.50s"));
    }

    #[test]
    fn test_detail_strips_prefix() {
        let err = LlmError::Backend("model overloaded".into());
        assert_eq!(err.detail(), "model overloaded");
        assert_eq!(err.to_string(), "Backend error: model overloaded");
    }
}
