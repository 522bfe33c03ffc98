//! Protocol events emitted by the orchestrator.

use bytes::Bytes;
use serde::Serialize;

use querypilot_llm::{LlmError, Usage};

use crate::error::AgentError;
use crate::sse::{self, EncodeError};
use crate::tool::ToolOutcome;

/// Category of a terminal error, so clients can react without parsing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Authentication,
    RateLimit,
    Api,
    IterationLimit,
    Cancelled,
    Internal,
}

/// Token usage reported with `done`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageReport {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl From<Usage> for UsageReport {
    fn from(usage: Usage) -> Self {
        Self {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
        }
    }
}

/// One event of an exchange.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AgentEvent {
    TextDelta {
        text: String,
    },
    ToolStart {
        tool: String,
        id: String,
    },
    ToolResult {
        tool: String,
        id: String,
        result: ToolOutcome,
    },
    Done {
        usage: UsageReport,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        pending_approvals: Vec<String>,
    },
    Error {
        message: String,
        kind: ErrorKind,
    },
}

impl AgentEvent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::TextDelta { text: text.into() }
    }

    pub fn tool_start(tool: impl Into<String>, id: impl Into<String>) -> Self {
        Self::ToolStart {
            tool: tool.into(),
            id: id.into(),
        }
    }

    pub fn tool_result(tool: impl Into<String>, id: impl Into<String>, result: ToolOutcome) -> Self {
        Self::ToolResult {
            tool: tool.into(),
            id: id.into(),
            result,
        }
    }

    pub fn done(usage: impl Into<UsageReport>, pending_approvals: Vec<String>) -> Self {
        Self::Done {
            usage: usage.into(),
            pending_approvals,
        }
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            kind,
        }
    }

    /// Build the terminal event for a model failure.
    pub fn from_llm_error(err: &LlmError) -> Self {
        match err {
            LlmError::Auth(_) => Self::error(ErrorKind::Authentication, "Invalid API key."),
            LlmError::RateLimit(_) => Self::error(
                ErrorKind::RateLimit,
                "Rate limit exceeded. Please try again later.",
            ),
            e if e.is_api() => Self::error(ErrorKind::Api, format!("API error: {}", e.detail())),
            e => Self::error(ErrorKind::Internal, format!("Error: {}", e.detail())),
        }
    }

    /// Build the terminal event for any agent failure.
    pub fn from_agent_error(err: &AgentError) -> Self {
        match err {
            AgentError::Llm(e) => Self::from_llm_error(e),
            AgentError::MaxIterations(n) => Self::error(
                ErrorKind::IterationLimit,
                format!("Stopped after {} model turns without a final answer.", n),
            ),
            AgentError::Cancelled => Self::error(ErrorKind::Cancelled, "Request cancelled."),
            e => Self::error(ErrorKind::Internal, format!("Error: {}", e)),
        }
    }

    /// The SSE event name.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TextDelta { .. } => "text_delta",
            Self::ToolStart { .. } => "tool_start",
            Self::ToolResult { .. } => "tool_result",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    /// Whether this event ends the exchange.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }

    /// Frame this event for the wire.
    pub fn encode(&self) -> Result<Bytes, EncodeError> {
        sse::encode(self.event_type(), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(event: &AgentEvent) -> serde_json::Value {
        serde_json::to_value(event).unwrap()
    }

    #[test]
    fn test_payload_shapes() {
        assert_eq!(payload(&AgentEvent::text("Hi")), json!({"text": "Hi"}));
        assert_eq!(
            payload(&AgentEvent::tool_start("get_schema", "t1")),
            json!({"tool": "get_schema", "id": "t1"})
        );
        assert_eq!(
            payload(&AgentEvent::tool_result(
                "execute_query",
                "t2",
                ToolOutcome::error("boom")
            )),
            json!({"tool": "execute_query", "id": "t2", "result": {"error": "boom"}})
        );
        assert_eq!(
            payload(&AgentEvent::done(Usage::new(10, 20), vec![])),
            json!({"usage": {"input_tokens": 10, "output_tokens": 20}})
        );
        assert_eq!(
            payload(&AgentEvent::done(Usage::new(1, 2), vec!["SELECT 1".into()])),
            json!({
                "usage": {"input_tokens": 1, "output_tokens": 2},
                "pending_approvals": ["SELECT 1"]
            })
        );
    }

    #[test]
    fn test_llm_error_messages() {
        let cases = [
            (LlmError::Auth("bad key".into()), ErrorKind::Authentication, "Invalid API key."),
            (
                LlmError::rate_limit("slow down"),
                ErrorKind::RateLimit,
                "Rate limit exceeded. Please try again later.",
            ),
            (
                LlmError::Backend("overloaded".into()),
                ErrorKind::Api,
                "API error: overloaded",
            ),
            (
                LlmError::Internal("oops".into()),
                ErrorKind::Internal,
                "Error: oops",
            ),
        ];
        for (err, kind, message) in cases {
            assert_eq!(AgentEvent::from_llm_error(&err), AgentEvent::error(kind, message));
        }
    }

    #[test]
    fn test_iteration_limit_kind() {
        let event = AgentEvent::from_agent_error(&AgentError::MaxIterations(10));
        assert!(matches!(
            event,
            AgentEvent::Error { kind: ErrorKind::IterationLimit, .. }
        ));
        assert_eq!(
            payload(&event)["kind"],
            json!("iteration_limit")
        );
    }

    #[test]
    fn test_encode_uses_event_type() {
        let frame = AgentEvent::text("x").encode().unwrap();
        assert!(frame.starts_with(b"event: text_delta\ndata: "));
        assert!(AgentEvent::done(Usage::default(), vec![]).is_terminal());
        assert!(!AgentEvent::text("x").is_terminal());
    }
}
