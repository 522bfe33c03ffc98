//! SQL assistant endpoints: streaming chat, direct execution, approvals,
//! status and key checks.

use std::collections::HashMap;
use std::convert::Infallible;

use axum::{
    Json,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderName, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use querypilot_agent::{
    AgentEvent, ApprovalGate, CancellationToken, Decision, ErrorKind, EventStream, Exchange,
    Orchestrator, ToolContext, ToolOutcome, execute_direct, system_prompt,
};
use querypilot_llm::Message;

use crate::error::{Result, ServerError};
use crate::keycheck::{KeyCheck, check_api_key};
use crate::state::AppState;

// ─────────────────────────────────────────────────────────────────────────────
// Request/Response Types
// ─────────────────────────────────────────────────────────────────────────────

/// Response for the status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub enabled: bool,
    pub configured: bool,
}

/// Request body for a streamed exchange.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub data_source_id: Option<String>,
    /// Conversation so far, ending with the user's latest message.
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Key for decisions held in the approval store.
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Decisions for this exchange: query text to final text, `null` to reject.
    #[serde(default)]
    pub approvals: HashMap<String, Option<String>>,
}

/// Request body for direct execution.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub data_source_id: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
}

/// Request body for recording an approval decision.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApprovalRequest {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
    /// `approve` or `reject`.
    #[serde(default)]
    pub action: Option<String>,
    /// Edited text to run instead of the proposed query.
    #[serde(default)]
    pub final_query: Option<String>,
}

/// Response for a recorded decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalResponse {
    pub conversation_id: String,
    pub query: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_query: Option<String>,
}

/// Request body for the key check.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestKeyRequest {
    #[serde(default)]
    pub api_key: Option<String>,
}

/// A required string field, trimmed; blank counts as missing.
fn required(value: Option<String>, field: &str) -> Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ServerError::missing_field(field))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/assistant/status
pub async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        enabled: state.settings.enabled,
        configured: state.settings.is_configured(),
    })
}

/// POST /api/v1/assistant/chat
///
/// Streams the exchange as server-sent events. Dropping the response body
/// (the client going away) cancels the exchange.
pub async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Response> {
    state.require_enabled()?;
    let api_key = state.require_api_key()?;
    let data_source_id = required(request.data_source_id, "data_source_id")?;
    if request.messages.is_empty() {
        return Err(ServerError::missing_field("messages"));
    }

    let source = state.data_sources.require(&data_source_id)?;
    let schema = state.data_sources.require_schema(&data_source_id)?;

    let backend = state
        .backend(api_key)
        .map_err(|e| ServerError::Internal(format!("Failed to create model backend: {}", e)))?;

    let stored = match &request.conversation_id {
        Some(id) => state.approvals.gate(id),
        None => ApprovalGate::new(),
    };
    let approvals = stored.merged_with(ApprovalGate::from_wire(request.approvals));

    info!(
        data_source = %data_source_id,
        messages = request.messages.len(),
        approvals = approvals.len(),
        conversation_id = ?request.conversation_id,
        "Starting assistant exchange"
    );

    let cancel = CancellationToken::new();
    let exchange = Exchange {
        system_prompt: system_prompt(&schema, source.kind(), source.ontology.as_deref()),
        messages: request.messages,
        context: ToolContext::new(source.runner.clone(), schema)
            .with_approvals(approvals)
            .with_cancellation(cancel.clone()),
    };

    let events = Orchestrator::new(backend, state.agent_config()).run(exchange);
    Ok(event_stream_response(events, cancel))
}

/// Frame events onto a streaming response body.
///
/// The body owns a drop guard for `cancel`, so the exchange is cancelled as
/// soon as the connection's body is dropped.
fn event_stream_response(events: EventStream, cancel: CancellationToken) -> Response {
    let body = async_stream::stream! {
        let _guard = cancel.drop_guard();
        let mut events = events;
        let mut sent = 0usize;

        while let Some(event) = events.next().await {
            match event.encode() {
                Ok(frame) => {
                    sent += 1;
                    yield Ok::<Bytes, Infallible>(frame);
                }
                Err(e) => {
                    error!(error = %e, "Failed to encode event");
                    if let Ok(frame) = AgentEvent::error(ErrorKind::Internal, format!("Error: {}", e)).encode() {
                        yield Ok(frame);
                    }
                    break;
                }
            }
        }

        debug!(events = sent, "Assistant exchange finished");
    };

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/event-stream; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(body),
    )
        .into_response()
}

/// POST /api/v1/assistant/execute
///
/// Runs a query the user approved in the UI, with the same limits as the
/// `execute_query` tool. Engine errors come back as `{error}` with `200`.
pub async fn execute_handler(
    State(state): State<AppState>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<ToolOutcome>> {
    state.require_enabled()?;
    let data_source_id = required(request.data_source_id, "data_source_id")?;
    let query = required(request.query, "query")?;

    let source = state.data_sources.require(&data_source_id)?;
    info!(data_source = %data_source_id, "Executing approved query");

    Ok(Json(execute_direct(source.runner.as_ref(), &query).await))
}

/// POST /api/v1/assistant/approvals
pub async fn approvals_handler(
    State(state): State<AppState>,
    Json(request): Json<ApprovalRequest>,
) -> Result<Json<ApprovalResponse>> {
    state.require_enabled()?;
    let conversation_id = required(request.conversation_id, "conversation_id")?;
    let query = required(request.query, "query")?;
    let action = required(request.action, "action")?;

    let (decision, final_query) = match action.as_str() {
        "approve" => {
            let final_query = request
                .final_query
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty())
                .unwrap_or_else(|| query.clone());
            (Decision::Approved(final_query.clone()), Some(final_query))
        }
        "reject" => (Decision::Rejected, None),
        other => {
            return Err(ServerError::BadRequest(format!(
                "action must be 'approve' or 'reject', got '{}'.",
                other
            )));
        }
    };

    state.approvals.record(&conversation_id, &query, decision);
    info!(conversation_id = %conversation_id, action = %action, "Recorded approval decision");

    Ok(Json(ApprovalResponse {
        conversation_id,
        query,
        status: if final_query.is_some() { "approved" } else { "rejected" }.to_string(),
        final_query,
    }))
}

/// POST /api/v1/assistant/test-key
///
/// Always answers `200`; failures are reported in the body.
pub async fn test_key_handler(
    State(state): State<AppState>,
    Json(request): Json<TestKeyRequest>,
) -> Json<KeyCheck> {
    let api_key = request
        .api_key
        .filter(|k| !k.trim().is_empty())
        .or_else(|| state.settings.api_key.clone());

    let Some(api_key) = api_key else {
        return Json(KeyCheck::missing_key());
    };

    match state.backend(api_key.trim()) {
        Ok(backend) => Json(check_api_key(&backend, &state.settings.model).await),
        Err(e) => Json(KeyCheck::from_error(&e)),
    }
}
