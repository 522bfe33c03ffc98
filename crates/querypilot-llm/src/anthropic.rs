//! Client for the Anthropic Messages API.
//!
//! Plain completions go through [`with_retry`]; streamed completions are
//! decoded frame by frame into [`StreamEvent`]s without retries, since a
//! partially consumed stream cannot be replayed.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::{Client, RequestBuilder, Response, header};
use serde::Deserialize;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{
    BlockStart, ContentDelta, LlmBackend, ResponseStream, StreamEvent, with_retry,
};
use crate::error::{LlmError, RateLimitInfo, Result};
use crate::types::{CompletionRequest, CompletionResponse, ContentBlock, StopReason, Usage};

const DEFAULT_API_BASE: &str = "https://api.anthropic.com";

/// Value sent in the `anthropic-version` header.
const DEFAULT_API_VERSION: &str = "2023-06-01";

/// Whole-request timeout; long tool-heavy turns can stream for minutes.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Connection settings for [`AnthropicBackend`].
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,

    /// Endpoint root, without a trailing slash.
    pub base_url: String,

    pub api_version: String,

    pub timeout: Duration,

    /// Extra attempts for transient failures. Streaming calls never retry.
    pub max_retries: u32,

    /// Delay before the first retry; doubled on each further attempt.
    pub retry_backoff: Duration,
}

impl AnthropicConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_API_BASE.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
        }
    }

    /// Point the client at another host, e.g. a proxy or a local stub.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend
// ─────────────────────────────────────────────────────────────────────────────

/// [`LlmBackend`] speaking the Anthropic Messages API over HTTPS.
pub struct AnthropicBackend {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicBackend {
    pub fn new(config: AnthropicConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.config.base_url)
    }

    /// A POST to the messages endpoint with credentials attached.
    fn post(&self, request: &CompletionRequest) -> RequestBuilder {
        self.client
            .post(self.messages_url())
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", &self.config.api_version)
            .header(header::CONTENT_TYPE, "application/json")
            .json(request)
    }

    /// Turn a non-2xx response into the matching error.
    async fn read_failure(response: Response) -> LlmError {
        let status = response.status();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ApiError>(&body) {
            Ok(api) => api.error.message,
            Err(_) => format!("HTTP {}: {}", status, body),
        };

        classify_status(status.as_u16(), message, retry_after.as_deref())
    }
}

/// Map an HTTP failure status to the matching error variant.
fn classify_status(status: u16, message: String, retry_after: Option<&str>) -> LlmError {
    match status {
        401 | 403 => LlmError::Auth(message),
        429 => LlmError::RateLimit(RateLimitInfo::from_header(&message, retry_after)),
        400 | 404 | 413 | 422 => LlmError::InvalidRequest(message),
        _ => LlmError::Backend(message),
    }
}

#[async_trait]
impl LlmBackend for AnthropicBackend {
    async fn complete(&self, mut request: CompletionRequest) -> Result<CompletionResponse> {
        request.stream = false;

        with_retry(
            self.config.max_retries,
            self.config.retry_backoff,
            "anthropic",
            || async {
                let response = self.post(&request).send().await?;
                if !response.status().is_success() {
                    return Err(Self::read_failure(response).await);
                }
                let message: ApiMessage = serde_json::from_slice(&response.bytes().await?)?;
                Ok(message.into())
            },
        )
        .await
    }

    async fn complete_stream(&self, mut request: CompletionRequest) -> Result<ResponseStream> {
        request.stream = true;

        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Opening streaming completion"
        );

        let response = self.post(&request).send().await?;
        if !response.status().is_success() {
            return Err(Self::read_failure(response).await);
        }

        Ok(decode_event_stream(response.bytes_stream()))
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

/// Build an [`AnthropicBackend`] behind the shared trait object.
pub fn create_shared_backend(config: AnthropicConfig) -> Result<Arc<dyn LlmBackend>> {
    Ok(Arc::new(AnthropicBackend::new(config)?))
}

// ─────────────────────────────────────────────────────────────────────────────
// Non-streaming Wire Format
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiMessage {
    id: String,
    model: String,
    content: Vec<ApiBlock>,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: ApiUsage,
}

impl From<ApiMessage> for CompletionResponse {
    fn from(message: ApiMessage) -> Self {
        let content = message
            .content
            .into_iter()
            .filter_map(ApiBlock::into_content)
            .collect();

        CompletionResponse {
            id: message.id,
            content,
            model: message.model,
            stop_reason: Some(StopReason::from_wire(message.stop_reason.as_deref())),
            usage: message.usage.into(),
        }
    }
}

/// Block kinds the assistant understands; thinking and others are dropped.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Unsupported,
}

impl ApiBlock {
    fn into_content(self) -> Option<ContentBlock> {
        match self {
            ApiBlock::Text { text } => Some(ContentBlock::Text { text }),
            ApiBlock::ToolUse { id, name, input } => Some(ContentBlock::ToolUse { id, name, input }),
            ApiBlock::Unsupported => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

impl From<ApiUsage> for Usage {
    fn from(usage: ApiUsage) -> Self {
        Usage::new(usage.input_tokens, usage.output_tokens)
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Streaming Wire Format
// ─────────────────────────────────────────────────────────────────────────────

/// One `data:` payload of the event stream. The payload repeats the frame's
/// `event:` name in its `type` field, so it is decoded on its own.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    MessageStart {
        message: WireMessage,
    },
    ContentBlockStart {
        index: usize,
        content_block: WireBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: WireDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        delta: WireStop,
        #[serde(default)]
        usage: ApiUsage,
    },
    MessageStop,
    Ping,
    Error {
        error: ApiErrorBody,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    id: String,
    model: String,
    #[serde(default)]
    usage: ApiUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text,
    ToolUse { id: String, name: String },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
struct WireStop {
    stop_reason: Option<String>,
}

impl WireEvent {
    /// The provider-neutral event, or `None` for frames the agent ignores.
    fn into_stream_event(self) -> Option<StreamEvent> {
        let event = match self {
            WireEvent::MessageStart { message } => StreamEvent::MessageStart {
                id: message.id,
                model: message.model,
                usage: message.usage.into(),
            },
            WireEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                let block = match content_block {
                    WireBlock::Text => BlockStart::Text,
                    WireBlock::ToolUse { id, name } => BlockStart::ToolUse { id, name },
                    WireBlock::Unsupported => {
                        tracing::debug!(index, "Skipping unsupported content block");
                        return None;
                    }
                };
                StreamEvent::ContentBlockStart { index, block }
            }
            WireEvent::ContentBlockDelta { index, delta } => {
                let delta = match delta {
                    WireDelta::TextDelta { text } => ContentDelta::TextDelta(text),
                    WireDelta::InputJsonDelta { partial_json } => {
                        ContentDelta::InputJsonDelta(partial_json)
                    }
                    WireDelta::Unsupported => return None,
                };
                StreamEvent::ContentBlockDelta { index, delta }
            }
            WireEvent::ContentBlockStop { index } => StreamEvent::ContentBlockStop { index },
            WireEvent::MessageDelta { delta, usage } => StreamEvent::MessageDelta {
                stop_reason: StopReason::from_wire(delta.stop_reason.as_deref()),
                usage: usage.into(),
            },
            WireEvent::MessageStop => StreamEvent::MessageStop,
            WireEvent::Ping => StreamEvent::Ping,
            WireEvent::Error { error } => StreamEvent::Error {
                message: error.message,
            },
            WireEvent::Unknown => return None,
        };
        Some(event)
    }
}

fn decode_payload(payload: &str) -> Option<StreamEvent> {
    match serde_json::from_str::<WireEvent>(payload) {
        Ok(event) => event.into_stream_event(),
        Err(e) => {
            tracing::debug!(error = %e, "Skipping undecodable stream payload");
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Event Stream Decoding
// ─────────────────────────────────────────────────────────────────────────────

/// Splits a `text/event-stream` body into frame payloads.
///
/// Bytes are buffered until a full line arrives, so multi-byte characters
/// split across network chunks survive intact.
#[derive(Debug, Default)]
struct FrameDecoder {
    pending: Vec<u8>,
    data: String,
}

impl FrameDecoder {
    fn feed(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    /// The next complete frame's joined `data:` lines, if one is buffered.
    fn next_payload(&mut self) -> Option<String> {
        while let Some(end) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=end).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.data.is_empty() {
                    return Some(std::mem::take(&mut self.data));
                }
                continue;
            }

            // `event:`, `id:` and comment lines carry nothing the payload lacks.
            if let Some(value) = line.strip_prefix("data:") {
                if !self.data.is_empty() {
                    self.data.push('\n');
                }
                self.data.push_str(value.strip_prefix(' ').unwrap_or(value));
            }
        }
        None
    }

    /// Whatever frame was left open when the body ended.
    fn finish(&mut self) -> Option<String> {
        if !self.pending.is_empty() {
            self.pending.push(b'\n');
            if let Some(payload) = self.next_payload() {
                return Some(payload);
            }
        }
        (!self.data.is_empty()).then(|| std::mem::take(&mut self.data))
    }
}

struct DecodeState {
    body: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    frames: FrameDecoder,
    finished: bool,
}

/// Decode a streamed response body into [`StreamEvent`]s, ending after the
/// first terminal event or transport error.
fn decode_event_stream(
    body: impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
) -> ResponseStream {
    let state = DecodeState {
        body: Box::pin(body),
        frames: FrameDecoder::default(),
        finished: false,
    };

    Box::pin(futures::stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }

            while let Some(payload) = state.frames.next_payload() {
                if let Some(event) = decode_payload(&payload) {
                    state.finished = event.is_terminal();
                    return Some((Ok(event), state));
                }
            }

            match state.body.next().await {
                Some(Ok(chunk)) => state.frames.feed(&chunk),
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(LlmError::Network(e.to_string())), state));
                }
                None => {
                    state.finished = true;
                    let event = state.frames.finish().as_deref().and_then(decode_payload)?;
                    return Some((Ok(event), state));
                }
            }
        }
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
