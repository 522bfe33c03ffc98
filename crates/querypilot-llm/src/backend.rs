//! The [`LlmBackend`] seam between the agent loop and a model provider.
//!
//! Besides the trait this holds the provider-neutral stream events, the retry
//! helper for one-shot calls and [`MockBackend`], which replays scripted turns
//! through the same streaming path the real client uses.

use async_trait::async_trait;
use futures::Stream;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{LlmError, Result};
use crate::types::{CompletionRequest, CompletionResponse, ContentBlock, StopReason, Usage};

// ─────────────────────────────────────────────────────────────────────────────
// Shared Retry Logic
// ─────────────────────────────────────────────────────────────────────────────

/// Run `f` until it succeeds, fails permanently, or `max_retries` extra
/// attempts are spent. The delay doubles after every failed attempt.
pub async fn with_retry<F, Fut, T>(
    max_retries: u32,
    initial_backoff: Duration,
    backend_name: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff = initial_backoff;
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() || attempt >= max_retries => return Err(e),
            Err(e) => {
                attempt += 1;
                tracing::warn!(
                    backend = backend_name,
                    attempt,
                    max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Request failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Streaming Types
// ─────────────────────────────────────────────────────────────────────────────

/// Events of one streamed turn, ending at the first terminal event.
pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send + 'static>>;

/// Events emitted during streaming.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Message started; carries the prompt-side usage.
    MessageStart {
        id: String,
        model: String,
        usage: Usage,
    },
    /// Content block started.
    ContentBlockStart { index: usize, block: BlockStart },
    /// Incremental content within a block.
    ContentBlockDelta { index: usize, delta: ContentDelta },
    /// Content block finished.
    ContentBlockStop { index: usize },
    /// Message finished with final usage stats.
    MessageDelta {
        stop_reason: StopReason,
        usage: Usage,
    },
    /// Message complete.
    MessageStop,
    /// Ping to keep connection alive.
    Ping,
    /// Error reported in-band by the provider.
    Error { message: String },
}

/// The kind of block being opened.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockStart {
    /// A text block.
    Text,
    /// A tool call; id and name are known up front, input streams as JSON.
    ToolUse { id: String, name: String },
}

/// Delta content in a streaming response.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentDelta {
    /// Text being streamed.
    TextDelta(String),
    /// Partial JSON for tool input.
    InputJsonDelta(String),
}

impl StreamEvent {
    /// Returns true if this is the final event in a message.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::MessageStop | StreamEvent::Error { .. })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM Backend Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A model provider.
///
/// Errors before the first event (bad key, rate limit) come back from
/// `complete_stream` itself; failures after that arrive inside the stream.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    async fn complete_stream(&self, request: CompletionRequest) -> Result<ResponseStream>;

    /// Short provider name for logs.
    fn name(&self) -> &str;
}

pub type SharedBackend = Arc<dyn LlmBackend>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock Backend
// ─────────────────────────────────────────────────────────────────────────────

/// One scripted reply of the [`MockBackend`].
#[derive(Debug)]
pub enum MockResponse {
    /// A complete turn, streamed block by block.
    Turn(CompletionResponse),
    /// The request itself fails.
    Fail(LlmError),
    /// Some text streams, then the provider reports an in-band error.
    StreamError { text: String, message: String },
}

impl From<CompletionResponse> for MockResponse {
    fn from(response: CompletionResponse) -> Self {
        MockResponse::Turn(response)
    }
}

/// Scripted backend for tests.
///
/// Replies are consumed in order, one per request. Every request is kept so
/// tests can inspect the conversation the agent sent back.
#[derive(Debug)]
pub struct MockBackend {
    responses: Mutex<VecDeque<MockResponse>>,
    request_log: Mutex<Vec<CompletionRequest>>,
}

impl MockBackend {
    /// A request past the end of the script fails with a backend error.
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            request_log: Mutex::new(Vec::new()),
        }
    }

    pub fn with_turns(turns: Vec<CompletionResponse>) -> Self {
        Self::new(turns.into_iter().map(MockResponse::Turn).collect())
    }

    /// One reply, plain text.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self::with_turns(vec![Self::text_turn(text)])
    }

    /// A final answer with usage (10, 20).
    pub fn text_turn(text: impl Into<String>) -> CompletionResponse {
        CompletionResponse::new(
            "mock_msg",
            "mock-model",
            vec![ContentBlock::text(text)],
            StopReason::EndTurn,
            Usage::new(10, 20),
        )
    }

    /// A turn that stops for tool use.
    pub fn tool_turn(blocks: Vec<ContentBlock>) -> CompletionResponse {
        CompletionResponse::new(
            "mock_msg",
            "mock-model",
            blocks,
            StopReason::ToolUse,
            Usage::new(10, 20),
        )
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.request_log.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.request_log.lock().len()
    }

    fn next_response(&self, request: CompletionRequest) -> Result<MockResponse> {
        self.request_log.lock().push(request);
        self.responses.lock().pop_front().ok_or_else(|| {
            LlmError::Backend("MockBackend: no more responses available".to_string())
        })
    }
}

/// Expand a finalized turn into the event sequence a provider would stream.
fn turn_events(response: &CompletionResponse) -> Vec<Result<StreamEvent>> {
    let mut events = vec![Ok(StreamEvent::MessageStart {
        id: response.id.clone(),
        model: response.model.clone(),
        usage: Usage::new(response.usage.input_tokens, 0),
    })];

    for (index, block) in response.content.iter().enumerate() {
        match block {
            ContentBlock::Text { text } => {
                events.push(Ok(StreamEvent::ContentBlockStart {
                    index,
                    block: BlockStart::Text,
                }));
                events.push(Ok(StreamEvent::ContentBlockDelta {
                    index,
                    delta: ContentDelta::TextDelta(text.clone()),
                }));
            }
            ContentBlock::ToolUse { id, name, input } => {
                events.push(Ok(StreamEvent::ContentBlockStart {
                    index,
                    block: BlockStart::ToolUse {
                        id: id.clone(),
                        name: name.clone(),
                    },
                }));
                events.push(Ok(StreamEvent::ContentBlockDelta {
                    index,
                    delta: ContentDelta::InputJsonDelta(input.to_string()),
                }));
            }
            ContentBlock::ToolResult { .. } => continue,
        }
        events.push(Ok(StreamEvent::ContentBlockStop { index }));
    }

    events.push(Ok(StreamEvent::MessageDelta {
        stop_reason: response.stop_reason.unwrap_or(StopReason::EndTurn),
        usage: Usage::new(0, response.usage.output_tokens),
    }));
    events.push(Ok(StreamEvent::MessageStop));
    events
}

#[async_trait]
impl LlmBackend for MockBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        match self.next_response(request)? {
            MockResponse::Turn(response) => Ok(response),
            MockResponse::Fail(err) => Err(err),
            MockResponse::StreamError { message, .. } => Err(LlmError::Backend(message)),
        }
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<ResponseStream> {
        let events = match self.next_response(request)? {
            MockResponse::Turn(response) => turn_events(&response),
            MockResponse::Fail(err) => return Err(err),
            MockResponse::StreamError { text, message } => vec![
                Ok(StreamEvent::MessageStart {
                    id: "mock_msg".to_string(),
                    model: "mock-model".to_string(),
                    usage: Usage::default(),
                }),
                Ok(StreamEvent::ContentBlockStart {
                    index: 0,
                    block: BlockStart::Text,
                }),
                Ok(StreamEvent::ContentBlockDelta {
                    index: 0,
                    delta: ContentDelta::TextDelta(text),
                }),
                Ok(StreamEvent::Error { message }),
            ],
        };

        Ok(Box::pin(futures::stream::iter(events)))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
