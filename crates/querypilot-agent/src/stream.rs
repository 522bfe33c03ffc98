//! The streaming conversation loop.
//!
//! One [`Orchestrator::run`] call drives a single exchange: it streams a model
//! turn, forwarding text and tool announcements as they arrive, dispatches the
//! turn's tool calls in order, feeds the results back and repeats until the
//! model answers without calling a tool.
//!
//! ```text
//! Streaming ──end of turn──▶ EvaluateTurn ──no tools──▶ Done
//!     ▲                           │
//!     └──── append results ◀── Dispatching
//! ```
//!
//! Any failure ends the exchange with a single `error` event.

use futures::{Stream, StreamExt};
use std::pin::Pin;

use querypilot_llm::{
    BlockStart, CompletionRequest, ContentBlock, ContentDelta, LlmError, Message, SharedBackend,
    StreamEvent, TurnAccumulator,
};

use crate::dispatch::ToolDispatcher;
use crate::error::AgentError;
use crate::event::AgentEvent;
use crate::tool::ToolContext;
use crate::types::AgentConfig;

/// A boxed stream of protocol events.
pub type EventStream = Pin<Box<dyn Stream<Item = AgentEvent> + Send + 'static>>;

/// Inputs for one exchange.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub context: ToolContext,
}

/// What the loop saw while waiting on the model.
enum Polled {
    Event(querypilot_llm::Result<StreamEvent>),
    End,
    Cancelled,
}

/// Drives exchanges against one model backend.
#[derive(Clone)]
pub struct Orchestrator {
    backend: SharedBackend,
    dispatcher: ToolDispatcher,
    config: AgentConfig,
}

impl Orchestrator {
    /// Create an orchestrator with the SQL assistant's tools.
    pub fn new(backend: SharedBackend, config: AgentConfig) -> Self {
        Self {
            backend,
            dispatcher: ToolDispatcher::sql_assistant(),
            config,
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: ToolDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run one exchange.
    ///
    /// The returned stream is lazy and ends after exactly one terminal event
    /// (`done` or `error`). Cancelling the context's token, or dropping the
    /// stream, stops pulling from the model.
    pub fn run(&self, exchange: Exchange) -> EventStream {
        let backend = self.backend.clone();
        let dispatcher = self.dispatcher.clone();
        let config = self.config.clone();
        let Exchange {
            system_prompt,
            mut messages,
            context,
        } = exchange;

        Box::pin(async_stream::stream! {
            let cancel = context.cancellation.clone();
            let tools = dispatcher.registry().to_llm_definitions();
            let mut pending_approvals: Vec<String> = Vec::new();
            let mut iterations = 0u32;

            loop {
                if cancel.is_cancelled() {
                    yield AgentEvent::from_agent_error(&AgentError::Cancelled);
                    return;
                }

                if iterations >= config.max_iterations {
                    tracing::warn!(iterations, "Exchange hit the iteration limit");
                    yield AgentEvent::from_agent_error(&AgentError::MaxIterations(config.max_iterations));
                    return;
                }
                iterations += 1;
                tracing::debug!(iteration = iterations, messages = messages.len(), "Starting model turn");

                let request = CompletionRequest::new(&config.model, messages.clone(), config.max_tokens)
                    .with_system(&system_prompt)
                    .with_tools(tools.clone())
                    .with_streaming();

                let opened = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    result = backend.complete_stream(request) => Some(result),
                };

                let mut upstream = match opened {
                    None => {
                        yield AgentEvent::from_agent_error(&AgentError::Cancelled);
                        return;
                    }
                    Some(Ok(upstream)) => upstream,
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Model request failed");
                        yield AgentEvent::from_llm_error(&e);
                        return;
                    }
                };

                let mut turn = TurnAccumulator::new();
                loop {
                    let polled = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Polled::Cancelled,
                        item = upstream.next() => match item {
                            Some(result) => Polled::Event(result),
                            None => Polled::End,
                        },
                    };

                    let event = match polled {
                        Polled::Cancelled => {
                            tracing::info!("Exchange cancelled while streaming");
                            yield AgentEvent::from_agent_error(&AgentError::Cancelled);
                            return;
                        }
                        Polled::End => break,
                        Polled::Event(Err(e)) => {
                            tracing::warn!(error = %e, "Model stream failed");
                            yield AgentEvent::from_llm_error(&e);
                            return;
                        }
                        Polled::Event(Ok(event)) => event,
                    };

                    match &event {
                        StreamEvent::ContentBlockStart { block: BlockStart::ToolUse { id, name }, .. } => {
                            yield AgentEvent::tool_start(name.clone(), id.clone());
                        }
                        StreamEvent::ContentBlockDelta { delta: ContentDelta::TextDelta(text), .. } => {
                            yield AgentEvent::text(text.clone());
                        }
                        _ => {}
                    }

                    if let Err(e) = turn.push(&event) {
                        tracing::warn!(error = %e, "Model reported an error mid-stream");
                        yield AgentEvent::from_llm_error(&e);
                        return;
                    }
                    if turn.is_stopped() {
                        break;
                    }
                }
                drop(upstream);

                if !turn.is_stopped() {
                    let err = LlmError::Backend("stream ended before the turn completed".to_string());
                    yield AgentEvent::from_llm_error(&err);
                    return;
                }

                let response = match turn.finish() {
                    Ok(response) => response,
                    Err(e) => {
                        yield AgentEvent::from_llm_error(&e);
                        return;
                    }
                };

                if !response.has_tool_use() {
                    tracing::info!(
                        iterations,
                        input_tokens = response.usage.input_tokens,
                        output_tokens = response.usage.output_tokens,
                        "Exchange complete"
                    );
                    yield AgentEvent::done(response.usage, pending_approvals);
                    return;
                }

                let mut results = Vec::new();
                for call in response.tool_uses() {
                    if cancel.is_cancelled() {
                        tracing::info!(tool = %call.name, "Exchange cancelled between tool calls");
                        yield AgentEvent::from_agent_error(&AgentError::Cancelled);
                        return;
                    }
                    tracing::debug!(tool = %call.name, id = %call.id, "Dispatching tool call");
                    let outcome = dispatcher
                        .dispatch(&call.name, call.input.clone(), &context.for_call(&call.id))
                        .await;

                    if let Some(query) = outcome.pending_query()
                        && !pending_approvals.iter().any(|q| q == query)
                    {
                        pending_approvals.push(query.to_string());
                    }

                    let content = match serde_json::to_string(&outcome) {
                        Ok(content) => content,
                        Err(e) => {
                            yield AgentEvent::from_agent_error(&AgentError::Serialization(e));
                            return;
                        }
                    };

                    yield AgentEvent::tool_result(call.name.clone(), call.id.clone(), outcome);
                    results.push(ContentBlock::tool_result(call.id, content));
                }

                messages.push(Message::assistant_blocks(response.content));
                messages.push(Message::tool_results(results));
            }
        })
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("backend", &self.backend.name())
            .field("dispatcher", &self.dispatcher)
            .field("config", &self.config)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
