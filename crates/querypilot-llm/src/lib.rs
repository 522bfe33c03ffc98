//! Model endpoint abstraction for querypilot.
//!
//! The core abstraction is the [`LlmBackend`] trait. The agent loop only ever
//! talks to a [`SharedBackend`], so the Anthropic client and the scripted
//! [`MockBackend`] are interchangeable.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  LlmBackend trait                       │
//! │  - complete() -> CompletionResponse     │
//! │  - complete_stream() -> Stream<Event>   │
//! └─────────────────────────────────────────┘
//!                    │
//!          ┌─────────┴─────────┐
//!          ▼                   ▼
//!    ┌──────────┐        ┌──────────┐
//!    │Anthropic │        │   Mock   │
//!    └──────────┘        └──────────┘
//! ```
//!
//! Streaming consumers feed every [`StreamEvent`] into a [`TurnAccumulator`]
//! to recover the finalized turn once the stream ends.

pub mod accumulate;
pub mod anthropic;
pub mod backend;
pub mod error;
pub mod types;

pub use accumulate::TurnAccumulator;
pub use anthropic::{AnthropicBackend, AnthropicConfig, create_shared_backend};
pub use backend::{
    BlockStart, ContentDelta, LlmBackend, MockBackend, MockResponse, ResponseStream,
    SharedBackend, StreamEvent, with_retry,
};
pub use error::{LlmError, RateLimitInfo, Result};
pub use types::{
    CompletionRequest, CompletionResponse, Content, ContentBlock, Message, Role, StopReason,
    ToolCall, ToolDefinition, Usage,
};
