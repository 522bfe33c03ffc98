//! Agent core for querypilot.
//!
//! This crate provides the conversation loop, the SQL tools and the approval
//! gate that power the streaming SQL assistant.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Orchestrator                                               │
//! │  - Streams model turns, forwards text and tool starts       │
//! │  - Dispatches tool calls in order, feeds results back       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!              ┌───────────────┼───────────────┐
//!              ▼               ▼               ▼
//!       ┌──────────┐    ┌──────────────┐  ┌──────────────┐
//!       │LlmBackend│    │ToolDispatcher│  │ ApprovalGate │
//!       └──────────┘    └──────────────┘  └──────────────┘
//!                              │
//!                     ┌────────┴────────┐
//!                     ▼                 ▼
//!               ┌───────────┐    ┌──────────────┐
//!               │QueryRunner│    │ safety rules │
//!               └───────────┘    └──────────────┘
//! ```
//!
//! # Core Components
//!
//! - [`Orchestrator`]: drives one exchange as a stream of [`AgentEvent`]s
//! - [`ToolRegistry`]: the three tools declared to the model
//! - [`ApprovalGate`]: human decisions for `execute_query`
//! - [`Schema`]: the canonical schema shape and its prompt rendering

pub mod approval;
pub mod datasource;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod generate;
pub mod prompt;
pub mod safety;
pub mod schema;
pub mod sse;
pub mod stream;
pub mod tool;
pub mod tools;
pub mod types;

// Re-export core types
pub use error::{AgentError, Result};
pub use types::{AgentConfig, DEFAULT_MODEL};

// Re-export tool types
pub use tool::{
    ExecuteQueryParams, GetSchemaParams, ParamExt, ParamError, ParamResult,
    SampleDataParams, TableInfo, Tool, ToolContext, ToolOutcome, ToolRegistry,
};
pub use tools::{ExecuteQueryTool, GetSchemaTool, SampleDataTool, execute_direct};

// Re-export the loop and its events
pub use dispatch::ToolDispatcher;
pub use event::{AgentEvent, ErrorKind, UsageReport};
pub use sse::EncodeError;
pub use stream::{EventStream, Exchange, Orchestrator};

// Re-export boundary types
pub use approval::{ApprovalGate, ApprovalState, Decision};
pub use datasource::{
    Cell, QueryData, QueryError, QueryRunner, ResultColumn, Row, SchemaSource, SharedRunner,
};
pub use schema::{Column, Schema, Table, format_schema_context, format_schema_listing};

// Re-export prompts and one-shot generation
pub use generate::{GenerateRequest, GeneratedQuery, generate_query, strip_code_fence};
pub use prompt::system_prompt;
pub use safety::{ROW_CAP, SAMPLE_ROWS, enforce_limit, is_valid_table_name, truncate_result};

// Re-export cancellation for callers that bind exchanges to connections
pub use tokio_util::sync::CancellationToken;
