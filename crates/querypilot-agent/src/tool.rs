//! Tool framework for the SQL assistant.
//!
//! This module defines the [`Tool`] trait, the [`ToolOutcome`] every tool
//! produces, and the [`ToolRegistry`] that declares tools to the model.
//!
//! # Example
//!
//! ```rust,ignore
//! use querypilot_agent::{ToolRegistry, ToolContext};
//!
//! let registry = ToolRegistry::sql_assistant();
//! let outcome = registry
//!     .execute("get_schema", json!({"tables": ["orders"]}), &ctx)
//!     .await?;
//! ```

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::approval::ApprovalGate;
use crate::datasource::{QueryData, SharedRunner};
use crate::error::{AgentError, Result};
use crate::schema::{Column, Schema};

// ─────────────────────────────────────────────────────────────────────────────
// Parameter Validation
// ─────────────────────────────────────────────────────────────────────────────

/// Why a tool call's input was unusable. Worded for the model, which reads
/// it back in the tool result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParamError {
    /// Absent, `null` or blank.
    #[error("{name} is required")]
    Missing { name: &'static str },

    #[error("{name} must be a {expected}, not {found}")]
    WrongType {
        name: &'static str,
        expected: &'static str,
        found: &'static str,
    },
}

impl ParamError {
    fn wrong_type(name: &'static str, expected: &'static str, found: &serde_json::Value) -> Self {
        let found = match found {
            serde_json::Value::Null => "null",
            serde_json::Value::Bool(_) => "boolean",
            serde_json::Value::Number(_) => "number",
            serde_json::Value::String(_) => "string",
            serde_json::Value::Array(_) => "list",
            serde_json::Value::Object(_) => "object",
        };
        Self::WrongType {
            name,
            expected,
            found,
        }
    }
}

impl From<ParamError> for AgentError {
    fn from(err: ParamError) -> Self {
        AgentError::InvalidToolParams(err.to_string())
    }
}

pub type ParamResult<T> = std::result::Result<T, ParamError>;

/// Typed access to a tool call's `input` object.
pub trait ParamExt {
    /// A non-blank string, trimmed.
    fn required_str(&self, name: &'static str) -> ParamResult<&str>;

    /// A non-blank string exactly as given, surrounding whitespace included.
    fn required_raw_str(&self, name: &'static str) -> ParamResult<&str>;

    /// A string if present; other types read as absent.
    fn optional_str(&self, name: &str) -> Option<&str>;

    /// A list of strings. Absent means empty; non-string items are skipped.
    fn optional_str_list(&self, name: &'static str) -> ParamResult<Vec<String>>;
}

impl ParamExt for serde_json::Value {
    fn required_str(&self, name: &'static str) -> ParamResult<&str> {
        match self.get(name) {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Ok(s.trim()),
            None | Some(serde_json::Value::Null) | Some(serde_json::Value::String(_)) => {
                Err(ParamError::Missing { name })
            }
            Some(other) => Err(ParamError::wrong_type(name, "string", other)),
        }
    }

    fn required_raw_str(&self, name: &'static str) -> ParamResult<&str> {
        self.required_str(name)?;
        self.get(name)
            .and_then(serde_json::Value::as_str)
            .ok_or(ParamError::Missing { name })
    }

    fn optional_str(&self, name: &str) -> Option<&str> {
        self.get(name)?.as_str()
    }

    fn optional_str_list(&self, name: &'static str) -> ParamResult<Vec<String>> {
        match self.get(name) {
            None | Some(serde_json::Value::Null) => Ok(Vec::new()),
            Some(serde_json::Value::Array(items)) => Ok(items
                .iter()
                .filter_map(serde_json::Value::as_str)
                .map(str::to_owned)
                .collect()),
            Some(other) => Err(ParamError::wrong_type(name, "list", other)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Typed Parameter Structs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct GetSchemaParams {
    pub tables: Vec<String>,
}

impl TryFrom<serde_json::Value> for GetSchemaParams {
    type Error = ParamError;

    fn try_from(params: serde_json::Value) -> std::result::Result<Self, Self::Error> {
        Ok(Self {
            tables: params.optional_str_list("tables")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleDataParams {
    pub table_name: String,
}

impl TryFrom<serde_json::Value> for SampleDataParams {
    type Error = ParamError;

    fn try_from(params: serde_json::Value) -> std::result::Result<Self, Self::Error> {
        Ok(Self {
            table_name: params.required_raw_str("table_name")?.to_string(),
        })
    }
}

/// Purpose reported when the model gives none.
pub const DEFAULT_PURPOSE: &str = "Verify query results";

#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteQueryParams {
    pub query: String,
    pub purpose: String,
}

impl TryFrom<serde_json::Value> for ExecuteQueryParams {
    type Error = ParamError;

    fn try_from(params: serde_json::Value) -> std::result::Result<Self, Self::Error> {
        let query = params.required_str("query")?.to_string();
        let purpose = params
            .optional_str("purpose")
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(DEFAULT_PURPOSE)
            .to_string();
        Ok(Self { query, purpose })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Context
// ─────────────────────────────────────────────────────────────────────────────

/// Everything a tool may touch during one exchange.
#[derive(Clone)]
pub struct ToolContext {
    /// Runner for the exchange's data source.
    pub runner: SharedRunner,
    /// Cached schema of the data source.
    pub schema: Arc<Schema>,
    /// Human decisions known for this exchange.
    pub approvals: Arc<ApprovalGate>,
    /// Fires when the client disconnects.
    pub cancellation: CancellationToken,
    /// Set by [`ToolContext::for_call`].
    pub tool_call_id: Option<String>,
}

impl ToolContext {
    /// Create a context with no approvals and a fresh cancellation token.
    pub fn new(runner: SharedRunner, schema: Arc<Schema>) -> Self {
        Self {
            runner,
            schema,
            approvals: Arc::new(ApprovalGate::new()),
            cancellation: CancellationToken::new(),
            tool_call_id: None,
        }
    }

    pub fn with_approvals(mut self, approvals: ApprovalGate) -> Self {
        self.approvals = Arc::new(approvals);
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// A copy of this context scoped to one tool call.
    pub fn for_call(&self, tool_call_id: impl Into<String>) -> Self {
        let mut ctx = self.clone();
        ctx.tool_call_id = Some(tool_call_id.into());
        ctx
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("runner", &self.runner.kind())
            .field("tables", &self.schema.tables.len())
            .field("approvals", &self.approvals.len())
            .field("tool_call_id", &self.tool_call_id)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Outcome
// ─────────────────────────────────────────────────────────────────────────────

/// One entry of a `get_schema` result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TableInfo {
    /// Overview entry used when no tables were requested.
    Summary { name: String, column_count: usize },
    /// Full column listing.
    Detail { name: String, columns: Vec<Column> },
}

/// The result of a tool call, as both the client and the model see it.
///
/// Serializes to exactly one of `{tables}`, `{data}`,
/// `{requires_approval, query, purpose}`, `{rejected, message}` or `{error}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolOutcome {
    Tables {
        tables: Vec<TableInfo>,
    },
    Data {
        data: QueryData,
    },
    ApprovalRequired {
        requires_approval: bool,
        query: String,
        purpose: String,
    },
    Rejected {
        rejected: bool,
        message: String,
    },
    Error {
        error: String,
    },
}

impl ToolOutcome {
    pub fn approval_required(query: impl Into<String>, purpose: impl Into<String>) -> Self {
        Self::ApprovalRequired {
            requires_approval: true,
            query: query.into(),
            purpose: purpose.into(),
        }
    }

    pub fn rejected() -> Self {
        Self::Rejected {
            rejected: true,
            message: "User rejected this query execution.".to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// The query awaiting approval, if this outcome is a pending request.
    pub fn pending_query(&self) -> Option<&str> {
        match self {
            Self::ApprovalRequired { query, .. } => Some(query),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Something the model may call by name.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The name the model calls it by.
    fn name(&self) -> &str;

    /// Shown to the model; this is the tool's whole documentation.
    fn description(&self) -> &str;

    /// JSON Schema of the `input` object.
    fn parameters(&self) -> serde_json::Value;

    /// Expected failures (bad table names, query errors) are returned as
    /// [`ToolOutcome::Error`]; `Err` is reserved for invalid parameters and
    /// defects.
    async fn execute(&self, params: serde_json::Value, ctx: &ToolContext) -> Result<ToolOutcome>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Registry
// ─────────────────────────────────────────────────────────────────────────────

/// The fixed, ordered set of tools declared to the model.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry used by the SQL assistant: `get_schema`,
    /// `get_sample_data` and `execute_query`, in that order.
    pub fn sql_assistant() -> Self {
        let mut registry = Self::new();
        registry.register(crate::tools::GetSchemaTool);
        registry.register(crate::tools::SampleDataTool);
        registry.register(crate::tools::ExecuteQueryTool);
        registry
    }

    /// Add a tool. A tool with the same name is replaced where it stands.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        let tool: Arc<dyn Tool> = Arc::new(tool);
        match self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            Some(slot) => *slot = tool,
            None => self.tools.push(tool),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    /// Names in declaration order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// The `tools` array of a completion request.
    pub fn to_llm_definitions(&self) -> Vec<querypilot_llm::ToolDefinition> {
        self.tools
            .iter()
            .map(|tool| {
                querypilot_llm::ToolDefinition::new(
                    tool.name(),
                    tool.description(),
                    tool.parameters(),
                )
            })
            .collect()
    }

    /// Run the named tool; unknown names are an error rather than an outcome.
    pub async fn execute(
        &self,
        name: &str,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutcome> {
        let tool = self
            .get(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))?;
        tool.execute(params, ctx).await
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_required_str() {
        let params = json!({"query": "  SELECT 1 ", "blank": "   ", "n": 3});
        assert_eq!(params.required_str("query").unwrap(), "SELECT 1");
        assert_eq!(
            params.required_str("blank").unwrap_err().to_string(),
            "blank is required"
        );
        assert_eq!(
            params.required_str("missing").unwrap_err().to_string(),
            "missing is required"
        );
        assert_eq!(
            params.required_str("n").unwrap_err().to_string(),
            "n must be a string, not number"
        );
    }

    #[test]
    fn test_get_schema_params() {
        let p = GetSchemaParams::try_from(json!({})).unwrap();
        assert!(p.tables.is_empty());

        let p = GetSchemaParams::try_from(json!({"tables": ["a", 1, "b"]})).unwrap();
        assert_eq!(p.tables, vec!["a", "b"]);

        assert_eq!(
            GetSchemaParams::try_from(json!({"tables": "a"})).unwrap_err(),
            ParamError::WrongType {
                name: "tables",
                expected: "list",
                found: "string"
            }
        );
    }

    #[test]
    fn test_execute_query_params_default_purpose() {
        let p = ExecuteQueryParams::try_from(json!({"query": "SELECT 1"})).unwrap();
        assert_eq!(p.purpose, DEFAULT_PURPOSE);

        let p = ExecuteQueryParams::try_from(json!({"query": "SELECT 1", "purpose": "count"}))
            .unwrap();
        assert_eq!(p.purpose, "count");

        let err = ExecuteQueryParams::try_from(json!({"purpose": "x"})).unwrap_err();
        assert_eq!(err.to_string(), "query is required");
    }

    #[test]
    fn test_sample_data_params() {
        let err = SampleDataParams::try_from(json!({})).unwrap_err();
        assert_eq!(err.to_string(), "table_name is required");

        let p = SampleDataParams::try_from(json!({"table_name": " orders "})).unwrap();
        assert_eq!(p.table_name, " orders ");
    }

    #[test]
    fn test_outcome_wire_shapes() {
        assert_eq!(
            serde_json::to_value(ToolOutcome::approval_required("SELECT 1", "check")).unwrap(),
            json!({"requires_approval": true, "query": "SELECT 1", "purpose": "check"})
        );
        assert_eq!(
            serde_json::to_value(ToolOutcome::rejected()).unwrap(),
            json!({"rejected": true, "message": "User rejected this query execution."})
        );
        assert_eq!(
            serde_json::to_value(ToolOutcome::error("boom")).unwrap(),
            json!({"error": "boom"})
        );
        assert_eq!(
            serde_json::to_value(ToolOutcome::Tables {
                tables: vec![TableInfo::Summary {
                    name: "orders".into(),
                    column_count: 4
                }]
            })
            .unwrap(),
            json!({"tables": [{"name": "orders", "column_count": 4}]})
        );
    }

    #[test]
    fn test_registry_declares_three_tools_in_order() {
        let registry = ToolRegistry::sql_assistant();
        assert_eq!(
            registry.names(),
            vec!["get_schema", "get_sample_data", "execute_query"]
        );

        let defs = registry.to_llm_definitions();
        assert_eq!(defs.len(), 3);
        assert_eq!(defs[0].input_schema["required"], json!([]));
        assert_eq!(defs[1].input_schema["required"], json!(["table_name"]));
        assert_eq!(defs[2].input_schema["required"], json!(["query"]));
        assert!(defs[2].description.contains("requires user approval"));
    }
}
