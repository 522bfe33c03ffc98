//! Routes tool calls to their handlers.

use std::sync::Arc;

use crate::tool::{ToolContext, ToolOutcome, ToolRegistry};

/// Runs named tool calls against a registry.
///
/// Dispatch never fails: invalid parameters, unknown tools and handler
/// errors all come back as an `{error}` outcome the model can read.
#[derive(Debug, Clone)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// A dispatcher over the SQL assistant's three tools.
    pub fn sql_assistant() -> Self {
        Self::new(Arc::new(ToolRegistry::sql_assistant()))
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub async fn dispatch(
        &self,
        name: &str,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> ToolOutcome {
        match self.registry.execute(name, input, ctx).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(tool = %name, error = %e, "Tool execution failed");
                ToolOutcome::error(e.tool_message())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{RecordingRunner, context};
    use serde_json::json;

    #[tokio::test]
    async fn test_unknown_tool_becomes_error_outcome() {
        let dispatcher = ToolDispatcher::sql_assistant();
        let outcome = dispatcher
            .dispatch("drop_database", json!({}), &context(RecordingRunner::new()))
            .await;
        assert_eq!(outcome, ToolOutcome::error("Unknown tool: drop_database"));
    }

    #[tokio::test]
    async fn test_missing_query_becomes_error_outcome() {
        let runner = RecordingRunner::new();
        let outcome = ToolDispatcher::sql_assistant()
            .dispatch("execute_query", json!({"purpose": "x"}), &context(runner.clone()))
            .await;
        assert_eq!(outcome, ToolOutcome::error("query is required"));
        assert!(runner.queries().is_empty());
    }

    #[tokio::test]
    async fn test_routes_by_name() {
        let outcome = ToolDispatcher::sql_assistant()
            .dispatch("get_schema", json!({}), &context(RecordingRunner::new()))
            .await;
        assert!(matches!(outcome, ToolOutcome::Tables { ref tables } if tables.len() == 2));
    }
}
