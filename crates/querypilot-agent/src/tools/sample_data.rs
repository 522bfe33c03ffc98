//! `get_sample_data`: the first few rows of one table.

use async_trait::async_trait;
use serde_json::json;

use crate::error::Result;
use crate::safety::{is_valid_table_name, sample_query};
use crate::tool::{SampleDataParams, Tool, ToolContext, ToolOutcome};
use crate::tools::run_capped;

pub struct SampleDataTool;

#[async_trait]
impl Tool for SampleDataTool {
    fn name(&self) -> &str {
        "get_sample_data"
    }

    fn description(&self) -> &str {
        "Get sample rows from a table to understand the data format and content. Limited to 5 rows."
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "table_name": {
                    "type": "string",
                    "description": "Name of the table to get sample data from"
                }
            },
            "required": ["table_name"]
        })
    }

    async fn execute(&self, params: serde_json::Value, ctx: &ToolContext) -> Result<ToolOutcome> {
        let params = SampleDataParams::try_from(params)?;

        if !is_valid_table_name(&params.table_name) {
            tracing::warn!(table = %params.table_name, "Rejected sample of invalid table name");
            return Ok(ToolOutcome::error("Invalid table name"));
        }

        Ok(run_capped(&sample_query(&params.table_name), ctx).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::QueryError;
    use crate::tools::testing::{RecordingRunner, context, rows};

    #[tokio::test]
    async fn test_samples_with_limit_five() {
        let runner = RecordingRunner::new().reply(Ok(rows(5)));
        let outcome = SampleDataTool
            .execute(json!({"table_name": "public.orders"}), &context(runner.clone()))
            .await
            .unwrap();

        assert_eq!(runner.queries(), vec!["SELECT * FROM public.orders LIMIT 5"]);
        match outcome {
            ToolOutcome::Data { data } => assert_eq!(data.row_count(), 5),
            other => panic!("expected data, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_name_never_reaches_runner() {
        let runner = RecordingRunner::new();
        let outcome = SampleDataTool
            .execute(
                json!({"table_name": "orders; DROP TABLE x"}),
                &context(runner.clone()),
            )
            .await
            .unwrap();

        assert_eq!(outcome, ToolOutcome::error("Invalid table name"));
        assert!(runner.queries().is_empty());
    }

    #[tokio::test]
    async fn test_padded_name_is_rejected() {
        let runner = RecordingRunner::new();
        let outcome = SampleDataTool
            .execute(json!({"table_name": " orders "}), &context(runner.clone()))
            .await
            .unwrap();

        assert_eq!(outcome, ToolOutcome::error("Invalid table name"));
        assert!(runner.queries().is_empty());
    }

    #[tokio::test]
    async fn test_missing_table_name_is_invalid_params() {
        let err = SampleDataTool
            .execute(json!({}), &context(RecordingRunner::new()))
            .await
            .unwrap_err();
        assert_eq!(err.tool_message(), "table_name is required");
    }

    #[tokio::test]
    async fn test_runner_error_becomes_outcome() {
        let runner = RecordingRunner::new()
            .reply(Err(QueryError::Execution("no such table: ghosts".into())));
        let outcome = SampleDataTool
            .execute(json!({"table_name": "ghosts"}), &context(runner))
            .await
            .unwrap();
        assert_eq!(outcome, ToolOutcome::error("no such table: ghosts"));
    }
}
