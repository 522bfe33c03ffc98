//! `execute_query`: run arbitrary SQL, but only after a person approves it.

use async_trait::async_trait;
use serde_json::json;

use crate::approval::ApprovalState;
use crate::error::Result;
use crate::safety::enforce_limit;
use crate::tool::{ExecuteQueryParams, Tool, ToolContext, ToolOutcome};
use crate::tools::run_capped;

pub struct ExecuteQueryTool;

#[async_trait]
impl Tool for ExecuteQueryTool {
    fn name(&self) -> &str {
        "execute_query"
    }

    fn description(&self) -> &str {
        "Request to execute a SQL query. IMPORTANT: This requires user approval before execution. \
         The user will review the query and can approve, modify, or reject it. Use this when you \
         want to verify a query's results or explore data. Limited to 100 rows."
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "SQL query to execute (requires user approval)"
                },
                "purpose": {
                    "type": "string",
                    "description": "Brief explanation of why you want to run this query"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: serde_json::Value, ctx: &ToolContext) -> Result<ToolOutcome> {
        let params = ExecuteQueryParams::try_from(params)?;

        match ctx.approvals.lookup(&params.query) {
            ApprovalState::Unresolved => {
                tracing::info!(query = %params.query, "Query awaiting approval");
                Ok(ToolOutcome::approval_required(params.query, params.purpose))
            }
            ApprovalState::Rejected => {
                tracing::info!(query = %params.query, "Query rejected by user");
                Ok(ToolOutcome::rejected())
            }
            ApprovalState::Approved(final_query) => {
                let final_query = final_query.trim();
                if final_query.is_empty() {
                    return Ok(ToolOutcome::error("query is required"));
                }
                Ok(run_capped(&enforce_limit(final_query), ctx).await)
            }
        }
    }
}
