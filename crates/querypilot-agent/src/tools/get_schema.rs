//! `get_schema`: table overview or per-table column details.

use async_trait::async_trait;
use serde_json::json;

use crate::error::Result;
use crate::tool::{GetSchemaParams, TableInfo, Tool, ToolContext, ToolOutcome};

pub struct GetSchemaTool;

#[async_trait]
impl Tool for GetSchemaTool {
    fn name(&self) -> &str {
        "get_schema"
    }

    fn description(&self) -> &str {
        "Get schema information (table names and column details) for specific tables. \
         Use this to understand the structure of tables before writing queries."
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "tables": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "List of table names to get schema for. If empty, returns all available tables."
                }
            },
            "required": []
        })
    }

    async fn execute(&self, params: serde_json::Value, ctx: &ToolContext) -> Result<ToolOutcome> {
        let params = GetSchemaParams::try_from(params)?;

        let tables = if params.tables.is_empty() {
            ctx.schema
                .tables
                .iter()
                .map(|t| TableInfo::Summary {
                    name: t.name.clone(),
                    column_count: t.columns.len(),
                })
                .collect()
        } else {
            // Schema order, not request order; unknown names drop out.
            ctx.schema
                .tables
                .iter()
                .filter(|t| params.tables.iter().any(|name| *name == t.name))
                .map(|t| TableInfo::Detail {
                    name: t.name.clone(),
                    columns: t.columns.clone(),
                })
                .collect()
        };

        Ok(ToolOutcome::Tables { tables })
    }
}
