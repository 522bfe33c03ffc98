//! The SQL assistant's tools.

mod execute_query;
mod get_schema;
mod sample_data;

pub use execute_query::ExecuteQueryTool;
pub use get_schema::GetSchemaTool;
pub use sample_data::SampleDataTool;

use crate::datasource::{QueryData, QueryError, QueryRunner};
use crate::safety::{ROW_CAP, enforce_limit, truncate_result};
use crate::tool::{ToolContext, ToolOutcome};

/// Run `query` on the context's data source and cap the returned rows.
///
/// Runner failures become `{error}` outcomes. A cancelled exchange abandons
/// the query instead of waiting on it.
pub(crate) async fn run_capped(query: &str, ctx: &ToolContext) -> ToolOutcome {
    tracing::debug!(query = %query, "Running query for tool");

    let result = tokio::select! {
        biased;
        _ = ctx.cancellation.cancelled() => Err(QueryError::Cancelled),
        result = ctx.runner.run_query(query) => result,
    };

    capped(result)
}

/// Run a query outside of any exchange, with the same limits as
/// `execute_query` but no approval step.
pub async fn execute_direct(runner: &dyn QueryRunner, query: &str) -> ToolOutcome {
    let query = enforce_limit(query);
    tracing::debug!(query = %query, "Running direct query");
    capped(runner.run_query(&query).await)
}

fn capped(result: Result<QueryData, QueryError>) -> ToolOutcome {
    match result {
        Ok(data) => ToolOutcome::Data {
            data: truncate_result(data, ROW_CAP),
        },
        Err(e) => {
            tracing::info!(error = %e, "Query failed");
            ToolOutcome::error(e.to_string())
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! A scripted query runner for tool and orchestrator tests.

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    use crate::datasource::{Cell, QueryData, QueryError, QueryRunner, ResultColumn, Row};
    use crate::schema::{Column, Schema, Table};
    use crate::tool::ToolContext;

    #[derive(Default)]
    pub struct RecordingRunner {
        pub queries: Mutex<Vec<String>>,
        pub replies: Mutex<VecDeque<Result<QueryData, QueryError>>>,
    }

    impl RecordingRunner {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn reply(self: &Arc<Self>, reply: Result<QueryData, QueryError>) -> Arc<Self> {
            self.replies.lock().push_back(reply);
            Arc::clone(self)
        }

        pub fn queries(&self) -> Vec<String> {
            self.queries.lock().clone()
        }
    }

    #[async_trait]
    impl QueryRunner for RecordingRunner {
        fn kind(&self) -> &str {
            "sqlite"
        }

        async fn run_query(&self, query: &str) -> Result<QueryData, QueryError> {
            self.queries.lock().push(query.to_string());
            self.replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(QueryData::new(vec![], vec![])))
        }
    }

    pub fn rows(n: usize) -> QueryData {
        QueryData::new(
            vec![ResultColumn {
                name: "id".into(),
                data_type: Some("integer".into()),
            }],
            (0..n)
                .map(|i| Row(vec![("id".into(), Cell::Int(i as i64))]))
                .collect(),
        )
    }

    pub fn schema() -> Schema {
        Schema::new(vec![
            Table::new(
                "orders",
                vec![
                    Column::new("id", "integer"),
                    Column::new("customer_id", "integer"),
                    Column::new("total", "numeric"),
                ],
            ),
            Table::new(
                "customers",
                vec![Column::new("id", "integer"), Column::new("name", "text")],
            ),
        ])
    }

    pub fn context(runner: Arc<RecordingRunner>) -> ToolContext {
        ToolContext::new(runner, Arc::new(schema()))
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{RecordingRunner, rows};
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_execute_direct_applies_limits() {
        let runner = RecordingRunner::new().reply(Ok(rows(150)));

        let outcome = execute_direct(runner.as_ref(), "select id from orders").await;

        assert_eq!(runner.queries(), vec!["select id from orders LIMIT 100"]);
        match outcome {
            ToolOutcome::Data { data } => {
                assert_eq!(data.row_count(), 100);
                assert!(data.truncated);
            }
            other => panic!("expected data, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_execute_direct_reports_engine_error() {
        let runner = RecordingRunner::new()
            .reply(Err(QueryError::Execution("no such table: ordres".into())));

        let outcome = execute_direct(runner.as_ref(), "DELETE FROM ordres").await;

        assert_eq!(runner.queries(), vec!["DELETE FROM ordres"]);
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({"error": "no such table: ordres"})
        );
    }
}
