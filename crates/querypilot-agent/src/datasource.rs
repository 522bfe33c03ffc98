//! Boundary with the query execution engine and the schema cache.
//!
//! The agent treats both as opaque capabilities: a [`QueryRunner`] turns a
//! query string into rows-or-error, and a [`SchemaSource`] hands back the
//! cached [`Schema`] of a data source if one exists.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::ser::{Error as _, SerializeMap};
use serde::{Serialize, Serializer};
use std::sync::Arc;
use thiserror::Error;

use crate::schema::Schema;

// ─────────────────────────────────────────────────────────────────────────────
// Result Cells
// ─────────────────────────────────────────────────────────────────────────────

/// A single value in a result row.
///
/// Dates and timestamps serialize as ISO-8601 strings and decimals as
/// floating-point numbers, which is what clients and the model expect.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Decimal(Decimal),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Cell::Null => serializer.serialize_unit(),
            Cell::Bool(b) => serializer.serialize_bool(*b),
            Cell::Int(i) => serializer.serialize_i64(*i),
            Cell::Float(f) => serializer.serialize_f64(*f),
            Cell::Text(s) => serializer.serialize_str(s),
            Cell::Decimal(d) => {
                let value = d
                    .to_f64()
                    .ok_or_else(|| S::Error::custom(format!("decimal {} has no f64 form", d)))?;
                serializer.serialize_f64(value)
            }
            Cell::Date(d) => serializer.collect_str(&d.format("%Y-%m-%d")),
            Cell::DateTime(dt) => serializer.collect_str(&dt.format("%Y-%m-%dT%H:%M:%S%.f")),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Int(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Float(value)
    }
}

/// One result row: column name to value, in column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(pub Vec<(String, Cell)>);

impl Row {
    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.0.iter().find(|(name, _)| name == column).map(|(_, v)| v)
    }
}

impl<K: Into<String>, V: Into<Cell>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Row(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Column metadata reported alongside rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: Option<String>,
}

/// Rows and metadata returned by a query runner.
///
/// Only `rows` is relied upon; runners may leave everything else empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryData {
    pub columns: Vec<ResultColumn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Row>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

impl QueryData {
    pub fn new(columns: Vec<ResultColumn>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows: Some(rows),
            truncated: false,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.as_ref().map_or(0, Vec::len)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Runner Traits
// ─────────────────────────────────────────────────────────────────────────────

/// Error returned by a query runner.
#[derive(Debug, Clone, Error)]
pub enum QueryError {
    /// The engine rejected or failed the query; the message is the engine's own.
    #[error("{0}")]
    Execution(String),

    /// The runner could not be reached or opened.
    #[error("Data source unavailable: {0}")]
    Unavailable(String),

    /// The query was abandoned because the exchange was cancelled.
    #[error("Query cancelled")]
    Cancelled,
}

/// Executes queries against one data source.
#[async_trait]
pub trait QueryRunner: Send + Sync {
    /// Short engine name, used in the system prompt (e.g. `sqlite`).
    fn kind(&self) -> &str;

    /// Run a query to completion.
    async fn run_query(&self, query: &str) -> Result<QueryData, QueryError>;
}

/// Shared query runner handle.
pub type SharedRunner = Arc<dyn QueryRunner>;

/// Supplies cached schemas by data source id.
pub trait SchemaSource: Send + Sync {
    /// The cached schema, or `None` when it has never been loaded.
    fn cached_schema(&self, data_source_id: &str) -> Option<Arc<Schema>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cell_serialization() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let ts = date.and_hms_opt(14, 5, 0).unwrap();
        let ts_frac = date.and_hms_micro_opt(14, 5, 0, 250_000).unwrap();

        assert_eq!(serde_json::to_value(Cell::Date(date)).unwrap(), json!("2024-03-09"));
        assert_eq!(
            serde_json::to_value(Cell::DateTime(ts)).unwrap(),
            json!("2024-03-09T14:05:00")
        );
        assert_eq!(
            serde_json::to_value(Cell::DateTime(ts_frac)).unwrap(),
            json!("2024-03-09T14:05:00.250")
        );
        assert_eq!(
            serde_json::to_value(Cell::Decimal(Decimal::new(1999, 2))).unwrap(),
            json!(19.99)
        );
        assert_eq!(serde_json::to_value(Cell::Null).unwrap(), json!(null));
    }

    #[test]
    fn test_row_keeps_column_order() {
        let row: Row = [("z", Cell::Int(1)), ("a", Cell::from("x"))].into_iter().collect();
        assert_eq!(serde_json::to_string(&row).unwrap(), r#"{"z":1,"a":"x"}"#);
        assert_eq!(row.get("a"), Some(&Cell::from("x")));
    }

    #[test]
    fn test_query_data_shape() {
        let data = QueryData::new(
            vec![ResultColumn {
                name: "id".into(),
                data_type: Some("integer".into()),
            }],
            vec![[("id", 1i64)].into_iter().collect()],
        );
        assert_eq!(
            serde_json::to_value(&data).unwrap(),
            json!({"columns": [{"name": "id", "type": "integer"}], "rows": [{"id": 1}]})
        );

        let mut truncated = data.clone();
        truncated.truncated = true;
        assert_eq!(serde_json::to_value(&truncated).unwrap()["truncated"], json!(true));
    }
}
