//! Data source schema model and its prompt renderings.
//!
//! Schema caches describe a table's columns in one of three shapes:
//!
//! ```text
//! {"name": "orders", "columns": {"id": {"type": "integer"}, "total": {"type": "numeric"}}}
//! {"name": "orders", "columns": ["id", "total"]}
//! {"name": "orders", "columns": [{"name": "id", "type": "integer"}, {"name": "total"}]}
//! ```
//!
//! All three decode into the same ordered `Vec<Column>`, so nothing past the
//! deserializer needs to know which shape it came from.

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Type recorded for columns whose source shape carries none.
pub const UNKNOWN_TYPE: &str = "unknown";

/// Columns rendered per table in the system prompt.
pub const PROMPT_COLUMN_LIMIT: usize = 10;

/// A column with a normalized type name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// A table and its columns in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }
}

/// The cached schema of one data source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    pub tables: Vec<Table>,
}

impl Schema {
    pub fn new(tables: Vec<Table>) -> Self {
        Self { tables }
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Look up a table by exact name.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Decoding
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawTable {
    #[serde(default = "unknown_name")]
    name: String,
    #[serde(default)]
    columns: RawColumns,
}

#[derive(Default)]
enum RawColumns {
    #[default]
    Missing,
    Mapping(Vec<Column>),
    List(Vec<RawColumn>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawColumn {
    Name(String),
    Record {
        #[serde(default)]
        name: Option<String>,
        #[serde(default, rename = "type")]
        data_type: Option<String>,
    },
}

/// Per-column info in the mapping shape: either `{"type": ...}` or a bare type name.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawColumnInfo {
    Type(String),
    Info {
        #[serde(default, rename = "type")]
        data_type: Option<String>,
    },
}

fn unknown_name() -> String {
    UNKNOWN_TYPE.to_string()
}

impl<'de> Deserialize<'de> for RawColumns {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(RawColumnsVisitor)
    }
}

struct RawColumnsVisitor;

impl<'de> Visitor<'de> for RawColumnsVisitor {
    type Value = RawColumns;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a column mapping or a list of columns")
    }

    // Entries arrive in source order. Decoding from a `serde_json::Value`
    // relies on the workspace's `preserve_order` feature for the same.
    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut columns = Vec::new();
        while let Some((name, info)) = map.next_entry::<String, Option<RawColumnInfo>>()? {
            let data_type = match info {
                Some(RawColumnInfo::Type(t)) => Some(t),
                Some(RawColumnInfo::Info { data_type }) => data_type,
                None => None,
            };
            columns.push(Column::new(name, data_type.unwrap_or_else(unknown_name)));
        }
        Ok(RawColumns::Mapping(columns))
    }

    fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut columns = Vec::new();
        while let Some(column) = seq.next_element::<RawColumn>()? {
            columns.push(column);
        }
        Ok(RawColumns::List(columns))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(RawColumns::Missing)
    }
}

impl From<RawColumns> for Vec<Column> {
    fn from(raw: RawColumns) -> Self {
        match raw {
            RawColumns::Missing => Vec::new(),
            RawColumns::Mapping(columns) => columns,
            RawColumns::List(list) => list
                .into_iter()
                .map(|column| match column {
                    RawColumn::Name(name) => Column::new(name, UNKNOWN_TYPE),
                    RawColumn::Record { name, data_type } => Column::new(
                        name.unwrap_or_else(unknown_name),
                        data_type.unwrap_or_else(unknown_name),
                    ),
                })
                .collect(),
        }
    }
}

impl<'de> Deserialize<'de> for Table {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawTable::deserialize(deserializer)?;
        Ok(Table {
            name: raw.name,
            columns: raw.columns.into(),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Rendering
// ─────────────────────────────────────────────────────────────────────────────

/// Render the schema as a bounded summary for the system prompt.
///
/// One line per table, at most [`PROMPT_COLUMN_LIMIT`] columns each.
pub fn format_schema_context(schema: &Schema) -> String {
    if schema.is_empty() {
        return "No schema available.".to_string();
    }

    schema
        .tables
        .iter()
        .map(|table| {
            let shown: Vec<String> = table
                .columns
                .iter()
                .take(PROMPT_COLUMN_LIMIT)
                .map(|c| format!("{} ({})", c.name, c.data_type))
                .collect();
            let mut line = format!("- {}: {}", table.name, shown.join(", "));
            if table.columns.len() > PROMPT_COLUMN_LIMIT {
                line.push_str(&format!(
                    " ... and {} more columns",
                    table.columns.len() - PROMPT_COLUMN_LIMIT
                ));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render the full schema, one column per line, for one-shot query generation.
pub fn format_schema_listing(schema: &Schema) -> String {
    if schema.is_empty() {
        return "No schema available.".to_string();
    }

    let mut lines = Vec::new();
    for table in &schema.tables {
        lines.push(format!("Table: {}", table.name));
        for column in &table.columns {
            lines.push(format!("  - {}: {}", column.name, column.data_type));
        }
        lines.push(String::new());
    }
    lines.join("\n")
}
