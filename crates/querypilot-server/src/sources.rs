//! Data sources: SQLite query runners and their cached schemas.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::{Mutex, RwLock};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::Serialize;
use tracing::{debug, info, warn};

use querypilot_agent::{
    Cell, Column, QueryData, QueryError, QueryRunner, ROW_CAP, ResultColumn, Row, Schema,
    SchemaSource, SharedRunner, Table,
};
use querypilot_config::DataSourceConfig;

use crate::error::{Result, ServerError};

/// Message returned when a data source has no usable schema.
pub const SCHEMA_UNAVAILABLE: &str = "Schema is not available. Please refresh the schema first.";

// ─────────────────────────────────────────────────────────────────────────────
// SQLite Runner
// ─────────────────────────────────────────────────────────────────────────────

/// How a declared column type maps onto result cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Plain,
    Bool,
    Decimal,
    Date,
    DateTime,
}

impl ColumnKind {
    fn from_decl_type(decl: Option<&str>) -> Self {
        let Some(decl) = decl else {
            return ColumnKind::Plain;
        };
        let decl = decl.to_ascii_uppercase();
        if decl.contains("DECIMAL") || decl.contains("NUMERIC") {
            ColumnKind::Decimal
        } else if decl.contains("DATETIME") || decl.contains("TIMESTAMP") {
            ColumnKind::DateTime
        } else if decl.contains("DATE") {
            ColumnKind::Date
        } else if decl.contains("BOOL") {
            ColumnKind::Bool
        } else {
            ColumnKind::Plain
        }
    }
}

/// Runs queries against one SQLite database file.
///
/// The connection lives behind a mutex and every query runs on the blocking
/// pool, so a slow query never stalls the async executor.
pub struct SqliteRunner {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRunner {
    /// Open an existing database file. Missing files are an error rather than
    /// silently created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| ServerError::Storage(format!("failed to open {}: {}", path.display(), e)))?;

        debug!(path = %path.display(), "Opened SQLite data source");
        Ok(Self::from_connection(path, conn))
    }

    /// Wrap an already open connection.
    pub fn from_connection(path: impl Into<PathBuf>, conn: Connection) -> Self {
        Self {
            path: path.into(),
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read tables and columns from the database catalog.
    pub fn introspect(&self) -> Result<Schema> {
        let conn = self.conn.lock();
        Ok(introspect_sync(&conn)?)
    }
}

#[async_trait]
impl QueryRunner for SqliteRunner {
    fn kind(&self) -> &str {
        "sqlite"
    }

    async fn run_query(&self, query: &str) -> std::result::Result<QueryData, QueryError> {
        let conn = Arc::clone(&self.conn);
        let query = query.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            run_sync(&conn, &query)
        })
        .await
        .map_err(|e| QueryError::Unavailable(format!("Task join error: {e}")))?
        .map_err(|e| QueryError::Execution(e.to_string()))
    }
}

impl std::fmt::Debug for SqliteRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRunner").field("path", &self.path).finish()
    }
}

fn run_sync(conn: &Connection, query: &str) -> rusqlite::Result<QueryData> {
    let mut stmt = conn.prepare(query)?;

    let columns: Vec<ResultColumn> = stmt
        .columns()
        .iter()
        .map(|c| ResultColumn {
            name: c.name().to_string(),
            data_type: c.decl_type().map(str::to_ascii_lowercase),
        })
        .collect();
    let kinds: Vec<ColumnKind> = stmt
        .columns()
        .iter()
        .map(|c| ColumnKind::from_decl_type(c.decl_type()))
        .collect();

    let mut rows = Vec::new();
    let mut truncated = false;
    let mut cursor = stmt.query([])?;
    while let Some(row) = cursor.next()? {
        // Reading stops one row past the cap.
        if rows.len() == ROW_CAP {
            truncated = true;
            break;
        }
        let mut cells = Vec::with_capacity(columns.len());
        for (i, (column, kind)) in columns.iter().zip(&kinds).enumerate() {
            cells.push((column.name.clone(), to_cell(row.get_ref(i)?, *kind)));
        }
        rows.push(Row(cells));
    }

    let mut data = QueryData::new(columns, rows);
    data.truncated = truncated;
    Ok(data)
}

fn to_cell(value: ValueRef<'_>, kind: ColumnKind) -> Cell {
    match (value, kind) {
        (ValueRef::Null, _) => Cell::Null,
        (ValueRef::Integer(i), ColumnKind::Bool) => Cell::Bool(i != 0),
        (ValueRef::Integer(i), ColumnKind::Decimal) => Cell::Decimal(Decimal::from(i)),
        (ValueRef::Integer(i), _) => Cell::Int(i),
        (ValueRef::Real(f), ColumnKind::Decimal) => {
            Decimal::from_f64(f).map_or(Cell::Float(f), Cell::Decimal)
        }
        (ValueRef::Real(f), _) => Cell::Float(f),
        (ValueRef::Text(bytes), kind) => {
            let text = String::from_utf8_lossy(bytes);
            match kind {
                ColumnKind::Decimal => Decimal::from_str(text.trim()).map(Cell::Decimal).ok(),
                ColumnKind::Date => parse_date(&text).map(Cell::Date),
                ColumnKind::DateTime => parse_datetime(&text).map(Cell::DateTime),
                _ => None,
            }
            .unwrap_or_else(|| Cell::Text(text.into_owned()))
        }
        (ValueRef::Blob(bytes), _) => Cell::Text(format!("<{} byte blob>", bytes.len())),
    }
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").ok()
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| parse_date(text).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

fn introspect_sync(conn: &Connection) -> rusqlite::Result<Schema> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master
         WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%'
         ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut columns_stmt = conn.prepare("SELECT name, type FROM pragma_table_info(?1) ORDER BY cid")?;
    let mut tables = Vec::with_capacity(names.len());
    for name in names {
        let columns = columns_stmt
            .query_map([&name], |row| {
                let column: String = row.get(0)?;
                let data_type: String = row.get(1)?;
                Ok(Column::new(column, normalize_type(&data_type)))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        tables.push(Table::new(name, columns));
    }

    Ok(Schema::new(tables))
}

fn normalize_type(decl: &str) -> String {
    let decl = decl.trim();
    if decl.is_empty() {
        querypilot_agent::schema::UNKNOWN_TYPE.to_string()
    } else {
        decl.to_ascii_lowercase()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Data Source Registry
// ─────────────────────────────────────────────────────────────────────────────

/// A named data source with its runner and cached schema.
pub struct DataSource {
    pub id: String,
    pub name: String,
    pub ontology: Option<String>,
    pub runner: SharedRunner,
    schema: RwLock<Option<Arc<Schema>>>,
}

impl DataSource {
    pub fn new(id: impl Into<String>, name: impl Into<String>, runner: SharedRunner) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ontology: None,
            runner,
            schema: RwLock::new(None),
        }
    }

    pub fn with_ontology(mut self, ontology: impl Into<String>) -> Self {
        self.ontology = Some(ontology.into());
        self
    }

    pub fn with_schema(self, schema: Schema) -> Self {
        self.set_schema(schema);
        self
    }

    /// Engine name of the runner.
    pub fn kind(&self) -> &str {
        self.runner.kind()
    }

    /// The cached schema, if one was loaded.
    pub fn schema(&self) -> Option<Arc<Schema>> {
        self.schema.read().clone()
    }

    /// Replace the cached schema.
    pub fn set_schema(&self, schema: Schema) {
        *self.schema.write() = Some(Arc::new(schema));
    }

    /// The cached schema, or the `400` every schema-backed endpoint returns.
    ///
    /// An empty schema counts as unavailable.
    pub fn require_schema(&self) -> Result<Arc<Schema>> {
        usable_schema(self.schema())
    }

    /// Open a configured data source and load its schema.
    ///
    /// A `schema_file` replaces introspection. A failed introspection leaves
    /// the schema unset instead of failing start-up.
    pub fn from_config(config: &DataSourceConfig) -> Result<Self> {
        let runner = SqliteRunner::open(&config.path)?;

        let schema = match &config.schema_file {
            Some(path) => Some(load_schema_file(path)?),
            None => match runner.introspect() {
                Ok(schema) => Some(schema),
                Err(e) => {
                    warn!(data_source = %config.id, error = %e, "Schema introspection failed");
                    None
                }
            },
        };

        let mut source = DataSource::new(&config.id, config.display_name(), Arc::new(runner));
        if let Some(ontology) = &config.ontology {
            source = source.with_ontology(ontology);
        }
        if let Some(schema) = schema {
            info!(
                data_source = %config.id,
                tables = schema.tables.len(),
                "Loaded data source schema"
            );
            source.set_schema(schema);
        }
        Ok(source)
    }

    /// Summary used by the listing endpoint.
    pub fn summary(&self) -> DataSourceSummary {
        DataSourceSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            kind: self.kind().to_string(),
            schema_available: self.require_schema().is_ok(),
            has_ontology: self.ontology.as_deref().is_some_and(|o| !o.trim().is_empty()),
        }
    }
}

impl std::fmt::Debug for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSource")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("tables", &self.schema().map(|s| s.tables.len()))
            .finish()
    }
}

/// Read a JSON schema file in any of the accepted column shapes.
pub fn load_schema_file(path: &Path) -> Result<Schema> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| ServerError::Config(format!("failed to read {}: {}", path.display(), e)))?;
    serde_json::from_str(&contents)
        .map_err(|e| ServerError::Config(format!("invalid schema file {}: {}", path.display(), e)))
}

/// Listing entry for one data source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataSourceSummary {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub schema_available: bool,
    pub has_ontology: bool,
}

/// All data sources known to the server, in configuration order.
#[derive(Debug, Default)]
pub struct DataSourceRegistry {
    sources: Vec<Arc<DataSource>>,
}

impl DataSourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open every configured data source.
    pub fn from_config(configs: &[DataSourceConfig]) -> Result<Self> {
        let mut registry = Self::new();
        for config in configs {
            registry.register(DataSource::from_config(config)?);
        }
        Ok(registry)
    }

    /// Add a data source, replacing any with the same id.
    pub fn register(&mut self, source: DataSource) {
        self.sources.retain(|s| s.id != source.id);
        self.sources.push(Arc::new(source));
    }

    pub fn get(&self, id: &str) -> Option<Arc<DataSource>> {
        self.sources.iter().find(|s| s.id == id).cloned()
    }

    /// Look up a data source, or the `404` handlers return.
    pub fn require(&self, id: &str) -> Result<Arc<DataSource>> {
        self.get(id)
            .ok_or_else(|| ServerError::NotFound(format!("Data source '{}' not found.", id)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<DataSource>> {
        self.sources.iter()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl SchemaSource for DataSourceRegistry {
    fn cached_schema(&self, data_source_id: &str) -> Option<Arc<Schema>> {
        self.get(data_source_id).and_then(|s| s.schema())
    }
}

impl DataSourceRegistry {
    /// The cached schema of a registered source, or the `400` every
    /// schema-backed endpoint returns.
    pub fn require_schema(&self, id: &str) -> Result<Arc<Schema>> {
        usable_schema(self.cached_schema(id))
    }
}

fn usable_schema(schema: Option<Arc<Schema>>) -> Result<Arc<Schema>> {
    match schema {
        Some(schema) if !schema.is_empty() => Ok(schema),
        _ => Err(ServerError::BadRequest(SCHEMA_UNAVAILABLE.to_string())),
    }
}
