//! Limits applied to every query the agent runs on a user's behalf.

use crate::datasource::QueryData;

/// Row cap for executed queries and the rows handed back to clients.
pub const ROW_CAP: usize = 100;

/// Rows fetched when sampling a table.
pub const SAMPLE_ROWS: usize = 5;

/// Append ` LIMIT 100` to a `SELECT` that carries no `LIMIT` of its own.
///
/// Detection is token based: `LIMIT` must appear as a whole word, so a column
/// named `speed_limit` does not count. Anything other than a `SELECT` is
/// returned unchanged.
pub fn enforce_limit(query: &str) -> String {
    let trimmed = query.trim();
    let upper = trimmed.to_uppercase();

    let has_limit = upper
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .any(|token| token == "LIMIT");

    if upper.starts_with("SELECT") && !has_limit {
        let body = trimmed.trim_end_matches(';').trim_end();
        format!("{} LIMIT {}", body, ROW_CAP)
    } else {
        query.to_string()
    }
}

/// Keep at most `cap` rows, flagging the result when any were dropped.
pub fn truncate_result(mut data: QueryData, cap: usize) -> QueryData {
    if let Some(rows) = data.rows.as_mut()
        && rows.len() > cap
    {
        rows.truncate(cap);
        data.truncated = true;
    }
    data
}

/// Whether `name` is safe to splice into `SELECT * FROM <name>`.
///
/// Only ASCII letters, digits, underscore and dot are allowed.
pub fn is_valid_table_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// The sampling query for a table name that passed [`is_valid_table_name`].
pub fn sample_query(table_name: &str) -> String {
    format!("SELECT * FROM {} LIMIT {}", table_name, SAMPLE_ROWS)
}
