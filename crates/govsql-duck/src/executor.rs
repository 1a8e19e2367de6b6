//! Query execution against DuckDB

use duckdb::Connection;
use thiserror::Error;

use crate::{quote_ident, DatabaseConfig};

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),
}

/// Result of a successful query: column names plus row values as JSON.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub row_count: usize,
}

/// Run `sql` against `schema` of the configured database.
///
/// A fresh connection is opened for the call and dropped when it
/// returns, success or failure. The caller decides what to do with the
/// error message; nothing is retried here.
pub fn execute(
    db: &DatabaseConfig,
    schema: &str,
    sql: &str,
) -> Result<QueryResult, ExecutionError> {
    let conn = Connection::open(&db.path)?;
    conn.execute_batch(&format!("USE {};", quote_ident(schema)))?;

    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;

    let mut columns: Vec<String> = Vec::new();
    let mut result_rows = Vec::new();

    while let Some(row) = rows.next()? {
        let statement = row.as_ref();
        if columns.is_empty() {
            columns = (0..statement.column_count())
                .map(|i| {
                    statement
                        .column_name(i)
                        .map(|name| name.to_string())
                        .unwrap_or_else(|_| format!("col{}", i))
                })
                .collect();
        }

        let mut json_row = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            json_row.push(value_to_json(row.get_ref(i)?));
        }
        result_rows.push(json_row);
    }
    drop(rows);

    // Empty result sets still carry a header; the statement has been
    // executed at this point so its column metadata is available.
    if columns.is_empty() {
        columns = (0..stmt.column_count())
            .map(|i| {
                stmt.column_name(i)
                    .map(|name| name.to_string())
                    .unwrap_or_else(|_| format!("col{}", i))
            })
            .collect();
    }

    let row_count = result_rows.len();
    tracing::debug!(rows = row_count, "query executed");

    Ok(QueryResult {
        columns,
        rows: result_rows,
        row_count,
    })
}

/// Convert a DuckDB cell to a JSON value.
fn value_to_json(value: duckdb::types::ValueRef<'_>) -> serde_json::Value {
    use duckdb::types::ValueRef;

    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Boolean(b) => serde_json::Value::Bool(b),
        ValueRef::TinyInt(i) => serde_json::json!(i),
        ValueRef::SmallInt(i) => serde_json::json!(i),
        ValueRef::Int(i) => serde_json::json!(i),
        ValueRef::BigInt(i) => serde_json::json!(i),
        ValueRef::HugeInt(i) => serde_json::json!(i),
        ValueRef::UTinyInt(i) => serde_json::json!(i),
        ValueRef::USmallInt(i) => serde_json::json!(i),
        ValueRef::UInt(i) => serde_json::json!(i),
        ValueRef::UBigInt(i) => serde_json::json!(i),
        ValueRef::Float(f) => serde_json::json!(f),
        ValueRef::Double(f) => serde_json::json!(f),
        ValueRef::Text(s) => serde_json::Value::String(String::from_utf8_lossy(s).to_string()),
        ValueRef::Blob(b) => serde_json::Value::String(format!("<blob {} bytes>", b.len())),
        _ => serde_json::Value::String("<unsupported>".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_db() -> (tempfile::TempDir, DatabaseConfig) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.duckdb").to_string_lossy().to_string();
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE users (id INTEGER, name VARCHAR, age INTEGER);
             INSERT INTO users VALUES (1, 'Alice', 30), (2, 'Bob', 25);",
        )
        .unwrap();
        (dir, DatabaseConfig { path })
    }

    #[test]
    fn executes_select_and_returns_columns() {
        let (_dir, db) = seeded_db();

        let result = execute(&db, "main", "SELECT id, name FROM users ORDER BY id").unwrap();

        assert_eq!(result.columns, vec!["id", "name"]);
        assert_eq!(result.row_count, 2);
        assert_eq!(result.rows[0][1], serde_json::json!("Alice"));
    }

    #[test]
    fn empty_result_still_has_header() {
        let (_dir, db) = seeded_db();

        let result = execute(&db, "main", "SELECT id FROM users WHERE id > 100").unwrap();

        assert_eq!(result.columns, vec!["id"]);
        assert_eq!(result.row_count, 0);
        assert!(result.rows.is_empty());
    }

    #[test]
    fn syntax_error_surfaces_as_database_error() {
        let (_dir, db) = seeded_db();

        let result = execute(&db, "main", "SELECT FROM WHERE");

        assert!(result.is_err());
    }

    #[test]
    fn unknown_table_surfaces_as_database_error() {
        let (_dir, db) = seeded_db();

        let result = execute(&db, "main", "SELECT * FROM no_such_table");

        assert!(result.is_err());
    }
}
