//! Schema catalog extraction

use duckdb::Connection;
use thiserror::Error;

use crate::DatabaseConfig;

#[derive(Debug, Error)]
pub enum IntrospectError {
    #[error("Schema catalog unavailable: {0}")]
    SchemaUnavailable(#[from] duckdb::Error),
}

const NO_COMMENT: &str = "No comment";

/// Describe a schema's tables and columns as prompt-ready text.
///
/// One block per table, columns listed as `name: type  ::  comment`,
/// in catalog order. A schema without tables yields an empty string.
/// Any connection or query failure is fatal for the calling run.
pub fn describe_schema(db: &DatabaseConfig, schema: &str) -> Result<String, IntrospectError> {
    let conn = Connection::open(&db.path)?;

    let mut stmt = conn.prepare(
        "SELECT schema_name, table_name, column_name, data_type, comment \
         FROM duckdb_columns() \
         WHERE schema_name = ? \
         ORDER BY schema_name, table_name, column_index",
    )?;

    let mut rows = stmt.query([schema])?;

    let mut description = String::new();
    let mut previous_table = String::new();

    while let Some(row) = rows.next()? {
        let schema_name: String = row.get(0)?;
        let table: String = row.get(1)?;
        let column: String = row.get(2)?;
        let data_type: String = row.get(3)?;
        let comment: Option<String> = row.get(4)?;

        if table != previous_table {
            description.push_str(&format!("\n Table '{}.{}': \n Columns: \n", schema_name, table));
        }

        let comment = comment.unwrap_or_else(|| NO_COMMENT.to_string());
        description.push_str(&format!("\t - {}: {}  ::  {}\n", column, data_type, comment));
        previous_table = table;
    }

    Ok(description)
}
