//! DuckDB access for the text-to-SQL workflow
//!
//! Two concerns live here: running a candidate statement against a
//! schema and describing a schema's catalog as text for the prompt.
//! Connections are opened per call and dropped on every exit path.

use serde::{Deserialize, Serialize};

mod executor;
mod introspect;

pub use executor::{execute, ExecutionError, QueryResult};
pub use introspect::{describe_schema, IntrospectError};

/// Location of the DuckDB database file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

/// Quote an identifier for interpolation into a statement.
///
/// Parameter binding is not available for `USE`, so the schema name is
/// double-quoted with embedded quotes doubled.
pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_ident_escapes_embedded_quotes() {
        assert_eq!(quote_ident("sales"), "\"sales\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
