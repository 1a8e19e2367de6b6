//! Statement policy gate for generated SQL
//!
//! The single safety check between a model-generated string and the
//! database. Only a plain SELECT may pass; everything else is refused.

use sqlparser::ast::{SetExpr, Statement};
use sqlparser::dialect::DuckDbDialect;
use sqlparser::parser::Parser;

/// Classify a candidate SQL statement as executable or not.
///
/// Returns `true` only when the text parses to exactly one statement,
/// that statement is a query whose body is a plain SELECT, and the
/// SELECT has no INTO target. Set operations, VALUES, DML, DDL,
/// multi-statement input and unparsable text all return `false`.
///
/// Parse errors are folded into `false`; this function never fails.
pub fn is_allowed_statement(sql: &str) -> bool {
    let dialect = DuckDbDialect {};

    let statements = match Parser::parse_sql(&dialect, sql) {
        Ok(statements) => statements,
        Err(e) => {
            tracing::debug!("statement rejected, parse error: {}", e);
            return false;
        }
    };

    // A trailing second statement would still reach the driver, so the
    // gate refuses anything that is not exactly one statement.
    let statement = match statements.as_slice() {
        [statement] => statement,
        _ => return false,
    };

    match statement {
        Statement::Query(query) => match query.body.as_ref() {
            SetExpr::Select(select) => select.into.is_none(),
            _ => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_select() {
        assert!(is_allowed_statement("SELECT * FROM users"));
        assert!(is_allowed_statement("select id, name from users where age > 25"));
        assert!(is_allowed_statement(
            "SELECT COUNT(*) FROM orders GROUP BY customer_id HAVING COUNT(*) > 1"
        ));
    }

    #[test]
    fn accepts_select_with_cte() {
        assert!(is_allowed_statement(
            "WITH recent AS (SELECT * FROM orders WHERE o_date > '2024-01-01') \
             SELECT COUNT(*) FROM recent"
        ));
    }

    #[test]
    fn rejects_select_into() {
        assert!(!is_allowed_statement("SELECT * INTO backup FROM users"));
        assert!(!is_allowed_statement("SELECT id INTO t2 FROM t1 WHERE id > 5"));
    }

    #[test]
    fn rejects_mutating_statements() {
        assert!(!is_allowed_statement("INSERT INTO users VALUES (1, 'x')"));
        assert!(!is_allowed_statement("UPDATE users SET name = 'x' WHERE id = 1"));
        assert!(!is_allowed_statement("DELETE FROM users"));
        assert!(!is_allowed_statement("DROP TABLE users"));
        assert!(!is_allowed_statement("CREATE TABLE t (id INTEGER)"));
        assert!(!is_allowed_statement("TRUNCATE TABLE users"));
    }

    #[test]
    fn rejects_set_operations() {
        assert!(!is_allowed_statement("SELECT id FROM a UNION SELECT id FROM b"));
        assert!(!is_allowed_statement("SELECT id FROM a EXCEPT SELECT id FROM b"));
    }

    #[test]
    fn rejects_unparsable_text() {
        assert!(!is_allowed_statement(""));
        assert!(!is_allowed_statement("not sql at all"));
        assert!(!is_allowed_statement("SELEC * FORM users"));
    }

    #[test]
    fn rejects_multiple_statements() {
        assert!(!is_allowed_statement("SELECT 1; DROP TABLE users"));
        assert!(!is_allowed_statement("SELECT 1; SELECT 2"));
    }
}
