//! Dialect-specific SQL rendering.
//!
//! Identifier quoting, placeholders and pagination live here so callers never
//! see quoted names: a column called `select` is `select` at the API level.

use crate::models::{Dialect, SortSpec};

/// Quote an identifier for the dialect.
pub fn quote_ident(dialect: Dialect, name: &str) -> String {
    match dialect {
        Dialect::PostgreSQL | Dialect::CockroachDB | Dialect::SQLite => {
            format!("\"{}\"", name.replace('"', "\"\""))
        }
        Dialect::MySQL | Dialect::MariaDB => format!("`{}`", name.replace('`', "``")),
        Dialect::SqlServer => format!("[{}]", name.replace(']', "]]")),
    }
}

/// Quote `schema.table`, or just `table` when no schema applies.
pub fn qualified_table(dialect: Dialect, schema: Option<&str>, table: &str) -> String {
    match schema {
        Some(schema) => format!(
            "{}.{}",
            quote_ident(dialect, schema),
            quote_ident(dialect, table)
        ),
        None => quote_ident(dialect, table),
    }
}

/// Bind placeholder for the 1-based parameter `index`.
pub fn placeholder(dialect: Dialect, index: usize) -> String {
    match dialect {
        Dialect::PostgreSQL | Dialect::CockroachDB => format!("${}", index),
        Dialect::MySQL | Dialect::MariaDB | Dialect::SQLite => "?".to_string(),
        Dialect::SqlServer => format!("@P{}", index),
    }
}

/// Render an `ORDER BY` clause, empty when there are no sort keys.
///
/// SQL Server needs an ordering for `OFFSET .. FETCH`, so it falls back to
/// `ORDER BY (SELECT NULL)`.
pub fn order_by(dialect: Dialect, sort: &[SortSpec]) -> String {
    if sort.is_empty() {
        return match dialect {
            Dialect::SqlServer => " ORDER BY (SELECT NULL)".to_string(),
            _ => String::new(),
        };
    }
    let keys: Vec<String> = sort
        .iter()
        .map(|s| {
            format!(
                "{} {}",
                quote_ident(dialect, s.column()),
                s.direction().as_sql()
            )
        })
        .collect();
    format!(" ORDER BY {}", keys.join(", "))
}

/// Render the pagination tail for a query that already carries its `ORDER BY`.
pub fn paginate(dialect: Dialect, offset: u64, limit: u64) -> String {
    match dialect {
        Dialect::SqlServer => format!(" OFFSET {} ROWS FETCH NEXT {} ROWS ONLY", offset, limit),
        _ => format!(" LIMIT {} OFFSET {}", limit, offset),
    }
}

/// Query returning the server's version banner.
pub fn version_query(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::PostgreSQL => "SHOW server_version",
        Dialect::CockroachDB => "SELECT version()",
        Dialect::MySQL | Dialect::MariaDB => "SELECT VERSION()",
        Dialect::SQLite => "SELECT sqlite_version()",
        Dialect::SqlServer => "SELECT CAST(SERVERPROPERTY('ProductVersion') AS NVARCHAR(128))",
    }
}
