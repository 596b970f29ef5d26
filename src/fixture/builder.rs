//! A small `CREATE TABLE` builder that renders per dialect.
//!
//! Column helpers mirror the shapes the fixture needs: auto-increment keys,
//! nullable timestamps, strings, integers and decimals, plus named primary
//! and foreign key constraints.

use crate::db::dialect::{qualified_table, quote_ident};
use crate::error::{DbError, DbResult};
use crate::models::Dialect;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Increments,
    String,
    Integer,
    Decimal,
    Timestamp,
}

#[derive(Debug, Clone)]
struct ColumnSpec {
    name: String,
    kind: ColumnKind,
    not_null: bool,
    unsigned: bool,
}

#[derive(Debug, Clone)]
struct ForeignSpec {
    column: String,
    table: String,
    references: String,
}

/// Declarative table definition.
#[derive(Debug, Clone)]
pub struct TableBuilder {
    name: String,
    columns: Vec<ColumnSpec>,
    primary: Vec<String>,
    foreign: Vec<ForeignSpec>,
}

impl TableBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary: Vec::new(),
            foreign: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column names in declaration order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Auto-incrementing integer primary key.
    pub fn increments(self, name: impl Into<String>) -> Self {
        self.column(name, ColumnKind::Increments)
    }

    /// Nullable `created_at` and `updated_at`.
    pub fn timestamps(self) -> Self {
        self.column("created_at", ColumnKind::Timestamp)
            .column("updated_at", ColumnKind::Timestamp)
    }

    pub fn string(self, name: impl Into<String>) -> Self {
        self.column(name, ColumnKind::String)
    }

    pub fn integer(self, name: impl Into<String>) -> Self {
        self.column(name, ColumnKind::Integer)
    }

    pub fn decimal(self, name: impl Into<String>) -> Self {
        self.column(name, ColumnKind::Decimal)
    }

    /// Mark the last declared column `NOT NULL`.
    pub fn not_nullable(mut self) -> Self {
        if let Some(column) = self.columns.last_mut() {
            column.not_null = true;
        }
        self
    }

    /// Mark the last declared column unsigned (MySQL family only).
    pub fn unsigned(mut self) -> Self {
        if let Some(column) = self.columns.last_mut() {
            column.unsigned = true;
        }
        self
    }

    /// Add a foreign key; `references` is `table.column`.
    pub fn foreign(mut self, column: impl Into<String>, references: &str) -> DbResult<Self> {
        let (table, target) = references.split_once('.').ok_or_else(|| {
            DbError::configuration(format!(
                "Foreign key reference '{}' must be 'table.column'",
                references
            ))
        })?;
        self.foreign.push(ForeignSpec {
            column: column.into(),
            table: table.to_string(),
            references: target.to_string(),
        });
        Ok(self)
    }

    /// Table-level primary key over `columns`, in key order.
    pub fn primary(mut self, columns: &[&str]) -> Self {
        self.primary = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    fn column(mut self, name: impl Into<String>, kind: ColumnKind) -> Self {
        self.columns.push(ColumnSpec {
            name: name.into(),
            kind,
            not_null: false,
            unsigned: false,
        });
        self
    }

    /// Render `CREATE TABLE`, qualifying every table name with `schema`.
    pub fn create_sql(&self, dialect: Dialect, schema: Option<&str>) -> String {
        let mut parts: Vec<String> = self
            .columns
            .iter()
            .map(|column| column_definition(dialect, column))
            .collect();

        if !self.primary.is_empty() {
            let keys: Vec<String> = self.primary.iter().map(|c| quote_ident(dialect, c)).collect();
            parts.push(format!(
                "constraint {} primary key ({})",
                quote_ident(dialect, &format!("{}_pkey", self.name)),
                keys.join(", ")
            ));
        }

        for fk in &self.foreign {
            parts.push(format!(
                "constraint {} foreign key ({}) references {} ({})",
                quote_ident(dialect, &format!("{}_{}_foreign", self.name, fk.column)),
                quote_ident(dialect, &fk.column),
                reference_table(dialect, schema, &fk.table),
                quote_ident(dialect, &fk.references)
            ));
        }

        format!(
            "create table {} ({})",
            qualified_table(dialect, schema, &self.name),
            parts.join(", ")
        )
    }

    /// Render a drop that succeeds whether or not the table exists.
    pub fn drop_sql(&self, dialect: Dialect, schema: Option<&str>) -> String {
        let table = qualified_table(dialect, schema, &self.name);
        match dialect {
            // DROP TABLE IF EXISTS needs SQL Server 2016
            Dialect::SqlServer => format!(
                "if object_id(N'{}', N'U') is not null drop table {}",
                table.replace('\'', "''"),
                table
            ),
            _ => format!("drop table if exists {}", table),
        }
    }
}

/// SQLite resolves foreign key targets inside the table's own database and
/// rejects a qualified name there.
fn reference_table(dialect: Dialect, schema: Option<&str>, table: &str) -> String {
    match dialect {
        Dialect::SQLite => quote_ident(dialect, table),
        _ => qualified_table(dialect, schema, table),
    }
}

fn column_definition(dialect: Dialect, column: &ColumnSpec) -> String {
    let name = quote_ident(dialect, &column.name);
    if column.kind == ColumnKind::Increments {
        return format!("{} {}", name, increments_type(dialect));
    }

    let mut definition = format!("{} {}", name, column_type(dialect, column.kind));
    if column.unsigned && matches!(dialect, Dialect::MySQL | Dialect::MariaDB) {
        definition.push_str(" unsigned");
    }
    definition.push_str(if column.not_null { " not null" } else { " null" });
    definition
}

fn increments_type(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::PostgreSQL | Dialect::CockroachDB => "serial primary key",
        Dialect::MySQL | Dialect::MariaDB => "int unsigned not null auto_increment primary key",
        Dialect::SQLite => "integer not null primary key autoincrement",
        Dialect::SqlServer => "int identity(1,1) not null primary key",
    }
}

fn column_type(dialect: Dialect, kind: ColumnKind) -> &'static str {
    match (kind, dialect) {
        (ColumnKind::String, Dialect::SqlServer) => "nvarchar(255)",
        (ColumnKind::String, _) => "varchar(255)",
        (ColumnKind::Integer, _) => "integer",
        (ColumnKind::Decimal, Dialect::SQLite) => "float",
        (ColumnKind::Decimal, _) => "decimal(8, 2)",
        (ColumnKind::Timestamp, Dialect::PostgreSQL | Dialect::CockroachDB) => "timestamptz",
        (ColumnKind::Timestamp, Dialect::SqlServer) => "datetime2",
        (ColumnKind::Timestamp, _) => "datetime",
        (ColumnKind::Increments, _) => "integer",
    }
}
