//! Schema-related data models.
//!
//! This module defines types for database schema introspection.

use serde::{Deserialize, Serialize};

/// Primary key shape of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "columns", rename_all = "snake_case")]
pub enum PrimaryKey {
    None,
    Single(String),
    /// Columns in key order
    Composite(Vec<String>),
}

impl PrimaryKey {
    /// Build from ordered key columns.
    pub fn from_columns(mut columns: Vec<String>) -> Self {
        match columns.len() {
            0 => Self::None,
            1 => Self::Single(columns.remove(0)),
            _ => Self::Composite(columns),
        }
    }

    /// The key column, only for single-column keys.
    pub fn single(&self) -> Option<&str> {
        match self {
            Self::Single(column) => Some(column),
            Self::None | Self::Composite(_) => None,
        }
    }

    /// All key columns in key order.
    pub fn columns(&self) -> Vec<String> {
        match self {
            Self::None => Vec::new(),
            Self::Single(column) => vec![column.clone()],
            Self::Composite(columns) => columns.clone(),
        }
    }

    pub fn contains(&self, column: &str) -> bool {
        match self {
            Self::None => false,
            Self::Single(c) => c == column,
            Self::Composite(cs) => cs.iter().any(|c| c == column),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub table_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    pub columns: Vec<ColumnDefinition>,
    pub primary_key: PrimaryKey,
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableSchema {
    /// Create a new table schema.
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            schema_name: None,
            columns: Vec::new(),
            primary_key: PrimaryKey::None,
            foreign_keys: Vec::new(),
        }
    }

    /// Set the schema name.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema_name = Some(schema.into());
        self
    }

    /// Add a column definition.
    pub fn with_column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    /// Set the primary key columns.
    pub fn with_primary_key(mut self, columns: Vec<String>) -> Self {
        for column in &mut self.columns {
            column.is_primary_key = columns.contains(&column.name);
        }
        self.primary_key = PrimaryKey::from_columns(columns);
        self
    }

    pub fn with_foreign_keys(mut self, foreign_keys: Vec<ForeignKey>) -> Self {
        self.foreign_keys = foreign_keys;
        self
    }

    /// Get the fully qualified table name.
    pub fn qualified_name(&self) -> String {
        match &self.schema_name {
            Some(schema) => format!("{}.{}", schema, self.table_name),
            None => self.table_name.clone(),
        }
    }

    /// Look up a column by exact name.
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    /// Declared type as the catalog reports it (e.g., `varchar(255)`, `int unsigned`)
    pub data_type: String,
    pub nullable: bool,
    /// Raw SQL text of the default expression
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    /// 1-based creation order
    pub ordinal_position: u32,
    pub is_primary_key: bool,
}

impl ColumnDefinition {
    /// Create a new column definition.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            default_value: None,
            ordinal_position: 0,
            is_primary_key: false,
        }
    }

    /// Set whether this is a primary key column.
    pub fn with_primary_key(mut self, is_pk: bool) -> Self {
        self.is_primary_key = is_pk;
        self
    }

    /// Set the default expression.
    pub fn with_default(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = Some(default_value.into());
        self
    }

    pub fn with_ordinal(mut self, position: u32) -> Self {
        self.ordinal_position = position;
        self
    }
}

/// An outgoing foreign key constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Source columns in key order
    pub columns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub references_schema: Option<String>,
    pub references_table: String,
    /// Target columns, positionally matching `columns`
    pub references_columns: Vec<String>,
    pub on_delete: ForeignKeyAction,
    pub on_update: ForeignKeyAction,
}

impl ForeignKey {
    /// Create a new single-column foreign key.
    pub fn new(
        column: impl Into<String>,
        references_table: impl Into<String>,
        references_column: impl Into<String>,
    ) -> Self {
        Self {
            name: None,
            columns: vec![column.into()],
            references_schema: None,
            references_table: references_table.into(),
            references_columns: vec![references_column.into()],
            on_delete: ForeignKeyAction::NoAction,
            on_update: ForeignKeyAction::NoAction,
        }
    }

    /// Set the constraint name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_references_schema(mut self, schema: impl Into<String>) -> Self {
        self.references_schema = Some(schema.into());
        self
    }

    /// Append another column pair to a composite key.
    pub fn with_column_pair(
        mut self,
        column: impl Into<String>,
        references_column: impl Into<String>,
    ) -> Self {
        self.columns.push(column.into());
        self.references_columns.push(references_column.into());
        self
    }

    /// Set the on delete action.
    pub fn with_on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = action;
        self
    }

    /// Set the on update action.
    pub fn with_on_update(mut self, action: ForeignKeyAction) -> Self {
        self.on_update = action;
        self
    }

    /// Whether this key maps `column` to `table.target`.
    pub fn links(&self, column: &str, table: &str, target: &str) -> bool {
        self.references_table == table
            && self
                .columns
                .iter()
                .zip(&self.references_columns)
                .any(|(c, t)| c == column && t == target)
    }
}

/// Foreign key referential action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForeignKeyAction {
    /// No action (error if referenced)
    #[default]
    NoAction,
    /// Restrict (same as NoAction in most databases)
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ForeignKeyAction {
    /// Parse from database-specific string.
    pub fn parse(s: &str) -> Self {
        let upper = s.to_uppercase().replace('_', " ");
        match upper.as_str() {
            "CASCADE" => Self::Cascade,
            "SET NULL" => Self::SetNull,
            "SET DEFAULT" => Self::SetDefault,
            "RESTRICT" => Self::Restrict,
            _ => Self::NoAction,
        }
    }
}

impl std::fmt::Display for ForeignKeyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoAction => write!(f, "NO ACTION"),
            Self::Restrict => write!(f, "RESTRICT"),
            Self::Cascade => write!(f, "CASCADE"),
            Self::SetNull => write!(f, "SET NULL"),
            Self::SetDefault => write!(f, "SET DEFAULT"),
        }
    }
}

/// Group per-column foreign key rows into constraints.
///
/// Rows must arrive ordered by constraint then key position. Rows without a
/// constraint name (SQLite) are grouped by their `id` string instead.
pub fn group_foreign_keys(rows: Vec<ForeignKeyRow>) -> Vec<ForeignKey> {
    let mut keys: Vec<(String, ForeignKey)> = Vec::new();
    for row in rows {
        if let Some((group, key)) = keys.pop() {
            if group == row.group {
                keys.push((group, key.with_column_pair(row.column, row.references_column)));
                continue;
            }
            keys.push((group, key));
        }

        let mut key = ForeignKey::new(row.column, row.references_table, row.references_column)
            .with_on_delete(ForeignKeyAction::parse(&row.on_delete))
            .with_on_update(ForeignKeyAction::parse(&row.on_update));
        if let Some(name) = row.name {
            key = key.with_name(name);
        }
        if let Some(schema) = row.references_schema {
            key = key.with_references_schema(schema);
        }
        keys.push((row.group, key));
    }
    keys.into_iter().map(|(_, key)| key).collect()
}

/// One column pair of a foreign key as read from a catalog.
#[derive(Debug, Clone)]
pub struct ForeignKeyRow {
    pub group: String,
    pub name: Option<String>,
    pub column: String,
    pub references_schema: Option<String>,
    pub references_table: String,
    pub references_column: String,
    pub on_delete: String,
    pub on_update: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fk_row(group: &str, column: &str, table: &str, target: &str) -> ForeignKeyRow {
        ForeignKeyRow {
            group: group.to_string(),
            name: Some(group.to_string()),
            column: column.to_string(),
            references_schema: None,
            references_table: table.to_string(),
            references_column: target.to_string(),
            on_delete: "CASCADE".to_string(),
            on_update: "NO ACTION".to_string(),
        }
    }

    #[test]
    fn test_primary_key_from_columns() {
        assert_eq!(PrimaryKey::from_columns(vec![]), PrimaryKey::None);
        assert_eq!(
            PrimaryKey::from_columns(vec!["id".into()]),
            PrimaryKey::Single("id".into())
        );
        let composite = PrimaryKey::from_columns(vec!["id1".into(), "id2".into()]);
        assert_eq!(composite.single(), None);
        assert_eq!(composite.columns(), vec!["id1", "id2"]);
        assert!(composite.contains("id2"));
    }

    #[test]
    fn test_table_schema_marks_primary_columns() {
        let schema = TableSchema::new("people")
            .with_column(ColumnDefinition::new("id", "integer", false))
            .with_column(ColumnDefinition::new("email", "varchar(255)", false))
            .with_primary_key(vec!["id".to_string()]);

        assert!(schema.column("id").unwrap().is_primary_key);
        assert!(!schema.column("email").unwrap().is_primary_key);
        assert_eq!(schema.primary_key.single(), Some("id"));
    }

    #[test]
    fn test_qualified_name() {
        let schema = TableSchema::new("people").with_schema("public");
        assert_eq!(schema.qualified_name(), "public.people");
        assert_eq!(TableSchema::new("people").qualified_name(), "people");
    }

    #[test]
    fn test_group_foreign_keys_by_constraint() {
        let keys = group_foreign_keys(vec![
            fk_row("fk_a", "a1", "parent", "p1"),
            fk_row("fk_a", "a2", "parent", "p2"),
            fk_row("fk_b", "b", "other", "id"),
        ]);

        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].columns, vec!["a1", "a2"]);
        assert_eq!(keys[0].references_columns, vec!["p1", "p2"]);
        assert_eq!(keys[0].on_delete, ForeignKeyAction::Cascade);
        assert!(keys[1].links("b", "other", "id"));
        assert!(!keys[1].links("b", "parent", "id"));
    }

    #[test]
    fn test_group_foreign_keys_keeps_name_and_schema() {
        let mut unnamed = fk_row("0", "address_id", "addresses", "id");
        unnamed.name = None;
        let mut qualified = fk_row("people_jobs_person_id_foreign", "person_id", "people", "id");
        qualified.references_schema = Some("public".to_string());

        let keys = group_foreign_keys(vec![unnamed, qualified]);
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].name, None);
        assert_eq!(keys[0].references_schema, None);
        assert_eq!(keys[1].name.as_deref(), Some("people_jobs_person_id_foreign"));
        assert_eq!(keys[1].references_schema.as_deref(), Some("public"));
        assert_eq!(keys[1].on_update, ForeignKeyAction::NoAction);
    }

    #[test]
    fn test_foreign_key_action_parsing() {
        assert_eq!(ForeignKeyAction::parse("set null"), ForeignKeyAction::SetNull);
        assert_eq!(ForeignKeyAction::parse("SET_DEFAULT"), ForeignKeyAction::SetDefault);
        assert_eq!(ForeignKeyAction::parse("restrict"), ForeignKeyAction::Restrict);
        assert_eq!(ForeignKeyAction::parse("whatever"), ForeignKeyAction::NoAction);
    }

    #[test]
    fn test_primary_key_serialization() {
        let json = serde_json::to_value(PrimaryKey::Single("id".into())).unwrap();
        assert_eq!(json["kind"], "single");
        assert_eq!(json["columns"], "id");
    }
}
