//! Schema introspection module.
//!
//! This module provides catalog introspection for every supported dialect.
//!
//! # Architecture
//!
//! SQL queries are organized in the `queries` submodule with constants for each
//! dialect. Dialect-specific implementations are in their respective submodules
//! (postgres, mysql, sqlite, mssql), each providing the same interface.
//! CockroachDB goes through the postgres module with its own column query,
//! since its catalogs expose hidden columns such as `rowid`.
//!
//! Nothing here caches: every call reads the catalog as it is at call time.

use crate::db::dialect;
use crate::db::deadline::{Deadline, with_timeout};
use crate::db::executor::mssql_query;
use crate::db::pool::DbPool;
use crate::error::{DbError, DbResult};
use crate::models::{
    ColumnDefinition, Dialect, ForeignKey, ForeignKeyRow, TableSchema, group_foreign_keys,
};
use tracing::debug;

/// Schema inspector for database introspection.
pub struct SchemaInspector;

impl SchemaInspector {
    /// List base tables in a schema, sorted by name.
    pub async fn list_tables(
        pool: &DbPool,
        dialect: Dialect,
        schema: Option<&str>,
        deadline: Deadline,
    ) -> DbResult<Vec<String>> {
        let schema = resolve_schema(dialect, schema);
        let mut tables = with_timeout("list_tables", deadline, async {
            match pool {
                DbPool::Postgres(p) => postgres::list_tables(p, schema.unwrap_or("public")).await,
                DbPool::MySql(p) => mysql::list_tables(p, schema).await,
                DbPool::SQLite(p) => sqlite::list_tables(p, schema.unwrap_or("main")).await,
                DbPool::SqlServer(p) => mssql::list_tables(p, schema.unwrap_or("dbo")).await,
            }
        })
        .await?;

        // Catalog collations differ; present one byte-wise order everywhere
        tables.sort();
        debug!(dialect = %dialect, schema = ?schema, count = tables.len(), "Listed tables");
        Ok(tables)
    }

    /// List a table's columns in creation order.
    ///
    /// An unknown table is a query error, never an empty list.
    pub async fn list_columns(
        pool: &DbPool,
        dialect: Dialect,
        table: &str,
        schema: Option<&str>,
        deadline: Deadline,
    ) -> DbResult<Vec<ColumnDefinition>> {
        let schema = resolve_schema(dialect, schema);
        let columns = with_timeout("list_table_columns", deadline, async {
            match pool {
                DbPool::Postgres(p) => {
                    postgres::list_columns(p, dialect, table, schema.unwrap_or("public")).await
                }
                DbPool::MySql(p) => mysql::list_columns(p, table, schema).await,
                DbPool::SQLite(p) => sqlite::list_columns(p, table, schema.unwrap_or("main")).await,
                DbPool::SqlServer(p) => {
                    mssql::list_columns(p, table, schema.unwrap_or("dbo")).await
                }
            }
        })
        .await?;

        if columns.is_empty() {
            return Err(unknown_table(table));
        }
        debug!(dialect = %dialect, table = %table, count = columns.len(), "Listed columns");
        Ok(columns)
    }

    /// Primary key columns in key order; empty when the table has no key.
    pub async fn primary_key_columns(
        pool: &DbPool,
        dialect: Dialect,
        table: &str,
        schema: Option<&str>,
        deadline: Deadline,
    ) -> DbResult<Vec<String>> {
        let resolved = resolve_schema(dialect, schema);
        let (exists, columns) = with_timeout("get_primary_key", deadline, async {
            match pool {
                DbPool::Postgres(p) => {
                    let schema = resolved.unwrap_or("public");
                    Ok((
                        postgres::table_exists(p, table, schema).await?,
                        postgres::primary_key(p, table, schema).await?,
                    ))
                }
                DbPool::MySql(p) => Ok((
                    mysql::table_exists(p, table, resolved).await?,
                    mysql::primary_key(p, table, resolved).await?,
                )),
                DbPool::SQLite(p) => {
                    let schema = resolved.unwrap_or("main");
                    Ok((
                        sqlite::table_exists(p, table, schema).await?,
                        sqlite::primary_key(p, table, schema).await?,
                    ))
                }
                DbPool::SqlServer(p) => {
                    let schema = resolved.unwrap_or("dbo");
                    Ok((
                        mssql::table_exists(p, table, schema).await?,
                        mssql::primary_key(p, table, schema).await?,
                    ))
                }
            }
        })
        .await?;

        if !exists {
            return Err(unknown_table(table));
        }
        debug!(dialect = %dialect, table = %table, columns = ?columns, "Read primary key");
        Ok(columns)
    }

    /// Outgoing foreign keys, one entry per constraint.
    pub async fn foreign_keys(
        pool: &DbPool,
        dialect: Dialect,
        table: &str,
        schema: Option<&str>,
        deadline: Deadline,
    ) -> DbResult<Vec<ForeignKey>> {
        let resolved = resolve_schema(dialect, schema);
        let (exists, rows) = with_timeout("get_table_keys", deadline, async {
            match pool {
                DbPool::Postgres(p) => {
                    let schema = resolved.unwrap_or("public");
                    Ok((
                        postgres::table_exists(p, table, schema).await?,
                        postgres::foreign_keys(p, table, schema).await?,
                    ))
                }
                DbPool::MySql(p) => Ok((
                    mysql::table_exists(p, table, resolved).await?,
                    mysql::foreign_keys(p, table, resolved).await?,
                )),
                DbPool::SQLite(p) => {
                    let schema = resolved.unwrap_or("main");
                    Ok((
                        sqlite::table_exists(p, table, schema).await?,
                        sqlite::foreign_keys(p, table, schema).await?,
                    ))
                }
                DbPool::SqlServer(p) => {
                    let schema = resolved.unwrap_or("dbo");
                    Ok((
                        mssql::table_exists(p, table, schema).await?,
                        mssql::foreign_keys(p, table, schema).await?,
                    ))
                }
            }
        })
        .await?;

        if !exists {
            return Err(unknown_table(table));
        }
        let keys = group_foreign_keys(rows);
        debug!(dialect = %dialect, table = %table, count = keys.len(), "Listed foreign keys");
        Ok(keys)
    }

    /// Describe a table: columns, primary key and foreign keys.
    pub async fn describe_table(
        pool: &DbPool,
        dialect: Dialect,
        table: &str,
        schema: Option<&str>,
        deadline: Deadline,
    ) -> DbResult<TableSchema> {
        let columns = Self::list_columns(pool, dialect, table, schema, deadline).await?;
        let primary_key = Self::primary_key_columns(pool, dialect, table, schema, deadline).await?;
        let foreign_keys = Self::foreign_keys(pool, dialect, table, schema, deadline).await?;

        let mut described = TableSchema::new(table);
        if let Some(schema) = resolve_schema(dialect, schema) {
            described = described.with_schema(schema);
        }
        for column in columns {
            described = described.with_column(column);
        }
        Ok(described
            .with_primary_key(primary_key)
            .with_foreign_keys(foreign_keys))
    }

    /// List user schemas (attached database names for SQLite).
    pub async fn list_schemas(
        pool: &DbPool,
        dialect: Dialect,
        deadline: Deadline,
    ) -> DbResult<Vec<String>> {
        let schemas = with_timeout("list_schemas", deadline, async {
            match pool {
                DbPool::Postgres(p) => postgres::list_schemas(p).await,
                DbPool::MySql(p) => mysql::list_schemas(p).await,
                DbPool::SQLite(p) => sqlite::list_schemas(p).await,
                DbPool::SqlServer(p) => mssql::list_schemas(p).await,
            }
        })
        .await?;
        debug!(dialect = %dialect, count = schemas.len(), "Listed schemas");
        Ok(schemas)
    }
}

/// Schema to scope a catalog lookup to; `None` only for the MySQL family,
/// which resolves to the connected database on the server side.
pub(crate) fn resolve_schema(dialect: Dialect, schema: Option<&str>) -> Option<&str> {
    schema.or(dialect.default_schema())
}

fn unknown_table(table: &str) -> DbError {
    DbError::query(format!("Table '{}' not found", table), table)
}

/// Render `varchar(255)` style type names from catalog parts.
fn sized_type(data_type: &str, max_length: Option<i64>) -> String {
    match max_length {
        Some(-1) => format!("{}(max)", data_type),
        Some(len) if len > 0 => format!("{}({})", data_type, len),
        _ => data_type.to_string(),
    }
}

// =============================================================================
// SQL Query Templates
// =============================================================================
//
// Centralized SQL queries for schema introspection. Each dialect has its own
// submodule with queries adapted to its specific system catalogs.

mod queries {
    pub mod postgres {
        pub const LIST_TABLES: &str = r#"
            SELECT table_name::text AS table_name
            FROM information_schema.tables
            WHERE table_schema = $1
            AND table_type = 'BASE TABLE'
            ORDER BY table_name
            "#;

        pub const TABLE_EXISTS: &str = r#"
            SELECT COUNT(*) AS table_count
            FROM information_schema.tables
            WHERE table_schema = $1 AND table_name = $2
            "#;

        pub const LIST_COLUMNS: &str = r#"
            SELECT
                column_name::text AS column_name,
                data_type::text AS data_type,
                character_maximum_length::int8 AS max_length,
                is_nullable::text AS is_nullable,
                column_default::text AS column_default,
                ordinal_position::int8 AS ordinal_position
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
            "#;

        /// CockroachDB reports its implicit `rowid` as a hidden column.
        pub const LIST_COLUMNS_COCKROACH: &str = r#"
            SELECT
                column_name::text AS column_name,
                data_type::text AS data_type,
                character_maximum_length::int8 AS max_length,
                is_nullable::text AS is_nullable,
                column_default::text AS column_default,
                ordinal_position::int8 AS ordinal_position
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            AND is_hidden = 'NO'
            ORDER BY ordinal_position
            "#;

        pub const PRIMARY_KEY: &str = r#"
            SELECT kcu.column_name::text AS column_name
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
                AND tc.table_name = kcu.table_name
            WHERE tc.constraint_type = 'PRIMARY KEY'
            AND tc.table_schema = $1
            AND tc.table_name = $2
            ORDER BY kcu.ordinal_position
            "#;

        pub const FOREIGN_KEYS: &str = r#"
            SELECT
                kcu.constraint_name::text AS constraint_name,
                kcu.column_name::text AS column_name,
                rkcu.table_schema::text AS foreign_table_schema,
                rkcu.table_name::text AS foreign_table_name,
                rkcu.column_name::text AS foreign_column_name,
                rc.delete_rule::text AS delete_rule,
                rc.update_rule::text AS update_rule
            FROM information_schema.referential_constraints rc
            JOIN information_schema.key_column_usage kcu
                ON kcu.constraint_schema = rc.constraint_schema
                AND kcu.constraint_name = rc.constraint_name
            JOIN information_schema.key_column_usage rkcu
                ON rkcu.constraint_schema = rc.unique_constraint_schema
                AND rkcu.constraint_name = rc.unique_constraint_name
                AND rkcu.ordinal_position = kcu.position_in_unique_constraint
            WHERE kcu.table_schema = $1 AND kcu.table_name = $2
            ORDER BY kcu.constraint_name, kcu.ordinal_position
            "#;

        pub const LIST_SCHEMAS: &str = r#"
            SELECT schema_name::text AS schema_name
            FROM information_schema.schemata
            WHERE schema_name NOT IN ('information_schema', 'pg_catalog', 'crdb_internal', 'pg_extension')
            AND schema_name NOT LIKE 'pg_toast%'
            AND schema_name NOT LIKE 'pg_temp%'
            ORDER BY schema_name
            "#;
    }

    pub mod mysql {
        pub const LIST_TABLES: &str = r#"
            SELECT CONVERT(TABLE_NAME USING utf8mb4) AS TABLE_NAME
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = COALESCE(?, DATABASE())
            AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
            "#;

        pub const TABLE_EXISTS: &str = r#"
            SELECT COUNT(*) AS TABLE_COUNT
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = COALESCE(?, DATABASE()) AND TABLE_NAME = ?
            "#;

        pub const LIST_COLUMNS: &str = r#"
            SELECT
                CONVERT(COLUMN_NAME USING utf8mb4) AS COLUMN_NAME,
                CONVERT(COLUMN_TYPE USING utf8mb4) AS COLUMN_TYPE,
                CONVERT(IS_NULLABLE USING utf8mb4) AS IS_NULLABLE,
                CONVERT(COLUMN_DEFAULT USING utf8mb4) AS COLUMN_DEFAULT,
                ORDINAL_POSITION
            FROM information_schema.COLUMNS
            WHERE TABLE_SCHEMA = COALESCE(?, DATABASE()) AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
            "#;

        pub const PRIMARY_KEY: &str = r#"
            SELECT CONVERT(COLUMN_NAME USING utf8mb4) AS COLUMN_NAME
            FROM information_schema.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = COALESCE(?, DATABASE())
            AND TABLE_NAME = ?
            AND CONSTRAINT_NAME = 'PRIMARY'
            ORDER BY ORDINAL_POSITION
            "#;

        pub const FOREIGN_KEYS: &str = r#"
            SELECT
                CONVERT(kcu.CONSTRAINT_NAME USING utf8mb4) AS CONSTRAINT_NAME,
                CONVERT(kcu.COLUMN_NAME USING utf8mb4) AS COLUMN_NAME,
                CONVERT(kcu.REFERENCED_TABLE_SCHEMA USING utf8mb4) AS REFERENCED_TABLE_SCHEMA,
                CONVERT(kcu.REFERENCED_TABLE_NAME USING utf8mb4) AS REFERENCED_TABLE_NAME,
                CONVERT(kcu.REFERENCED_COLUMN_NAME USING utf8mb4) AS REFERENCED_COLUMN_NAME,
                CONVERT(rc.DELETE_RULE USING utf8mb4) AS DELETE_RULE,
                CONVERT(rc.UPDATE_RULE USING utf8mb4) AS UPDATE_RULE
            FROM information_schema.KEY_COLUMN_USAGE kcu
            JOIN information_schema.REFERENTIAL_CONSTRAINTS rc
                ON rc.CONSTRAINT_SCHEMA = kcu.CONSTRAINT_SCHEMA
                AND rc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME
                AND rc.TABLE_NAME = kcu.TABLE_NAME
            WHERE kcu.TABLE_SCHEMA = COALESCE(?, DATABASE())
            AND kcu.TABLE_NAME = ?
            AND kcu.REFERENCED_TABLE_NAME IS NOT NULL
            ORDER BY kcu.CONSTRAINT_NAME, kcu.ORDINAL_POSITION
            "#;

        pub const LIST_SCHEMAS: &str = r#"
            SELECT CONVERT(SCHEMA_NAME USING utf8mb4) AS SCHEMA_NAME
            FROM information_schema.SCHEMATA
            WHERE SCHEMA_NAME NOT IN ('information_schema', 'mysql', 'performance_schema', 'sys')
            ORDER BY SCHEMA_NAME
            "#;
    }

    pub mod sqlite {
        pub const LIST_COLUMNS: &str = r#"
            SELECT cid, name, type, "notnull", dflt_value, pk
            FROM pragma_table_info(?1, ?2)
            ORDER BY cid
            "#;

        pub const PRIMARY_KEY: &str = r#"
            SELECT name
            FROM pragma_table_info(?1, ?2)
            WHERE pk > 0
            ORDER BY pk
            "#;

        pub const FOREIGN_KEYS: &str = r#"
            SELECT id, seq, "table", "from", "to", on_update, on_delete
            FROM pragma_foreign_key_list(?1, ?2)
            ORDER BY id, seq
            "#;

        pub const LIST_SCHEMAS: &str = "SELECT name FROM pragma_database_list ORDER BY seq";

        /// `sqlite_master` lives per attached database, so the schema is spliced in.
        pub fn list_tables(schema: &str) -> String {
            format!(
                "SELECT name FROM {}.sqlite_master \
                 WHERE type = 'table' AND name NOT GLOB 'sqlite_*' \
                 ORDER BY name",
                schema
            )
        }

        pub fn table_exists(schema: &str) -> String {
            format!(
                "SELECT COUNT(*) FROM {}.sqlite_master \
                 WHERE type IN ('table', 'view') AND name = ?1",
                schema
            )
        }
    }

    pub mod mssql {
        pub const LIST_TABLES: &str = r#"
            SELECT TABLE_NAME
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_SCHEMA = @P1
            AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
            "#;

        pub const TABLE_EXISTS: &str = r#"
            SELECT COUNT(*) AS TABLE_COUNT
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_SCHEMA = @P1 AND TABLE_NAME = @P2
            "#;

        pub const LIST_COLUMNS: &str = r#"
            SELECT
                COLUMN_NAME,
                DATA_TYPE,
                CHARACTER_MAXIMUM_LENGTH,
                IS_NULLABLE,
                COLUMN_DEFAULT,
                ORDINAL_POSITION
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = @P1 AND TABLE_NAME = @P2
            ORDER BY ORDINAL_POSITION
            "#;

        pub const PRIMARY_KEY: &str = r#"
            SELECT kcu.COLUMN_NAME
            FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
            JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu
                ON tc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME
                AND tc.TABLE_SCHEMA = kcu.TABLE_SCHEMA
                AND tc.TABLE_NAME = kcu.TABLE_NAME
            WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY'
            AND tc.TABLE_SCHEMA = @P1
            AND tc.TABLE_NAME = @P2
            ORDER BY kcu.ORDINAL_POSITION
            "#;

        pub const FOREIGN_KEYS: &str = r#"
            SELECT
                fk.name AS constraint_name,
                pc.name AS column_name,
                SCHEMA_NAME(rt.schema_id) AS foreign_table_schema,
                rt.name AS foreign_table_name,
                rc.name AS foreign_column_name,
                fk.delete_referential_action_desc AS delete_rule,
                fk.update_referential_action_desc AS update_rule
            FROM sys.foreign_keys fk
            JOIN sys.foreign_key_columns fkc ON fkc.constraint_object_id = fk.object_id
            JOIN sys.tables pt ON pt.object_id = fkc.parent_object_id
            JOIN sys.columns pc
                ON pc.object_id = fkc.parent_object_id AND pc.column_id = fkc.parent_column_id
            JOIN sys.tables rt ON rt.object_id = fkc.referenced_object_id
            JOIN sys.columns rc
                ON rc.object_id = fkc.referenced_object_id AND rc.column_id = fkc.referenced_column_id
            WHERE SCHEMA_NAME(pt.schema_id) = @P1 AND pt.name = @P2
            ORDER BY fk.name, fkc.constraint_column_id
            "#;

        pub const LIST_SCHEMAS: &str = r#"
            SELECT name FROM sys.schemas
            WHERE name NOT IN ('guest', 'sys', 'INFORMATION_SCHEMA')
            AND name NOT LIKE 'db[_]%'
            ORDER BY name
            "#;
    }
}

// =============================================================================
// Dialect-Specific Implementations
// =============================================================================

mod postgres {
    use super::*;
    use sqlx::{PgPool, Row};

    pub async fn list_tables(pool: &PgPool, schema: &str) -> DbResult<Vec<String>> {
        let rows = sqlx::query(queries::postgres::LIST_TABLES)
            .bind(schema)
            .fetch_all(pool)
            .await?;
        Ok(rows.iter().map(|row| row.get("table_name")).collect())
    }

    pub async fn table_exists(pool: &PgPool, table: &str, schema: &str) -> DbResult<bool> {
        let count: i64 = sqlx::query_scalar(queries::postgres::TABLE_EXISTS)
            .bind(schema)
            .bind(table)
            .fetch_one(pool)
            .await?;
        Ok(count > 0)
    }

    pub async fn list_columns(
        pool: &PgPool,
        dialect: Dialect,
        table: &str,
        schema: &str,
    ) -> DbResult<Vec<ColumnDefinition>> {
        let query = match dialect {
            Dialect::CockroachDB => queries::postgres::LIST_COLUMNS_COCKROACH,
            _ => queries::postgres::LIST_COLUMNS,
        };
        let rows = sqlx::query(query)
            .bind(schema)
            .bind(table)
            .fetch_all(pool)
            .await?;

        rows.iter()
            .map(|row| {
                let name: String = row.try_get("column_name")?;
                let data_type: String = row.try_get("data_type")?;
                let max_length: Option<i64> = row.try_get("max_length")?;
                let nullable: String = row.try_get("is_nullable")?;
                let default_value: Option<String> = row.try_get("column_default")?;
                let position: i64 = row.try_get("ordinal_position")?;

                let mut col = ColumnDefinition::new(
                    name,
                    sized_type(&data_type, max_length),
                    nullable == "YES",
                )
                .with_ordinal(position as u32);
                if let Some(def) = default_value {
                    col = col.with_default(def);
                }
                Ok(col)
            })
            .collect()
    }

    pub async fn primary_key(pool: &PgPool, table: &str, schema: &str) -> DbResult<Vec<String>> {
        let rows = sqlx::query(queries::postgres::PRIMARY_KEY)
            .bind(schema)
            .bind(table)
            .fetch_all(pool)
            .await?;
        Ok(rows.iter().map(|row| row.get("column_name")).collect())
    }

    pub async fn foreign_keys(
        pool: &PgPool,
        table: &str,
        schema: &str,
    ) -> DbResult<Vec<ForeignKeyRow>> {
        let rows = sqlx::query(queries::postgres::FOREIGN_KEYS)
            .bind(schema)
            .bind(table)
            .fetch_all(pool)
            .await?;

        rows.iter()
            .map(|row| {
                let name: String = row.try_get("constraint_name")?;
                Ok(ForeignKeyRow {
                    group: name.clone(),
                    name: Some(name),
                    column: row.try_get("column_name")?,
                    references_schema: row.try_get("foreign_table_schema")?,
                    references_table: row.try_get("foreign_table_name")?,
                    references_column: row.try_get("foreign_column_name")?,
                    on_delete: row.try_get("delete_rule")?,
                    on_update: row.try_get("update_rule")?,
                })
            })
            .collect()
    }

    pub async fn list_schemas(pool: &PgPool) -> DbResult<Vec<String>> {
        let rows = sqlx::query(queries::postgres::LIST_SCHEMAS)
            .fetch_all(pool)
            .await?;
        Ok(rows.iter().map(|row| row.get("schema_name")).collect())
    }
}

mod mysql {
    use super::*;
    use sqlx::mysql::MySqlRow;
    use sqlx::{MySqlPool, Row};

    /// Try to get a u64 value from a row, handling MySQL version differences.
    /// MySQL 5.x may return BIGINT (i64), MySQL 8.x returns unsigned types.
    fn try_get_u64(row: &MySqlRow, column: &str) -> Option<u64> {
        if let Ok(Some(v)) = row.try_get::<Option<u64>, _>(column) {
            return Some(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<u32>, _>(column) {
            return Some(v as u64);
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(column) {
            return Some(v as u64);
        }
        None
    }

    /// Safely get a string from a MySQL row.
    /// MySQL may return VARBINARY instead of VARCHAR depending on charset configuration.
    fn get_string(row: &MySqlRow, column: &str) -> String {
        get_optional_string(row, column).unwrap_or_default()
    }

    /// Safely get an optional string from a MySQL row.
    fn get_optional_string(row: &MySqlRow, column: &str) -> Option<String> {
        row.try_get::<Option<String>, _>(column)
            .ok()
            .flatten()
            .or_else(|| {
                row.try_get::<Option<Vec<u8>>, _>(column)
                    .ok()
                    .flatten()
                    .and_then(|bytes| String::from_utf8(bytes).ok())
            })
    }

    pub async fn list_tables(pool: &MySqlPool, schema: Option<&str>) -> DbResult<Vec<String>> {
        let rows = sqlx::query(queries::mysql::LIST_TABLES)
            .bind(schema)
            .fetch_all(pool)
            .await?;
        Ok(rows.iter().map(|row| get_string(row, "TABLE_NAME")).collect())
    }

    pub async fn table_exists(pool: &MySqlPool, table: &str, schema: Option<&str>) -> DbResult<bool> {
        let row = sqlx::query(queries::mysql::TABLE_EXISTS)
            .bind(schema)
            .bind(table)
            .fetch_one(pool)
            .await?;
        Ok(try_get_u64(&row, "TABLE_COUNT").unwrap_or(0) > 0)
    }

    pub async fn list_columns(
        pool: &MySqlPool,
        table: &str,
        schema: Option<&str>,
    ) -> DbResult<Vec<ColumnDefinition>> {
        let rows = sqlx::query(queries::mysql::LIST_COLUMNS)
            .bind(schema)
            .bind(table)
            .fetch_all(pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let nullable = get_string(row, "IS_NULLABLE");
                let mut col = ColumnDefinition::new(
                    get_string(row, "COLUMN_NAME"),
                    get_string(row, "COLUMN_TYPE"),
                    nullable == "YES",
                )
                .with_ordinal(try_get_u64(row, "ORDINAL_POSITION").unwrap_or(0) as u32);
                if let Some(def) = get_optional_string(row, "COLUMN_DEFAULT") {
                    col = col.with_default(def);
                }
                col
            })
            .collect())
    }

    pub async fn primary_key(
        pool: &MySqlPool,
        table: &str,
        schema: Option<&str>,
    ) -> DbResult<Vec<String>> {
        let rows = sqlx::query(queries::mysql::PRIMARY_KEY)
            .bind(schema)
            .bind(table)
            .fetch_all(pool)
            .await?;
        Ok(rows.iter().map(|row| get_string(row, "COLUMN_NAME")).collect())
    }

    pub async fn foreign_keys(
        pool: &MySqlPool,
        table: &str,
        schema: Option<&str>,
    ) -> DbResult<Vec<ForeignKeyRow>> {
        let rows = sqlx::query(queries::mysql::FOREIGN_KEYS)
            .bind(schema)
            .bind(table)
            .fetch_all(pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let name = get_string(row, "CONSTRAINT_NAME");
                ForeignKeyRow {
                    group: name.clone(),
                    name: Some(name),
                    column: get_string(row, "COLUMN_NAME"),
                    references_schema: get_optional_string(row, "REFERENCED_TABLE_SCHEMA"),
                    references_table: get_string(row, "REFERENCED_TABLE_NAME"),
                    references_column: get_string(row, "REFERENCED_COLUMN_NAME"),
                    on_delete: get_string(row, "DELETE_RULE"),
                    on_update: get_string(row, "UPDATE_RULE"),
                }
            })
            .collect())
    }

    pub async fn list_schemas(pool: &MySqlPool) -> DbResult<Vec<String>> {
        let rows = sqlx::query(queries::mysql::LIST_SCHEMAS)
            .fetch_all(pool)
            .await?;
        Ok(rows.iter().map(|row| get_string(row, "SCHEMA_NAME")).collect())
    }
}

mod sqlite {
    use super::*;
    use sqlx::{Row, SqlitePool};

    fn quoted(schema: &str) -> String {
        dialect::quote_ident(Dialect::SQLite, schema)
    }

    pub async fn list_tables(pool: &SqlitePool, schema: &str) -> DbResult<Vec<String>> {
        let rows = sqlx::query(&queries::sqlite::list_tables(&quoted(schema)))
            .fetch_all(pool)
            .await?;
        Ok(rows.iter().map(|row| row.get("name")).collect())
    }

    pub async fn table_exists(pool: &SqlitePool, table: &str, schema: &str) -> DbResult<bool> {
        let count: i64 = sqlx::query_scalar(&queries::sqlite::table_exists(&quoted(schema)))
            .bind(table)
            .fetch_one(pool)
            .await?;
        Ok(count > 0)
    }

    pub async fn list_columns(
        pool: &SqlitePool,
        table: &str,
        schema: &str,
    ) -> DbResult<Vec<ColumnDefinition>> {
        let rows = sqlx::query(queries::sqlite::LIST_COLUMNS)
            .bind(table)
            .bind(schema)
            .fetch_all(pool)
            .await?;

        rows.iter()
            .map(|row| {
                let cid: i64 = row.try_get("cid")?;
                let name: String = row.try_get("name")?;
                let data_type: String = row.try_get("type")?;
                let notnull: i64 = row.try_get("notnull")?;
                let default_value: Option<String> = row.try_get("dflt_value")?;
                let pk: i64 = row.try_get("pk")?;

                let mut col = ColumnDefinition::new(name, data_type.to_lowercase(), notnull == 0)
                    .with_primary_key(pk > 0)
                    .with_ordinal(cid as u32 + 1);
                if let Some(def) = default_value {
                    col = col.with_default(def);
                }
                Ok(col)
            })
            .collect()
    }

    pub async fn primary_key(pool: &SqlitePool, table: &str, schema: &str) -> DbResult<Vec<String>> {
        let rows = sqlx::query(queries::sqlite::PRIMARY_KEY)
            .bind(table)
            .bind(schema)
            .fetch_all(pool)
            .await?;
        Ok(rows.iter().map(|row| row.get("name")).collect())
    }

    pub async fn foreign_keys(
        pool: &SqlitePool,
        table: &str,
        schema: &str,
    ) -> DbResult<Vec<ForeignKeyRow>> {
        let rows = sqlx::query(queries::sqlite::FOREIGN_KEYS)
            .bind(table)
            .bind(schema)
            .fetch_all(pool)
            .await?;

        let mut keys = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: i64 = row.try_get("id")?;
            let seq: i64 = row.try_get("seq")?;
            let references_table: String = row.try_get("table")?;
            let to: Option<String> = row.try_get("to")?;

            // `REFERENCES t` without columns targets t's primary key
            let references_column = match to {
                Some(column) => column,
                None => primary_key(pool, &references_table, schema)
                    .await?
                    .into_iter()
                    .nth(seq as usize)
                    .unwrap_or_default(),
            };

            keys.push(ForeignKeyRow {
                group: id.to_string(),
                name: None,
                column: row.try_get("from")?,
                references_schema: None,
                references_table,
                references_column,
                on_delete: row.try_get("on_delete")?,
                on_update: row.try_get("on_update")?,
            });
        }
        Ok(keys)
    }

    pub async fn list_schemas(pool: &SqlitePool) -> DbResult<Vec<String>> {
        let rows = sqlx::query(queries::sqlite::LIST_SCHEMAS)
            .fetch_all(pool)
            .await?;
        Ok(rows.iter().map(|row| row.get("name")).collect())
    }
}

mod mssql {
    use super::*;
    use crate::db::pool::MssqlPool;
    use crate::models::QueryParam;

    fn params(schema: &str, table: &str) -> [QueryParam; 2] {
        [
            QueryParam::String(schema.to_string()),
            QueryParam::String(table.to_string()),
        ]
    }

    fn get_string(row: &tiberius::Row, column: &str) -> String {
        get_optional_string(row, column).unwrap_or_default()
    }

    fn get_optional_string(row: &tiberius::Row, column: &str) -> Option<String> {
        row.try_get::<&str, _>(column).ok().flatten().map(String::from)
    }

    pub async fn list_tables(pool: &MssqlPool, schema: &str) -> DbResult<Vec<String>> {
        let rows = mssql_query(
            pool,
            queries::mssql::LIST_TABLES,
            &[QueryParam::String(schema.to_string())],
        )
        .await?;
        Ok(rows.iter().map(|row| get_string(row, "TABLE_NAME")).collect())
    }

    pub async fn table_exists(pool: &MssqlPool, table: &str, schema: &str) -> DbResult<bool> {
        let rows = mssql_query(pool, queries::mssql::TABLE_EXISTS, &params(schema, table)).await?;
        let count = rows
            .first()
            .and_then(|row| row.try_get::<i32, _>("TABLE_COUNT").ok().flatten())
            .unwrap_or(0);
        Ok(count > 0)
    }

    pub async fn list_columns(
        pool: &MssqlPool,
        table: &str,
        schema: &str,
    ) -> DbResult<Vec<ColumnDefinition>> {
        let rows = mssql_query(pool, queries::mssql::LIST_COLUMNS, &params(schema, table)).await?;

        Ok(rows
            .iter()
            .map(|row| {
                let max_length = row
                    .try_get::<i32, _>("CHARACTER_MAXIMUM_LENGTH")
                    .ok()
                    .flatten()
                    .map(i64::from);
                let position = row
                    .try_get::<i32, _>("ORDINAL_POSITION")
                    .ok()
                    .flatten()
                    .unwrap_or(0);
                let mut col = ColumnDefinition::new(
                    get_string(row, "COLUMN_NAME"),
                    sized_type(&get_string(row, "DATA_TYPE"), max_length),
                    get_string(row, "IS_NULLABLE") == "YES",
                )
                .with_ordinal(position as u32);
                if let Some(def) = get_optional_string(row, "COLUMN_DEFAULT") {
                    col = col.with_default(def);
                }
                col
            })
            .collect())
    }

    pub async fn primary_key(pool: &MssqlPool, table: &str, schema: &str) -> DbResult<Vec<String>> {
        let rows = mssql_query(pool, queries::mssql::PRIMARY_KEY, &params(schema, table)).await?;
        Ok(rows.iter().map(|row| get_string(row, "COLUMN_NAME")).collect())
    }

    pub async fn foreign_keys(
        pool: &MssqlPool,
        table: &str,
        schema: &str,
    ) -> DbResult<Vec<ForeignKeyRow>> {
        let rows = mssql_query(pool, queries::mssql::FOREIGN_KEYS, &params(schema, table)).await?;

        Ok(rows
            .iter()
            .map(|row| {
                let name = get_string(row, "constraint_name");
                ForeignKeyRow {
                    group: name.clone(),
                    name: Some(name),
                    column: get_string(row, "column_name"),
                    references_schema: get_optional_string(row, "foreign_table_schema"),
                    references_table: get_string(row, "foreign_table_name"),
                    references_column: get_string(row, "foreign_column_name"),
                    on_delete: get_string(row, "delete_rule"),
                    on_update: get_string(row, "update_rule"),
                }
            })
            .collect())
    }

    pub async fn list_schemas(pool: &MssqlPool) -> DbResult<Vec<String>> {
        let rows = mssql_query(pool, queries::mssql::LIST_SCHEMAS, &[]).await?;
        Ok(rows.iter().map(|row| get_string(row, "name")).collect())
    }
}
