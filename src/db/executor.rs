//! Query execution engine.
//!
//! This module provides the paginated read path plus the small write path the
//! fixture needs:
//! - `select_top`: filter, sort, skip, take, with an unpaginated match count
//! - `execute`: a statement returning rows affected
//! - `insert_row`: a single-row insert returning the generated id
//!
//! # Architecture
//!
//! SQL text is rendered once per call from the `Dialect` (quoting, placeholders,
//! pagination) and then handed to database-specific submodules:
//! - `mysql`: MySQL and MariaDB
//! - `postgres`: PostgreSQL and CockroachDB
//! - `sqlite`: SQLite
//! - `mssql`: SQL Server over tiberius
//!
//! Each submodule provides identical functionality adapted to the driver.
//! User values only ever travel as bound parameters.

use crate::db::dialect::{self, placeholder, quote_ident};
use crate::db::params::{
    bind_mysql_param, bind_mysql_scalar, bind_postgres_param, bind_postgres_scalar,
    bind_sqlite_param, bind_sqlite_scalar, mssql_params,
};
use crate::db::pool::{DbPool, MssqlPool};
use crate::db::schema::{SchemaInspector, resolve_schema};
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::{
    Dialect, Filter, FilterOperator, QueryParam, SelectTopResult, SortSpec,
};
use crate::db::deadline::{Deadline, with_timeout};
use futures_util::future::try_join;
use tracing::debug;

type JsonRow = serde_json::Map<String, serde_json::Value>;

/// A paginated select against one table.
#[derive(Debug, Clone, Copy)]
pub struct SelectTopRequest<'a> {
    pub table: &'a str,
    pub schema: Option<&'a str>,
    pub offset: u64,
    pub limit: u64,
    pub sort: &'a [SortSpec],
    pub filters: &'a [Filter],
}

impl<'a> SelectTopRequest<'a> {
    pub fn new(table: &'a str) -> Self {
        Self {
            table,
            schema: None,
            offset: 0,
            limit: u64::MAX,
            sort: &[],
            filters: &[],
        }
    }
}

/// Query executor bound to one dialect and the deadline of one operation.
#[derive(Debug, Clone, Copy)]
pub struct QueryExecutor {
    dialect: Dialect,
    deadline: Deadline,
}

impl QueryExecutor {
    pub fn new(dialect: Dialect, deadline: Deadline) -> Self {
        Self { dialect, deadline }
    }

    /// Run a paginated select and count the matching rows.
    ///
    /// The table and every sort/filter column are checked against the catalog
    /// first, so a bad reference fails as a query error before any SQL runs.
    pub async fn select_top(
        &self,
        pool: &DbPool,
        request: &SelectTopRequest<'_>,
    ) -> DbResult<SelectTopResult> {
        let columns = SchemaInspector::list_columns(
            pool,
            self.dialect,
            request.table,
            request.schema,
            self.deadline,
        )
        .await?;
        let known: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();

        for spec in request.sort {
            if !known.contains(&spec.column()) {
                return Err(DbError::query(
                    format!("Unknown sort column '{}' on '{}'", spec.column(), request.table),
                    spec.column(),
                ));
            }
        }
        for filter in request.filters {
            if !known.contains(&filter.column.as_str()) {
                return Err(DbError::query(
                    format!("Unknown filter column '{}' on '{}'", filter.column, request.table),
                    filter.column.as_str(),
                ));
            }
        }

        let table = dialect::qualified_table(
            self.dialect,
            resolve_schema(self.dialect, request.schema),
            request.table,
        );
        let (where_clause, params) = build_where(self.dialect, request.filters);
        let count_sql = count_query(self.dialect, &table, &where_clause);
        // No row sits past MAX_ROW_INDEX, and engines reject larger literals
        let page_sql = (request.limit > 0 && request.offset <= MAX_ROW_INDEX).then(|| {
            format!(
                "SELECT * FROM {}{}{}{}",
                table,
                where_clause,
                dialect::order_by(self.dialect, request.sort),
                dialect::paginate(self.dialect, request.offset, clamp_limit(request.limit)),
            )
        });

        debug!(
            dialect = %self.dialect,
            table = %request.table,
            sql = ?page_sql,
            params = params.len(),
            "Executing select_top"
        );

        let (total, rows) = with_timeout("select_top", self.deadline, async {
            try_join(
                self.count(pool, &count_sql, &params),
                self.fetch_page(pool, page_sql.as_deref(), &params),
            )
            .await
        })
        .await?;

        debug!(
            table = %request.table,
            total_records = total,
            returned = rows.len(),
            "select_top finished"
        );
        Ok(SelectTopResult {
            result: rows,
            total_records: total.max(0) as u64,
        })
    }

    /// Execute a statement and return the number of affected rows.
    pub async fn execute(&self, pool: &DbPool, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        debug!(dialect = %self.dialect, sql = %sql, params = params.len(), "Executing statement");
        with_timeout("execute", self.deadline, async {
            match pool {
                DbPool::Postgres(p) => postgres::execute(p, sql, params).await,
                DbPool::MySql(p) => mysql::execute(p, sql, params).await,
                DbPool::SQLite(p) => sqlite::execute(p, sql, params).await,
                DbPool::SqlServer(p) => mssql::execute(p, sql, params).await,
            }
        })
        .await
    }

    /// Insert one row, returning the generated key when `returning` names one.
    pub async fn insert_row(
        &self,
        pool: &DbPool,
        table: &str,
        values: &[(String, QueryParam)],
        returning: Option<&str>,
        schema: Option<&str>,
    ) -> DbResult<Option<i64>> {
        let table_ref =
            dialect::qualified_table(self.dialect, resolve_schema(self.dialect, schema), table);
        let sql = insert_sql(self.dialect, &table_ref, values, returning);
        let params: Vec<QueryParam> = values.iter().map(|(_, v)| v.clone()).collect();
        debug!(dialect = %self.dialect, table = %table, sql = %sql, "Inserting row");

        with_timeout("insert_row", self.deadline, async {
            match pool {
                DbPool::Postgres(p) => match returning {
                    Some(_) => postgres::fetch_id(p, &sql, &params).await.map(Some),
                    None => postgres::execute(p, &sql, &params).await.map(|_| None),
                },
                DbPool::MySql(p) => {
                    let id = mysql::insert(p, &sql, &params).await?;
                    Ok(returning.map(|_| id as i64))
                }
                DbPool::SQLite(p) => {
                    let id = sqlite::insert(p, &sql, &params).await?;
                    Ok(returning.map(|_| id))
                }
                DbPool::SqlServer(p) => match returning {
                    Some(_) => mssql::fetch_id(p, &sql, &params).await.map(Some),
                    None => mssql::execute(p, &sql, &params).await.map(|_| None),
                },
            }
        })
        .await
    }

    async fn count(&self, pool: &DbPool, sql: &str, params: &[QueryParam]) -> DbResult<i64> {
        match pool {
            DbPool::Postgres(p) => postgres::count(p, sql, params).await,
            DbPool::MySql(p) => mysql::count(p, sql, params).await,
            DbPool::SQLite(p) => sqlite::count(p, sql, params).await,
            DbPool::SqlServer(p) => mssql::count(p, sql, params).await,
        }
    }

    async fn fetch_page(
        &self,
        pool: &DbPool,
        sql: Option<&str>,
        params: &[QueryParam],
    ) -> DbResult<Vec<JsonRow>> {
        let Some(sql) = sql else {
            return Ok(Vec::new());
        };
        match pool {
            DbPool::Postgres(p) => postgres::fetch_rows(p, sql, params).await,
            DbPool::MySql(p) => mysql::fetch_rows(p, sql, params).await,
            DbPool::SQLite(p) => sqlite::fetch_rows(p, sql, params).await,
            DbPool::SqlServer(p) => mssql::fetch_rows(p, sql, params).await,
        }
    }
}

// =============================================================================
// Common Helper Functions
// =============================================================================

/// Run a parameterized statement on a pooled SQL Server client and collect
/// its first result set.
pub(crate) async fn mssql_query(
    pool: &MssqlPool,
    sql: &str,
    params: &[QueryParam],
) -> DbResult<Vec<tiberius::Row>> {
    let mut conn = pool.get().await?;
    let refs = mssql_params(params);
    let stream = conn.query(sql, &refs).await?;
    Ok(stream.into_first_result().await?)
}

/// Render an AND-ed `WHERE` clause and its parameters.
///
/// Equality against null is rewritten to `IS NULL`, since `= NULL` never matches.
fn build_where(dialect: Dialect, filters: &[Filter]) -> (String, Vec<QueryParam>) {
    if filters.is_empty() {
        return (String::new(), Vec::new());
    }

    let mut params = Vec::new();
    let predicates: Vec<String> = filters
        .iter()
        .map(|filter| {
            let column = quote_ident(dialect, &filter.column);
            let operator = match (filter.operator, filter.value.is_null()) {
                (FilterOperator::Eq, true) => FilterOperator::IsNull,
                (FilterOperator::Neq, true) => FilterOperator::IsNotNull,
                (op, _) => op,
            };
            if operator.takes_value() {
                params.push(filter.value.clone());
                format!(
                    "{} {} {}",
                    column,
                    operator.as_sql(),
                    placeholder(dialect, params.len())
                )
            } else {
                format!("{} {}", column, operator.as_sql())
            }
        })
        .collect();

    (format!(" WHERE {}", predicates.join(" AND ")), params)
}

fn count_query(dialect: Dialect, table: &str, where_clause: &str) -> String {
    let count = match dialect {
        Dialect::SqlServer => "COUNT_BIG(*)",
        _ => "COUNT(*)",
    };
    format!("SELECT {} FROM {}{}", count, table, where_clause)
}

/// Keep limits inside what every engine accepts as a row count.
/// Largest row count or offset every engine accepts as a literal.
const MAX_ROW_INDEX: u64 = i64::MAX as u64;

fn clamp_limit(limit: u64) -> u64 {
    limit.min(MAX_ROW_INDEX)
}

fn insert_sql(
    dialect: Dialect,
    table: &str,
    values: &[(String, QueryParam)],
    returning: Option<&str>,
) -> String {
    let columns: Vec<String> = values
        .iter()
        .map(|(column, _)| quote_ident(dialect, column))
        .collect();
    let placeholders: Vec<String> = (1..=values.len())
        .map(|idx| placeholder(dialect, idx))
        .collect();

    let body = if values.is_empty() {
        match dialect {
            Dialect::MySQL | Dialect::MariaDB => "() VALUES ()".to_string(),
            _ => "DEFAULT VALUES".to_string(),
        }
    } else {
        format!("({}) VALUES ({})", columns.join(", "), placeholders.join(", "))
    };

    match (dialect, returning) {
        (Dialect::PostgreSQL | Dialect::CockroachDB, Some(column)) => format!(
            "INSERT INTO {} {} RETURNING CAST({} AS BIGINT)",
            table,
            body,
            quote_ident(dialect, column)
        ),
        (Dialect::SqlServer, Some(column)) => {
            let output = format!(
                "OUTPUT CAST(INSERTED.{} AS BIGINT) AS inserted_id",
                quote_ident(dialect, column)
            );
            if values.is_empty() {
                format!("INSERT INTO {} {} DEFAULT VALUES", table, output)
            } else {
                format!(
                    "INSERT INTO {} ({}) {} VALUES ({})",
                    table,
                    columns.join(", "),
                    output,
                    placeholders.join(", ")
                )
            }
        }
        _ => format!("INSERT INTO {} {}", table, body),
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Each module below provides the same interface adapted to its driver.

mod postgres {
    use super::*;
    use sqlx::PgPool;

    pub async fn count(pool: &PgPool, sql: &str, params: &[QueryParam]) -> DbResult<i64> {
        let mut query = sqlx::query_scalar::<_, i64>(sql);
        for param in params {
            query = bind_postgres_scalar(query, param);
        }
        Ok(query.fetch_one(pool).await?)
    }

    pub async fn fetch_rows(pool: &PgPool, sql: &str, params: &[QueryParam]) -> DbResult<Vec<JsonRow>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_postgres_param(query, param);
        }
        let rows = query.fetch_all(pool).await?;
        Ok(rows.iter().map(RowToJson::to_json_map).collect())
    }

    pub async fn execute(pool: &PgPool, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        // Unparameterized statements go through the simple protocol so DDL
        // batches are accepted
        let result = if params.is_empty() {
            use sqlx::Executor;
            pool.execute(sql).await?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_postgres_param(query, param);
            }
            query.execute(pool).await?
        };
        Ok(result.rows_affected())
    }

    pub async fn fetch_id(pool: &PgPool, sql: &str, params: &[QueryParam]) -> DbResult<i64> {
        let mut query = sqlx::query_scalar::<_, i64>(sql);
        for param in params {
            query = bind_postgres_scalar(query, param);
        }
        Ok(query.fetch_one(pool).await?)
    }
}

mod mysql {
    use super::*;
    use sqlx::MySqlPool;

    pub async fn count(pool: &MySqlPool, sql: &str, params: &[QueryParam]) -> DbResult<i64> {
        let mut query = sqlx::query_scalar::<_, i64>(sql);
        for param in params {
            query = bind_mysql_scalar(query, param);
        }
        Ok(query.fetch_one(pool).await?)
    }

    pub async fn fetch_rows(
        pool: &MySqlPool,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Vec<JsonRow>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_mysql_param(query, param);
        }
        let rows = query.fetch_all(pool).await?;
        Ok(rows.iter().map(RowToJson::to_json_map).collect())
    }

    pub async fn execute(pool: &MySqlPool, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        // Some statements (CREATE PROCEDURE, some DDL) can't be prepared
        let result = if params.is_empty() {
            use sqlx::Executor;
            pool.execute(sql).await?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_mysql_param(query, param);
            }
            query.execute(pool).await?
        };
        Ok(result.rows_affected())
    }

    pub async fn insert(pool: &MySqlPool, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_mysql_param(query, param);
        }
        Ok(query.execute(pool).await?.last_insert_id())
    }
}

mod sqlite {
    use super::*;
    use sqlx::SqlitePool;

    pub async fn count(pool: &SqlitePool, sql: &str, params: &[QueryParam]) -> DbResult<i64> {
        let mut query = sqlx::query_scalar::<_, i64>(sql);
        for param in params {
            query = bind_sqlite_scalar(query, param);
        }
        Ok(query.fetch_one(pool).await?)
    }

    pub async fn fetch_rows(
        pool: &SqlitePool,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Vec<JsonRow>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_sqlite_param(query, param);
        }
        let rows = query.fetch_all(pool).await?;
        Ok(rows.iter().map(RowToJson::to_json_map).collect())
    }

    pub async fn execute(pool: &SqlitePool, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        let result = if params.is_empty() {
            use sqlx::Executor;
            pool.execute(sql).await?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_sqlite_param(query, param);
            }
            query.execute(pool).await?
        };
        Ok(result.rows_affected())
    }

    pub async fn insert(pool: &SqlitePool, sql: &str, params: &[QueryParam]) -> DbResult<i64> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_sqlite_param(query, param);
        }
        Ok(query.execute(pool).await?.last_insert_rowid())
    }
}

mod mssql {
    use super::*;

    pub async fn count(pool: &MssqlPool, sql: &str, params: &[QueryParam]) -> DbResult<i64> {
        let rows = mssql_query(pool, sql, params).await?;
        rows.first()
            .and_then(|row| row.try_get::<i64, _>(0).ok().flatten())
            .ok_or_else(|| DbError::internal("COUNT_BIG returned no value"))
    }

    pub async fn fetch_rows(
        pool: &MssqlPool,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Vec<JsonRow>> {
        let rows = mssql_query(pool, sql, params).await?;
        Ok(rows.iter().map(RowToJson::to_json_map).collect())
    }

    pub async fn execute(pool: &MssqlPool, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        let mut conn = pool.get().await?;
        let refs = mssql_params(params);
        let result = conn.execute(sql, &refs).await?;
        Ok(result.total())
    }

    pub async fn fetch_id(pool: &MssqlPool, sql: &str, params: &[QueryParam]) -> DbResult<i64> {
        let rows = mssql_query(pool, sql, params).await?;
        rows.first()
            .and_then(|row| row.try_get::<i64, _>("inserted_id").ok().flatten())
            .ok_or_else(|| DbError::internal("INSERT ... OUTPUT returned no id"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_where_empty() {
        let (clause, params) = build_where(Dialect::PostgreSQL, &[]);
        assert!(clause.is_empty());
        assert!(params.is_empty());
    }

    #[test]
    fn test_build_where_numbers_placeholders() {
        let filters = vec![
            Filter::eq("select", "bar"),
            Filter::new("id", FilterOperator::Gt, 3i64),
            Filter::new("email", FilterOperator::IsNotNull, QueryParam::Null),
        ];
        let (clause, params) = build_where(Dialect::PostgreSQL, &filters);
        assert_eq!(
            clause,
            " WHERE \"select\" = $1 AND \"id\" > $2 AND \"email\" IS NOT NULL"
        );
        assert_eq!(params, vec![QueryParam::from("bar"), QueryParam::Int(3)]);

        let (clause, _) = build_where(Dialect::SqlServer, &filters);
        assert_eq!(
            clause,
            " WHERE [select] = @P1 AND [id] > @P2 AND [email] IS NOT NULL"
        );
    }

    #[test]
    fn test_build_where_null_equality() {
        let filters = vec![Filter::eq("lastname", QueryParam::Null)];
        let (clause, params) = build_where(Dialect::MySQL, &filters);
        assert_eq!(clause, " WHERE `lastname` IS NULL");
        assert!(params.is_empty());
    }

    #[test]
    fn test_count_query() {
        assert_eq!(
            count_query(Dialect::SQLite, "\"main\".\"group\"", ""),
            "SELECT COUNT(*) FROM \"main\".\"group\""
        );
        assert_eq!(
            count_query(Dialect::SqlServer, "[dbo].[group]", " WHERE [id] = @P1"),
            "SELECT COUNT_BIG(*) FROM [dbo].[group] WHERE [id] = @P1"
        );
    }

    #[test]
    fn test_insert_sql_returning() {
        let values = vec![("select".to_string(), QueryParam::from("bar"))];
        assert_eq!(
            insert_sql(Dialect::PostgreSQL, "\"public\".\"group\"", &values, Some("id")),
            "INSERT INTO \"public\".\"group\" (\"select\") VALUES ($1) RETURNING CAST(\"id\" AS BIGINT)"
        );
        assert_eq!(
            insert_sql(Dialect::SqlServer, "[dbo].[group]", &values, Some("id")),
            "INSERT INTO [dbo].[group] ([select]) OUTPUT CAST(INSERTED.[id] AS BIGINT) AS inserted_id VALUES (@P1)"
        );
        assert_eq!(
            insert_sql(Dialect::MySQL, "`group`", &values, Some("id")),
            "INSERT INTO `group` (`select`) VALUES (?)"
        );
    }

    #[test]
    fn test_insert_sql_default_values() {
        assert_eq!(
            insert_sql(Dialect::SQLite, "\"main\".\"t\"", &[], None),
            "INSERT INTO \"main\".\"t\" DEFAULT VALUES"
        );
        assert_eq!(
            insert_sql(Dialect::MariaDB, "`t`", &[], None),
            "INSERT INTO `t` () VALUES ()"
        );
    }

    #[test]
    fn test_select_top_request_defaults() {
        let request = SelectTopRequest::new("people");
        assert_eq!(request.offset, 0);
        assert!(request.sort.is_empty());
        assert!(request.filters.is_empty());
        assert_eq!(clamp_limit(request.limit), i64::MAX as u64);
    }
}
