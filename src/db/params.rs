//! Parameter binding utilities for database queries.
//!
//! This module binds `QueryParam` values to database-specific query objects.
//! Filters and fixture inserts both go through here, so user values never
//! reach the SQL text.

use crate::models::QueryParam;
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::sqlite::SqliteArguments;
use sqlx::{MySql, Postgres, Sqlite};
use std::borrow::Cow;
use tiberius::ColumnData;

/// Bind a parameter to a MySQL query.
pub(crate) fn bind_mysql_param<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Bytes(v) => query.bind(v.as_slice()),
    }
}

/// Bind a parameter to a PostgreSQL query.
pub(crate) fn bind_postgres_param<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Bytes(v) => query.bind(v.as_slice()),
    }
}

/// Bind a parameter to a PostgreSQL scalar query.
pub(crate) fn bind_postgres_scalar<'q, O>(
    query: sqlx::query::QueryScalar<'q, Postgres, O, PgArguments>,
    param: &'q QueryParam,
) -> sqlx::query::QueryScalar<'q, Postgres, O, PgArguments> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Bytes(v) => query.bind(v.as_slice()),
    }
}

/// Bind a parameter to a MySQL scalar query.
pub(crate) fn bind_mysql_scalar<'q, O>(
    query: sqlx::query::QueryScalar<'q, MySql, O, MySqlArguments>,
    param: &'q QueryParam,
) -> sqlx::query::QueryScalar<'q, MySql, O, MySqlArguments> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Bytes(v) => query.bind(v.as_slice()),
    }
}

/// Bind a parameter to a SQLite query.
pub(crate) fn bind_sqlite_param<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Bytes(v) => query.bind(v.as_slice()),
    }
}

/// Bind a parameter to a SQLite scalar query.
pub(crate) fn bind_sqlite_scalar<'q, O>(
    query: sqlx::query::QueryScalar<'q, Sqlite, O, SqliteArguments<'q>>,
    param: &'q QueryParam,
) -> sqlx::query::QueryScalar<'q, Sqlite, O, SqliteArguments<'q>> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Bytes(v) => query.bind(v.as_slice()),
    }
}

impl tiberius::ToSql for QueryParam {
    fn to_sql(&self) -> ColumnData<'_> {
        match self {
            QueryParam::Null => ColumnData::I32(None),
            QueryParam::Bool(v) => ColumnData::Bit(Some(*v)),
            QueryParam::Int(v) => ColumnData::I64(Some(*v)),
            QueryParam::Float(v) => ColumnData::F64(Some(*v)),
            QueryParam::String(v) => ColumnData::String(Some(Cow::Borrowed(v.as_str()))),
            QueryParam::Bytes(v) => ColumnData::Binary(Some(Cow::Borrowed(v.as_slice()))),
        }
    }
}

/// Borrow parameters as tiberius trait objects.
pub(crate) fn mssql_params(params: &[QueryParam]) -> Vec<&dyn tiberius::ToSql> {
    params.iter().map(|p| p as &dyn tiberius::ToSql).collect()
}
