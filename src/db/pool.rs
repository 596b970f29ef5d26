//! Connection pool management.
//!
//! This module provides connection pooling using dialect-specific pools
//! (PgPool, MySqlPool, SqlitePool, and a bb8 pool of tiberius clients for
//! SQL Server) to ensure full type support.

use crate::config::{DEFAULT_IDLE_TIMEOUT_SECS, PoolBounds, is_memory_database};
use crate::db::deadline::{Deadline, with_timeout};
use crate::db::dialect;
use crate::error::{ConnectFailure, DbError, DbResult};
use crate::models::{ConnectionConfig, Dialect};
use bb8_tiberius::ConnectionManager as MssqlConnectionManager;
use sqlx::{
    MySqlPool, PgPool, SqlitePool, mysql::MySqlConnectOptions, mysql::MySqlPoolOptions,
    postgres::PgConnectOptions, postgres::PgPoolOptions, sqlite::SqliteConnectOptions,
    sqlite::SqlitePoolOptions,
};
use std::str::FromStr;
use std::time::Duration;
use tiberius::AuthMethod;
use tracing::{debug, info};

/// Pooled SQL Server clients.
pub type MssqlPool = bb8::Pool<MssqlConnectionManager>;

/// Dialect-specific connection pool (avoids AnyPool limitations).
///
/// CockroachDB shares the Postgres variant; MariaDB shares the MySQL one.
#[derive(Clone)]
pub enum DbPool {
    Postgres(PgPool),
    MySql(MySqlPool),
    SQLite(SqlitePool),
    SqlServer(MssqlPool),
}

impl DbPool {
    /// Close the connection pool.
    ///
    /// bb8 has no explicit close; its connections are dropped with the last
    /// pool handle.
    pub async fn close(&self) {
        match self {
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::MySql(pool) => pool.close().await,
            DbPool::SQLite(pool) => pool.close().await,
            DbPool::SqlServer(_) => {}
        }
    }

    /// Name of the driver family backing this pool.
    pub fn driver_name(&self) -> &'static str {
        match self {
            DbPool::Postgres(_) => "postgres",
            DbPool::MySql(_) => "mysql",
            DbPool::SQLite(_) => "sqlite",
            DbPool::SqlServer(_) => "tiberius",
        }
    }
}

impl std::fmt::Debug for DbPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbPool::Postgres(pool) => f.debug_tuple("Postgres").field(pool).finish(),
            DbPool::MySql(pool) => f.debug_tuple("MySql").field(pool).finish(),
            DbPool::SQLite(pool) => f.debug_tuple("SQLite").field(pool).finish(),
            DbPool::SqlServer(pool) => f
                .debug_struct("SqlServer")
                .field("connections", &pool.state().connections)
                .finish(),
        }
    }
}

/// Create a connection pool and establish its first session before `deadline`.
///
/// The pool's own acquire timeout stays at the configured operation timeout;
/// it bounds each later checkout, while `deadline` bounds this setup.
pub async fn create_pool(
    config: &ConnectionConfig,
    database: &str,
    deadline: Deadline,
) -> DbResult<DbPool> {
    let dialect = config.dialect;
    let timeout = config.operation_timeout();
    let bounds = PoolBounds::new(config.pool_min, config.pool_max);
    let idle_timeout = Some(Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS));

    info!(
        dialect = %dialect,
        host = %config.host_or_default(),
        database = %database,
        pool_min = bounds.min,
        pool_max = bounds.max,
        "Creating connection pool"
    );

    match dialect {
        Dialect::PostgreSQL | Dialect::CockroachDB => {
            let mut options = PgConnectOptions::new()
                .host(config.host_or_default())
                .database(database);
            if let Some(port) = config.port_or_default() {
                options = options.port(port);
            }
            if let Some(user) = &config.user {
                options = options.username(user);
            }
            if let Some(password) = &config.password {
                options = options.password(password);
            }

            let pool = with_connect_timeout(
                dialect,
                deadline,
                PgPoolOptions::new()
                    .min_connections(bounds.min)
                    .max_connections(bounds.max)
                    .acquire_timeout(timeout)
                    .idle_timeout(idle_timeout)
                    .connect_with(options),
            )
            .await?;
            Ok(DbPool::Postgres(pool))
        }
        Dialect::MySQL | Dialect::MariaDB => {
            let mut options = MySqlConnectOptions::new()
                .host(config.host_or_default())
                .database(database)
                .charset("utf8mb4");
            if let Some(port) = config.port_or_default() {
                options = options.port(port);
            }
            if let Some(user) = &config.user {
                options = options.username(user);
            }
            if let Some(password) = &config.password {
                options = options.password(password);
            }

            let pool = with_connect_timeout(
                dialect,
                deadline,
                MySqlPoolOptions::new()
                    .min_connections(bounds.min)
                    .max_connections(bounds.max)
                    .acquire_timeout(timeout)
                    .idle_timeout(idle_timeout)
                    .connect_with(options),
            )
            .await?;
            Ok(DbPool::MySql(pool))
        }
        Dialect::SQLite => {
            let bounds = bounds.for_sqlite(database);
            let options = if is_memory_database(database) {
                SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
                    DbError::connection(
                        ConnectFailure::Other,
                        format!("Invalid SQLite options: {}", e),
                        connection_suggestion(dialect, ConnectFailure::Other),
                    )
                })?
            } else {
                SqliteConnectOptions::new()
                    .filename(database)
                    .create_if_missing(true)
            };
            let options = options.foreign_keys(true);

            let mut pool_options = SqlitePoolOptions::new()
                .min_connections(bounds.min)
                .max_connections(bounds.max)
                .acquire_timeout(timeout);
            // An in-memory database dies with its connection
            pool_options = if is_memory_database(database) {
                pool_options.idle_timeout(None).max_lifetime(None)
            } else {
                pool_options.idle_timeout(idle_timeout)
            };

            let pool =
                with_connect_timeout(dialect, deadline, pool_options.connect_with(options)).await?;
            Ok(DbPool::SQLite(pool))
        }
        Dialect::SqlServer => {
            let mut tib_config = tiberius::Config::new();
            tib_config.host(config.host_or_default());
            if let Some(port) = config.port_or_default() {
                tib_config.port(port);
            }
            tib_config.authentication(AuthMethod::sql_server(
                config.user.as_deref().unwrap_or("sa"),
                config.password.as_deref().unwrap_or(""),
            ));
            tib_config.database(database);
            tib_config.trust_cert();

            let manager = MssqlConnectionManager::new(tib_config);
            let pool = bb8::Pool::builder()
                .max_size(bounds.max)
                .min_idle(Some(bounds.min).filter(|min| *min > 0))
                .connection_timeout(timeout)
                .idle_timeout(idle_timeout)
                .retry_connection(false)
                .build(manager);
            let pool = tokio::time::timeout(deadline.remaining(), pool)
                .await
                .map_err(|_| connect_timeout_error(dialect, deadline))?
                .map_err(|e| connect_error(dialect, &e.to_string()))?;

            // bb8 builds lazily; prove the server is reachable now
            {
                let _session = tokio::time::timeout(deadline.remaining(), pool.get())
                    .await
                    .map_err(|_| connect_timeout_error(dialect, deadline))?
                    .map_err(|e| match e {
                        bb8::RunError::User(e) => connect_error(dialect, &e.to_string()),
                        bb8::RunError::TimedOut => connect_timeout_error(dialect, deadline),
                    })?;
            }
            Ok(DbPool::SqlServer(pool))
        }
    }
}

async fn with_connect_timeout<T>(
    dialect: Dialect,
    deadline: Deadline,
    fut: impl std::future::Future<Output = Result<T, sqlx::Error>>,
) -> DbResult<T> {
    match tokio::time::timeout(deadline.remaining(), fut).await {
        Ok(Ok(pool)) => Ok(pool),
        Ok(Err(e)) => Err(sqlx_connect_error(dialect, &e)),
        Err(_) => Err(connect_timeout_error(dialect, deadline)),
    }
}

fn connect_timeout_error(dialect: Dialect, deadline: Deadline) -> DbError {
    DbError::connection(
        ConnectFailure::Unreachable,
        format!("Timed out after {}ms", deadline.budget_ms()),
        connection_suggestion(dialect, ConnectFailure::Unreachable),
    )
}

/// Build a connection error from a driver message.
pub(crate) fn connect_error(dialect: Dialect, message: &str) -> DbError {
    let kind = classify_connect_message(message);
    DbError::connection(
        kind,
        format!("Failed to connect: {}", message),
        connection_suggestion(dialect, kind),
    )
}

fn sqlx_connect_error(dialect: Dialect, error: &sqlx::Error) -> DbError {
    let kind = match error {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => ConnectFailure::Unreachable,
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            // invalid_authorization_specification / invalid_password
            Some("28000") | Some("28P01") => ConnectFailure::Authentication,
            _ => classify_connect_message(db_err.message()),
        },
        other => classify_connect_message(&other.to_string()),
    };
    DbError::connection(
        kind,
        format!("Failed to connect: {}", error),
        connection_suggestion(dialect, kind),
    )
}

/// Pick a failure kind from a driver's error text.
pub fn classify_connect_message(message: &str) -> ConnectFailure {
    let lower = message.to_lowercase();

    if lower.contains("authentication")
        || lower.contains("password")
        || lower.contains("access denied")
        || lower.contains("login failed")
    {
        return ConnectFailure::Authentication;
    }

    if lower.contains("connection refused")
        || lower.contains("timed out")
        || lower.contains("failed to lookup address")
        || lower.contains("name or service not known")
        || lower.contains("no route to host")
        || lower.contains("network is unreachable")
        || lower.contains("connection reset")
    {
        return ConnectFailure::Unreachable;
    }

    ConnectFailure::Other
}

/// Generate a helpful suggestion for connection errors.
pub fn connection_suggestion(dialect: Dialect, kind: ConnectFailure) -> String {
    match kind {
        ConnectFailure::Authentication => {
            "Verify the user and password in the connection config".to_string()
        }
        ConnectFailure::Unreachable => format!(
            "Check that the {} server is running and accessible",
            dialect
        ),
        ConnectFailure::UnsupportedVersion => format!(
            "Upgrade the server to {} {} or newer, or set version_override",
            dialect,
            dialect.minimum_version()
        ),
        ConnectFailure::Other => match dialect {
            Dialect::PostgreSQL => "Verify the host, port (5432) and database name".to_string(),
            Dialect::CockroachDB => "Verify the host, port (26257) and database name".to_string(),
            Dialect::MySQL | Dialect::MariaDB => {
                "Verify the host, port (3306) and database name".to_string()
            }
            Dialect::SQLite => "Verify the file path exists and is accessible".to_string(),
            Dialect::SqlServer => {
                "Verify the host, port (1433), database name and TLS settings".to_string()
            }
        },
    }
}

/// Read the server's version banner.
pub async fn fetch_server_version(
    pool: &DbPool,
    dialect: Dialect,
    deadline: Deadline,
) -> DbResult<String> {
    let sql = dialect::version_query(dialect);
    let fut = async {
        let version = match pool {
            DbPool::Postgres(pool) => sqlx::query_scalar::<_, String>(sql).fetch_one(pool).await?,
            DbPool::MySql(pool) => sqlx::query_scalar::<_, String>(sql).fetch_one(pool).await?,
            DbPool::SQLite(pool) => sqlx::query_scalar::<_, String>(sql).fetch_one(pool).await?,
            DbPool::SqlServer(pool) => {
                let mut conn = pool.get().await?;
                let row = conn.simple_query(sql).await?.into_row().await?;
                row.and_then(|r| r.get::<&str, _>(0).map(String::from))
                    .ok_or_else(|| DbError::internal("SQL Server returned no version"))?
            }
        };
        Ok::<_, DbError>(version)
    };

    let version = with_timeout("server version", deadline, fut).await?;
    debug!(dialect = %dialect, version = %version, "Got server version");
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_authentication() {
        assert_eq!(
            classify_connect_message("password authentication failed for user \"app\""),
            ConnectFailure::Authentication
        );
        assert_eq!(
            classify_connect_message("Access denied for user 'root'@'172.17.0.1'"),
            ConnectFailure::Authentication
        );
        assert_eq!(
            classify_connect_message("Token error: 'Login failed for user 'sa'.' code=18456"),
            ConnectFailure::Authentication
        );
    }

    #[test]
    fn test_classify_unreachable() {
        assert_eq!(
            classify_connect_message("error communicating with database: Connection refused (os error 111)"),
            ConnectFailure::Unreachable
        );
        assert_eq!(
            classify_connect_message("failed to lookup address information: Name or service not known"),
            ConnectFailure::Unreachable
        );
    }

    #[test]
    fn test_classify_other() {
        assert_eq!(
            classify_connect_message("database \"nope\" does not exist"),
            ConnectFailure::Other
        );
    }

    #[test]
    fn test_suggestion_mentions_minimum_version() {
        let text = connection_suggestion(Dialect::MySQL, ConnectFailure::UnsupportedVersion);
        assert!(text.contains("5.7"));
    }

    #[test]
    fn test_sqlx_io_error_is_unreachable() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = sqlx_connect_error(Dialect::PostgreSQL, &sqlx::Error::Io(io));
        assert_eq!(err.connect_failure(), Some(ConnectFailure::Unreachable));
    }

    #[tokio::test]
    async fn test_memory_sqlite_pool_keeps_state() {
        let config = ConnectionConfig::new(Dialect::SQLite);
        let deadline = Deadline::after(config.operation_timeout());
        let pool = create_pool(&config, ":memory:", deadline).await.unwrap();
        let DbPool::SQLite(sqlite) = &pool else {
            panic!("expected sqlite pool");
        };
        sqlx::query("CREATE TABLE t (id INTEGER)")
            .execute(sqlite)
            .await
            .unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM t")
            .fetch_one(sqlite)
            .await
            .unwrap();
        assert_eq!(count, 0);

        let version = fetch_server_version(&pool, Dialect::SQLite, deadline)
            .await
            .unwrap();
        assert!(version.starts_with('3'));
        pool.close().await;
    }
}
