//! Server handles and the connection lifecycle.
//!
//! A [`Server`] is a validated configuration; it performs no I/O. Each
//! [`Connection`] it hands out binds one database and moves through
//! `unconnected -> connected -> closed`. Every capability checks the state
//! first and fails fast outside `connected`.

use crate::db::deadline::Deadline;
use crate::db::executor::{QueryExecutor, SelectTopRequest};
use crate::db::pool::{DbPool, connection_suggestion, create_pool, fetch_server_version};
use crate::db::schema::SchemaInspector;
use crate::error::{ConnectFailure, DbError, DbResult};
use crate::models::{
    ColumnDefinition, ConnectionConfig, ConnectionState, Dialect, Filter, ForeignKey, PrimaryKey,
    QueryParam, SelectTopResult, ServerVersion, SortSpec, TableSchema,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Validate a configuration and build a server handle.
pub fn create_server(config: ConnectionConfig) -> DbResult<Server> {
    Server::new(config)
}

/// A validated server configuration.
#[derive(Debug, Clone)]
pub struct Server {
    config: Arc<ConnectionConfig>,
}

impl Server {
    pub fn new(config: ConnectionConfig) -> DbResult<Self> {
        config.validate()?;
        debug!(
            dialect = %config.dialect,
            host = %config.host_or_default(),
            port = ?config.port_or_default(),
            "Server configured"
        );
        Ok(Self {
            config: Arc::new(config),
        })
    }

    pub fn dialect(&self) -> Dialect {
        self.config.dialect
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Bind a database name. For SQLite this is a file path or `:memory:`.
    pub fn create_connection(&self, database: impl Into<String>) -> Connection {
        Connection {
            config: Arc::clone(&self.config),
            database: database.into().into(),
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: ConnectionState,
    pool: Option<DbPool>,
    version: Option<ServerVersion>,
}

/// A database session bound to one database on a server.
///
/// Clones share the same underlying state and pool.
#[derive(Debug, Clone)]
pub struct Connection {
    config: Arc<ConnectionConfig>,
    database: Arc<str>,
    inner: Arc<RwLock<Inner>>,
}

impl Connection {
    pub fn dialect(&self) -> Dialect {
        self.config.dialect
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.read().await.state
    }

    /// Version the compatibility check ran against, once connected.
    pub async fn server_version(&self) -> Option<ServerVersion> {
        self.inner.read().await.version
    }

    /// Open the pool, probe the server version and check it is supported.
    ///
    /// Pool setup and the version probe share one operation timeout.
    pub async fn connect(&self) -> DbResult<()> {
        let dialect = self.dialect();
        let deadline = self.deadline();

        // Early state check
        check_connectable(self.inner.read().await.state)?;

        info!(
            dialect = %dialect,
            host = %self.config.host_or_default(),
            database = %self.database,
            "Connecting to database"
        );

        let pool = create_pool(&self.config, &self.database, deadline).await?;
        let version = match self.check_version(&pool, deadline).await {
            Ok(version) => version,
            Err(e) => {
                pool.close().await;
                return Err(e);
            }
        };

        // Re-check after async work; a concurrent connect or close may have won
        let lost_race = {
            let mut inner = self.inner.write().await;
            match check_connectable(inner.state) {
                Ok(()) => {
                    inner.pool = Some(pool.clone());
                    inner.version = version;
                    inner.state = ConnectionState::Connected;
                    None
                }
                Err(e) => Some(e),
            }
        };
        if let Some(e) = lost_race {
            pool.close().await;
            return Err(e);
        }

        info!(
            dialect = %dialect,
            database = %self.database,
            server_version = ?version,
            driver = pool.driver_name(),
            "Connected successfully"
        );
        Ok(())
    }

    /// Release the pool. Closing twice is a no-op.
    pub async fn close(&self) -> DbResult<()> {
        let pool = {
            let mut inner = self.inner.write().await;
            if inner.state == ConnectionState::Closed {
                return Ok(());
            }
            inner.state = ConnectionState::Closed;
            inner.pool.take()
        };

        if let Some(pool) = pool {
            pool.close().await;
        }
        info!(dialect = %self.dialect(), database = %self.database, "Connection closed");
        Ok(())
    }

    async fn check_version(
        &self,
        pool: &DbPool,
        deadline: Deadline,
    ) -> DbResult<Option<ServerVersion>> {
        let dialect = self.dialect();
        let version = match &self.config.version_override {
            Some(text) => {
                let version = ServerVersion::parse_banner(text).ok_or_else(|| {
                    DbError::configuration(format!("Invalid version_override '{}'", text))
                })?;
                debug!(dialect = %dialect, version = %version, "Using version override");
                Some(version)
            }
            None => match fetch_server_version(pool, dialect, deadline).await {
                Ok(banner) => {
                    let parsed = ServerVersion::parse_banner(&banner);
                    if parsed.is_none() {
                        warn!(dialect = %dialect, banner = %banner, "Unrecognized version banner");
                    }
                    parsed
                }
                Err(e) => {
                    warn!(dialect = %dialect, error = %e, "Failed to get server version");
                    None
                }
            },
        };

        if let Some(version) = version {
            let minimum = dialect.minimum_version();
            if version < minimum {
                return Err(DbError::connection(
                    ConnectFailure::UnsupportedVersion,
                    format!(
                        "{} {} is older than the supported minimum {}",
                        dialect, version, minimum
                    ),
                    connection_suggestion(dialect, ConnectFailure::UnsupportedVersion),
                ));
            }
        }
        Ok(version)
    }

    /// The pool, if the connection is usable.
    async fn pool(&self) -> DbResult<DbPool> {
        let inner = self.inner.read().await;
        match (inner.state, &inner.pool) {
            (ConnectionState::Connected, Some(pool)) => Ok(pool.clone()),
            (ConnectionState::Unconnected, _) => Err(DbError::NotConnected),
            (ConnectionState::Closed, _) => Err(DbError::ConnectionClosed),
            (ConnectionState::Connected, None) => {
                Err(DbError::internal("Connected without a pool"))
            }
        }
    }

    /// A fresh budget for one public operation.
    fn deadline(&self) -> Deadline {
        Deadline::after(self.config.operation_timeout())
    }

    fn executor(&self) -> QueryExecutor {
        QueryExecutor::new(self.dialect(), self.deadline())
    }

    // =========================================================================
    // Schema introspection
    // =========================================================================

    pub async fn list_tables(&self, schema: Option<&str>) -> DbResult<Vec<String>> {
        let pool = self.pool().await?;
        SchemaInspector::list_tables(&pool, self.dialect(), schema, self.deadline()).await
    }

    pub async fn list_table_columns(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> DbResult<Vec<ColumnDefinition>> {
        let pool = self.pool().await?;
        SchemaInspector::list_columns(
            &pool,
            self.dialect(),
            table,
            schema,
            self.deadline(),
        )
        .await
    }

    /// The key column of a single-column primary key.
    ///
    /// `None` for tables with a composite key or no key at all.
    pub async fn get_primary_key(&self, table: &str, schema: Option<&str>) -> DbResult<Option<String>> {
        let columns = self.get_primary_keys(table, schema).await?;
        Ok(PrimaryKey::from_columns(columns).single().map(String::from))
    }

    /// All primary key columns in key order.
    pub async fn get_primary_keys(&self, table: &str, schema: Option<&str>) -> DbResult<Vec<String>> {
        let pool = self.pool().await?;
        SchemaInspector::primary_key_columns(
            &pool,
            self.dialect(),
            table,
            schema,
            self.deadline(),
        )
        .await
    }

    /// Outgoing foreign keys of a table.
    pub async fn get_table_keys(&self, table: &str, schema: Option<&str>) -> DbResult<Vec<ForeignKey>> {
        let pool = self.pool().await?;
        SchemaInspector::foreign_keys(
            &pool,
            self.dialect(),
            table,
            schema,
            self.deadline(),
        )
        .await
    }

    pub async fn describe_table(&self, table: &str, schema: Option<&str>) -> DbResult<TableSchema> {
        let pool = self.pool().await?;
        SchemaInspector::describe_table(
            &pool,
            self.dialect(),
            table,
            schema,
            self.deadline(),
        )
        .await
    }

    pub async fn list_schemas(&self) -> DbResult<Vec<String>> {
        let pool = self.pool().await?;
        SchemaInspector::list_schemas(&pool, self.dialect(), self.deadline()).await
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Filter, sort, skip `offset`, take `limit`; `total_records` ignores
    /// pagination.
    pub async fn select_top(
        &self,
        table: &str,
        offset: u64,
        limit: u64,
        sort: &[SortSpec],
        filters: Option<&[Filter]>,
        schema: Option<&str>,
    ) -> DbResult<SelectTopResult> {
        let request = SelectTopRequest {
            table,
            schema,
            offset,
            limit,
            sort,
            filters: filters.unwrap_or_default(),
        };
        self.select(&request).await
    }

    pub async fn select(&self, request: &SelectTopRequest<'_>) -> DbResult<SelectTopResult> {
        let pool = self.pool().await?;
        self.executor().select_top(&pool, request).await
    }

    /// Execute a statement, returning rows affected.
    pub async fn execute(&self, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        let pool = self.pool().await?;
        self.executor().execute(&pool, sql, params).await
    }

    /// Insert one row; returns the generated value of `returning` if given.
    pub async fn insert_row(
        &self,
        table: &str,
        values: &[(String, QueryParam)],
        returning: Option<&str>,
        schema: Option<&str>,
    ) -> DbResult<Option<i64>> {
        let pool = self.pool().await?;
        self.executor()
            .insert_row(&pool, table, values, returning, schema)
            .await
    }
}

fn check_connectable(state: ConnectionState) -> DbResult<()> {
    match state {
        ConnectionState::Unconnected => Ok(()),
        ConnectionState::Connected => Err(DbError::invalid_state("Connection is already connected")),
        ConnectionState::Closed => Err(DbError::ConnectionClosed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_server_validates() {
        let config = ConnectionConfig::new(Dialect::PostgreSQL);
        let err = create_server(config).unwrap_err();
        assert!(matches!(err, DbError::Configuration { .. }));

        let config = ConnectionConfig::new(Dialect::SQLite).with_pool(5, 2);
        assert!(create_server(config).is_err());
    }

    #[test]
    fn test_create_connection_is_lazy() {
        let server = create_server(ConnectionConfig::new(Dialect::SQLite)).unwrap();
        let conn = server.create_connection("/nonexistent/dir/test.db");
        assert_eq!(conn.database(), "/nonexistent/dir/test.db");
        assert_eq!(conn.dialect(), Dialect::SQLite);
    }

    #[test]
    fn test_check_connectable() {
        assert!(check_connectable(ConnectionState::Unconnected).is_ok());
        assert!(matches!(
            check_connectable(ConnectionState::Connected),
            Err(DbError::InvalidState { .. })
        ));
        assert!(matches!(
            check_connectable(ConnectionState::Closed),
            Err(DbError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_lifecycle_in_memory() {
        let server = create_server(ConnectionConfig::new(Dialect::SQLite)).unwrap();
        let conn = server.create_connection(":memory:");

        assert!(matches!(conn.list_tables(None).await, Err(DbError::NotConnected)));
        assert_eq!(conn.state().await, ConnectionState::Unconnected);

        conn.connect().await.unwrap();
        assert_eq!(conn.state().await, ConnectionState::Connected);
        assert!(conn.server_version().await.is_some());
        assert!(matches!(conn.connect().await, Err(DbError::InvalidState { .. })));

        conn.close().await.unwrap();
        conn.close().await.unwrap();
        assert_eq!(conn.state().await, ConnectionState::Closed);
        assert!(matches!(conn.list_tables(None).await, Err(DbError::ConnectionClosed)));
        assert!(matches!(conn.connect().await, Err(DbError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_version_override_below_minimum() {
        let config = ConnectionConfig::new(Dialect::SQLite).with_version_override("3.8");
        let server = create_server(config).unwrap();
        let conn = server.create_connection(":memory:");

        let err = conn.connect().await.unwrap_err();
        assert_eq!(err.connect_failure(), Some(ConnectFailure::UnsupportedVersion));
        assert_eq!(conn.state().await, ConnectionState::Unconnected);
    }
}
