//! Uniform database client.
//!
//! One `Connection` contract over PostgreSQL, MySQL, MariaDB, SQLite,
//! SQL Server and CockroachDB: schema introspection plus paginated selects,
//! with a conformance fixture and harness that check every dialect answers
//! the same way.

pub mod config;
pub mod db;
pub mod error;
pub mod fixture;
pub mod harness;
pub mod models;

pub use config::Config;
pub use db::{Connection, Server, create_server};
pub use error::{ConnectFailure, DbError, DbResult};
pub use harness::{ConformanceHarness, HarnessError};
