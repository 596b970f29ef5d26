//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Server handles and the connection lifecycle
//! - Connection pool management
//! - Per-operation deadlines
//! - Dialect-specific SQL rendering
//! - Query execution
//! - Schema introspection
//! - Type mappings

pub mod deadline;
pub mod dialect;
pub mod executor;
pub mod params;
pub mod pool;
pub mod schema;
pub mod server;
pub mod types;

pub use deadline::Deadline;
pub use executor::{QueryExecutor, SelectTopRequest};
pub use pool::DbPool;
pub use schema::SchemaInspector;
pub use server::{Connection, Server, create_server};
