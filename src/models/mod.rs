//! Data models for the database client.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod query;
pub mod schema;

// Re-export commonly used types
pub use connection::{ConnectionConfig, ConnectionState, Dialect, ServerVersion};
pub use query::{
    Filter, FilterOperator, QueryParam, SelectTopResult, SortDirection, SortSpec,
};
pub use schema::{
    ColumnDefinition, ForeignKey, ForeignKeyAction, ForeignKeyRow, PrimaryKey, TableSchema,
    group_foreign_keys,
};
