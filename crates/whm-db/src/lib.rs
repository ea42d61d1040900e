//! whm-db - Warehouse client layer for whm
//!
//! This crate provides the `Database` trait the migration engine executes
//! against, a DuckDB implementation, and the scoped `WarehouseSession`.

pub mod duckdb;
pub mod error;
pub mod session;
pub mod traits;

pub use duckdb::DuckDbBackend;
pub use error::{DbError, DbResult};
pub use session::WarehouseSession;
pub use traits::{Database, Row};
