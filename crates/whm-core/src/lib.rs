//! whm-core - Core library for whm
//!
//! This crate provides configuration parsing, the migration catalog, the
//! audit record model, and pending-version resolution shared by the engine
//! and the CLI. Nothing here talks to a warehouse.

pub mod audit_record;
pub mod catalog;
pub mod config;
pub mod error;
pub mod resolver;
pub mod sql_utils;

pub use audit_record::{AuditRecord, AuditStatus};
pub use catalog::{MigrationCatalog, MigrationUnit, StatementSource};
pub use config::{Config, ConnectionConfig, DbType, RunSettings, TargetConfig};
pub use error::{CoreError, CoreResult};
pub use resolver::{pending, SuccessLedger};
