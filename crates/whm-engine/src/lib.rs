//! whm-engine - Migration engine for whm
//!
//! [`AuditStore`] reads and appends the audit table; [`MigrationRunner`]
//! executes pending units and records one audit row per statement attempt.
//! Both borrow the same warehouse connection for the length of a run.

pub mod audit;
pub mod error;
pub mod runner;

pub use audit::{AuditStore, HistoryFilter};
pub use error::{AuditError, AuditResult};
pub use runner::{MigrationRunner, RunSummary, StatementOutcome, UnitOutcome, UnitState};
