//! Migration application
//!
//! Units run in the order given, statements in file order. A failing
//! statement is recorded and the runner moves on: later statements of the
//! same unit and later units are still attempted, so partial progress is
//! always in the audit table.

use crate::audit::AuditStore;
use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};
use whm_core::{AuditRecord, AuditStatus, MigrationUnit, StatementSource};
use whm_db::Database;

/// Lifecycle of one unit within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    /// Resolved but not started
    Pending,
    /// Statements are executing
    InProgress,
    /// Every statement succeeded (or the unit had none)
    FullySucceeded,
    /// At least one statement failed
    PartiallyFailed,
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitState::Pending => write!(f, "pending"),
            UnitState::InProgress => write!(f, "in progress"),
            UnitState::FullySucceeded => write!(f, "succeeded"),
            UnitState::PartiallyFailed => write!(f, "failed"),
        }
    }
}

/// Result of executing one statement file
#[derive(Debug, Clone, Serialize)]
pub struct StatementOutcome {
    /// Statement file name
    pub file_name: String,

    /// SQL outcome
    pub status: AuditStatus,

    /// Warehouse error for failed statements
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Set when the audit row for this attempt could not be written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_write_error: Option<String>,

    /// Execution time in milliseconds
    pub duration_ms: u64,
}

impl StatementOutcome {
    /// Returns true when the SQL itself failed
    pub fn failed(&self) -> bool {
        self.status == AuditStatus::Failed
    }

    /// Returns true when the audit write failed
    pub fn degraded(&self) -> bool {
        self.log_write_error.is_some()
    }
}

/// Result of applying one unit
#[derive(Debug, Clone, Serialize)]
pub struct UnitOutcome {
    /// Unit version
    pub version: String,

    /// db_name label
    pub db_name: String,

    /// Terminal state
    pub state: UnitState,

    /// One entry per statement file, in execution order
    pub statements: Vec<StatementOutcome>,
}

impl UnitOutcome {
    /// Returns true when any statement failed
    pub fn failed(&self) -> bool {
        self.state == UnitState::PartiallyFailed
    }

    /// Returns true when any audit write failed
    pub fn degraded(&self) -> bool {
        self.statements.iter().any(StatementOutcome::degraded)
    }
}

/// Aggregate result of a run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Outcomes in application order
    pub outcomes: Vec<UnitOutcome>,

    /// At least one statement failed
    pub any_failed: bool,

    /// At least one audit write failed
    pub degraded: bool,

    /// Wall-clock time in milliseconds
    pub duration_ms: u64,
}

impl RunSummary {
    /// Number of units attempted
    pub fn units_applied(&self) -> usize {
        self.outcomes.len()
    }

    /// Statements that executed cleanly
    pub fn statements_succeeded(&self) -> usize {
        self.statements().filter(|s| !s.failed()).count()
    }

    /// Statements the warehouse rejected
    pub fn statements_failed(&self) -> usize {
        self.statements().filter(|s| s.failed()).count()
    }

    /// Audit rows that could not be written
    pub fn log_write_failures(&self) -> usize {
        self.statements().filter(|s| s.degraded()).count()
    }

    fn statements(&self) -> impl Iterator<Item = &StatementOutcome> {
        self.outcomes.iter().flat_map(|o| o.statements.iter())
    }
}

/// Applies migration units against a warehouse and records every attempt
pub struct MigrationRunner<'a> {
    db: &'a dyn Database,
    audit: &'a AuditStore<'a>,
    environment: String,
}

impl<'a> MigrationRunner<'a> {
    /// Create a runner for `environment`
    pub fn new(db: &'a dyn Database, audit: &'a AuditStore<'a>, environment: &str) -> Self {
        Self {
            db,
            audit,
            environment: environment.to_string(),
        }
    }

    /// Apply every statement of `unit`, in order.
    pub async fn apply(&self, unit: &MigrationUnit) -> UnitOutcome {
        self.apply_with(unit, &mut ignore_progress).await
    }

    /// Like [`apply`](Self::apply), calling `on_statement` after each
    /// statement has been executed and recorded.
    pub async fn apply_with<F>(&self, unit: &MigrationUnit, on_statement: &mut F) -> UnitOutcome
    where
        F: FnMut(&MigrationUnit, &StatementOutcome),
    {
        log::debug!(
            "{}: {} -> {}",
            unit.version,
            UnitState::Pending,
            UnitState::InProgress
        );
        log::info!(
            "Applying version {} ({} statement file(s))",
            unit.version,
            unit.statements.len()
        );

        let mut statements = Vec::with_capacity(unit.statements.len());
        let mut any_failed = false;

        for source in &unit.statements {
            let outcome = self.apply_statement(unit, source).await;
            any_failed |= outcome.failed();
            on_statement(unit, &outcome);
            statements.push(outcome);
        }

        let terminal = if any_failed {
            UnitState::PartiallyFailed
        } else {
            UnitState::FullySucceeded
        };
        log::debug!("{}: {} -> {}", unit.version, UnitState::InProgress, terminal);

        UnitOutcome {
            version: unit.version.clone(),
            db_name: unit.db_name.clone(),
            state: terminal,
            statements,
        }
    }

    /// Apply every pending unit in order. Failures never stop the loop.
    pub async fn run_all(&self, pending: &[&MigrationUnit]) -> RunSummary {
        self.run_all_with(pending, ignore_progress).await
    }

    /// Like [`run_all`](Self::run_all), reporting each statement outcome to
    /// `on_statement` as it happens.
    pub async fn run_all_with<F>(
        &self,
        pending: &[&MigrationUnit],
        mut on_statement: F,
    ) -> RunSummary
    where
        F: FnMut(&MigrationUnit, &StatementOutcome),
    {
        let start = Instant::now();
        let mut summary = RunSummary::default();

        for unit in pending {
            let outcome = self.apply_with(unit, &mut on_statement).await;
            summary.any_failed |= outcome.failed();
            summary.degraded |= outcome.degraded();
            summary.outcomes.push(outcome);
        }

        summary.duration_ms = millis(start.elapsed());
        log::info!(
            "Applied {} unit(s): {} statement(s) succeeded, {} failed, {} unrecorded",
            summary.units_applied(),
            summary.statements_succeeded(),
            summary.statements_failed(),
            summary.log_write_failures()
        );
        summary
    }

    async fn apply_statement(
        &self,
        unit: &MigrationUnit,
        source: &StatementSource,
    ) -> StatementOutcome {
        let start = Instant::now();
        let result = self.db.execute_batch(&source.sql).await;
        let duration_ms = millis(start.elapsed());
        let executed_at = Utc::now();

        let record = match result {
            Ok(()) => {
                log::info!("{}/{} succeeded", unit.version, source.file_name);
                AuditRecord::success(
                    &self.environment,
                    &unit.db_name,
                    &unit.version,
                    &source.file_name,
                    executed_at,
                )
            }
            Err(e) => {
                log::warn!("{}/{} failed: {}", unit.version, source.file_name, e);
                AuditRecord::failed(
                    &self.environment,
                    &unit.db_name,
                    &unit.version,
                    &source.file_name,
                    e.to_string(),
                    executed_at,
                )
            }
        };

        let log_write_error = match self.audit.record(&record).await {
            Ok(()) => None,
            Err(e) => {
                log::error!("{}", e);
                Some(e.to_string())
            }
        };

        StatementOutcome {
            file_name: source.file_name.clone(),
            status: record.status,
            error_message: record.error_message,
            log_write_error,
            duration_ms,
        }
    }
}

fn ignore_progress(_: &MigrationUnit, _: &StatementOutcome) {}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[path = "runner_test.rs"]
mod tests;
