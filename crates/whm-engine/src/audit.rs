//! Durable audit log of migration attempts.
//!
//! The audit table is the only record of what has been applied. Rows are
//! appended, one per statement execution attempt, and never updated.

use crate::error::{AuditError, AuditResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::HashSet;
use whm_core::sql_utils::{escape_sql_string, split_qualified_name, sql_literal};
use whm_core::{AuditRecord, AuditStatus, SuccessLedger};
use whm_db::{Database, DbError, Row};

/// Timestamp format written to `executed_at`
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Filters for [`AuditStore::history`]
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    /// Only rows for this version
    pub version: Option<String>,

    /// Only FAILED rows
    pub failed_only: bool,

    /// Keep only the N most recent rows
    pub limit: Option<usize>,
}

/// Audit table accessor over a borrowed warehouse connection
pub struct AuditStore<'a> {
    db: &'a dyn Database,
    table: String,
}

impl<'a> AuditStore<'a> {
    /// Create a store for `table` (optionally schema- or database-qualified)
    pub fn new(db: &'a dyn Database, table: impl Into<String>) -> Self {
        Self {
            db,
            table: table.into(),
        }
    }

    /// The audit table name
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the audit table (and its schema) if absent.
    pub async fn ensure_schema(&self) -> AuditResult<()> {
        if let (Some(schema), _) = split_qualified_name(&self.table) {
            self.db
                .create_schema_if_not_exists(schema)
                .await
                .map_err(|e| self.schema_error(e))?;
        }

        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                env           VARCHAR,
                db_name       VARCHAR,
                version       VARCHAR,
                file_name     VARCHAR,
                status        VARCHAR,
                error_message VARCHAR,
                executed_at   TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )",
            self.table
        );
        self.db
            .execute_batch(&ddl)
            .await
            .map_err(|e| self.schema_error(e))?;

        log::debug!("Verified audit table {}", self.table);
        Ok(())
    }

    /// Whether the audit table exists yet
    pub async fn exists(&self) -> AuditResult<bool> {
        self.db
            .relation_exists(&self.table)
            .await
            .map_err(|e| self.query_error(e))
    }

    /// Every version with at least one SUCCESS record for `environment`.
    ///
    /// FAILED-only versions are never included.
    pub async fn applied_versions(&self, environment: &str) -> AuditResult<HashSet<String>> {
        Ok(self.success_ledger(environment).await?.versions())
    }

    /// The (version, file) pairs with at least one SUCCESS record for
    /// `environment`.
    pub async fn success_ledger(&self, environment: &str) -> AuditResult<SuccessLedger> {
        let sql = format!(
            "SELECT DISTINCT version, file_name FROM {} WHERE env = '{}' AND status = '{}'",
            self.table,
            escape_sql_string(environment),
            AuditStatus::Success.as_str()
        );
        let rows = self
            .db
            .query_rows(&sql)
            .await
            .map_err(|e| self.query_error(e))?;

        let mut ledger = SuccessLedger::new();
        for row in rows {
            match (row.first().cloned().flatten(), row.get(1).cloned().flatten()) {
                (Some(version), Some(file_name)) => ledger.insert(version, file_name),
                _ => log::warn!("Skipping audit row with NULL version or file_name"),
            }
        }
        Ok(ledger)
    }

    /// Append one row. Failure is reported as [`AuditError::LogWrite`].
    pub async fn record(&self, record: &AuditRecord) -> AuditResult<()> {
        let executed_at = record.executed_at.format(TIMESTAMP_FORMAT).to_string();
        let sql = format!(
            "INSERT INTO {} (env, db_name, version, file_name, status, error_message, executed_at) \
             VALUES ({}, {}, {}, {}, {}, {}, {})",
            self.table,
            sql_literal(Some(&record.environment)),
            sql_literal(Some(&record.db_name)),
            sql_literal(Some(&record.version)),
            sql_literal(Some(&record.file_name)),
            sql_literal(Some(record.status.as_str())),
            sql_literal(record.error_message.as_deref()),
            sql_literal(Some(&executed_at)),
        );

        self.db
            .execute(&sql)
            .await
            .map(|_| ())
            .map_err(|e| AuditError::LogWrite {
                version: record.version.clone(),
                file_name: record.file_name.clone(),
                message: e.to_string(),
            })
    }

    /// Audit rows for `environment`, oldest first.
    ///
    /// With a limit, only the most recent rows are read. Rows missing a
    /// status or timestamp are skipped with a warning.
    pub async fn history(
        &self,
        environment: &str,
        filter: &HistoryFilter,
    ) -> AuditResult<Vec<AuditRecord>> {
        let mut inner = format!(
            "SELECT env, db_name, version, file_name, status, error_message, executed_at \
             FROM {} WHERE env = '{}'",
            self.table,
            escape_sql_string(environment)
        );
        if let Some(version) = &filter.version {
            inner.push_str(&format!(" AND version = '{}'", escape_sql_string(version)));
        }
        if filter.failed_only {
            inner.push_str(&format!(" AND status = '{}'", AuditStatus::Failed.as_str()));
        }
        if let Some(limit) = filter.limit {
            inner.push_str(&format!(
                " ORDER BY executed_at DESC, version DESC, file_name DESC LIMIT {limit}"
            ));
        }

        let sql = format!(
            "SELECT env, db_name, version, file_name, status, error_message, \
             CAST(executed_at AS VARCHAR) AS executed_at_text FROM ({inner}) AS recent \
             ORDER BY executed_at, version, file_name"
        );

        let rows = self
            .db
            .query_rows(&sql)
            .await
            .map_err(|e| self.query_error(e))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(record) = self.parse_row(row)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn parse_row(&self, row: Row) -> AuditResult<Option<AuditRecord>> {
        let mut cols = row.into_iter();
        let mut next = |name: &str| -> AuditResult<Option<String>> {
            cols.next().ok_or_else(|| AuditError::Query {
                table: self.table.clone(),
                message: format!("missing column {name}"),
            })
        };

        let environment = next("env")?.unwrap_or_default();
        let db_name = next("db_name")?.unwrap_or_default();
        let version = next("version")?.unwrap_or_default();
        let file_name = next("file_name")?.unwrap_or_default();
        let status_text = next("status")?;
        let error_message = next("error_message")?;
        let executed_at_text = next("executed_at")?;

        let status = match status_text.as_deref().map(str::parse::<AuditStatus>) {
            Some(Ok(status)) => status,
            Some(Err(message)) => {
                log::warn!("Skipping audit row for {version}/{file_name}: {message}");
                return Ok(None);
            }
            None => {
                log::warn!("Skipping audit row for {version}/{file_name} with NULL status");
                return Ok(None);
            }
        };
        let Some(executed_at) = executed_at_text.as_deref().and_then(parse_timestamp) else {
            log::warn!(
                "Skipping audit row for {version}/{file_name} with missing or unparseable executed_at"
            );
            return Ok(None);
        };

        Ok(Some(AuditRecord {
            environment,
            db_name,
            version,
            file_name,
            status,
            error_message,
            executed_at,
        }))
    }

    fn schema_error(&self, err: DbError) -> AuditError {
        AuditError::Schema {
            table: self.table.clone(),
            message: err.to_string(),
        }
    }

    fn query_error(&self, err: DbError) -> AuditError {
        AuditError::Query {
            table: self.table.clone(),
            message: err.to_string(),
        }
    }
}

/// Parse a warehouse timestamp rendered as text (stored as UTC).
fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
#[path = "audit_test.rs"]
mod tests;
