//! Audit log record types
//!
//! One [`AuditRecord`] is written per statement execution attempt. Records
//! are append-only; a version counts as applied only through SUCCESS rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Outcome of one statement execution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditStatus {
    /// The statement executed without error
    Success,
    /// The warehouse rejected the statement
    Failed,
}

impl AuditStatus {
    /// The literal stored in the `status` column
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Success => "SUCCESS",
            AuditStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(AuditStatus::Success),
            "FAILED" => Ok(AuditStatus::Failed),
            other => Err(format!("unknown audit status '{other}'")),
        }
    }
}

/// One row of the audit table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Environment label (e.g. `prod`)
    pub environment: String,

    /// db_name label of the unit
    pub db_name: String,

    /// Version of the unit
    pub version: String,

    /// Statement file name
    pub file_name: String,

    /// Outcome
    pub status: AuditStatus,

    /// Warehouse error text for failed attempts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// When the attempt finished (UTC)
    pub executed_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Record for a statement that executed cleanly
    pub fn success(
        environment: &str,
        db_name: &str,
        version: &str,
        file_name: &str,
        executed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            environment: environment.to_string(),
            db_name: db_name.to_string(),
            version: version.to_string(),
            file_name: file_name.to_string(),
            status: AuditStatus::Success,
            error_message: None,
            executed_at,
        }
    }

    /// Record for a statement the warehouse rejected
    pub fn failed(
        environment: &str,
        db_name: &str,
        version: &str,
        file_name: &str,
        error_message: String,
        executed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            environment: environment.to_string(),
            db_name: db_name.to_string(),
            version: version.to_string(),
            file_name: file_name.to_string(),
            status: AuditStatus::Failed,
            error_message: Some(error_message),
            executed_at,
        }
    }
}
