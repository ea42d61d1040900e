//! Error types for the migration engine

use thiserror::Error;

/// Audit store errors
#[derive(Error, Debug)]
pub enum AuditError {
    /// The audit table could not be created (A001). Fatal.
    #[error("[A001] Failed to create audit table {table}: {message}")]
    Schema { table: String, message: String },

    /// The audit history could not be read (A002). Fatal.
    #[error("[A002] Failed to read audit table {table}: {message}")]
    Query { table: String, message: String },

    /// An audit row could not be written (A003). The run continues degraded.
    #[error("[A003] Failed to record {version}/{file_name} in audit table: {message}")]
    LogWrite {
        version: String,
        file_name: String,
        message: String,
    },
}

/// Result type alias for [`AuditError`].
pub type AuditResult<T> = Result<T, AuditError>;
