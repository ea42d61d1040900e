//! Scoped warehouse sessions
//!
//! A [`WarehouseSession`] is acquired once per invocation, lent by reference
//! to the audit store and the runner, and releases its connection when it is
//! dropped, whichever way the invocation ends.

use crate::duckdb::DuckDbBackend;
use crate::error::{DbError, DbResult};
use crate::traits::Database;
use whm_core::config::{ConnectionConfig, DbType};

/// An open warehouse connection
pub struct WarehouseSession {
    db: Box<dyn Database>,
    description: String,
}

impl WarehouseSession {
    /// Open a session from connection settings.
    ///
    /// Snowflake settings are checked for the required credentials, but no
    /// Snowflake client is bundled, so connecting reports `NotImplemented`.
    pub fn connect(config: &ConnectionConfig) -> DbResult<Self> {
        match config.db_type {
            DbType::DuckDb => {
                let backend = DuckDbBackend::new(&config.path)?;
                log::debug!("Opened DuckDB session at {}", config.path);
                Ok(Self::from_backend(
                    Box::new(backend),
                    format!("duckdb:{}", config.path),
                ))
            }
            DbType::Snowflake => {
                let missing: Vec<&str> = [
                    ("account", config.account.is_some()),
                    ("username", config.username.is_some()),
                    ("password", config.resolved_password().is_some()),
                ]
                .into_iter()
                .filter(|(_, present)| !present)
                .map(|(field, _)| field)
                .collect();
                if !missing.is_empty() {
                    return Err(DbError::ConnectionError(format!(
                        "snowflake connection is missing: {}",
                        missing.join(", ")
                    )));
                }
                Err(DbError::NotImplemented {
                    backend: "snowflake".to_string(),
                    feature: "connection".to_string(),
                })
            }
        }
    }

    /// Wrap an already-open backend
    pub fn from_backend(db: Box<dyn Database>, description: impl Into<String>) -> Self {
        Self {
            db,
            description: description.into(),
        }
    }

    /// Borrow the warehouse client
    pub fn db(&self) -> &dyn Database {
        self.db.as_ref()
    }

    /// Human-readable connection description (never includes credentials)
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl Drop for WarehouseSession {
    fn drop(&mut self) {
        log::debug!("Releasing warehouse session {}", self.description);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_duckdb_in_memory() {
        let session = WarehouseSession::connect(&ConnectionConfig::default()).unwrap();
        assert_eq!(session.db().db_type(), "duckdb");
        assert_eq!(session.description(), "duckdb::memory:");
        session
            .db()
            .execute_batch("CREATE TABLE t (id INT)")
            .await
            .unwrap();
        assert!(session.db().relation_exists("t").await.unwrap());
    }

    #[test]
    fn test_connect_duckdb_file_releases_on_drop() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("wh.duckdb");
        let config = ConnectionConfig {
            path: path.display().to_string(),
            ..ConnectionConfig::default()
        };

        {
            let _session = WarehouseSession::connect(&config).unwrap();
        }
        // The file lock is gone once the first session is dropped
        let _again = WarehouseSession::connect(&config).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_connect_duckdb_bad_path() {
        let config = ConnectionConfig {
            path: "/nonexistent-dir/sub/wh.duckdb".to_string(),
            ..ConnectionConfig::default()
        };
        let err = WarehouseSession::connect(&config).err().unwrap();
        assert!(matches!(err, DbError::ConnectionError(_)));
    }

    #[test]
    fn test_connect_snowflake_missing_credentials() {
        let config = ConnectionConfig {
            db_type: DbType::Snowflake,
            account: Some("xy12345".to_string()),
            ..ConnectionConfig::default()
        };
        let err = WarehouseSession::connect(&config).err().unwrap();
        let msg = err.to_string();
        assert!(msg.contains("username"));
        assert!(!msg.contains("account,"));
    }

    #[test]
    fn test_connect_snowflake_not_implemented() {
        let config = ConnectionConfig {
            db_type: DbType::Snowflake,
            account: Some("xy12345".to_string()),
            username: Some("deployer".to_string()),
            password: Some("secret".to_string()),
            ..ConnectionConfig::default()
        };
        let err = WarehouseSession::connect(&config).err().unwrap();
        assert!(matches!(err, DbError::NotImplemented { .. }));
    }
}
