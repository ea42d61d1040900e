//! Configuration types and parsing for whm.yml

use crate::error::{CoreError, CoreResult};
use crate::sql_utils::is_valid_qualified_name;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Environment variable consulted when `--target` is not given
pub const TARGET_ENV_VAR: &str = "WHM_TARGET";

/// Environment variable that supplies the warehouse password when the
/// config file leaves it out
pub const PASSWORD_ENV_VAR: &str = "WHM_PASSWORD";

/// Main project configuration from whm.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Project name
    pub name: String,

    /// Environment label used when no target is selected
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Root directory of the migration catalog, relative to the project
    #[serde(default = "default_migration_path")]
    pub migration_path: String,

    /// Glob pattern selecting statement files by file name
    #[serde(default = "default_sql_file_pattern")]
    pub sql_file_pattern: String,

    /// Fully qualified name of the audit table
    #[serde(default = "default_audit_table")]
    pub audit_table: String,

    /// Label written to the `db_name` column of every audit row
    #[serde(default)]
    pub db_name: Option<String>,

    /// Warehouse connection settings
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Named target configurations (e.g., dev, prod).
    /// The selected target's name becomes the environment label.
    #[serde(default)]
    pub targets: HashMap<String, TargetConfig>,
}

/// Target-specific configuration overrides
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    /// Connection override
    #[serde(default)]
    pub connection: Option<ConnectionConfig>,

    /// Migration root override
    #[serde(default)]
    pub migration_path: Option<String>,

    /// db_name label override
    #[serde(default)]
    pub db_name: Option<String>,
}

/// Warehouse type selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    /// DuckDB (default)
    #[default]
    DuckDb,
    /// Snowflake
    Snowflake,
}

impl std::fmt::Display for DbType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbType::DuckDb => write!(f, "duckdb"),
            DbType::Snowflake => write!(f, "snowflake"),
        }
    }
}

/// Warehouse connection configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    /// Warehouse type (duckdb or snowflake)
    #[serde(rename = "type", default)]
    pub db_type: DbType,

    /// Database path (for DuckDB file-based or :memory:)
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Login name
    #[serde(default)]
    pub username: Option<String>,

    /// Password; falls back to `WHM_PASSWORD`
    #[serde(default)]
    pub password: Option<String>,

    /// Account identifier
    #[serde(default)]
    pub account: Option<String>,

    /// Compute warehouse
    #[serde(default)]
    pub warehouse: Option<String>,

    /// Default database
    #[serde(default)]
    pub database: Option<String>,

    /// Role to assume
    #[serde(default)]
    pub role: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            db_type: DbType::default(),
            path: default_db_path(),
            username: None,
            password: None,
            account: None,
            warehouse: None,
            database: None,
            role: None,
        }
    }
}

// Keeps the password out of `{:?}` output.
impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("db_type", &self.db_type)
            .field("path", &self.path)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("account", &self.account)
            .field("warehouse", &self.warehouse)
            .field("database", &self.database)
            .field("role", &self.role)
            .finish()
    }
}

impl ConnectionConfig {
    /// The configured password, or the value of `WHM_PASSWORD`
    pub fn resolved_password(&self) -> Option<String> {
        self.password
            .clone()
            .or_else(|| std::env::var(PASSWORD_ENV_VAR).ok())
    }
}

/// Everything a single invocation needs, after target overrides are applied
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Environment label the audit history is keyed by
    pub environment: String,

    /// Name of the selected target, if any
    pub target: Option<String>,

    /// Absolute catalog root
    pub migration_root: PathBuf,

    /// Statement file glob
    pub sql_file_pattern: glob::Pattern,

    /// Audit table name
    pub audit_table: String,

    /// db_name label for audit rows
    pub db_name: String,

    /// Connection settings
    pub connection: ConnectionConfig,
}

fn default_environment() -> String {
    "prod".to_string()
}

fn default_migration_path() -> String {
    "migrations".to_string()
}

fn default_sql_file_pattern() -> String {
    "*.sql".to_string()
}

fn default_audit_table() -> String {
    "migration.migration_logs".to_string()
}

const DEFAULT_DB_PATH: &str = ":memory:";

const DEFAULT_DB_NAME: &str = "main";

fn default_db_path() -> String {
    DEFAULT_DB_PATH.to_string()
}

impl Config {
    /// Load configuration from a file path
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| CoreError::ConfigParseError {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a project directory
    /// Looks for whm.yml or whm.yaml
    pub fn load_from_dir(dir: &Path) -> CoreResult<Self> {
        let yml_path = dir.join("whm.yml");
        let yaml_path = dir.join("whm.yaml");

        if yml_path.exists() {
            Self::load(&yml_path)
        } else if yaml_path.exists() {
            Self::load(&yaml_path)
        } else {
            Err(CoreError::ConfigNotFound {
                path: yml_path.display().to_string(),
            })
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> CoreResult<()> {
        if self.name.is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "Project name cannot be empty".to_string(),
            });
        }

        if self.environment.trim().is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "environment cannot be empty".to_string(),
            });
        }

        if let Err(e) = glob::Pattern::new(&self.sql_file_pattern) {
            return Err(CoreError::ConfigInvalid {
                message: format!(
                    "Invalid sql_file_pattern '{}': {}",
                    self.sql_file_pattern, e
                ),
            });
        }

        if !is_valid_qualified_name(&self.audit_table) {
            return Err(CoreError::ConfigInvalid {
                message: format!(
                    "Invalid audit_table '{}': expected an unquoted name with at most three dot-separated parts",
                    self.audit_table
                ),
            });
        }

        Ok(())
    }

    /// Get the list of available target names, sorted
    pub fn available_targets(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.targets.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Get target configuration by name
    pub fn get_target(&self, name: &str) -> CoreResult<&TargetConfig> {
        self.targets
            .get(name)
            .ok_or_else(|| CoreError::ConfigInvalid {
                message: format!(
                    "Target '{}' not found. Available targets: {}",
                    name,
                    self.available_targets().join(", ")
                ),
            })
    }

    /// Resolve the settings for one invocation.
    ///
    /// With a target, the target's name is the environment label and its
    /// overrides win. `db_name` falls back through the top-level label and
    /// the connection's database to `"main"`.
    pub fn resolve(&self, root: &Path, target: Option<&str>) -> CoreResult<RunSettings> {
        let target_config = target.map(|name| self.get_target(name)).transpose()?;

        let connection = target_config
            .and_then(|tc| tc.connection.clone())
            .unwrap_or_else(|| self.connection.clone());

        let migration_path = target_config
            .and_then(|tc| tc.migration_path.as_deref())
            .unwrap_or(&self.migration_path);

        let db_name = target_config
            .and_then(|tc| tc.db_name.clone())
            .or_else(|| self.db_name.clone())
            .or_else(|| connection.database.clone())
            .unwrap_or_else(|| DEFAULT_DB_NAME.to_string());

        let sql_file_pattern =
            glob::Pattern::new(&self.sql_file_pattern).map_err(|e| CoreError::ConfigInvalid {
                message: format!("Invalid sql_file_pattern: {e}"),
            })?;

        Ok(RunSettings {
            environment: target
                .map(String::from)
                .unwrap_or_else(|| self.environment.clone()),
            target: target.map(String::from),
            migration_root: root.join(migration_path),
            sql_file_pattern,
            audit_table: self.audit_table.clone(),
            db_name,
            connection,
        })
    }

    /// Resolve target from CLI flag or WHM_TARGET environment variable
    ///
    /// Priority: CLI flag > WHM_TARGET env var > None
    pub fn resolve_target(cli_target: Option<&str>) -> Option<String> {
        cli_target
            .map(String::from)
            .or_else(|| std::env::var(TARGET_ENV_VAR).ok())
            .filter(|t| !t.is_empty())
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
