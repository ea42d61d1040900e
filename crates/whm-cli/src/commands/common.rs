//! Shared utilities for CLI commands

use anyhow::{Context, Result};
use std::fmt;
use std::path::Path;
use whm_core::{Config, DbType, MigrationCatalog, RunSettings, SuccessLedger};
use whm_db::WarehouseSession;
use whm_engine::AuditStore;

use crate::cli::GlobalArgs;

/// One or more statements failed
pub(crate) const EXIT_STATEMENT_FAILED: i32 = 1;

/// Config, connection, discovery, schema or audit read failure
pub(crate) const EXIT_FATAL: i32 = 2;

/// At least one audit row could not be written
pub(crate) const EXIT_DEGRADED: i32 = 3;

/// Error type representing a non-zero process exit code.
///
/// Use `return Err(ExitCode(N).into())` instead of `std::process::exit(N)`
/// so the warehouse session is dropped before the process ends.
#[derive(Debug)]
pub(crate) struct ExitCode(pub(crate) i32);

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Control flow only; main prints nothing for it.
        write!(f, "")
    }
}

impl std::error::Error for ExitCode {}

/// Load the config named by the global args and resolve it for the
/// selected target.
pub(crate) fn load_settings(global: &GlobalArgs) -> Result<RunSettings> {
    let project_dir = Path::new(&global.project_dir);
    let config = match &global.config {
        Some(path) => Config::load(Path::new(path)),
        None => Config::load_from_dir(project_dir),
    }
    .context("Failed to load config")?;

    let target = Config::resolve_target(global.target.as_deref());
    let mut settings = config
        .resolve(project_dir, target.as_deref())
        .context("Failed to resolve config")?;

    // Relative DuckDB files live next to the project, not the shell's cwd
    if settings.connection.db_type == DbType::DuckDb
        && settings.connection.path != ":memory:"
        && Path::new(&settings.connection.path).is_relative()
    {
        settings.connection.path = project_dir
            .join(&settings.connection.path)
            .display()
            .to_string();
    }

    log::debug!(
        "Environment '{}' (target: {}), audit table {}",
        settings.environment,
        settings.target.as_deref().unwrap_or("none"),
        settings.audit_table
    );
    Ok(settings)
}

/// Open the warehouse session for an invocation
pub(crate) fn open_session(settings: &RunSettings) -> Result<WarehouseSession> {
    let session = WarehouseSession::connect(&settings.connection).with_context(|| {
        format!(
            "Failed to connect to {} warehouse",
            settings.connection.db_type
        )
    })?;
    log::info!(
        "Connected to {} warehouse {}",
        session.db().db_type(),
        session.description()
    );
    Ok(session)
}

/// Discover the migration catalog for an invocation
pub(crate) fn discover_catalog(settings: &RunSettings) -> Result<MigrationCatalog> {
    let catalog = MigrationCatalog::discover(
        &settings.migration_root,
        &settings.db_name,
        &settings.sql_file_pattern,
    )
    .context("Failed to discover migrations")?;
    log::info!(
        "Discovered {} migration version(s) under {}",
        catalog.len(),
        catalog.root().display()
    );
    log::debug!("Catalog order: {}", catalog.versions().join(", "));
    Ok(catalog)
}

/// Read the success ledger without creating anything.
///
/// A missing audit table means nothing has ever been applied.
pub(crate) async fn read_ledger(audit: &AuditStore<'_>, environment: &str) -> Result<SuccessLedger> {
    if !audit.exists().await? {
        log::debug!("Audit table {} does not exist yet", audit.table());
        return Ok(SuccessLedger::new());
    }
    Ok(audit.success_ledger(environment).await?)
}
