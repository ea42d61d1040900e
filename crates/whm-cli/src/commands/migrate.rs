//! Migrate command implementation

use anyhow::{Context, Result};
use serde::Serialize;
use whm_core::{pending, MigrationUnit};
use whm_engine::{AuditStore, MigrationRunner, RunSummary, StatementOutcome};

use crate::cli::{GlobalArgs, MigrateArgs, OutputFormat};
use crate::commands::common::{self, ExitCode, EXIT_DEGRADED, EXIT_STATEMENT_FAILED};

/// A unit the run will (or would) apply
#[derive(Debug, Serialize)]
struct PlannedUnit<'a> {
    version: &'a str,
    db_name: &'a str,
    files: Vec<&'a str>,
}

impl<'a> PlannedUnit<'a> {
    fn from_unit(unit: &'a MigrationUnit) -> Self {
        Self {
            version: &unit.version,
            db_name: &unit.db_name,
            files: unit.file_names().collect(),
        }
    }
}

/// JSON report for `migrate --output json`
#[derive(Debug, Serialize)]
struct MigrateReport<'a> {
    environment: &'a str,
    audit_table: &'a str,
    dry_run: bool,
    pending: Vec<PlannedUnit<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    run: Option<&'a RunSummary>,
    exit_code: i32,
}

/// Execute the migrate command
pub(crate) async fn execute(args: &MigrateArgs, global: &GlobalArgs) -> Result<()> {
    let settings = common::load_settings(global)?;
    let session = common::open_session(&settings)?;
    let audit = AuditStore::new(session.db(), settings.audit_table.as_str());
    let json = args.output == OutputFormat::Json;

    if args.dry_run {
        let catalog = common::discover_catalog(&settings)?;
        let ledger = common::read_ledger(&audit, &settings.environment)
            .await
            .context("Failed to read audit history")?;
        let todo = pending(&catalog, &ledger.applied_versions(&catalog));

        if json {
            let report = MigrateReport {
                environment: &settings.environment,
                audit_table: audit.table(),
                dry_run: true,
                pending: todo.iter().map(|u| PlannedUnit::from_unit(u)).collect(),
                run: None,
                exit_code: 0,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_plan(&settings.environment, catalog.len(), &todo);
        }
        return Ok(());
    }

    audit
        .ensure_schema()
        .await
        .context("Failed to prepare audit table")?;
    let catalog = common::discover_catalog(&settings)?;
    let ledger = audit
        .success_ledger(&settings.environment)
        .await
        .context("Failed to read audit history")?;
    if ledger.is_empty() {
        log::info!(
            "No successful migrations recorded for environment '{}'",
            settings.environment
        );
    }
    let todo = pending(&catalog, &ledger.applied_versions(&catalog));

    if !json {
        if catalog.is_empty() {
            println!(
                "No migration versions found under {}",
                catalog.root().display()
            );
        } else if todo.is_empty() {
            println!(
                "Nothing to migrate: all {} version(s) applied for environment '{}'",
                catalog.len(),
                settings.environment
            );
        } else {
            println!(
                "Applying {} of {} version(s) to environment '{}'...\n",
                todo.len(),
                catalog.len(),
                settings.environment
            );
        }
    }

    let runner = MigrationRunner::new(session.db(), &audit, &settings.environment);
    let summary = if json {
        runner.run_all(&todo).await
    } else {
        runner.run_all_with(&todo, print_statement).await
    };
    let code = exit_code(&summary);

    if json {
        let report = MigrateReport {
            environment: &settings.environment,
            audit_table: audit.table(),
            dry_run: false,
            pending: todo.iter().map(|u| PlannedUnit::from_unit(u)).collect(),
            run: Some(&summary),
            exit_code: code,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !todo.is_empty() {
        print_summary(&summary);
    }

    if summary.degraded {
        eprintln!(
            "Warning: {} audit row(s) could not be written to {}; the audit log is incomplete",
            summary.log_write_failures(),
            audit.table()
        );
    }

    match code {
        0 => Ok(()),
        code => Err(ExitCode(code).into()),
    }
}

/// Degraded outranks statement failure
fn exit_code(summary: &RunSummary) -> i32 {
    if summary.degraded {
        EXIT_DEGRADED
    } else if summary.any_failed {
        EXIT_STATEMENT_FAILED
    } else {
        0
    }
}

fn print_plan(environment: &str, total: usize, todo: &[&MigrationUnit]) {
    if todo.is_empty() {
        println!(
            "Nothing to migrate: all {} version(s) applied for environment '{}'",
            total, environment
        );
        return;
    }

    println!(
        "Would apply {} of {} version(s) to environment '{}':\n",
        todo.len(),
        total,
        environment
    );
    for unit in todo {
        if unit.is_empty() {
            println!("  {} (no statement files)", unit.version);
            continue;
        }
        println!("  {}", unit.version);
        for file in unit.file_names() {
            println!("    {}", file);
        }
    }
}

fn print_statement(unit: &MigrationUnit, outcome: &StatementOutcome) {
    match &outcome.error_message {
        None => println!(
            "  ✓ {}/{} ({}ms)",
            unit.version, outcome.file_name, outcome.duration_ms
        ),
        Some(error) => println!(
            "  ✗ {}/{} ({}ms) - {}",
            unit.version, outcome.file_name, outcome.duration_ms, error
        ),
    }
    if let Some(error) = &outcome.log_write_error {
        eprintln!("    audit write failed: {}", error);
    }
}

fn print_summary(summary: &RunSummary) {
    let failed_versions: Vec<&str> = summary
        .outcomes
        .iter()
        .filter(|o| o.failed())
        .map(|o| o.version.as_str())
        .collect();

    println!();
    println!(
        "Applied {} version(s): {} statement(s) succeeded, {} failed ({}ms)",
        summary.units_applied(),
        summary.statements_succeeded(),
        summary.statements_failed(),
        summary.duration_ms
    );
    if !failed_versions.is_empty() {
        println!("Still pending after failures: {}", failed_versions.join(", "));
    }
}

#[cfg(test)]
#[path = "migrate_test.rs"]
mod tests;
