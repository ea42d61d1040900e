//! Status command implementation

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashSet;
use whm_core::{MigrationCatalog, SuccessLedger};
use whm_engine::AuditStore;

use crate::cli::{GlobalArgs, OutputFormat, StatusArgs};
use crate::commands::common;

/// Where one catalog version stands for the environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum VersionState {
    /// Every statement file has succeeded
    Applied,
    /// Some files succeeded, others never did
    Partial,
    /// Nothing has succeeded yet
    Pending,
}

impl VersionState {
    fn label(self) -> &'static str {
        match self {
            VersionState::Applied => "applied",
            VersionState::Partial => "partial",
            VersionState::Pending => "pending",
        }
    }
}

#[derive(Debug, Serialize)]
struct VersionStatus {
    version: String,
    db_name: String,
    state: VersionState,
    files: usize,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    environment: String,
    audit_table: String,
    applied: usize,
    pending: usize,
    versions: Vec<VersionStatus>,
}

/// Execute the status command
pub(crate) async fn execute(args: &StatusArgs, global: &GlobalArgs) -> Result<()> {
    let settings = common::load_settings(global)?;
    let session = common::open_session(&settings)?;
    let audit = AuditStore::new(session.db(), settings.audit_table.as_str());

    let catalog = common::discover_catalog(&settings)?;
    let ledger = common::read_ledger(&audit, &settings.environment)
        .await
        .context("Failed to read audit history")?;

    let report = build_report(&catalog, &ledger, &settings.environment, audit.table());

    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_report(&report),
    }
    Ok(())
}

fn build_report(
    catalog: &MigrationCatalog,
    ledger: &SuccessLedger,
    environment: &str,
    audit_table: &str,
) -> StatusReport {
    let applied = ledger.applied_versions(catalog);
    let touched: HashSet<String> = ledger.versions();

    let versions: Vec<VersionStatus> = catalog
        .units()
        .iter()
        .map(|unit| {
            let state = if applied.contains(&unit.version) {
                VersionState::Applied
            } else if touched.contains(&unit.version) {
                VersionState::Partial
            } else {
                VersionState::Pending
            };
            VersionStatus {
                version: unit.version.clone(),
                db_name: unit.db_name.clone(),
                state,
                files: unit.statements.len(),
            }
        })
        .collect();

    let applied_count = versions
        .iter()
        .filter(|v| v.state == VersionState::Applied)
        .count();

    StatusReport {
        environment: environment.to_string(),
        audit_table: audit_table.to_string(),
        applied: applied_count,
        pending: versions.len() - applied_count,
        versions,
    }
}

fn print_report(report: &StatusReport) {
    println!(
        "Environment '{}' (audit table {})\n",
        report.environment, report.audit_table
    );

    if report.versions.is_empty() {
        println!("No migration versions found.");
        return;
    }

    let width = report
        .versions
        .iter()
        .map(|v| v.version.len())
        .max()
        .unwrap_or(0);
    for v in &report.versions {
        println!(
            "  {:<8} {:<width$}  ({} file(s))",
            v.state.label(),
            v.version,
            v.files,
            width = width
        );
    }

    println!();
    println!(
        "{} version(s): {} applied, {} pending",
        report.versions.len(),
        report.applied,
        report.pending
    );
}

#[cfg(test)]
#[path = "status_test.rs"]
mod tests;
