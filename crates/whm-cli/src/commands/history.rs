//! History command implementation

use anyhow::{Context, Result};
use whm_core::AuditRecord;
use whm_engine::{AuditStore, HistoryFilter};

use crate::cli::{GlobalArgs, HistoryArgs, OutputFormat};
use crate::commands::common;

/// Execute the history command
pub(crate) async fn execute(args: &HistoryArgs, global: &GlobalArgs) -> Result<()> {
    let settings = common::load_settings(global)?;
    let session = common::open_session(&settings)?;
    let audit = AuditStore::new(session.db(), settings.audit_table.as_str());

    let filter = HistoryFilter {
        version: args.version.clone(),
        failed_only: args.failed,
        limit: args.limit,
    };

    let records = if audit
        .exists()
        .await
        .context("Failed to read audit history")?
    {
        audit
            .history(&settings.environment, &filter)
            .await
            .context("Failed to read audit history")?
    } else {
        log::debug!("Audit table {} does not exist yet", audit.table());
        Vec::new()
    };

    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
        OutputFormat::Text => print_records(&settings.environment, &records),
    }
    Ok(())
}

fn print_records(environment: &str, records: &[AuditRecord]) {
    if records.is_empty() {
        println!("No audit records for environment '{}'.", environment);
        return;
    }

    for record in records {
        println!("{}", format_record(record));
    }
}

fn format_record(record: &AuditRecord) -> String {
    let mut line = format!(
        "{}  {:<7}  {}/{}",
        record.executed_at.format("%Y-%m-%d %H:%M:%S"),
        record.status.as_str(),
        record.version,
        record.file_name
    );
    if let Some(error) = &record.error_message {
        line.push_str(&format!("  {}", error));
    }
    line
}

#[cfg(test)]
#[path = "history_test.rs"]
mod tests;
