use super::*;
use whm_core::{MigrationUnit, StatementSource};

fn unit(version: &str, files: &[&str]) -> MigrationUnit {
    MigrationUnit {
        version: version.to_string(),
        db_name: "main".to_string(),
        statements: files
            .iter()
            .map(|f| StatementSource {
                file_name: f.to_string(),
                path: std::path::PathBuf::from(version).join(f),
                sql: "SELECT 1;".to_string(),
            })
            .collect(),
    }
}

#[test]
fn test_build_report_classifies_versions() {
    let catalog = MigrationCatalog::from_units(
        "migrations",
        vec![
            unit("V1", &["a.sql"]),
            unit("V2", &["a.sql", "b.sql"]),
            unit("V3", &["a.sql"]),
        ],
    );
    let ledger: SuccessLedger = [("V1", "a.sql"), ("V2", "a.sql")].into_iter().collect();

    let report = build_report(&catalog, &ledger, "prod", "migration.migration_logs");

    let states: Vec<_> = report.versions.iter().map(|v| v.state).collect();
    assert_eq!(
        states,
        vec![
            VersionState::Applied,
            VersionState::Partial,
            VersionState::Pending
        ]
    );
    assert_eq!(report.applied, 1);
    assert_eq!(report.pending, 2);
}

#[test]
fn test_build_report_fresh_environment() {
    let catalog = MigrationCatalog::from_units("migrations", vec![unit("V1", &["a.sql"])]);

    let report = build_report(&catalog, &SuccessLedger::new(), "dev", "logs");

    assert_eq!(report.applied, 0);
    assert_eq!(report.pending, 1);
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["versions"][0]["state"], "pending");
    assert_eq!(json["environment"], "dev");
}
