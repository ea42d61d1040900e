use super::*;
use crate::audit::HistoryFilter;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use whm_db::{DbError, DbResult, DuckDbBackend, Row};

const TABLE: &str = "migration.migration_logs";

fn unit(version: &str, files: &[(&str, &str)]) -> MigrationUnit {
    MigrationUnit {
        version: version.to_string(),
        db_name: "main".to_string(),
        statements: files
            .iter()
            .map(|(name, sql)| StatementSource {
                file_name: name.to_string(),
                path: PathBuf::from(version).join(name),
                sql: sql.to_string(),
            })
            .collect(),
    }
}

/// Delegates to DuckDB but rejects every single-statement `execute`, which
/// is the path audit rows are written through.
struct RejectingAuditWrites {
    inner: DuckDbBackend,
    rejected: AtomicUsize,
}

#[async_trait]
impl Database for RejectingAuditWrites {
    async fn execute(&self, _sql: &str) -> DbResult<usize> {
        self.rejected.fetch_add(1, Ordering::SeqCst);
        Err(DbError::ConnectionError("connection reset".to_string()))
    }

    async fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.inner.execute_batch(sql).await
    }

    async fn query_rows(&self, sql: &str) -> DbResult<Vec<Row>> {
        self.inner.query_rows(sql).await
    }

    async fn relation_exists(&self, name: &str) -> DbResult<bool> {
        self.inner.relation_exists(name).await
    }

    async fn create_schema_if_not_exists(&self, schema: &str) -> DbResult<()> {
        self.inner.create_schema_if_not_exists(schema).await
    }

    fn db_type(&self) -> &'static str {
        "rejecting"
    }
}

#[tokio::test]
async fn test_apply_all_statements_succeed() {
    let db = DuckDbBackend::in_memory().unwrap();
    let audit = AuditStore::new(&db, TABLE);
    audit.ensure_schema().await.unwrap();
    let runner = MigrationRunner::new(&db, &audit, "prod");

    let v1 = unit(
        "V1",
        &[
            ("a.sql", "CREATE TABLE a (id INT);"),
            ("b.sql", "CREATE TABLE b (id INT); INSERT INTO b VALUES (1);"),
        ],
    );
    let outcome = runner.apply(&v1).await;

    assert_eq!(outcome.state, UnitState::FullySucceeded);
    assert!(!outcome.failed());
    assert!(!outcome.degraded());
    assert_eq!(outcome.statements.len(), 2);
    assert!(db.relation_exists("a").await.unwrap());
    assert!(db.relation_exists("b").await.unwrap());

    let ledger = audit.success_ledger("prod").await.unwrap();
    let expected: whm_core::SuccessLedger =
        [("V1", "a.sql"), ("V1", "b.sql")].into_iter().collect();
    assert_eq!(ledger, expected);
}

#[tokio::test]
async fn test_failing_statement_does_not_stop_unit() {
    let db = DuckDbBackend::in_memory().unwrap();
    let audit = AuditStore::new(&db, TABLE);
    audit.ensure_schema().await.unwrap();
    let runner = MigrationRunner::new(&db, &audit, "prod");

    let v1 = unit(
        "V1",
        &[
            ("a.sql", "CREATE TABLE a (id INT);"),
            ("b.sql", "CREATE TABLE b (id INT"),
            ("c.sql", "CREATE TABLE c (id INT);"),
        ],
    );
    let outcome = runner.apply(&v1).await;

    assert_eq!(outcome.state, UnitState::PartiallyFailed);
    let statuses: Vec<_> = outcome.statements.iter().map(|s| s.status).collect();
    assert_eq!(
        statuses,
        vec![AuditStatus::Success, AuditStatus::Failed, AuditStatus::Success]
    );
    assert!(outcome.statements[1].error_message.is_some());
    // c.sql still ran after b.sql failed
    assert!(db.relation_exists("c").await.unwrap());

    let history = audit.history("prod", &HistoryFilter::default()).await.unwrap();
    assert_eq!(history.len(), 3);
    let failed: Vec<_> = history
        .iter()
        .filter(|r| r.status == AuditStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].file_name, "b.sql");
    assert!(failed[0].error_message.is_some());
}

#[tokio::test]
async fn test_nul_byte_statement_is_recorded_as_failed() {
    let db = DuckDbBackend::in_memory().unwrap();
    let audit = AuditStore::new(&db, TABLE);
    audit.ensure_schema().await.unwrap();
    let runner = MigrationRunner::new(&db, &audit, "prod");

    let v1 = unit(
        "V1",
        &[
            ("a.sql", "CREATE TABLE a (id INT);"),
            ("b.sql", "CREATE TABLE b\0 (id INT);"),
            ("c.sql", "CREATE TABLE c (id INT);"),
        ],
    );
    let v2 = unit("V2", &[("a.sql", "CREATE TABLE d (id INT);")]);
    let summary = runner.run_all(&[&v1, &v2]).await;

    let statuses: Vec<_> = summary.outcomes[0].statements.iter().map(|s| s.status).collect();
    assert_eq!(
        statuses,
        vec![AuditStatus::Success, AuditStatus::Failed, AuditStatus::Success]
    );
    assert!(summary.any_failed);
    assert_eq!(summary.outcomes[1].state, UnitState::FullySucceeded);
    assert!(db.relation_exists("d").await.unwrap());

    let failed = audit
        .history(
            "prod",
            &HistoryFilter {
                failed_only: true,
                ..HistoryFilter::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].file_name, "b.sql");
}

#[tokio::test]
async fn test_empty_unit_succeeds_without_records() {
    let db = DuckDbBackend::in_memory().unwrap();
    let audit = AuditStore::new(&db, TABLE);
    audit.ensure_schema().await.unwrap();
    let runner = MigrationRunner::new(&db, &audit, "prod");

    let outcome = runner.apply(&unit("V1_empty", &[])).await;

    assert_eq!(outcome.state, UnitState::FullySucceeded);
    assert!(outcome.statements.is_empty());
    assert!(audit
        .history("prod", &HistoryFilter::default())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_run_all_continues_after_failed_unit() {
    let db = DuckDbBackend::in_memory().unwrap();
    let audit = AuditStore::new(&db, TABLE);
    audit.ensure_schema().await.unwrap();
    let runner = MigrationRunner::new(&db, &audit, "prod");

    let v1 = unit("V1", &[("a.sql", "CREATE TABLE t1 (id INT);")]);
    let v10 = unit("V10", &[("a.sql", "SELECT * FROM missing_table;")]);
    let v2 = unit("V2", &[("a.sql", "CREATE TABLE t2 (id INT);")]);
    let summary = runner.run_all(&[&v1, &v10, &v2]).await;

    let order: Vec<_> = summary.outcomes.iter().map(|o| o.version.as_str()).collect();
    assert_eq!(order, vec!["V1", "V10", "V2"]);
    assert!(summary.any_failed);
    assert!(!summary.degraded);
    assert_eq!(summary.units_applied(), 3);
    assert_eq!(summary.statements_succeeded(), 2);
    assert_eq!(summary.statements_failed(), 1);
    assert!(db.relation_exists("t2").await.unwrap());

    let applied = audit.applied_versions("prod").await.unwrap();
    assert!(applied.contains("V1"));
    assert!(applied.contains("V2"));
    assert!(!applied.contains("V10"));
}

#[tokio::test]
async fn test_run_all_with_reports_each_statement_in_order() {
    let db = DuckDbBackend::in_memory().unwrap();
    let audit = AuditStore::new(&db, TABLE);
    audit.ensure_schema().await.unwrap();
    let runner = MigrationRunner::new(&db, &audit, "prod");

    let v1 = unit(
        "V1",
        &[("a.sql", "SELECT 1;"), ("b.sql", "SELECT 2;")],
    );
    let v2 = unit("V2", &[("a.sql", "SELEC 3;")]);

    let mut seen = Vec::new();
    let summary = runner
        .run_all_with(&[&v1, &v2], |unit, outcome| {
            seen.push(format!("{}/{}:{}", unit.version, outcome.file_name, outcome.status));
        })
        .await;

    assert!(summary.any_failed);
    assert_eq!(
        seen,
        vec!["V1/a.sql:SUCCESS", "V1/b.sql:SUCCESS", "V2/a.sql:FAILED"]
    );
}

#[tokio::test]
async fn test_run_all_with_nothing_pending() {
    let db = DuckDbBackend::in_memory().unwrap();
    let audit = AuditStore::new(&db, TABLE);
    audit.ensure_schema().await.unwrap();
    let runner = MigrationRunner::new(&db, &audit, "prod");

    let summary = runner.run_all(&[]).await;

    assert!(summary.outcomes.is_empty());
    assert!(!summary.any_failed);
    assert!(!summary.degraded);
}

#[tokio::test]
async fn test_audit_write_failure_marks_run_degraded() {
    let db = RejectingAuditWrites {
        inner: DuckDbBackend::in_memory().unwrap(),
        rejected: AtomicUsize::new(0),
    };
    let audit = AuditStore::new(&db, TABLE);
    audit.ensure_schema().await.unwrap();
    let runner = MigrationRunner::new(&db, &audit, "prod");

    let v1 = unit(
        "V1",
        &[
            ("a.sql", "CREATE TABLE a (id INT);"),
            ("b.sql", "CREATE TABLE b (id INT);"),
        ],
    );
    let summary = runner.run_all(&[&v1]).await;

    // Both statements still executed
    assert!(!summary.any_failed);
    assert!(summary.degraded);
    assert_eq!(summary.log_write_failures(), 2);
    assert_eq!(db.rejected.load(Ordering::SeqCst), 2);
    assert!(db.relation_exists("b").await.unwrap());

    let first = &summary.outcomes[0].statements[0];
    assert!(first.degraded());
    let message = first.log_write_error.as_deref().unwrap();
    assert!(message.contains("[A003]"));
    assert!(message.contains("V1/a.sql"));
}

#[test]
fn test_unit_state_display() {
    assert_eq!(UnitState::Pending.to_string(), "pending");
    assert_eq!(UnitState::FullySucceeded.to_string(), "succeeded");
    assert_eq!(UnitState::PartiallyFailed.to_string(), "failed");
}
