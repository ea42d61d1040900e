//! DuckDB warehouse backend

use crate::error::{DbError, DbResult};
use crate::traits::{Database, Row};
use async_trait::async_trait;
use duckdb::types::ValueRef;
use duckdb::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use whm_core::sql_utils::escape_sql_string;

/// DuckDB warehouse backend
pub struct DuckDbBackend {
    conn: Mutex<Connection>,
}

impl DuckDbBackend {
    /// Create a new in-memory DuckDB connection
    pub fn in_memory() -> DbResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create a new DuckDB connection from a file path
    pub fn from_path(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| DbError::ConnectionError(format!("{}: {}", e, path.display())))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create from path string (handles :memory: special case)
    pub fn new(path: &str) -> DbResult<Self> {
        if path == ":memory:" {
            Self::in_memory()
        } else {
            Self::from_path(Path::new(path))
        }
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))
    }

    /// Execute SQL synchronously
    fn execute_sync(&self, sql: &str) -> DbResult<usize> {
        reject_nul(sql)?;
        let conn = self.lock()?;
        conn.execute(sql, [])
            .map_err(|e| DbError::ExecutionError(e.to_string()))
    }

    /// Execute batch SQL synchronously
    fn execute_batch_sync(&self, sql: &str) -> DbResult<()> {
        reject_nul(sql)?;
        let conn = self.lock()?;
        conn.execute_batch(sql)
            .map_err(|e| DbError::ExecutionError(e.to_string()))
    }

    /// Collect every row of a query synchronously
    fn query_rows_sync(&self, sql: &str) -> DbResult<Vec<Row>> {
        reject_nul(sql)?;
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;

        // Column count is read per row: DuckDB panics on
        // `stmt.column_count()` before the statement has executed.
        let rows = stmt
            .query_map([], |row| {
                let col_count = row.as_ref().column_count();
                Ok((0..col_count)
                    .map(|i| get_column_as_string(row, i))
                    .collect::<Row>())
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Check if relation exists synchronously
    fn relation_exists_sync(&self, name: &str) -> DbResult<bool> {
        reject_nul(name)?;
        let parts: Vec<&str> = name.split('.').collect();
        let (catalog, schema, table) = match parts.as_slice() {
            [table] => (None, "main", *table),
            [schema, table] => (None, *schema, *table),
            [catalog, schema, table] => (Some(*catalog), *schema, *table),
            _ => {
                return Err(DbError::ExecutionError(format!(
                    "invalid relation name: {name}"
                )))
            }
        };

        let mut sql = format!(
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE lower(table_schema) = lower('{}') AND lower(table_name) = lower('{}')",
            escape_sql_string(schema),
            escape_sql_string(table)
        );
        if let Some(catalog) = catalog {
            sql.push_str(&format!(
                " AND lower(table_catalog) = lower('{}')",
                escape_sql_string(catalog)
            ));
        }

        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(&sql, [], |row| row.get(0))
            .map_err(|e| DbError::ExecutionError(e.to_string()))?;

        Ok(count > 0)
    }
}

/// DuckDB takes SQL as a C string and panics on an interior NUL byte.
fn reject_nul(sql: &str) -> DbResult<()> {
    if sql.contains('\0') {
        return Err(DbError::ExecutionError("SQL contains a NUL byte".to_string()));
    }
    Ok(())
}

/// Read a column value as text, trying the DuckDB types a row may hold.
///
/// Integer columns come back as `Err` for `String`, so the numeric and
/// boolean readers are tried in turn. Timestamps should be cast to VARCHAR
/// in the query.
fn get_column_as_string(row: &duckdb::Row<'_>, idx: usize) -> Option<String> {
    if matches!(row.get_ref(idx), Ok(ValueRef::Null)) {
        return None;
    }
    if let Ok(s) = row.get::<_, String>(idx) {
        return Some(s);
    }
    if let Ok(n) = row.get::<_, i64>(idx) {
        return Some(n.to_string());
    }
    if let Ok(f) = row.get::<_, f64>(idx) {
        return Some(f.to_string());
    }
    if let Ok(b) = row.get::<_, bool>(idx) {
        return Some(b.to_string());
    }
    log::debug!("Column {} has a type that cannot be rendered as text", idx);
    None
}

#[async_trait]
impl Database for DuckDbBackend {
    async fn execute(&self, sql: &str) -> DbResult<usize> {
        self.execute_sync(sql)
    }

    async fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.execute_batch_sync(sql)
    }

    async fn query_rows(&self, sql: &str) -> DbResult<Vec<Row>> {
        self.query_rows_sync(sql)
    }

    async fn relation_exists(&self, name: &str) -> DbResult<bool> {
        self.relation_exists_sync(name)
    }

    async fn create_schema_if_not_exists(&self, schema: &str) -> DbResult<()> {
        let sql = format!("CREATE SCHEMA IF NOT EXISTS {}", schema);
        self.execute_sync(&sql)?;
        Ok(())
    }

    fn db_type(&self) -> &'static str {
        "duckdb"
    }
}

#[cfg(test)]
#[path = "duckdb_test.rs"]
mod tests;
