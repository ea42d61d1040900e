//! Migration catalog discovery
//!
//! The catalog root holds one entry per version. A directory is a unit whose
//! statement files are the matching files inside it; a matching file at the
//! root is a single-statement unit named after the file. Units and their
//! statements are ordered by byte-wise lexicographic comparison of names, so
//! `V10` sorts before `V2`.

use crate::error::{CoreError, CoreResult};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// One SQL file belonging to a migration unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementSource {
    /// Base file name, used in logs and audit rows
    pub file_name: String,

    /// Path the SQL was read from
    pub path: PathBuf,

    /// File contents
    #[serde(skip)]
    pub sql: String,
}

/// One version's worth of migration work
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationUnit {
    /// Version identifier (folder or file name)
    pub version: String,

    /// Label written to the `db_name` audit column
    pub db_name: String,

    /// Statement sources in execution order
    pub statements: Vec<StatementSource>,
}

impl MigrationUnit {
    /// File names of every statement, in execution order
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.statements.iter().map(|s| s.file_name.as_str())
    }

    /// Returns true when the unit has no statement files
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// Ordered set of migration units discovered under a root directory
#[derive(Debug, Clone)]
pub struct MigrationCatalog {
    root: PathBuf,
    units: Vec<MigrationUnit>,
}

impl MigrationCatalog {
    /// Enumerate the units under `root`.
    ///
    /// Every unit is labelled with `db_name`. Hidden entries are skipped, as
    /// are root-level files that do not match `pattern`.
    pub fn discover(root: &Path, db_name: &str, pattern: &glob::Pattern) -> CoreResult<Self> {
        if !root.exists() {
            return Err(discovery_error(root, "directory does not exist"));
        }
        if !root.is_dir() {
            return Err(discovery_error(root, "not a directory"));
        }

        let mut units = Vec::new();
        for (name, path) in sorted_entries(root)? {
            if path.is_dir() {
                let statements = discover_statements(&path, pattern)?;
                units.push(MigrationUnit {
                    version: name,
                    db_name: db_name.to_string(),
                    statements,
                });
            } else if pattern.matches(&name) {
                let statement = read_statement(&path, name.clone())?;
                units.push(MigrationUnit {
                    version: name,
                    db_name: db_name.to_string(),
                    statements: vec![statement],
                });
            } else {
                log::debug!("Ignoring non-migration file {}", path.display());
            }
        }

        Ok(Self::from_units(root, units))
    }

    /// Build a catalog from already-constructed units, sorting them by version.
    pub fn from_units(root: impl Into<PathBuf>, mut units: Vec<MigrationUnit>) -> Self {
        units.sort_by(|a, b| a.version.cmp(&b.version));
        Self {
            root: root.into(),
            units,
        }
    }

    /// The directory the catalog was discovered from
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All units in version order
    pub fn units(&self) -> &[MigrationUnit] {
        &self.units
    }

    /// All versions in order
    pub fn versions(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.version.as_str()).collect()
    }

    /// Number of units
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns true when no units were discovered
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

fn discovery_error(path: &Path, reason: impl Into<String>) -> CoreError {
    CoreError::Discovery {
        path: path.display().to_string(),
        reason: reason.into(),
    }
}

/// List the non-hidden children of `dir` as (name, path), sorted by name.
fn sorted_entries(dir: &Path) -> CoreResult<Vec<(String, PathBuf)>> {
    let entries = std::fs::read_dir(dir).map_err(|e| discovery_error(dir, e.to_string()))?;

    let mut children = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| discovery_error(dir, e.to_string()))?;
        let path = entry.path();
        let name = entry.file_name().into_string().map_err(|raw| {
            discovery_error(
                dir,
                format!("entry name is not valid UTF-8: {}", raw.to_string_lossy()),
            )
        })?;
        if name.starts_with('.') {
            continue;
        }
        children.push((name, path));
    }

    children.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(children)
}

/// Collect the matching statement files directly inside a version directory
fn discover_statements(
    dir: &Path,
    pattern: &glob::Pattern,
) -> CoreResult<Vec<StatementSource>> {
    let mut statements = Vec::new();
    for (name, path) in sorted_entries(dir)? {
        if path.is_dir() || !pattern.matches(&name) {
            continue;
        }
        statements.push(read_statement(&path, name)?);
    }

    if statements.is_empty() {
        log::warn!("Migration folder {} contains no statement files", dir.display());
    }
    Ok(statements)
}

fn read_statement(path: &Path, file_name: String) -> CoreResult<StatementSource> {
    let sql = std::fs::read_to_string(path)
        .map_err(|e| discovery_error(path, format!("failed to read statement file: {e}")))?;
    Ok(StatementSource {
        file_name,
        path: path.to_path_buf(),
        sql,
    })
}

#[cfg(test)]
#[path = "catalog_test.rs"]
mod tests;
