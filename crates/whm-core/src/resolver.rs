//! Pending-version resolution
//!
//! Diffs the catalog against the audit history. The catalog alone decides
//! ordering; history only filters.

use crate::catalog::{MigrationCatalog, MigrationUnit};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Versions and files with at least one SUCCESS audit record, for one
/// environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuccessLedger {
    files: BTreeMap<String, BTreeSet<String>>,
}

impl SuccessLedger {
    /// Create an empty ledger (fresh environment)
    pub fn new() -> Self {
        Self::default()
    }

    /// Note a SUCCESS record for `file_name` in `version`
    pub fn insert(&mut self, version: impl Into<String>, file_name: impl Into<String>) {
        self.files
            .entry(version.into())
            .or_default()
            .insert(file_name.into());
    }

    /// Returns true when nothing has ever succeeded
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Every version with at least one SUCCESS record
    pub fn versions(&self) -> HashSet<String> {
        self.files.keys().cloned().collect()
    }

    /// Whether every statement file of `unit` has a SUCCESS record.
    ///
    /// A unit with no statement files has nothing to apply and is always
    /// covered.
    pub fn covers(&self, unit: &MigrationUnit) -> bool {
        if unit.is_empty() {
            return true;
        }
        match self.files.get(&unit.version) {
            Some(succeeded) => unit.file_names().all(|f| succeeded.contains(f)),
            None => false,
        }
    }

    /// The applied set for `catalog`: versions whose every current statement
    /// file has succeeded at least once.
    pub fn applied_versions(&self, catalog: &MigrationCatalog) -> HashSet<String> {
        catalog
            .units()
            .iter()
            .filter(|unit| self.covers(unit))
            .map(|unit| unit.version.clone())
            .collect()
    }
}

impl<V, F> FromIterator<(V, F)> for SuccessLedger
where
    V: Into<String>,
    F: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (V, F)>>(iter: I) -> Self {
        let mut ledger = SuccessLedger::new();
        for (version, file_name) in iter {
            ledger.insert(version, file_name);
        }
        ledger
    }
}

/// Catalog units whose version is not in `applied`, in catalog order.
///
/// An empty `applied` set means every unit is pending.
pub fn pending<'a>(
    catalog: &'a MigrationCatalog,
    applied: &HashSet<String>,
) -> Vec<&'a MigrationUnit> {
    catalog
        .units()
        .iter()
        .filter(|unit| !applied.contains(&unit.version))
        .collect()
}

#[cfg(test)]
#[path = "resolver_test.rs"]
mod tests;
