//! SQL string helpers
//!
//! The warehouse client only accepts SQL text, so literal values and the
//! configured audit table name are embedded directly. These helpers keep that
//! safe.

/// Escape a SQL string literal value by doubling single quotes.
///
/// This is for use inside single-quoted SQL string literals, not identifiers.
pub fn escape_sql_string(value: &str) -> String {
    value.replace('\'', "''")
}

/// Render an optional value as a quoted SQL literal or `NULL`.
///
/// # Examples
/// ```
/// use whm_core::sql_utils::sql_literal;
/// assert_eq!(sql_literal(Some("it's")), "'it''s'");
/// assert_eq!(sql_literal(None), "NULL");
/// ```
pub fn sql_literal(value: Option<&str>) -> String {
    match value {
        Some(v) => format!("'{}'", escape_sql_string(v)),
        None => "NULL".to_string(),
    }
}

/// Split a potentially qualified table name into (qualifier, table).
///
/// Uses the last `.` as the separator. Returns `None` for the qualifier when
/// the name is unqualified.
///
/// # Examples
/// ```
/// use whm_core::sql_utils::split_qualified_name;
/// assert_eq!(split_qualified_name("logs"), (None, "logs"));
/// assert_eq!(split_qualified_name("migration.logs"), (Some("migration"), "logs"));
/// assert_eq!(split_qualified_name("db.dbo.logs"), (Some("db.dbo"), "logs"));
/// ```
pub fn split_qualified_name(name: &str) -> (Option<&str>, &str) {
    match name.rfind('.') {
        Some(pos) => (Some(&name[..pos]), &name[pos + 1..]),
        None => (None, name),
    }
}

/// Check that `name` is a plain (unquoted) identifier with at most three
/// dot-separated parts, e.g. `MIGRATION.DBO.MIGRATION_LOGS`.
pub fn is_valid_qualified_name(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.is_empty() || parts.len() > 3 {
        return false;
    }
    parts.iter().all(|part| is_valid_identifier(part))
}

fn is_valid_identifier(part: &str) -> bool {
    let mut chars = part.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}
