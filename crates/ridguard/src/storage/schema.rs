//! `SQLite` schema definitions for the preference store.

/// SQL statement to create the preferences table.
///
/// `value` has no declared type so `SQLite` keeps whatever representation was
/// written (integer or text); `kind` records the logical type.
pub const CREATE_PREFERENCES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS preferences (
    key TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    value,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[CREATE_PREFERENCES_TABLE, CREATE_METADATA_TABLE];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_not_empty() {
        assert!(!SCHEMA_STATEMENTS.is_empty());
        for stmt in SCHEMA_STATEMENTS {
            assert!(!stmt.is_empty());
        }
    }

    #[test]
    fn test_preferences_table_columns() {
        assert!(CREATE_PREFERENCES_TABLE.contains("key TEXT PRIMARY KEY"));
        assert!(CREATE_PREFERENCES_TABLE.contains("kind TEXT NOT NULL"));
        assert!(CREATE_PREFERENCES_TABLE.contains("value,"));
    }

    #[test]
    fn test_create_metadata_table_structure() {
        assert!(CREATE_METADATA_TABLE.contains("key TEXT PRIMARY KEY"));
        assert!(CREATE_METADATA_TABLE.contains("value TEXT NOT NULL"));
    }
}
