//! Preference schema migrations.
//!
//! Version 1 is the base schema. Version 2 renames option keys written by
//! earlier releases, which carried a `ridguard_` prefix and a few different
//! names, to the current namespace.

use rusqlite::Connection;

use crate::error::{Error, Result};

use super::schema::SCHEMA_STATEMENTS;

/// The current schema version.
pub const CURRENT_VERSION: i32 = 2;

/// Key used to store the schema version in the metadata table.
const VERSION_KEY: &str = "schema_version";

/// Legacy option keys and their current names.
const LEGACY_KEYS: &[(&str, &str)] = &[
    ("ridguard_radius_m", "radius_m"),
    ("ridguard_altitude_enabled", "altitude_window_enabled"),
    ("ridguard_altitude_min", "altitude_min_m"),
    ("ridguard_altitude_max", "altitude_max_m"),
    ("ridguard_cooldown_s", "cooldown_s"),
    ("ridguard_silence_until", "silence_until"),
    ("ridguard_ignore_ids", "ignore_ids"),
    ("ridguard_log_retention_hours", "log_retention_hours"),
    ("ridguard_map_enabled", "map_enabled"),
];

/// Legacy prefix of temporary-ignore keys.
const LEGACY_IGNORE_UNTIL_PREFIX: &str = "ridguard_ignore_until_";

/// Initialize the preference schema.
///
/// Creates all tables if they don't exist, then runs any pending migrations.
///
/// # Errors
///
/// Returns an error if schema creation or migration fails.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    for statement in SCHEMA_STATEMENTS {
        conn.execute(statement, [])?;
    }

    let version = get_schema_version(conn)?;
    if version < CURRENT_VERSION {
        run_migrations(conn, version)?;
    }

    Ok(())
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (fresh database).
fn get_schema_version(conn: &Connection) -> Result<i32> {
    let result: std::result::Result<String, rusqlite::Error> = conn.query_row(
        "SELECT value FROM metadata WHERE key = ?1",
        [VERSION_KEY],
        |row| row.get(0),
    );

    match result {
        Ok(value) => value.parse().map_err(|_| Error::PreferenceMigration {
            message: format!("invalid schema version: {value}"),
        }),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
        Err(e) => Err(e.into()),
    }
}

/// Set the schema version in the database.
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
        (VERSION_KEY, version.to_string()),
    )?;
    Ok(())
}

/// Run migrations from the given version to the current version.
fn run_migrations(conn: &Connection, from_version: i32) -> Result<()> {
    let mut current = from_version;

    while current < CURRENT_VERSION {
        current += 1;
        run_migration(conn, current)?;
    }

    set_schema_version(conn, CURRENT_VERSION)?;
    Ok(())
}

/// Run a specific migration version.
fn run_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => set_schema_version(conn, 1),
        2 => migrate_v2(conn),
        _ => Err(Error::PreferenceMigration {
            message: format!("unknown migration version: {version}"),
        }),
    }
}

/// Rename legacy keys. A key already present under its current name wins.
fn migrate_v2(conn: &Connection) -> Result<()> {
    for (legacy, current) in LEGACY_KEYS {
        conn.execute(
            "UPDATE OR IGNORE preferences SET key = ?2 WHERE key = ?1",
            (legacy, current),
        )?;
    }
    let prefix_len = i64::try_from(LEGACY_IGNORE_UNTIL_PREFIX.len()).unwrap_or(i64::MAX);
    conn.execute(
        "UPDATE OR IGNORE preferences SET key = 'ignore_until_' || substr(key, ?1 + 1)
         WHERE substr(key, 1, ?1) = ?2",
        (prefix_len, LEGACY_IGNORE_UNTIL_PREFIX),
    )?;
    conn.execute(
        "DELETE FROM preferences WHERE substr(key, 1, 9) = 'ridguard_'",
        [],
    )?;
    set_schema_version(conn, 2)
}
