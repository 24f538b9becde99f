//! Database schema and migrations.
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use crate::error::Result;
use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: analyses and their discrepancy children
    r#"
    CREATE TABLE IF NOT EXISTS analyses (
        id                  INTEGER PRIMARY KEY AUTOINCREMENT,
        correlation_id      TEXT NOT NULL,
        timestamp           TEXT NOT NULL,
        method              TEXT NOT NULL,
        path                TEXT NOT NULL,
        overall_match       TEXT NOT NULL,
        status_match        INTEGER NOT NULL,
        body_match          INTEGER NOT NULL,
        nightscout_status   INTEGER,
        nocturne_status     INTEGER,
        nightscout_ms       INTEGER NOT NULL,
        nocturne_ms         INTEGER NOT NULL,
        total_ms            INTEGER NOT NULL,
        summary             TEXT NOT NULL,
        selected_target     TEXT NOT NULL,
        selection_rationale TEXT NOT NULL,
        critical_count      INTEGER NOT NULL,
        major_count         INTEGER NOT NULL,
        minor_count         INTEGER NOT NULL,
        nightscout_missing  INTEGER NOT NULL,
        nocturne_missing    INTEGER NOT NULL,
        error_message       TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_analyses_timestamp ON analyses(timestamp);
    CREATE INDEX IF NOT EXISTS idx_analyses_path ON analyses(path);
    CREATE INDEX IF NOT EXISTS idx_analyses_overall ON analyses(overall_match);

    CREATE TABLE IF NOT EXISTS discrepancies (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        analysis_id      INTEGER NOT NULL REFERENCES analyses(id) ON DELETE CASCADE,
        position         INTEGER NOT NULL,
        kind             TEXT NOT NULL,
        severity         INTEGER NOT NULL,
        field_path       TEXT NOT NULL,
        nightscout_value TEXT,
        nocturne_value   TEXT,
        description      TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_discrepancies_analysis ON discrepancies(analysis_id);
    "#,
];

/// Applies any pending migrations.
pub fn migrate(conn: &Connection) -> Result<()> {
    let current: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    for (index, migration) in MIGRATIONS.iter().enumerate() {
        let version = index as i32 + 1;
        if version > current {
            conn.execute_batch(migration)?;
            conn.pragma_update(None, "user_version", version)?;
            tracing::debug!(version, "applied schema migration");
        }
    }
    Ok(())
}
