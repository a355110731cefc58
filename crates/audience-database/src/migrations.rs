//! Database migrations.
//!
//! Migrations are run in order and tracked in the `migrations` table.

use crate::DatabaseResult;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> DatabaseResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    debug!(current_version, target_version = CURRENT_VERSION, "Running migrations");

    if current_version < 1 {
        migrate_v1_data_store(conn)?;
    }
    if current_version < 2 {
        migrate_v2_signal_hits(conn)?;
    }

    Ok(())
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> DatabaseResult<()> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: key-value table for visitor state.
fn migrate_v1_data_store(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v1: data store");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS data_store (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        ",
    )?;

    record_migration(conn, 1, "data_store")
}

/// V2: durable hit queue. `position` gives insertion order.
fn migrate_v2_signal_hits(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v2: signal hits");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS signal_hits (
            position INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            url TEXT NOT NULL,
            timeout_secs INTEGER NOT NULL,
            event_sequence INTEGER,
            pair_id TEXT,
            event_json TEXT NOT NULL
        );
        ",
    )?;

    record_migration(conn, 2, "signal_hits")
}
