use rusqlite::Connection;

use crate::error::StorageError;

pub const SCHEMA_VERSION: i32 = 1;

/// SQL expression for "now" in milliseconds, shared by column defaults and updates.
pub(crate) const NOW_MS: &str = "CAST(unixepoch('now','subsec') * 1000 AS INTEGER)";

pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA cache_size = -32000;
    ",
    )?;
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, unixepoch())",
        [SCHEMA_VERSION],
    )?;
    Ok(())
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS projects (
    project_id BLOB PRIMARY KEY CHECK (length(project_id) = 16),
    name TEXT NOT NULL,
    created_at INTEGER NOT NULL DEFAULT (CAST(unixepoch('now','subsec') * 1000 AS INTEGER))
);

CREATE TABLE IF NOT EXISTS records (
    record_id BLOB PRIMARY KEY CHECK (length(record_id) = 16),
    collection TEXT NOT NULL,
    project_id BLOB NOT NULL REFERENCES projects (project_id),
    natural_key TEXT NOT NULL,
    label TEXT NOT NULL,
    reference_id BLOB REFERENCES records (record_id),
    created_at INTEGER NOT NULL DEFAULT (CAST(unixepoch('now','subsec') * 1000 AS INTEGER)),
    updated_at INTEGER NOT NULL DEFAULT (CAST(unixepoch('now','subsec') * 1000 AS INTEGER)),
    UNIQUE (collection, project_id, natural_key)
);
CREATE INDEX IF NOT EXISTS idx_records_reference ON records (reference_id) WHERE reference_id IS NOT NULL;

CREATE TABLE IF NOT EXISTS record_fields (
    record_id BLOB NOT NULL REFERENCES records (record_id) ON DELETE CASCADE,
    field_key TEXT NOT NULL,
    value BLOB NOT NULL,
    PRIMARY KEY (record_id, field_key)
);

CREATE TABLE IF NOT EXISTS curves (
    curve_id BLOB PRIMARY KEY CHECK (length(curve_id) = 16),
    project_id BLOB NOT NULL REFERENCES projects (project_id),
    name TEXT NOT NULL,
    created_at INTEGER NOT NULL DEFAULT (CAST(unixepoch('now','subsec') * 1000 AS INTEGER)),
    updated_at INTEGER NOT NULL DEFAULT (CAST(unixepoch('now','subsec') * 1000 AS INTEGER))
);

CREATE TABLE IF NOT EXISTS curve_points (
    curve_id BLOB NOT NULL REFERENCES curves (curve_id) ON DELETE CASCADE,
    point_order INTEGER NOT NULL CHECK (point_order >= 1),
    primary_value REAL NOT NULL CHECK (primary_value >= 0),
    secondary_value REAL NOT NULL CHECK (secondary_value >= 0),
    PRIMARY KEY (curve_id, point_order)
);
";
