//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Roster-Sync database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track sync cycles
CREATE TABLE IF NOT EXISTS sync_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    synced INTEGER NOT NULL DEFAULT 0,
    failed INTEGER NOT NULL DEFAULT 0,
    deleted INTEGER NOT NULL DEFAULT 0,
    runs_logged INTEGER NOT NULL DEFAULT 0
);

-- Tracked entities, one row per normalized key
CREATE TABLE IF NOT EXISTS entities (
    name TEXT NOT NULL,
    realm TEXT NOT NULL,
    region TEXT NOT NULL,
    display_name TEXT NOT NULL,
    group_name TEXT NOT NULL DEFAULT '',
    group_realm TEXT NOT NULL DEFAULT '',
    group_rank INTEGER,
    class TEXT NOT NULL,
    item_level REAL NOT NULL DEFAULT 0,
    score REAL NOT NULL DEFAULT 0,
    rank_overall INTEGER,
    rank_class INTEGER,
    weekly_high INTEGER NOT NULL DEFAULT 0,
    previous_weekly_high INTEGER NOT NULL DEFAULT 0,
    pending_key TEXT,
    pending_key_level INTEGER,
    state TEXT NOT NULL,
    last_synced TEXT NOT NULL,
    last_error TEXT,
    created_at TEXT NOT NULL,
    PRIMARY KEY (name, realm, region)
);

CREATE INDEX IF NOT EXISTS idx_entities_group ON entities(group_name, group_realm, region);
CREATE INDEX IF NOT EXISTS idx_entities_state ON entities(state);

-- Weekly activity log, idempotent per (run_id, entity_name)
CREATE TABLE IF NOT EXISTS weekly_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL,
    entity_name TEXT NOT NULL,
    dungeon TEXT NOT NULL,
    level INTEGER NOT NULL,
    observed_at TEXT NOT NULL,
    UNIQUE(run_id, entity_name)
);

CREATE INDEX IF NOT EXISTS idx_weekly_runs_entity ON weekly_runs(entity_name);

-- Per chat room default group
CREATE TABLE IF NOT EXISTS group_defaults (
    room_id TEXT PRIMARY KEY,
    room_name TEXT NOT NULL,
    group_name TEXT NOT NULL,
    group_realm TEXT NOT NULL,
    region TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Small persisted values (access token, reset marker)
CREATE TABLE IF NOT EXISTS settings (
    name TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
