//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::model::{EntityKey, GroupDefaults, GroupKey, PendingKey, TrackedEntity, WeeklyRun};
use crate::state::EntityState;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    ResetCounts, RunCounts, RunRecord, RunStatus, RESET_MARKER_SETTING,
};
use crate::SyncError;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const ENTITY_COLUMNS: &str = "name, realm, region, display_name, group_name, group_realm,
    group_rank, class, item_level, score, rank_overall, rank_class, weekly_high,
    previous_weekly_high, pending_key, pending_key_level, state, last_synced, last_error,
    created_at";

const RUN_COLUMNS: &str =
    "id, started_at, finished_at, config_hash, status, synced, failed, deleted, runs_logged";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(SyncError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, SyncError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, SyncError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Raw connection access for tests that need to inject failures
    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn parse_timestamp(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn entity_from_row(row: &Row<'_>) -> rusqlite::Result<TrackedEntity> {
    let pending_dungeon: Option<String> = row.get(14)?;
    let pending_level: Option<u32> = row.get(15)?;
    let pending_key = match (pending_dungeon, pending_level) {
        (Some(dungeon), Some(level)) => Some(PendingKey { dungeon, level }),
        _ => None,
    };

    let state_str: String = row.get(16)?;
    let state = EntityState::from_db_string(&state_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            16,
            Type::Text,
            format!("unknown entity state '{}'", state_str).into(),
        )
    })?;

    Ok(TrackedEntity {
        key: EntityKey {
            name: row.get(0)?,
            realm: row.get(1)?,
            region: row.get(2)?,
        },
        display_name: row.get(3)?,
        group_name: row.get(4)?,
        group_realm: row.get(5)?,
        group_rank: row.get(6)?,
        class: row.get(7)?,
        item_level: row.get(8)?,
        score: row.get(9)?,
        rank_overall: row.get(10)?,
        rank_class: row.get(11)?,
        weekly_high: row.get(12)?,
        previous_weekly_high: row.get(13)?,
        pending_key,
        state,
        last_synced: parse_timestamp(17, row.get(17)?)?,
        last_error: row.get(18)?,
        created_at: parse_timestamp(19, row.get(19)?)?,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    let count = |idx: usize| -> rusqlite::Result<u64> { Ok(row.get::<_, i64>(idx)?.max(0) as u64) };

    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Interrupted),
        counts: RunCounts {
            synced: count(5)?,
            failed: count(6)?,
            deleted: count(7)?,
            runs_logged: count(8)?,
        },
    })
}

fn weekly_run_from_row(row: &Row<'_>) -> rusqlite::Result<WeeklyRun> {
    Ok(WeeklyRun {
        run_id: row.get(0)?,
        entity_name: row.get(1)?,
        dungeon: row.get(2)?,
        level: row.get(3)?,
        observed_at: parse_timestamp(4, row.get(4)?)?,
    })
}

fn group_defaults_from_row(row: &Row<'_>) -> rusqlite::Result<GroupDefaults> {
    Ok(GroupDefaults {
        room_id: row.get(0)?,
        room_name: row.get(1)?,
        group: GroupKey {
            name: row.get(2)?,
            realm: row.get(3)?,
            region: row.get(4)?,
        },
        updated_at: parse_timestamp(5, row.get(5)?)?,
    })
}

impl Storage for SqliteStorage {
    // ===== Entities =====

    fn get_entity(&self, key: &EntityKey) -> StorageResult<Option<TrackedEntity>> {
        let sql = format!(
            "SELECT {} FROM entities WHERE name = ?1 AND realm = ?2 AND region = ?3",
            ENTITY_COLUMNS
        );
        let entity = self
            .conn
            .query_row(&sql, params![key.name, key.realm, key.region], entity_from_row)
            .optional()?;
        Ok(entity)
    }

    fn save_entity(&mut self, entity: &TrackedEntity, runs: &[WeeklyRun]) -> StorageResult<usize> {
        let tx = self.conn.transaction()?;

        // The pending key is only written on insert; set_pending_key owns it afterwards
        tx.execute(
            "INSERT INTO entities (name, realm, region, display_name, group_name, group_realm,
                group_rank, class, item_level, score, rank_overall, rank_class, weekly_high,
                previous_weekly_high, pending_key, pending_key_level, state, last_synced,
                last_error, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                ?17, ?18, ?19, ?20)
             ON CONFLICT(name, realm, region) DO UPDATE SET
                display_name = excluded.display_name,
                group_name = excluded.group_name,
                group_realm = excluded.group_realm,
                group_rank = excluded.group_rank,
                class = excluded.class,
                item_level = excluded.item_level,
                score = excluded.score,
                rank_overall = excluded.rank_overall,
                rank_class = excluded.rank_class,
                weekly_high = excluded.weekly_high,
                previous_weekly_high = excluded.previous_weekly_high,
                state = excluded.state,
                last_synced = excluded.last_synced,
                last_error = excluded.last_error",
            params![
                entity.key.name,
                entity.key.realm,
                entity.key.region,
                entity.display_name,
                entity.group_name,
                entity.group_realm,
                entity.group_rank,
                entity.class,
                entity.item_level,
                entity.score,
                entity.rank_overall,
                entity.rank_class,
                entity.weekly_high,
                entity.previous_weekly_high,
                entity.pending_key.as_ref().map(|k| k.dungeon.as_str()),
                entity.pending_key.as_ref().map(|k| k.level),
                entity.state.to_db_string(),
                entity.last_synced.to_rfc3339(),
                entity.last_error,
                entity.created_at.to_rfc3339(),
            ],
        )?;

        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO weekly_runs (run_id, entity_name, dungeon, level, observed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for run in runs {
                inserted += stmt.execute(params![
                    run.run_id,
                    run.entity_name,
                    run.dungeon,
                    run.level,
                    run.observed_at.to_rfc3339(),
                ])?;
            }
        }

        tx.commit()?;
        Ok(inserted)
    }

    fn mark_entity_state(
        &mut self,
        key: &EntityKey,
        state: EntityState,
        error: Option<&str>,
    ) -> StorageResult<()> {
        if !state.is_persisted() {
            return Err(StorageError::Serialization(format!(
                "state '{}' is never persisted",
                state
            )));
        }

        let updated = self.conn.execute(
            "UPDATE entities SET state = ?1, last_error = ?2
             WHERE name = ?3 AND realm = ?4 AND region = ?5",
            params![state.to_db_string(), error, key.name, key.realm, key.region],
        )?;

        if updated == 0 {
            return Err(StorageError::EntityNotFound(key.to_string()));
        }
        Ok(())
    }

    fn delete_entity(&mut self, key: &EntityKey) -> StorageResult<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM entities WHERE name = ?1 AND realm = ?2 AND region = ?3",
            params![key.name, key.realm, key.region],
        )?;
        Ok(deleted > 0)
    }

    fn list_entities(&self) -> StorageResult<Vec<TrackedEntity>> {
        let sql = format!(
            "SELECT {} FROM entities ORDER BY region, realm, name",
            ENTITY_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let entities = stmt
            .query_map([], entity_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entities)
    }

    fn list_group_members(
        &self,
        group: &GroupKey,
        ranks: Option<&[u32]>,
    ) -> StorageResult<Vec<TrackedEntity>> {
        let sql = format!(
            "SELECT {} FROM entities
             WHERE group_name = ?1 AND group_realm = ?2 AND region = ?3
             ORDER BY group_rank, name",
            ENTITY_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let members = stmt
            .query_map(params![group.name, group.realm, group.region], entity_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let members = match ranks {
            Some(ranks) => members
                .into_iter()
                .filter(|m| m.group_rank.map_or(false, |r| ranks.contains(&r)))
                .collect(),
            None => members,
        };
        Ok(members)
    }

    fn list_distinct_groups(&self) -> StorageResult<Vec<GroupKey>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT group_name, group_realm, region FROM entities
             WHERE group_name != '' ORDER BY region, group_realm, group_name",
        )?;
        let groups = stmt
            .query_map([], |row| {
                Ok(GroupKey {
                    name: row.get(0)?,
                    realm: row.get(1)?,
                    region: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(groups)
    }

    // ===== Pending keys =====

    fn set_pending_key(
        &mut self,
        key: &EntityKey,
        pending: Option<&PendingKey>,
    ) -> StorageResult<bool> {
        let updated = self.conn.execute(
            "UPDATE entities SET pending_key = ?1, pending_key_level = ?2
             WHERE name = ?3 AND realm = ?4 AND region = ?5",
            params![
                pending.map(|k| k.dungeon.as_str()),
                pending.map(|k| k.level),
                key.name,
                key.realm,
                key.region
            ],
        )?;
        Ok(updated > 0)
    }

    // ===== Weekly activity =====

    fn list_weekly_runs(&self, entity_name: &str) -> StorageResult<Vec<WeeklyRun>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, entity_name, dungeon, level, observed_at FROM weekly_runs
             WHERE entity_name = ?1 ORDER BY level DESC, id",
        )?;
        let runs = stmt
            .query_map(params![entity_name], weekly_run_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    fn weekly_reset(&mut self, week: Option<&str>) -> StorageResult<ResetCounts> {
        let tx = self.conn.transaction()?;

        let keys_cleared = tx.execute(
            "UPDATE entities SET pending_key = NULL, pending_key_level = NULL
             WHERE pending_key IS NOT NULL OR pending_key_level IS NOT NULL",
            [],
        )?;
        let runs_deleted = tx.execute("DELETE FROM weekly_runs", [])?;

        if let Some(week) = week {
            tx.execute(
                "INSERT INTO settings (name, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(name) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![RESET_MARKER_SETTING, week, Utc::now().to_rfc3339()],
            )?;
        }

        tx.commit()?;
        Ok(ResetCounts {
            keys_cleared,
            runs_deleted,
        })
    }

    // ===== Group defaults =====

    fn upsert_group_defaults(&mut self, defaults: &GroupDefaults) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO group_defaults (room_id, room_name, group_name, group_realm, region, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(room_id) DO UPDATE SET
                room_name = excluded.room_name,
                group_name = excluded.group_name,
                group_realm = excluded.group_realm,
                region = excluded.region,
                updated_at = excluded.updated_at",
            params![
                defaults.room_id,
                defaults.room_name,
                defaults.group.name,
                defaults.group.realm,
                defaults.group.region,
                defaults.updated_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn get_group_defaults(&self, room_id: &str) -> StorageResult<Option<GroupDefaults>> {
        let defaults = self
            .conn
            .query_row(
                "SELECT room_id, room_name, group_name, group_realm, region, updated_at
                 FROM group_defaults WHERE room_id = ?1",
                params![room_id],
                group_defaults_from_row,
            )
            .optional()?;
        Ok(defaults)
    }

    fn list_group_defaults(&self) -> StorageResult<Vec<GroupDefaults>> {
        let mut stmt = self.conn.prepare(
            "SELECT room_id, room_name, group_name, group_realm, region, updated_at
             FROM group_defaults ORDER BY room_id",
        )?;
        let defaults = stmt
            .query_map([], group_defaults_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(defaults)
    }

    // ===== Settings =====

    fn get_setting(&self, name: &str) -> StorageResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put_setting(&mut self, name: &str, value: &str) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO settings (name, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![name, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    // ===== Sync runs =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO sync_runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        counts: &RunCounts,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE sync_runs SET status = ?1, finished_at = ?2, synced = ?3, failed = ?4,
             deleted = ?5, runs_logged = ?6 WHERE id = ?7",
            params![
                status.to_db_string(),
                now,
                counts.synced as i64,
                counts.failed as i64,
                counts.deleted as i64,
                counts.runs_logged as i64,
                run_id
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let sql = format!("SELECT {} FROM sync_runs WHERE id = ?1", RUN_COLUMNS);
        self.conn
            .query_row(&sql, params![run_id], run_from_row)
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let sql = format!(
            "SELECT {} FROM sync_runs ORDER BY id DESC LIMIT 1",
            RUN_COLUMNS
        );
        let run = self.conn.query_row(&sql, [], run_from_row).optional()?;
        Ok(run)
    }

    fn mark_interrupted_runs(&mut self) -> StorageResult<usize> {
        let updated = self.conn.execute(
            "UPDATE sync_runs SET status = ?1 WHERE status = ?2",
            params![
                RunStatus::Interrupted.to_db_string(),
                RunStatus::Running.to_db_string()
            ],
        )?;
        Ok(updated)
    }

    // ===== Statistics =====

    fn count_entities(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM entities", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_entities_by_state(&self, state: EntityState) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM entities WHERE state = ?1",
            params![state.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_pending_keys(&self) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM entities WHERE pending_key IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_weekly_runs(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM weekly_runs", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
