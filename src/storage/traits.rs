//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::model::{EntityKey, GroupDefaults, GroupKey, PendingKey, TrackedEntity, WeeklyRun};
use crate::state::EntityState;
use crate::storage::{ResetCounts, RunCounts, RunRecord, RunStatus};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Every call reports success or failure on its own; callers treat a failure
/// as "try again next cycle". Multi-row writes are atomic.
pub trait Storage {
    // ===== Entities =====

    /// Looks up an entity by its normalized key
    fn get_entity(&self, key: &EntityKey) -> StorageResult<Option<TrackedEntity>>;

    /// Inserts or replaces an entity together with newly observed weekly runs
    ///
    /// Both writes happen in one transaction. Runs already logged for the same
    /// (run id, entity name) are skipped.
    ///
    /// # Returns
    ///
    /// The number of weekly runs that were newly inserted
    fn save_entity(&mut self, entity: &TrackedEntity, runs: &[WeeklyRun]) -> StorageResult<usize>;

    /// Records a failed fetch without touching the synced fields
    fn mark_entity_state(
        &mut self,
        key: &EntityKey,
        state: EntityState,
        error: Option<&str>,
    ) -> StorageResult<()>;

    /// Deletes an entity, returning whether a record existed
    fn delete_entity(&mut self, key: &EntityKey) -> StorageResult<bool>;

    /// Lists every tracked entity
    fn list_entities(&self) -> StorageResult<Vec<TrackedEntity>>;

    /// Lists members of a group, optionally filtered by rank
    fn list_group_members(
        &self,
        group: &GroupKey,
        ranks: Option<&[u32]>,
    ) -> StorageResult<Vec<TrackedEntity>>;

    /// Lists every distinct (group, realm, region) among tracked entities
    fn list_distinct_groups(&self) -> StorageResult<Vec<GroupKey>>;

    // ===== Pending keys =====

    /// Sets or clears the pending key of an entity, returning whether it exists
    fn set_pending_key(
        &mut self,
        key: &EntityKey,
        pending: Option<&PendingKey>,
    ) -> StorageResult<bool>;

    // ===== Weekly activity =====

    /// Lists the weekly runs logged for an entity name
    fn list_weekly_runs(&self, entity_name: &str) -> StorageResult<Vec<WeeklyRun>>;

    /// Clears every pending key and every weekly run in one transaction
    ///
    /// When `week` is given it is stored as the reset marker in the same
    /// transaction. On failure nothing changes.
    fn weekly_reset(&mut self, week: Option<&str>) -> StorageResult<ResetCounts>;

    // ===== Group defaults =====

    fn upsert_group_defaults(&mut self, defaults: &GroupDefaults) -> StorageResult<()>;

    fn get_group_defaults(&self, room_id: &str) -> StorageResult<Option<GroupDefaults>>;

    fn list_group_defaults(&self) -> StorageResult<Vec<GroupDefaults>>;

    // ===== Settings =====

    fn get_setting(&self, name: &str) -> StorageResult<Option<String>>;

    fn put_setting(&mut self, name: &str, value: &str) -> StorageResult<()>;

    // ===== Sync runs =====

    /// Creates a new sync run in the running state
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Finishes a run with a final status and its counters
    fn finish_run(&mut self, run_id: i64, status: RunStatus, counts: &RunCounts)
        -> StorageResult<()>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Marks runs left in the running state (e.g. after a crash) as interrupted
    fn mark_interrupted_runs(&mut self) -> StorageResult<usize>;

    // ===== Statistics =====

    fn count_entities(&self) -> StorageResult<u64>;

    fn count_entities_by_state(&self, state: EntityState) -> StorageResult<u64>;

    fn count_pending_keys(&self) -> StorageResult<u64>;

    fn count_weekly_runs(&self) -> StorageResult<u64>;
}
