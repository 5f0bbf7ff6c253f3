//! Storage module for persisting sync data
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Tracked entity records and their lifecycle state
//! - The weekly activity log and the weekly reset
//! - Group defaults and small persisted settings
//! - Sync run bookkeeping

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::SyncError;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Settings key holding the persisted access token
pub const ACCESS_TOKEN_SETTING: &str = "access_token";

/// Settings key holding the ISO week of the last successful weekly reset
pub const RESET_MARKER_SETTING: &str = "last_reset_week";

/// Storage shared between the scheduler loops and command handlers
///
/// The lock is only held for synchronous database calls, never across an await.
pub type SharedStorage<S> = Arc<Mutex<S>>;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(SyncError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, SyncError> {
    SqliteStorage::new(path)
}

/// Locks shared storage, reporting a poisoned lock as a storage error
pub fn lock_storage<S>(storage: &Mutex<S>) -> StorageResult<MutexGuard<'_, S>> {
    storage
        .lock()
        .map_err(|e| StorageError::Database(format!("storage lock poisoned: {}", e)))
}

/// Represents a sync run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub counts: RunCounts,
}

/// Counters recorded when a sync run finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounts {
    pub synced: u64,
    pub failed: u64,
    pub deleted: u64,
    pub runs_logged: u64,
}

/// Rows touched by a weekly reset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetCounts {
    pub keys_cleared: usize,
    pub runs_deleted: usize,
}

/// Status of a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_roundtrip() {
        for status in &[
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Interrupted,
            RunStatus::Failed,
        ] {
            let parsed = RunStatus::from_db_string(status.to_db_string());
            assert_eq!(Some(*status), parsed);
        }
        assert_eq!(RunStatus::from_db_string("invalid"), None);
    }

    #[test]
    fn test_lock_storage_reports_poisoned_lock() {
        let shared: SharedStorage<u32> = Arc::new(Mutex::new(0));
        let poisoner = Arc::clone(&shared);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        let result = lock_storage(&shared);
        assert!(matches!(result, Err(StorageError::Database(_))));
    }
}
