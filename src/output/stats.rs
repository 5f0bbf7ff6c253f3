//! Statistics generation from the sync database
//!
//! This module provides functionality for extracting and displaying
//! sync statistics from the storage layer.

use crate::state::EntityState;
use crate::storage::{RunRecord, Storage};
use crate::SyncError;
use std::collections::HashMap;

/// Sync statistics summary
#[derive(Debug, Clone)]
pub struct SyncStatistics {
    /// Total number of tracked entities
    pub total_entities: u64,

    /// Count of entities by lifecycle state
    pub entities_by_state: HashMap<EntityState, u64>,

    /// Number of distinct groups entities belong to
    pub groups: u64,

    /// Rooms with group defaults
    pub rooms_with_defaults: u64,

    /// Entities with a pending key
    pub pending_keys: u64,

    /// Runs logged in the current weekly window
    pub weekly_runs: u64,

    /// Most recent sync cycle, if any
    pub latest_run: Option<RunRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(SyncStatistics)` - Successfully loaded statistics
/// * `Err(SyncError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<SyncStatistics, SyncError> {
    let total_entities = storage.count_entities()?;

    let mut entities_by_state = HashMap::new();
    for state in EntityState::persisted_states() {
        let count = storage.count_entities_by_state(state)?;
        if count > 0 {
            entities_by_state.insert(state, count);
        }
    }

    Ok(SyncStatistics {
        total_entities,
        entities_by_state,
        groups: storage.list_distinct_groups()?.len() as u64,
        rooms_with_defaults: storage.list_group_defaults()?.len() as u64,
        pending_keys: storage.count_pending_keys()?,
        weekly_runs: storage.count_weekly_runs()?,
        latest_run: storage.get_latest_run()?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &SyncStatistics) {
    println!("=== Sync Statistics ===\n");

    println!("Overview:");
    println!("  Tracked entities: {}", stats.total_entities);
    println!("  Groups: {}", stats.groups);
    println!("  Rooms with defaults: {}", stats.rooms_with_defaults);
    println!("  Pending keys: {}", stats.pending_keys);
    println!("  Runs logged this week: {}", stats.weekly_runs);
    println!();

    println!("Entities by State:");
    let mut state_counts: Vec<_> = stats.entities_by_state.iter().collect();
    state_counts.sort_by(|a, b| b.1.cmp(a.1));

    for (state, count) in state_counts {
        println!(
            "  {}: {} ({:.1}%)",
            state,
            count,
            percentage(*count, stats.total_entities)
        );
    }
    println!();

    match &stats.latest_run {
        Some(run) => {
            println!("Latest Sync Run (#{}):", run.id);
            println!("  Status: {}", run.status.to_db_string());
            println!("  Started: {}", run.started_at);
            if let Some(finished) = &run.finished_at {
                println!("  Finished: {}", finished);
            }
            println!(
                "  Synced: {}, failed: {}, deleted: {}, runs logged: {}",
                run.counts.synced, run.counts.failed, run.counts.deleted, run.counts.runs_logged
            );
            println!("  Config hash: {}", run.config_hash);
        }
        None => println!("No sync runs recorded yet."),
    }
}

fn percentage(count: u64, total: u64) -> f64 {
    if total > 0 {
        (count as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}
