//! Output module for sync reports and statistics
//!
//! This module handles:
//! - Printing the counters of a finished sync cycle
//! - Recording and displaying database statistics

pub mod stats;

pub use stats::{load_statistics, print_statistics, SyncStatistics};

use crate::crawler::CycleReport;
use crate::sync::BatchReport;

/// Prints the outcome of one sync cycle to stdout
pub fn print_cycle_report(report: &CycleReport) {
    println!("=== Sync Cycle ===\n");

    match report.run_id {
        Some(run_id) => println!("Run: #{}", run_id),
        None => println!("Run: not recorded"),
    }
    println!(
        "Groups: {} crawled, {} skipped",
        report.groups_crawled, report.groups_skipped
    );
    println!();

    print_batch("Roster members", &report.roster);
    print_batch("Other tracked entities", &report.tracked);

    let counts = report.counts();
    println!(
        "Total: {} synced, {} failed, {} deleted, {} runs logged",
        counts.synced, counts.failed, counts.deleted, counts.runs_logged
    );
}

fn print_batch(title: &str, batch: &BatchReport) {
    println!("{} ({} visited):", title, batch.visited.len());
    println!("  Created: {}", batch.created);
    println!("  Updated: {}", batch.updated);
    println!("  Marked stale: {}", batch.marked_stale);
    println!("  Deleted: {}", batch.deleted);
    println!("  Failed: {}", batch.failed);
    println!();
}
