//! Sync coordinator - one full sync cycle
//!
//! A cycle runs in two phases against the same rate limiter:
//! - (a) fetch the roster of every tracked group and refresh its members
//!   with their roster rank
//! - (b) refresh every other stored entity, so members that left a group or
//!   never had one stay current and the staleness policy keeps applying
//!
//! Each cycle is recorded as a row in `sync_runs`.

use crate::config::Config;
use crate::crawler::{FetchOutcome, Fetcher};
use crate::model::GroupKey;
use crate::storage::{lock_storage, RunCounts, RunStatus, Storage};
use crate::sync::{BatchReport, Synchronizer};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

/// What happened during one sync cycle
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Row id in `sync_runs`, if it could be recorded
    pub run_id: Option<i64>,
    pub groups_crawled: usize,
    pub groups_skipped: usize,
    pub roster: BatchReport,
    pub tracked: BatchReport,
}

impl CycleReport {
    pub fn counts(&self) -> RunCounts {
        RunCounts {
            synced: (self.roster.synced() + self.tracked.synced()) as u64,
            failed: (self.roster.failed + self.tracked.failed) as u64,
            deleted: (self.roster.deleted + self.tracked.deleted) as u64,
            runs_logged: (self.roster.runs_logged + self.tracked.runs_logged) as u64,
        }
    }
}

/// Main sync coordinator structure
pub struct Coordinator<S> {
    config: Arc<Config>,
    config_hash: String,
    fetcher: Arc<Fetcher>,
    synchronizer: Arc<Synchronizer<S>>,
}

impl<S: Storage + Send + 'static> Coordinator<S> {
    pub fn new(
        config: Arc<Config>,
        config_hash: String,
        fetcher: Arc<Fetcher>,
        synchronizer: Arc<Synchronizer<S>>,
    ) -> Self {
        Self {
            config,
            config_hash,
            fetcher,
            synchronizer,
        }
    }

    pub fn synchronizer(&self) -> &Arc<Synchronizer<S>> {
        &self.synchronizer
    }

    /// Groups crawled every cycle: configured groups plus every room default
    pub fn tracked_groups(&self) -> Vec<GroupKey> {
        let mut groups: BTreeSet<GroupKey> = self
            .config
            .groups
            .iter()
            .map(|g| GroupKey::new(&g.name, &g.realm, &g.region))
            .collect();

        match lock_storage(self.synchronizer.storage()).and_then(|s| s.list_group_defaults()) {
            Ok(defaults) => groups.extend(defaults.into_iter().map(|d| d.group)),
            Err(e) => tracing::error!("Failed to load group defaults: {}", e),
        }

        groups.into_iter().collect()
    }

    /// Fetches one roster and refreshes its members
    ///
    /// Returns `None` when the roster itself could not be fetched.
    pub async fn crawl_group(&self, group: &GroupKey) -> Option<BatchReport> {
        match self.fetcher.fetch_roster(group).await {
            FetchOutcome::Found(members) => {
                tracing::debug!("Roster of {} has {} eligible members", group, members.len());
                Some(self.synchronizer.sync_roster(members, &group.region).await)
            }
            other => {
                let reason = match other.into_result() {
                    Ok(_) => String::new(),
                    Err(failure) => failure.to_string(),
                };
                tracing::warn!("Skipping {}, roster unavailable: {}", group, reason);
                None
            }
        }
    }

    /// Runs one full sync cycle
    ///
    /// Failures are logged and counted; nothing here stops the scheduler.
    pub async fn run_cycle(&self) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport {
            run_id: self.start_run(),
            ..Default::default()
        };

        tracing::info!("Starting sync cycle {:?}", report.run_id);

        for group in self.tracked_groups() {
            match self.crawl_group(&group).await {
                Some(batch) => {
                    report.groups_crawled += 1;
                    report.roster.merge(batch);
                }
                None => report.groups_skipped += 1,
            }
        }

        report.tracked = self.synchronizer.sync_tracked(&report.roster.visited).await;

        let counts = report.counts();
        if let Some(run_id) = report.run_id {
            let finished = lock_storage(self.synchronizer.storage())
                .and_then(|mut s| s.finish_run(run_id, RunStatus::Completed, &counts));
            if let Err(e) = finished {
                tracing::error!("Failed to record end of sync run {}: {}", run_id, e);
            }
        }

        tracing::info!(
            synced = counts.synced,
            failed = counts.failed,
            deleted = counts.deleted,
            runs_logged = counts.runs_logged,
            groups = report.groups_crawled,
            skipped = report.groups_skipped,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Sync cycle complete"
        );

        report
    }

    /// Closes sync runs left open by an abandoned cycle
    pub fn mark_interrupted(&self) -> usize {
        match lock_storage(self.synchronizer.storage()).and_then(|mut s| s.mark_interrupted_runs()) {
            Ok(count) => count,
            Err(e) => {
                tracing::error!("Failed to mark interrupted sync runs: {}", e);
                0
            }
        }
    }

    fn start_run(&self) -> Option<i64> {
        match lock_storage(self.synchronizer.storage()).and_then(|mut s| s.create_run(&self.config_hash)) {
            Ok(run_id) => Some(run_id),
            Err(e) => {
                tracing::error!("Failed to record sync run: {}", e);
                None
            }
        }
    }
}
