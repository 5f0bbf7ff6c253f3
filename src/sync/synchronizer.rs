use crate::crawler::{FetchFailure, Fetcher};
use crate::model::{
    normalize_component, EntityData, EntityKey, GroupKey, RosterMember, TrackedEntity, WeeklyRun,
};
use crate::state::EntityState;
use crate::storage::{lock_storage, SharedStorage, Storage, StorageResult};
use crate::sync::activity::derive_weekly_runs;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Acknowledgement returned to command handlers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    Done(String),
    Failed(String),
}

impl Ack {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Done(message) | Self::Failed(message) => message,
        }
    }
}

/// Result of writing freshly fetched data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Created { runs_logged: usize },
    Updated { runs_logged: usize },
    /// Nothing was written; the record is retried next cycle
    Failed(String),
}

/// Result of applying the staleness policy after a failed fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissOutcome {
    /// Unresolvable for longer than the staleness window
    Deleted,
    MarkedStale,
    /// There was no local record to act on
    Untracked,
    Failed(String),
}

/// Result of fetching and reconciling one entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Synced(SyncOutcome),
    Missed(MissOutcome),
}

/// Counters of a batch of refreshes
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub marked_stale: usize,
    pub failed: usize,
    pub runs_logged: usize,
    /// Every key attempted in this batch, whatever the outcome
    pub visited: HashSet<EntityKey>,
}

impl BatchReport {
    pub fn record(&mut self, key: EntityKey, outcome: &RefreshOutcome) {
        match outcome {
            RefreshOutcome::Synced(SyncOutcome::Created { runs_logged }) => {
                self.created += 1;
                self.runs_logged += runs_logged;
            }
            RefreshOutcome::Synced(SyncOutcome::Updated { runs_logged }) => {
                self.updated += 1;
                self.runs_logged += runs_logged;
            }
            RefreshOutcome::Missed(MissOutcome::Deleted) => self.deleted += 1,
            RefreshOutcome::Missed(MissOutcome::MarkedStale) => self.marked_stale += 1,
            RefreshOutcome::Missed(MissOutcome::Untracked) => {}
            RefreshOutcome::Synced(SyncOutcome::Failed(_))
            | RefreshOutcome::Missed(MissOutcome::Failed(_)) => self.failed += 1,
        }
        self.visited.insert(key);
    }

    pub fn merge(&mut self, other: BatchReport) {
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.marked_stale += other.marked_stale;
        self.failed += other.failed;
        self.runs_logged += other.runs_logged;
        self.visited.extend(other.visited);
    }

    /// Records written successfully
    pub fn synced(&self) -> usize {
        self.created + self.updated
    }
}

/// Reconciles fetched upstream data into storage
///
/// Every write is per entity. A failure for one entity is logged and reported
/// in its outcome; it never stops the rest of a batch.
pub struct Synchronizer<S> {
    pub(crate) storage: SharedStorage<S>,
    fetcher: Arc<Fetcher>,
    staleness: Duration,
}

impl<S: Storage + Send + 'static> Synchronizer<S> {
    pub fn new(storage: SharedStorage<S>, fetcher: Arc<Fetcher>, staleness_days: i64) -> Self {
        Self {
            storage,
            fetcher,
            staleness: Duration::days(staleness_days),
        }
    }

    pub fn storage(&self) -> &SharedStorage<S> {
        &self.storage
    }

    /// Writes freshly fetched data, creating the record if needed
    pub fn sync_entity(&self, data: &EntityData, rank: Option<u32>) -> SyncOutcome {
        self.sync_entity_at(data, rank, Utc::now())
    }

    /// [`Self::sync_entity`] with an explicit clock
    ///
    /// # Flow
    ///
    /// 1. Look up the record by normalized key
    /// 2. Create it, or overwrite every mutable field (last write wins)
    /// 3. Derive this week's activity records
    /// 4. Write record and new activity in one transaction
    pub fn sync_entity_at(
        &self,
        data: &EntityData,
        rank: Option<u32>,
        now: DateTime<Utc>,
    ) -> SyncOutcome {
        let runs = derive_weekly_runs(data, now);

        let mut storage = match lock_storage(&self.storage) {
            Ok(storage) => storage,
            Err(e) => return SyncOutcome::Failed(e.to_string()),
        };

        let existing = match storage.get_entity(&data.key) {
            Ok(existing) => existing,
            Err(e) => {
                error!("Failed to load {}: {}", data.key, e);
                return SyncOutcome::Failed(e.to_string());
            }
        };

        let (entity, created) = match existing {
            Some(mut entity) => {
                debug_assert!(entity.state.can_transition_to(EntityState::Tracked));
                entity.apply(data, rank, now);
                (entity, false)
            }
            None => (TrackedEntity::from_data(data, rank, now), true),
        };

        match storage.save_entity(&entity, &runs) {
            Ok(runs_logged) if created => {
                info!("Now tracking {}", data.key);
                SyncOutcome::Created { runs_logged }
            }
            Ok(runs_logged) => {
                debug!(runs_logged, "Updated {}", data.key);
                SyncOutcome::Updated { runs_logged }
            }
            Err(e) => {
                error!("Failed to save {}, rolled back: {}", data.key, e);
                SyncOutcome::Failed(e.to_string())
            }
        }
    }

    /// This week's logged runs of an entity, highest level first
    pub fn weekly_runs(&self, name: &str) -> StorageResult<Vec<WeeklyRun>> {
        lock_storage(&self.storage)?.list_weekly_runs(&normalize_component(name))
    }

    /// Applies the staleness policy to an entity whose fetch failed
    ///
    /// NotFound and Malformed delete the record once it has gone unsynced for
    /// longer than the staleness window, otherwise mark it stale. Transient
    /// failures only ever mark it stale.
    pub fn handle_missing(
        &self,
        key: &EntityKey,
        failure: &FetchFailure,
        now: DateTime<Utc>,
    ) -> MissOutcome {
        let mut storage = match lock_storage(&self.storage) {
            Ok(storage) => storage,
            Err(e) => return MissOutcome::Failed(e.to_string()),
        };

        let entity = match storage.get_entity(key) {
            Ok(Some(entity)) => entity,
            Ok(None) => {
                debug!("{} is not tracked, nothing to do ({})", key, failure);
                return MissOutcome::Untracked;
            }
            Err(e) => {
                error!("Failed to load {}: {}", key, e);
                return MissOutcome::Failed(e.to_string());
            }
        };

        let unsynced_for = now - entity.last_synced;
        if failure.counts_as_missing() && unsynced_for > self.staleness {
            return match storage.delete_entity(key) {
                Ok(_) => {
                    info!(
                        days = unsynced_for.num_days(),
                        "Deleted {}, unresolvable upstream ({})", key, failure
                    );
                    MissOutcome::Deleted
                }
                Err(e) => {
                    error!("Failed to delete stale {}: {}", key, e);
                    MissOutcome::Failed(e.to_string())
                }
            };
        }

        match storage.mark_entity_state(key, EntityState::Stale, Some(&failure.to_string())) {
            Ok(()) => {
                warn!("Could not refresh {}: {}", key, failure);
                MissOutcome::MarkedStale
            }
            Err(e) => {
                error!("Failed to mark {} stale: {}", key, e);
                MissOutcome::Failed(e.to_string())
            }
        }
    }

    /// Fetches one entity and reconciles the result
    pub async fn refresh_entity(&self, key: &EntityKey, rank: Option<u32>) -> RefreshOutcome {
        self.refresh(key, rank).await.0
    }

    /// Like [`Self::refresh_entity`], also returning the key the record was
    /// stored under when upstream spells it differently than requested
    async fn refresh(&self, key: &EntityKey, rank: Option<u32>) -> (RefreshOutcome, Option<EntityKey>) {
        match self.fetcher.fetch_entity(key).await.into_result() {
            Ok(data) => {
                let outcome = RefreshOutcome::Synced(self.sync_entity(&data, rank));
                let stored = (data.key != *key).then_some(data.key);
                (outcome, stored)
            }
            Err(failure) => (
                RefreshOutcome::Missed(self.handle_missing(key, &failure, Utc::now())),
                None,
            ),
        }
    }

    /// Refreshes every member of a fetched roster with its roster rank
    ///
    /// Members are fetched concurrently; the shared rate limiter bounds how
    /// many calls actually run.
    pub async fn sync_roster(self: &Arc<Self>, members: Vec<RosterMember>, region: &str) -> BatchReport {
        let targets = members
            .into_iter()
            .map(|m| (EntityKey::new(&m.name, &m.realm, region), Some(m.rank)))
            .collect();
        self.refresh_all(targets).await
    }

    /// Refreshes every stored entity not in `skip`, keeping stored ranks
    pub async fn sync_tracked(self: &Arc<Self>, skip: &HashSet<EntityKey>) -> BatchReport {
        let entities = match lock_storage(&self.storage).and_then(|s| s.list_entities()) {
            Ok(entities) => entities,
            Err(e) => {
                error!("Failed to list tracked entities: {}", e);
                return BatchReport::default();
            }
        };

        let targets = entities
            .into_iter()
            .filter(|e| !skip.contains(&e.key))
            .map(|e| (e.key, None))
            .collect();
        self.refresh_all(targets).await
    }

    async fn refresh_all(self: &Arc<Self>, targets: Vec<(EntityKey, Option<u32>)>) -> BatchReport {
        let mut report = BatchReport::default();
        let mut tasks = JoinSet::new();
        let mut seen = HashSet::new();

        for (key, rank) in targets {
            if !seen.insert(key.clone()) {
                continue;
            }
            let this = Arc::clone(self);
            tasks.spawn(async move {
                let (outcome, stored) = this.refresh(&key, rank).await;
                (key, outcome, stored)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((key, outcome, stored)) => {
                    report.record(key, &outcome);
                    if let Some(stored) = stored {
                        debug!("Stored under upstream spelling {}", stored);
                        report.visited.insert(stored);
                    }
                }
                Err(e) => {
                    error!("Refresh task failed: {}", e);
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Stops tracking an entity
    pub fn remove(&self, key: &EntityKey) -> Ack {
        match lock_storage(&self.storage).and_then(|mut s| s.delete_entity(key)) {
            Ok(true) => {
                info!("Removed {}", key);
                Ack::Done(format!("Removed {}", key))
            }
            Ok(false) => Ack::Failed(format!("{} is not tracked", key)),
            Err(e) => {
                error!("Failed to remove {}: {}", key, e);
                Ack::Failed(format!("Could not remove {}", key))
            }
        }
    }

    /// Stops tracking every entity of a group
    ///
    /// Members are deleted one by one; a failed delete is reported and the
    /// rest still go.
    pub fn remove_group(&self, group: &GroupKey) -> Ack {
        let mut storage = match lock_storage(&self.storage) {
            Ok(storage) => storage,
            Err(e) => return Ack::Failed(e.to_string()),
        };

        let members = match storage.list_group_members(group, None) {
            Ok(members) => members,
            Err(e) => {
                error!("Failed to list members of {}: {}", group, e);
                return Ack::Failed(format!("Could not list members of {}", group));
            }
        };

        let mut removed = 0;
        let mut failed = 0;
        for member in &members {
            match storage.delete_entity(&member.key) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => {
                    error!("Failed to remove {}: {}", member.key, e);
                    failed += 1;
                }
            }
        }

        info!(removed, failed, "Removed members of {}", group);
        if failed > 0 {
            Ack::Failed(format!(
                "Removed {} members of {}, {} could not be removed",
                removed, group, failed
            ))
        } else {
            Ack::Done(format!("Removed {} members of {}", removed, group))
        }
    }
}
