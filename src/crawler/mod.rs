//! Crawler module for upstream fetching and sync orchestration
//!
//! This module contains the core sync machinery, including:
//! - HTTP fetching and response classification
//! - Payload decoding into domain records
//! - The sliding window rate limiter shared by every call
//! - Cycle coordination and the background loops
//!
//! [`Engine`] wires all of it together from a loaded configuration.

mod coordinator;
mod fetcher;
mod limiter;
mod payload;
mod scheduler;

pub use coordinator::{Coordinator, CycleReport};
pub use fetcher::{
    build_http_client, profile_request_url, roster_request_url, FetchFailure, FetchOutcome,
    Fetcher, PROFILE_FIELDS,
};
pub use limiter::{RateLimiter, RatePermit};
pub use payload::PayloadError;
pub use scheduler::{Scheduler, SchedulerAbort, SchedulerHandles};

use crate::auth::{TokenManager, TokenStore};
use crate::config::Config;
use crate::notify::{build_notifier, Notifier};
use crate::storage::{open_storage, SharedStorage, SqliteStorage, Storage};
use crate::sync::{ResetSchedule, Synchronizer, WeeklyReset};
use crate::SyncError;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Every long lived component of a running bot, built once at startup
pub struct Engine<S> {
    pub config: Arc<Config>,
    pub storage: SharedStorage<S>,
    pub fetcher: Arc<Fetcher>,
    pub synchronizer: Arc<Synchronizer<S>>,
    pub coordinator: Arc<Coordinator<S>>,
    pub reset: Arc<WeeklyReset<S>>,
    pub notifier: Arc<dyn Notifier>,
}

impl Engine<SqliteStorage> {
    /// Opens the configured database and builds the engine on top of it
    ///
    /// Runs left `running` by a previous process are marked interrupted.
    pub fn open(config: Config, config_hash: String) -> Result<Self, SyncError> {
        let mut storage = open_storage(Path::new(&config.storage.database_path))?;

        let interrupted = storage.mark_interrupted_runs()?;
        if interrupted > 0 {
            tracing::warn!("Marked {} unfinished sync runs as interrupted", interrupted);
        }

        Self::with_storage(config, config_hash, storage)
    }
}

impl<S: Storage + Send + 'static> Engine<S> {
    /// Builds the engine around an already opened store
    ///
    /// The configuration is used as given; callers validate it first.
    pub fn with_storage(config: Config, config_hash: String, storage: S) -> Result<Self, SyncError> {
        let storage: SharedStorage<S> = Arc::new(Mutex::new(storage));
        let config = Arc::new(config);

        let client = build_http_client(&config.user_agent, &config.upstream)?;
        let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));

        let token_store: Arc<dyn TokenStore> = storage.clone();
        let tokens = Arc::new(TokenManager::new(
            client.clone(),
            config.auth.clone(),
            token_store,
        ));

        let fetcher = Arc::new(Fetcher::new(
            client.clone(),
            tokens,
            limiter,
            config.upstream.clone(),
            config.sync.min_level,
            config.sync.max_level,
        ));

        let synchronizer = Arc::new(Synchronizer::new(
            Arc::clone(&storage),
            Arc::clone(&fetcher),
            config.sync.staleness_days,
        ));

        let coordinator = Arc::new(Coordinator::new(
            Arc::clone(&config),
            config_hash,
            Arc::clone(&fetcher),
            Arc::clone(&synchronizer),
        ));

        let notifier = build_notifier(&config.notify, client);
        let schedule = ResetSchedule::from_config(&config.reset)?;
        let reset = Arc::new(WeeklyReset::new(
            Arc::clone(&storage),
            Arc::clone(&notifier),
            schedule,
        ));

        tracing::debug!(
            "Engine ready: {} configured groups, reset {:?} {:02}:00 UTC",
            config.groups.len(),
            schedule.weekday,
            schedule.hour
        );

        Ok(Self {
            config,
            storage,
            fetcher,
            synchronizer,
            coordinator,
            reset,
            notifier,
        })
    }

    /// The background loops at the configured intervals
    pub fn scheduler(&self) -> Scheduler<S> {
        Scheduler::new(
            Arc::clone(&self.coordinator),
            Arc::clone(&self.reset),
            Duration::from_secs(self.config.sync.interval_secs),
            Duration::from_secs(self.config.reset.poll_secs),
        )
    }
}
