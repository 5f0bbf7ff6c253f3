//! Background loops driving periodic sync and the weekly reset
//!
//! Two independent tasks run until the shutdown channel flips to `true`:
//! - the sync loop runs one full cycle per tick of `sync.interval-secs`
//! - the reset loop polls the reset schedule every `reset.poll-secs`
//!
//! A tick that arrives while a cycle is still running is skipped rather than
//! queued, so cycles never overlap and never pile up after a slow one.
//!
//! Shutdown also cancels work in progress. An abandoned cycle drops its
//! in-flight fetches and its sync run is recorded as interrupted.

use crate::crawler::Coordinator;
use crate::storage::Storage;
use crate::sync::WeeklyReset;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{interval, MissedTickBehavior};

/// Join handles of the spawned loops
pub struct SchedulerHandles {
    pub sync: JoinHandle<()>,
    pub reset: JoinHandle<()>,
}

impl SchedulerHandles {
    /// Waits for both loops to exit
    pub async fn join(self) {
        for (name, handle) in [("Sync", self.sync), ("Reset", self.reset)] {
            match handle.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => tracing::warn!("{} loop aborted", name),
                Err(e) => tracing::error!("{} loop panicked: {}", name, e),
            }
        }
    }

    /// Handles that stop both loops without waiting, usable after `join` started
    pub fn abort_handles(&self) -> SchedulerAbort {
        SchedulerAbort {
            sync: self.sync.abort_handle(),
            reset: self.reset.abort_handle(),
        }
    }
}

/// Forced stop of both loops
pub struct SchedulerAbort {
    sync: AbortHandle,
    reset: AbortHandle,
}

impl SchedulerAbort {
    pub fn abort(&self) {
        self.sync.abort();
        self.reset.abort();
    }
}

/// Owns the periodic work of a running bot
pub struct Scheduler<S> {
    coordinator: Arc<Coordinator<S>>,
    reset: Arc<WeeklyReset<S>>,
    sync_interval: Duration,
    reset_poll: Duration,
}

impl<S: Storage + Send + 'static> Scheduler<S> {
    pub fn new(
        coordinator: Arc<Coordinator<S>>,
        reset: Arc<WeeklyReset<S>>,
        sync_interval: Duration,
        reset_poll: Duration,
    ) -> Self {
        Self {
            coordinator,
            reset,
            sync_interval,
            reset_poll,
        }
    }

    /// Starts both loops
    ///
    /// The first sync cycle runs immediately. Sending `true` on the shutdown
    /// channel (or dropping its sender) stops both loops, abandoning a cycle or
    /// reset check that is still running.
    pub fn spawn(self, shutdown_rx: watch::Receiver<bool>) -> SchedulerHandles {
        let sync = tokio::spawn(sync_loop(
            self.coordinator,
            self.sync_interval,
            shutdown_rx.clone(),
        ));
        let reset = tokio::spawn(reset_loop(self.reset, self.reset_poll, shutdown_rx));

        SchedulerHandles { sync, reset }
    }
}

async fn sync_loop<S: Storage + Send + 'static>(
    coordinator: Arc<Coordinator<S>>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!("Sync loop started, interval {:?}", period);

    loop {
        tokio::select! {
            _ = shutdown_requested(&mut shutdown_rx) => {
                tracing::info!("Sync loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                tokio::select! {
                    _ = coordinator.run_cycle() => {}
                    _ = shutdown_requested(&mut shutdown_rx) => {
                        let closed = coordinator.mark_interrupted();
                        tracing::warn!(closed, "Sync cycle abandoned on shutdown");
                        break;
                    }
                }
            }
        }
    }
}

async fn reset_loop<S: Storage + Send + 'static>(
    reset: Arc<WeeklyReset<S>>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let schedule = reset.schedule();
    tracing::info!(
        "Reset loop started, window {:?} {:02}:00 UTC, polling every {:?}",
        schedule.weekday,
        schedule.hour,
        period
    );

    loop {
        tokio::select! {
            _ = shutdown_requested(&mut shutdown_rx) => {
                tracing::info!("Reset loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                tokio::select! {
                    attempt = reset.check(Utc::now()) => {
                        if let Some(succeeded) = attempt {
                            tracing::debug!("Reset attempt finished, succeeded: {}", succeeded);
                        }
                    }
                    _ = shutdown_requested(&mut shutdown_rx) => {
                        tracing::warn!("Reset check abandoned on shutdown");
                        break;
                    }
                }
            }
        }
    }
}

/// Resolves once shutdown is signalled or the sender is gone
async fn shutdown_requested(shutdown_rx: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow_and_update() {
            return;
        }
        if shutdown_rx.changed().await.is_err() {
            return;
        }
    }
}
