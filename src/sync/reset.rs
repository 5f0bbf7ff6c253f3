//! Weekly reset of pending keys and activity
//!
//! The reset fires once per ISO week, during the configured weekday and hour
//! (UTC). The week it last succeeded for is stored in the same transaction as
//! the reset itself, so a restart inside the window does not fire it twice and
//! a failed reset is retried at the next poll while the window is still open.

use crate::config::{parse_weekday, ResetConfig};
use crate::notify::{Channel, Notifier};
use crate::storage::{lock_storage, SharedStorage, Storage, RESET_MARKER_SETTING};
use crate::ConfigError;
use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// When the weekly reset is due
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetSchedule {
    pub weekday: Weekday,
    pub hour: u32,
}

impl ResetSchedule {
    pub fn new(weekday: Weekday, hour: u32) -> Self {
        Self { weekday, hour }
    }

    pub fn from_config(config: &ResetConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(parse_weekday(&config.weekday)?, config.hour))
    }

    /// Whether `now` falls inside the reset window
    pub fn matches(&self, now: DateTime<Utc>) -> bool {
        now.weekday() == self.weekday && now.hour() == self.hour
    }

    /// ISO week identifier of `now`, e.g. `2024-W10`
    pub fn week_id(now: DateTime<Utc>) -> String {
        let week = now.iso_week();
        format!("{}-W{:02}", week.year(), week.week())
    }

    /// Whether the reset should run now, given the week it last ran for
    pub fn is_due(&self, now: DateTime<Utc>, last_marker: Option<&str>) -> bool {
        self.matches(now) && last_marker != Some(Self::week_id(now).as_str())
    }
}

/// Runs the weekly reset and reports its outcome
pub struct WeeklyReset<S> {
    storage: SharedStorage<S>,
    notifier: Arc<dyn Notifier>,
    schedule: ResetSchedule,
}

impl<S: Storage + Send + 'static> WeeklyReset<S> {
    pub fn new(storage: SharedStorage<S>, notifier: Arc<dyn Notifier>, schedule: ResetSchedule) -> Self {
        Self {
            storage,
            notifier,
            schedule,
        }
    }

    pub fn schedule(&self) -> ResetSchedule {
        self.schedule
    }

    /// Clears all pending keys and weekly activity in one transaction
    ///
    /// Success is announced on the general channel, failure on the operator
    /// channel. With `week` set, the reset marker is written as part of the
    /// same transaction.
    pub async fn run_reset(&self, week: Option<&str>) -> bool {
        let result = lock_storage(&self.storage).and_then(|mut s| s.weekly_reset(week));

        let (channel, message, succeeded) = match result {
            Ok(counts) => {
                info!(
                    keys_cleared = counts.keys_cleared,
                    runs_deleted = counts.runs_deleted,
                    "Weekly reset complete"
                );
                (
                    Channel::General,
                    format!(
                        "Weekly reset done: cleared {} keys and {} logged runs.",
                        counts.keys_cleared, counts.runs_deleted
                    ),
                    true,
                )
            }
            Err(e) => {
                error!("Weekly reset failed, nothing was cleared: {}", e);
                (
                    Channel::Operator,
                    format!("Weekly reset failed, keys and runs were left untouched: {}", e),
                    false,
                )
            }
        };

        if let Err(e) = self.notifier.notify(channel, &message).await {
            warn!("Failed to deliver reset notification: {}", e);
        }

        succeeded
    }

    /// Runs the reset if it is due at `now`
    ///
    /// # Returns
    ///
    /// * `None` - The reset was not due (or its marker could not be read)
    /// * `Some(true)` - The reset ran and succeeded
    /// * `Some(false)` - The reset ran and failed
    pub async fn check(&self, now: DateTime<Utc>) -> Option<bool> {
        if !self.schedule.matches(now) {
            return None;
        }

        let marker = match lock_storage(&self.storage).and_then(|s| s.get_setting(RESET_MARKER_SETTING)) {
            Ok(marker) => marker,
            Err(e) => {
                error!("Failed to read reset marker: {}", e);
                return None;
            }
        };

        if !self.schedule.is_due(now, marker.as_deref()) {
            debug!("Weekly reset already done for {}", ResetSchedule::week_id(now));
            return None;
        }

        let week = ResetSchedule::week_id(now);
        Some(self.run_reset(Some(&week)).await)
    }
}
