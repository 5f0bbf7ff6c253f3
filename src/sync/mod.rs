//! Record synchronization
//!
//! This module reconciles upstream data into storage:
//! - Lookup-or-create of tracked entities with last-write-wins updates
//! - Weekly activity logging, idempotent per (run id, entity name)
//! - The staleness policy for entities that cannot be fetched
//! - Pending key assignment and per room group defaults
//! - The weekly reset

mod activity;
mod defaults;
mod keys;
mod reset;
mod synchronizer;

pub use activity::{derive_weekly_runs, extract_run_id};
pub use defaults::{fill_group, PartialGroup};
pub use keys::{parse_key_spec, KeySpecError, MIN_KEY_LEVEL};
pub use reset::{ResetSchedule, WeeklyReset};
pub use synchronizer::{
    Ack, BatchReport, MissOutcome, RefreshOutcome, SyncOutcome, Synchronizer,
};
