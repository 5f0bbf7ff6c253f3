//! Data model for tracked entities, groups and weekly activity
//!
//! - `EntityKey` / `GroupKey`: normalized identities (lowercase, spaces as hyphens)
//! - `EntityData`: a character profile decoded from upstream
//! - `TrackedEntity`: the locally stored record
//! - `WeeklyRun`: one observed unit of weekly activity
//! - `GroupDefaults`: per chat room default group

mod entity;
mod key;

pub use entity::{
    sort_runs, EntityData, GroupDefaults, PendingKey, RosterMember, RunData, TrackedEntity,
    WeeklyRun,
};
pub use key::{normalize_component, EntityKey, GroupKey};
