//! State module for tracking entity lifecycle
//!
//! `EntityState` models the per-entity state machine:
//! `Absent -> Tracked -> Stale -> Deleted`, with `Stale -> Tracked` on a
//! successful refetch.

mod entity_state;

pub use entity_state::EntityState;
