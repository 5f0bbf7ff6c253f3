//! Pending key assignment
//!
//! A key spec is `<dungeon>+<level>`, e.g. `fh+18`. The dungeon part is either
//! a configured abbreviation or a full dungeon name, compared case-insensitively.

use crate::model::{EntityKey, PendingKey};
use crate::storage::{lock_storage, Storage};
use crate::sync::{Ack, Synchronizer};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{error, info};

/// Lowest level a key can have
pub const MIN_KEY_LEVEL: u32 = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeySpecError {
    #[error("expected <dungeon>+<level>, got '{0}'")]
    Malformed(String),

    #[error("unknown dungeon '{0}'")]
    UnknownDungeon(String),

    #[error("invalid key level '{0}'")]
    InvalidLevel(String),
}

/// Parses a key spec against the dungeon abbreviation table
pub fn parse_key_spec(
    spec: &str,
    dungeons: &BTreeMap<String, String>,
) -> Result<PendingKey, KeySpecError> {
    let (dungeon, level) = spec
        .trim()
        .split_once('+')
        .ok_or_else(|| KeySpecError::Malformed(spec.to_string()))?;

    let dungeon = dungeon.trim();
    let level = level.trim();
    if dungeon.is_empty() || level.is_empty() {
        return Err(KeySpecError::Malformed(spec.to_string()));
    }

    let level: u32 = level
        .parse()
        .map_err(|_| KeySpecError::InvalidLevel(level.to_string()))?;
    if level < MIN_KEY_LEVEL {
        return Err(KeySpecError::InvalidLevel(level.to_string()));
    }

    let wanted = dungeon.to_lowercase();
    let full_name = dungeons
        .iter()
        .find(|(abbr, _)| abbr.to_lowercase() == wanted)
        .map(|(_, name)| name.clone())
        .or_else(|| {
            dungeons
                .values()
                .find(|name| name.to_lowercase() == wanted)
                .cloned()
        })
        .ok_or_else(|| KeySpecError::UnknownDungeon(dungeon.to_string()))?;

    Ok(PendingKey {
        dungeon: full_name,
        level,
    })
}

impl<S: Storage + Send + 'static> Synchronizer<S> {
    /// Sets the pending key of a tracked entity
    pub fn assign_key(&self, key: &EntityKey, pending: &PendingKey) -> Ack {
        self.write_pending_key(key, Some(pending))
    }

    /// Clears the pending key of a tracked entity
    pub fn clear_key(&self, key: &EntityKey) -> Ack {
        self.write_pending_key(key, None)
    }

    fn write_pending_key(&self, key: &EntityKey, pending: Option<&PendingKey>) -> Ack {
        let result = lock_storage(&self.storage).and_then(|mut s| s.set_pending_key(key, pending));

        match (result, pending) {
            (Ok(true), Some(p)) => {
                info!("Assigned {} +{} to {}", p.dungeon, p.level, key);
                Ack::Done(format!("{} now holds {} +{}", key, p.dungeon, p.level))
            }
            (Ok(true), None) => {
                info!("Cleared key of {}", key);
                Ack::Done(format!("Cleared key of {}", key))
            }
            (Ok(false), _) => Ack::Failed(format!("{} is not tracked", key)),
            (Err(e), _) => {
                error!("Failed to update key of {}: {}", key, e);
                Ack::Failed(format!("Could not update key of {}", key))
            }
        }
    }
}
