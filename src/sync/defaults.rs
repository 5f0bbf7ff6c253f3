//! Per chat room group defaults
//!
//! Commands that omit the group name, realm or region take the missing parts
//! from the defaults of the room they were issued in.

use crate::model::{normalize_component, GroupDefaults, GroupKey};
use crate::storage::{lock_storage, Storage, StorageResult};
use crate::sync::{Ack, Synchronizer};
use crate::SyncError;
use chrono::Utc;
use tracing::{error, info};

/// Group parameters as given to a command, each part optional
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialGroup {
    pub name: Option<String>,
    pub realm: Option<String>,
    pub region: Option<String>,
}

impl PartialGroup {
    pub fn is_complete(&self) -> bool {
        self.name.is_some() && self.realm.is_some() && self.region.is_some()
    }
}

/// Fills missing parts of `partial` from `defaults`
///
/// Returns `None` when a part is missing from both.
pub fn fill_group(partial: &PartialGroup, defaults: Option<&GroupKey>) -> Option<GroupKey> {
    let pick = |given: &Option<String>, fallback: Option<&String>| -> Option<String> {
        given
            .as_deref()
            .map(normalize_component)
            .or_else(|| fallback.cloned())
    };

    Some(GroupKey {
        name: pick(&partial.name, defaults.map(|d| &d.name))?,
        realm: pick(&partial.realm, defaults.map(|d| &d.realm))?,
        region: pick(&partial.region, defaults.map(|d| &d.region))?,
    })
}

impl<S: Storage + Send + 'static> Synchronizer<S> {
    /// Stores the default group of a room, replacing any previous one
    pub fn set_group_defaults(&self, room_id: &str, room_name: &str, group: GroupKey) -> Ack {
        let defaults = GroupDefaults {
            room_id: room_id.to_string(),
            room_name: room_name.to_string(),
            group,
            updated_at: Utc::now(),
        };

        match lock_storage(&self.storage).and_then(|mut s| s.upsert_group_defaults(&defaults)) {
            Ok(()) => {
                info!("Room {} now defaults to {}", room_id, defaults.group);
                Ack::Done(format!(
                    "Defaults for {} set to {}",
                    defaults.room_name, defaults.group
                ))
            }
            Err(e) => {
                error!("Failed to store defaults for room {}: {}", room_id, e);
                Ack::Failed(format!("Could not store defaults for {}", room_name))
            }
        }
    }

    /// The default group of a room, if one was set
    pub fn group_defaults(&self, room_id: &str) -> StorageResult<Option<GroupDefaults>> {
        lock_storage(&self.storage)?.get_group_defaults(room_id)
    }

    /// Resolves a complete group from command parameters and room defaults
    ///
    /// A complete `partial` never touches storage.
    pub fn resolve_group(
        &self,
        room_id: Option<&str>,
        partial: &PartialGroup,
    ) -> Result<GroupKey, SyncError> {
        let defaults = match room_id {
            Some(room_id) if !partial.is_complete() => self
                .group_defaults(room_id)?
                .map(|d| d.group),
            _ => None,
        };

        fill_group(partial, defaults.as_ref()).ok_or_else(|| {
            SyncError::MissingDefaults(room_id.unwrap_or("<none>").to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_group_from_defaults() {
        let defaults = GroupKey::new("Felforged", "Wyrmrest Accord", "us");
        let partial = PartialGroup {
            name: Some("Other Guild".to_string()),
            ..Default::default()
        };

        let group = fill_group(&partial, Some(&defaults)).unwrap();
        assert_eq!(group, GroupKey::new("other-guild", "wyrmrest-accord", "us"));
    }

    #[test]
    fn test_fill_group_without_defaults() {
        let complete = PartialGroup {
            name: Some("Felforged".to_string()),
            realm: Some("Area 52".to_string()),
            region: Some("EU".to_string()),
        };
        assert_eq!(
            fill_group(&complete, None),
            Some(GroupKey::new("felforged", "area-52", "eu"))
        );

        let incomplete = PartialGroup {
            name: Some("Felforged".to_string()),
            ..Default::default()
        };
        assert_eq!(fill_group(&incomplete, None), None);
    }
}
