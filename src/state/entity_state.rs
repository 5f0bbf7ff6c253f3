/// Entity lifecycle states
///
/// Only `Tracked` and `Stale` are ever persisted. `Absent` and `Deleted` are
/// represented by the record not existing in storage.
use std::fmt;

/// Represents where an entity is in its synchronization lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityState {
    /// Never seen, or removed and not re-created since
    Absent,

    /// Last fetch succeeded
    Tracked,

    /// Last fetch failed, still inside the staleness window
    Stale,

    /// Removed, either explicitly or because the staleness window ran out
    Deleted,
}

impl EntityState {
    /// Returns true if records in this state live in storage
    pub fn is_persisted(&self) -> bool {
        matches!(self, Self::Tracked | Self::Stale)
    }

    /// Returns true if moving from `self` to `next` is a legal lifecycle step
    ///
    /// A deleted entity only comes back through a fresh create, which starts
    /// from `Absent` again.
    pub fn can_transition_to(&self, next: EntityState) -> bool {
        use EntityState::*;
        matches!(
            (self, next),
            (Absent, Tracked)
                | (Tracked, Tracked)
                | (Tracked, Stale)
                | (Stale, Stale)
                | (Stale, Tracked)
                | (Tracked, Deleted)
                | (Stale, Deleted)
                | (Deleted, Absent)
        )
    }

    /// Converts the state to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Tracked => "tracked",
            Self::Stale => "stale",
            Self::Deleted => "deleted",
        }
    }

    /// Parses a state from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "absent" => Some(Self::Absent),
            "tracked" => Some(Self::Tracked),
            "stale" => Some(Self::Stale),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }

    /// Returns the persisted states
    pub fn persisted_states() -> [Self; 2] {
        [Self::Tracked, Self::Stale]
    }
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_string_roundtrip() {
        for state in [
            EntityState::Absent,
            EntityState::Tracked,
            EntityState::Stale,
            EntityState::Deleted,
        ] {
            assert_eq!(EntityState::from_db_string(state.to_db_string()), Some(state));
        }
        assert_eq!(EntityState::from_db_string("bogus"), None);
    }

    #[test]
    fn test_lifecycle_transitions() {
        use EntityState::*;

        assert!(Absent.can_transition_to(Tracked));
        assert!(Tracked.can_transition_to(Stale));
        assert!(Stale.can_transition_to(Tracked));
        assert!(Stale.can_transition_to(Deleted));

        assert!(!Absent.can_transition_to(Stale));
        assert!(!Deleted.can_transition_to(Tracked));
        assert!(!Deleted.can_transition_to(Stale));
        assert!(!Absent.can_transition_to(Deleted));
    }

    #[test]
    fn test_is_persisted() {
        assert!(EntityState::Tracked.is_persisted());
        assert!(EntityState::Stale.is_persisted());
        assert!(!EntityState::Absent.is_persisted());
        assert!(!EntityState::Deleted.is_persisted());
    }
}
