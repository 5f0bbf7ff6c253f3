//! Normalized identity keys for entities and groups

use std::fmt;

/// Normalizes one key component: trimmed, lowercase, spaces replaced by hyphens
///
/// `"Wyrmrest Accord"` and `"wyrmrest-accord"` both normalize to `"wyrmrest-accord"`.
pub fn normalize_component(value: &str) -> String {
    value.trim().to_lowercase().replace(' ', "-")
}

/// Identity of a tracked entity: (name, realm, region), all normalized
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub name: String,
    pub realm: String,
    pub region: String,
}

impl EntityKey {
    pub fn new(name: &str, realm: &str, region: &str) -> Self {
        Self {
            name: normalize_component(name),
            realm: normalize_component(realm),
            region: normalize_component(region),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}-{}", self.name, self.realm, self.region)
    }
}

/// Identity of a tracked group (guild): (name, realm, region), all normalized
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    pub name: String,
    pub realm: String,
    pub region: String,
}

impl GroupKey {
    pub fn new(name: &str, realm: &str, region: &str) -> Self {
        Self {
            name: normalize_component(name),
            realm: normalize_component(realm),
            region: normalize_component(region),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}> on {}-{}", self.name, self.realm, self.region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_component() {
        assert_eq!(normalize_component("Wyrmrest Accord"), "wyrmrest-accord");
        assert_eq!(normalize_component("  Allikazam "), "allikazam");
        assert_eq!(normalize_component("US"), "us");
    }

    #[test]
    fn test_mixed_case_keys_are_equal() {
        let a = EntityKey::new("Allikazam", "Wyrmrest Accord", "US");
        let b = EntityKey::new("allikazam", "wyrmrest-accord", "us");
        assert_eq!(a, b);
    }

    #[test]
    fn test_group_key_normalizes() {
        let key = GroupKey::new("Fel Forged", "Wyrmrest Accord", "us");
        assert_eq!(key.name, "fel-forged");
        assert_eq!(key.realm, "wyrmrest-accord");
    }

    #[test]
    fn test_display() {
        let key = EntityKey::new("Allikazam", "Wyrmrest Accord", "us");
        assert_eq!(key.to_string(), "allikazam on wyrmrest-accord-us");
    }
}
