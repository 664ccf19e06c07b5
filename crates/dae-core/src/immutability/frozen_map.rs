//! Read-only key/value mapping.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

/// An immutable string-keyed mapping.
///
/// Entries are copied in at construction and never change afterwards; there
/// are no mutators. Clones share storage. Serialization writes the entries as
/// a plain map, so a serialize → deserialize → serialize cycle never routes
/// through a mutable intermediate that could be written back.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct FrozenMap {
    entries: Arc<BTreeMap<String, Value>>,
}

impl FrozenMap {
    /// Creates an empty map.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Looks up a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Returns whether the key is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterates keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns an owned copy of the entries.
    ///
    /// The copy is detached; editing it never affects this map.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, Value> {
        (*self.entries).clone()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for FrozenMap {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            entries: Arc::new(iter.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        }
    }
}

impl From<BTreeMap<String, Value>> for FrozenMap {
    fn from(entries: BTreeMap<String, Value>) -> Self {
        Self {
            entries: Arc::new(entries),
        }
    }
}

impl fmt::Debug for FrozenMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

impl Serialize for FrozenMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in self.entries.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FrozenMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        BTreeMap::<String, Value>::deserialize(deserializer).map(Self::from)
    }
}

#[cfg(test)]
mod unit_tests {
    use serde_json::json;

    use super::*;

    fn sample() -> FrozenMap {
        [
            ("source_systems", json!(["crm", "erp"])),
            ("engine", json!("migration_readiness")),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_reads() {
        let map = sample();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("engine"), Some(&json!("migration_readiness")));
        assert!(map.contains_key("source_systems"));
        assert_eq!(map.keys().collect::<Vec<_>>(), ["engine", "source_systems"]);
    }

    #[test]
    fn test_serializes_as_plain_map() {
        let map = sample();
        let first = serde_json::to_string(&map).unwrap();
        assert_eq!(
            first,
            r#"{"engine":"migration_readiness","source_systems":["crm","erp"]}"#
        );

        let back: FrozenMap = serde_json::from_str(&first).unwrap();
        let second = serde_json::to_string(&back).unwrap();
        assert_eq!(first, second);
        assert_eq!(map, back);
    }

    #[test]
    fn test_detached_copy_does_not_write_back() {
        let map = sample();
        let mut copy = map.to_map();
        copy.insert("engine".into(), json!("other"));
        assert_eq!(map.get("engine"), Some(&json!("migration_readiness")));
    }

    #[test]
    fn test_clone_shares_entries() {
        let map = sample();
        let clone = map.clone();
        assert_eq!(map, clone);
        assert!(Arc::ptr_eq(&map.entries, &clone.entries));
    }
}
