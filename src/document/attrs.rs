//! Per-entity property storage.
//!
//! String key/value pairs with set semantics on the key and sequence
//! semantics on iteration: lookup is by key, but `keys()`/`iter()` preserve
//! insertion order so the property grid shows properties in the order they
//! were added. Overwriting a value keeps the key's original position.
//!
//! Missing keys are never errors; every getter takes or implies a default.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::config::NO_CLASSNAME;
use crate::document::keys::K_CLASSNAME;

/// Ordered property container: string key -> string value.
/// Keys are unique and case-sensitive; last write wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attrs {
    #[serde(default)]
    map: IndexMap<String, String>,
}

impl Attrs {
    pub fn new() -> Self {
        Self {
            map: IndexMap::new(),
        }
    }

    /// Insert or overwrite. Returns true when the key was newly created.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        self.map.insert(key.into(), value.into()).is_none()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    /// Value for `key`, or `default` when absent. Never fails.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Remove by key. `None` when the key was absent; removal shifts later
    /// keys down, keeping display order compact.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.map.shift_remove(key)
    }

    /// Restore `key` to `value` at position `index` (undo support).
    /// Appends when `index` is out of range.
    pub fn insert_at(&mut self, index: usize, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if index >= self.map.len() {
            self.map.insert(key, value);
        } else {
            self.map.shift_insert(index, key, value);
        }
    }

    /// Index of `key` in display order.
    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.map.get_index_of(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }

    /// (key, value) pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// The `classname` property, or the documented sentinel when unset.
    /// Never empty or missing: collaborators can always render it.
    pub fn classname(&self) -> &str {
        self.get_or(K_CLASSNAME, NO_CLASSNAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_default_on_empty() {
        let attrs = Attrs::new();
        assert_eq!(attrs.get_or("anything", "fallback"), "fallback");
        assert_eq!(attrs.get("anything"), None);
    }

    #[test]
    fn test_set_get_roundtrip() {
        let mut attrs = Attrs::new();
        assert!(attrs.set("targetname", "door1"));
        assert_eq!(attrs.get("targetname"), Some("door1"));
        // Overwrite: not newly created, last write wins.
        assert!(!attrs.set("targetname", "door2"));
        assert_eq!(attrs.get_or("targetname", "x"), "door2");
    }

    #[test]
    fn test_keys_case_sensitive() {
        let mut attrs = Attrs::new();
        attrs.set("Angle", "90");
        attrs.set("angle", "180");
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs.get("Angle"), Some("90"));
        assert_eq!(attrs.get("angle"), Some("180"));
    }

    #[test]
    fn test_insertion_order_preserved() {
        let mut attrs = Attrs::new();
        attrs.set("classname", "func_door");
        attrs.set("speed", "200");
        attrs.set("targetname", "door1");
        // Overwrite keeps original position.
        attrs.set("speed", "250");
        let keys: Vec<_> = attrs.keys().collect();
        assert_eq!(keys, vec!["classname", "speed", "targetname"]);
    }

    #[test]
    fn test_remove() {
        let mut attrs = Attrs::new();
        attrs.set("speed", "200");
        assert_eq!(attrs.remove("speed"), Some("200".to_string()));
        assert_eq!(attrs.remove("speed"), None);
        assert!(attrs.is_empty());
    }

    #[test]
    fn test_insert_at_restores_order() {
        let mut attrs = Attrs::new();
        attrs.set("a", "1");
        attrs.set("b", "2");
        attrs.set("c", "3");
        let idx = attrs.index_of("b").unwrap();
        attrs.remove("b");
        attrs.insert_at(idx, "b", "2");
        let keys: Vec<_> = attrs.keys().collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_json_snapshot_roundtrip() {
        let mut attrs = Attrs::new();
        attrs.set("classname", "func_door");
        attrs.set("speed", "200");
        let json = serde_json::to_string(&attrs).unwrap();
        let back: Attrs = serde_json::from_str(&json).unwrap();
        assert_eq!(back, attrs);
        let keys: Vec<_> = back.keys().collect();
        assert_eq!(keys, vec!["classname", "speed"]);
    }

    #[test]
    fn test_classname_sentinel() {
        let mut attrs = Attrs::new();
        assert_eq!(attrs.classname(), crate::config::NO_CLASSNAME);
        assert!(!attrs.classname().is_empty());
        attrs.set("classname", "info_player_start");
        assert_eq!(attrs.classname(), "info_player_start");
    }
}
