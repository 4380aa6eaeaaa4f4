//! Raw entry model: normalization, layer validation, and precedence merge
//!
//! Entries are the unit every source produces. Only the normalized name
//! participates in equality, ordering, and merging; the original name is kept
//! for diagnostics.

use std::collections::HashMap;

use crate::error::{ConfigError, Result};

/// Case-fold a setting key and collapse separators: dashes and underscores
/// both become dots. `TEST.PORT`, `test-port` and `test_port` all normalize
/// to the same key.
pub fn normalize_key(key: &str) -> String {
    key.replace(['-', '_'], ".").to_lowercase()
}

/// Build a dotted child key under `prefix`
pub fn prefix_with_name(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        return key.to_string();
    }
    let prefix = prefix.strip_suffix('.').unwrap_or(prefix);
    format!("{prefix}.{key}")
}

/// Build an indexed child key under `prefix`
pub fn prefix_with_index(prefix: &str, index: usize) -> String {
    if prefix.is_empty() {
        return format!("[{index}]");
    }
    let prefix = prefix.strip_suffix('.').unwrap_or(prefix);
    format!("{prefix}[{index}]")
}

/// One raw `(key, value)` pair from a source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    /// Canonical form of `name`; the only key used for merge and lookup
    pub normalized_name: String,
    /// The name exactly as the source spelled it
    pub name: String,
    /// The raw, unresolved value
    pub value: String,
    /// Description of the producing source, for diagnostics
    pub source: String,
}

impl Entry {
    /// Create an entry, deriving the normalized name
    pub fn new(source: impl Into<String>, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            normalized_name: normalize_key(&name),
            name,
            value: value.into(),
            source: source.into(),
        }
    }
}

/// One `(old, new)` pair in a raw-entry delta. `old` is absent for
/// additions, `new` is absent for removals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDelta {
    pub old: Option<Entry>,
    pub new: Option<Entry>,
}

impl EntryDelta {
    /// Normalized name of the affected entry
    pub fn normalized_name(&self) -> &str {
        self.new
            .as_ref()
            .or(self.old.as_ref())
            .map(|e| e.normalized_name.as_str())
            .unwrap_or_default()
    }

    pub fn is_set(&self) -> bool {
        self.new.is_some()
    }
}

/// Ordered change delta between two entry sets
pub type EntriesDelta = Vec<EntryDelta>;

/// An ordered sequence of entries from one source (post-cache)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entries(pub Vec<Entry>);

impl Entries {
    pub fn new(entries: Vec<Entry>) -> Self {
        Self(entries)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, entry: Entry) {
        self.0.push(entry);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.0.iter()
    }

    pub fn append(&mut self, mut other: Entries) {
        self.0.append(&mut other.0);
    }

    pub fn sort_by_normalized_name(&mut self) {
        self.0
            .sort_by(|a, b| a.normalized_name.cmp(&b.normalized_name));
    }

    /// Validate the layer invariant: normalized names are unique and
    /// non-empty. Sorts the entries as a side effect.
    pub fn validate(&mut self) -> Result<()> {
        if self.0.is_empty() {
            return Ok(());
        }

        self.sort_by_normalized_name();

        if self.0[0].normalized_name.is_empty() {
            return Err(ConfigError::EmptyKey {
                description: self.0[0].source.clone(),
            });
        }

        for pair in self.0.windows(2) {
            if pair[0].normalized_name == pair[1].normalized_name {
                return Err(ConfigError::DuplicateKey {
                    normalized: pair[1].normalized_name.clone(),
                    first: pair[1].name.clone(),
                    second: pair[0].name.clone(),
                });
            }
        }

        Ok(())
    }

    /// Merge-style ordered-walk diff against `other`. Both sides must be
    /// sorted by normalized name.
    pub fn compare(&self, other: &Entries) -> EntriesDelta {
        let mut delta = EntriesDelta::new();
        let (le, re) = (&self.0, &other.0);
        let (mut li, mut ri) = (0usize, 0usize);

        while li < le.len() || ri < re.len() {
            let lv = li < le.len();
            let rv = ri < re.len();

            if lv && rv && le[li].normalized_name == re[ri].normalized_name {
                // Updated
                if le[li].value != re[ri].value {
                    delta.push(EntryDelta {
                        old: Some(le[li].clone()),
                        new: Some(re[ri].clone()),
                    });
                }
                li += 1;
                ri += 1;
            } else if lv && (!rv || le[li].normalized_name < re[ri].normalized_name) {
                // Removed
                delta.push(EntryDelta {
                    old: Some(le[li].clone()),
                    new: None,
                });
                li += 1;
            } else {
                // Added
                delta.push(EntryDelta {
                    old: None,
                    new: Some(re[ri].clone()),
                });
                ri += 1;
            }
        }

        delta
    }
}

impl IntoIterator for Entries {
    type Item = Entry;
    type IntoIter = std::vec::IntoIter<Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<Entry> for Entries {
    fn from_iter<T: IntoIterator<Item = Entry>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Merge an ordered list of layers (lowest precedence first) into a single
/// entry set. Layers are visited from last to first and an entry is inserted
/// only when its normalized name is not yet present, so the last layer in
/// the list wins ties. The result is sorted by normalized name.
pub fn merge_layers(layers: &[Entries]) -> Entries {
    let mut merged: HashMap<&str, &Entry> = HashMap::new();

    for layer in layers.iter().rev() {
        for entry in layer.iter() {
            merged.entry(&entry.normalized_name).or_insert(entry);
        }
    }

    let mut result: Entries = merged.into_values().cloned().collect();
    result.sort_by_normalized_name();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, value: &str) -> Entry {
        Entry::new("test", name, value)
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("TEST.PORT"), "test.port");
        assert_eq!(normalize_key("test-port"), "test.port");
        assert_eq!(normalize_key("test_port"), "test.port");
        assert_eq!(normalize_key("Server_Max-Conns"), "server.max.conns");
    }

    #[test]
    fn test_prefix_helpers() {
        assert_eq!(prefix_with_name("", "port"), "port");
        assert_eq!(prefix_with_name("server.", "port"), "server.port");
        assert_eq!(prefix_with_name("server", "port"), "server.port");
        assert_eq!(prefix_with_index("whitelist", 2), "whitelist[2]");
        assert_eq!(prefix_with_index("", 0), "[0]");
    }

    #[test]
    fn test_validate_detects_duplicates() {
        let mut entries = Entries::new(vec![entry("a_b", "1"), entry("a.b", "2")]);
        let err = entries.validate().unwrap_err();
        match err {
            ConfigError::DuplicateKey { normalized, .. } => assert_eq!(normalized, "a.b"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validate_detects_empty_key() {
        let mut entries = Entries::new(vec![entry("", "1"), entry("a", "2")]);
        assert!(matches!(
            entries.validate(),
            Err(ConfigError::EmptyKey { .. })
        ));
    }

    #[test]
    fn test_merge_last_layer_wins() {
        let defaults = Entries::new(vec![entry("server.port", "80"), entry("profile", "default")]);
        let file = Entries::new(vec![entry("server.port", "9211")]);
        let overrides = Entries::new(vec![entry("SERVER_PORT", "9300")]);

        let merged = merge_layers(&[defaults, file, overrides]);
        assert_eq!(merged.len(), 2);
        let port = merged
            .iter()
            .find(|e| e.normalized_name == "server.port")
            .unwrap();
        assert_eq!(port.value, "9300");
    }

    #[test]
    fn test_merge_result_sorted() {
        let merged = merge_layers(&[Entries::new(vec![
            entry("zebra", "1"),
            entry("apple", "2"),
            entry("mango", "3"),
        ])]);
        let names: Vec<&str> = merged.iter().map(|e| e.normalized_name.as_str()).collect();
        assert_eq!(names, vec!["apple", "mango", "zebra"]);
    }

    #[test]
    fn test_compare_classifies_changes() {
        let mut old = Entries::new(vec![entry("a", "1"), entry("b", "2"), entry("d", "4")]);
        let mut new = Entries::new(vec![entry("a", "1"), entry("b", "3"), entry("c", "5")]);
        old.sort_by_normalized_name();
        new.sort_by_normalized_name();

        let delta = old.compare(&new);
        assert_eq!(delta.len(), 3);

        // b updated
        assert_eq!(delta[0].normalized_name(), "b");
        assert_eq!(delta[0].old.as_ref().unwrap().value, "2");
        assert_eq!(delta[0].new.as_ref().unwrap().value, "3");
        // c added
        assert_eq!(delta[1].normalized_name(), "c");
        assert!(delta[1].old.is_none());
        // d removed
        assert_eq!(delta[2].normalized_name(), "d");
        assert!(!delta[2].is_set());
    }

    #[test]
    fn test_compare_identical_is_empty() {
        let entries = Entries::new(vec![entry("a", "1"), entry("b", "2")]);
        assert!(entries.compare(&entries).is_empty());
    }
}
