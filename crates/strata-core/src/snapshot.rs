//! Resolved snapshot model: indexed lookup, prefix sub-ranges, and diffing

use std::collections::HashMap;
use std::time::Duration;

use indexmap::IndexMap;

use crate::entry::{Entry, normalize_key};
use crate::error::{ConfigError, Result};
use crate::expression::ExpressionResolver;
use crate::value::Value;

/// An entry plus its fully placeholder-expanded value. Produced only by the
/// expression resolver; never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedEntry {
    pub entry: Entry,
    pub resolved_value: Value,
}

impl ResolvedEntry {
    pub fn normalized_name(&self) -> &str {
        &self.entry.normalized_name
    }

    /// True when this entry sits at or under `prefix` in the dotted/indexed
    /// hierarchy. `server.port` has prefix `server` but not `serv`.
    pub fn has_prefix(&self, prefix: &str) -> bool {
        let k = self.normalized_name();
        if k.len() < prefix.len() {
            return false;
        }
        if k == prefix {
            return true;
        }
        if !k.starts_with(prefix) {
            return false;
        }
        matches!(k.as_bytes()[prefix.len()], b'.' | b'[')
    }
}

impl std::fmt::Display for ResolvedEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} => {:?}", self.entry.name, self.resolved_value.as_str())
    }
}

/// One hierarchical child under a prefix: either a dotted object child
/// (`prefix.child`) or an indexed array child (`prefix[n]`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeName {
    /// Full normalized name of the child node
    pub normalized_name: String,
    pub prefix: String,
    /// Child name for dotted children; empty for indexed children
    pub name: String,
    pub suffix: String,
    /// Array position for indexed children
    pub index: Option<usize>,
}

/// One `(old, new)` pair in a resolved-set delta
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntryDelta {
    pub old: Option<ResolvedEntry>,
    pub new: Option<ResolvedEntry>,
}

impl ResolvedEntryDelta {
    pub fn normalized_name(&self) -> &str {
        self.new
            .as_ref()
            .or(self.old.as_ref())
            .map(|e| e.normalized_name())
            .unwrap_or_default()
    }

    pub fn is_set(&self) -> bool {
        self.new.is_some()
    }
}

/// Ordered additions, removals, and value changes between two resolved sets
pub type SnapshotDelta = Vec<ResolvedEntryDelta>;

/// A sorted sequence of resolved entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedEntries(pub Vec<ResolvedEntry>);

impl ResolvedEntries {
    pub fn new(entries: Vec<ResolvedEntry>) -> Self {
        Self(entries)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResolvedEntry> {
        self.0.iter()
    }

    pub fn sort_by_normalized_name(&mut self) {
        self.0
            .sort_by(|a, b| a.normalized_name().cmp(b.normalized_name()));
    }

    /// Derive the distinct immediate children under `prefix`, in entry
    /// order. `prefix` must already be normalized.
    pub fn child_node_names(&self, prefix: &str) -> Vec<NodeName> {
        let mut seen: HashMap<String, ()> = HashMap::new();
        let mut children = Vec::new();

        for entry in self.iter() {
            let k = entry.normalized_name();
            if !entry.has_prefix(prefix) || k.len() == prefix.len() {
                continue;
            }

            let sep = k.as_bytes()[prefix.len()];
            let rest = &k[prefix.len() + 1..];

            let node = if sep == b'.' {
                let end = rest.find('.').unwrap_or(rest.len());
                NodeName {
                    normalized_name: k[..prefix.len() + 1 + end].to_string(),
                    prefix: prefix.to_string(),
                    name: rest[..end].to_string(),
                    suffix: k[prefix.len()..prefix.len() + 1 + end].to_string(),
                    index: None,
                }
            } else {
                // Indexed child: prefix[n]
                let Some(end) = rest.find(']') else { continue };
                let Ok(index) = rest[..end].parse::<usize>() else {
                    continue;
                };
                NodeName {
                    normalized_name: k[..prefix.len() + 2 + end].to_string(),
                    prefix: prefix.to_string(),
                    name: String::new(),
                    suffix: k[prefix.len()..prefix.len() + 2 + end].to_string(),
                    index: Some(index),
                }
            };

            if seen.insert(node.suffix.clone(), ()).is_none() {
                children.push(node);
            }
        }

        children
    }

    /// Merge-style ordered-walk diff against `other`: equal keys compare
    /// resolved values, left-only keys are removals, right-only keys are
    /// additions. O(n) over the two sorted inputs.
    pub fn compare(&self, other: &ResolvedEntries) -> SnapshotDelta {
        let mut delta = SnapshotDelta::new();
        let (le, re) = (&self.0, &other.0);
        let (mut li, mut ri) = (0usize, 0usize);

        while li < le.len() || ri < re.len() {
            let lv = li < le.len();
            let rv = ri < re.len();

            if lv && rv && le[li].normalized_name() == re[ri].normalized_name() {
                if le[li].resolved_value != re[ri].resolved_value {
                    delta.push(ResolvedEntryDelta {
                        old: Some(le[li].clone()),
                        new: Some(re[ri].clone()),
                    });
                }
                li += 1;
                ri += 1;
            } else if lv && (!rv || le[li].normalized_name() < re[ri].normalized_name()) {
                delta.push(ResolvedEntryDelta {
                    old: Some(le[li].clone()),
                    new: None,
                });
                li += 1;
            } else {
                delta.push(ResolvedEntryDelta {
                    old: None,
                    new: Some(re[ri].clone()),
                });
                ri += 1;
            }
        }

        delta
    }
}

impl IntoIterator for ResolvedEntries {
    type Item = ResolvedEntry;
    type IntoIter = std::vec::IntoIter<ResolvedEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Uniform typed-accessor surface shared by snapshots and the orchestrator.
///
/// All accessors are built on a single `value` lookup plus a type-specific
/// parse. The `*_or` variants convert not-found into the supplied default
/// without treating it as an error, but propagate genuine parse failures.
pub trait Values {
    fn value(&self, key: &str) -> Result<Value>;

    fn string(&self, key: &str) -> Result<String> {
        self.value(key).map(Value::into_string)
    }

    fn string_or(&self, key: &str, alt: &str) -> Result<String> {
        match self.value(key) {
            Ok(v) => Ok(v.into_string()),
            Err(e) if e.is_not_found() => Ok(alt.to_string()),
            Err(e) => Err(e),
        }
    }

    fn int(&self, key: &str) -> Result<i64> {
        self.value(key)?.int()
    }

    fn int_or(&self, key: &str, alt: i64) -> Result<i64> {
        match self.value(key) {
            Ok(v) => v.int(),
            Err(e) if e.is_not_found() => Ok(alt),
            Err(e) => Err(e),
        }
    }

    fn uint(&self, key: &str) -> Result<u64> {
        self.value(key)?.uint()
    }

    fn uint_or(&self, key: &str, alt: u64) -> Result<u64> {
        match self.value(key) {
            Ok(v) => v.uint(),
            Err(e) if e.is_not_found() => Ok(alt),
            Err(e) => Err(e),
        }
    }

    fn float(&self, key: &str) -> Result<f64> {
        self.value(key)?.float()
    }

    fn float_or(&self, key: &str, alt: f64) -> Result<f64> {
        match self.value(key) {
            Ok(v) => v.float(),
            Err(e) if e.is_not_found() => Ok(alt),
            Err(e) => Err(e),
        }
    }

    fn bool(&self, key: &str) -> Result<bool> {
        self.value(key)?.bool()
    }

    fn bool_or(&self, key: &str, alt: bool) -> Result<bool> {
        match self.value(key) {
            Ok(v) => v.bool(),
            Err(e) if e.is_not_found() => Ok(alt),
            Err(e) => Err(e),
        }
    }

    fn duration(&self, key: &str) -> Result<Duration> {
        self.value(key)?.duration()
    }

    fn duration_or(&self, key: &str, alt: Duration) -> Result<Duration> {
        match self.value(key) {
            Ok(v) => v.duration(),
            Err(e) if e.is_not_found() => Ok(alt),
            Err(e) => Err(e),
        }
    }
}

/// An indexed, queryable view over a sorted resolved entry set
#[derive(Debug, Clone, Default)]
pub struct SnapshotValues {
    index: HashMap<String, usize>,
    entries: ResolvedEntries,
}

impl SnapshotValues {
    /// Build the index over an already-resolved, sorted entry set
    pub fn new(entries: ResolvedEntries) -> Self {
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.normalized_name().to_string(), i))
            .collect();

        Self { index, entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &ResolvedEntries {
        &self.entries
    }

    /// Point lookup by (case/separator-insensitive) name
    pub fn resolve_by_name(&self, name: &str) -> Result<ResolvedEntry> {
        let key = normalize_key(name);
        match self.index.get(&key) {
            Some(&idx) => Ok(self.entries.0[idx].clone()),
            None => Err(ConfigError::not_found(name)),
        }
    }

    /// The contiguous sub-range of entries at or under `prefix`.
    ///
    /// Settings counts are small, so a bounded linear scan over the sorted
    /// slice stands in for binary search.
    pub fn values_with_prefix(&self, prefix: &str) -> SnapshotValues {
        if prefix.is_empty() {
            return self.clone();
        }

        let prefix = normalize_key(prefix);

        let start = self
            .entries
            .iter()
            .position(|e| e.has_prefix(&prefix))
            .unwrap_or(self.entries.len());
        let end = start
            + self.entries.0[start..]
                .iter()
                .position(|e| !e.has_prefix(&prefix))
                .unwrap_or(self.entries.len() - start);

        SnapshotValues::new(ResolvedEntries::new(self.entries.0[start..end].to_vec()))
    }

    /// Every resolved setting as `(normalized name, resolved value)`, in
    /// sorted order
    pub fn settings(&self) -> IndexMap<String, String> {
        self.entries
            .iter()
            .map(|e| {
                (
                    e.normalized_name().to_string(),
                    e.resolved_value.as_str().to_string(),
                )
            })
            .collect()
    }
}

impl Values for SnapshotValues {
    fn value(&self, key: &str) -> Result<Value> {
        self.resolve_by_name(key).map(|e| e.resolved_value)
    }
}

impl ExpressionResolver for SnapshotValues {
    fn resolve_by_name(&self, name: &str) -> Result<ResolvedEntry> {
        SnapshotValues::resolve_by_name(self, name)
    }
}

/// A fully-resolved view plus the delta that produced it
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub values: SnapshotValues,
    pub delta: SnapshotDelta,
}

impl Snapshot {
    /// Resolve a merged entry set and diff it against the previous view
    pub fn resolve(entries: &crate::entry::Entries, previous: &SnapshotValues) -> Result<Snapshot> {
        let resolver = crate::expression::Resolver::new(entries);
        let resolved = resolver.entries()?;
        let delta = previous.entries.compare(&resolved);

        Ok(Snapshot {
            values: SnapshotValues::new(resolved),
            delta,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entries;
    use crate::entry::Entry;

    fn snapshot(pairs: &[(&str, &str)]) -> SnapshotValues {
        let mut entries = ResolvedEntries::new(
            pairs
                .iter()
                .map(|(k, v)| ResolvedEntry {
                    entry: Entry::new("test", *k, *v),
                    resolved_value: Value::new(*v),
                })
                .collect(),
        );
        entries.sort_by_normalized_name();
        SnapshotValues::new(entries)
    }

    #[test]
    fn test_point_lookup_is_insensitive() {
        let values = snapshot(&[("test_port", "9211")]);
        assert_eq!(values.string("TEST.PORT").unwrap(), "9211");
        assert_eq!(values.string("test-port").unwrap(), "9211");
        assert!(values.string("test.host").unwrap_err().is_not_found());
    }

    #[test]
    fn test_typed_accessors() {
        let values = snapshot(&[
            ("server.port", "9211"),
            ("server.enabled", "true"),
            ("server.timeout", "15s"),
            ("server.ratio", "0.5"),
        ]);

        assert_eq!(values.int("server.port").unwrap(), 9211);
        assert_eq!(values.uint("server.port").unwrap(), 9211);
        assert!(values.bool("server.enabled").unwrap());
        assert_eq!(
            values.duration("server.timeout").unwrap(),
            Duration::from_secs(15)
        );
        assert_eq!(values.float("server.ratio").unwrap(), 0.5);
    }

    #[test]
    fn test_or_accessors_default_only_on_not_found() {
        let values = snapshot(&[("server.port", "not-a-number")]);

        assert_eq!(values.int_or("server.missing", 9000).unwrap(), 9000);
        // A present but malformed value is a real failure.
        assert!(values.int_or("server.port", 9000).is_err());
    }

    #[test]
    fn test_values_with_prefix() {
        let values = snapshot(&[
            ("server.host", "localhost"),
            ("server.port", "9211"),
            ("serverless", "true"),
            ("client.host", "remote"),
        ]);

        let sub = values.values_with_prefix("server");
        assert_eq!(sub.len(), 2);
        assert!(sub.string("server.host").is_ok());
        // `serverless` shares the byte prefix but not the hierarchy.
        assert!(sub.string("serverless").unwrap_err().is_not_found());

        assert!(values.values_with_prefix("absent").is_empty());
    }

    #[test]
    fn test_child_node_names_dotted_and_indexed() {
        let values = snapshot(&[
            ("pool.primary.host", "a"),
            ("pool.primary.port", "1"),
            ("pool.replica.host", "b"),
            ("whitelist[0]", "x"),
            ("whitelist[1]", "y"),
        ]);

        let pool = values.entries().child_node_names("pool");
        assert_eq!(pool.len(), 2);
        assert_eq!(pool[0].name, "primary");
        assert_eq!(pool[0].normalized_name, "pool.primary");
        assert_eq!(pool[1].name, "replica");

        let list = values.entries().child_node_names("whitelist");
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].index, Some(0));
        assert_eq!(list[0].normalized_name, "whitelist[0]");
        assert_eq!(list[1].index, Some(1));
    }

    #[test]
    fn test_compare_update_and_addition() {
        let old = snapshot(&[("a", "1"), ("b", "2")]);
        let new = snapshot(&[("a", "1"), ("b", "3"), ("c", "4")]);

        let delta = old.entries().compare(new.entries());
        assert_eq!(delta.len(), 2);

        assert_eq!(delta[0].normalized_name(), "b");
        assert_eq!(delta[0].old.as_ref().unwrap().resolved_value.as_str(), "2");
        assert_eq!(delta[0].new.as_ref().unwrap().resolved_value.as_str(), "3");

        assert_eq!(delta[1].normalized_name(), "c");
        assert!(delta[1].old.is_none());
        assert!(delta[1].is_set());
    }

    #[test]
    fn test_snapshot_resolve_expands_expressions() {
        let entries: Entries = [
            ("server.port", "9211"),
            ("server.url", "http://localhost:${server.port}/"),
        ]
        .iter()
        .map(|(k, v)| Entry::new("test", *k, *v))
        .collect();

        let snap = Snapshot::resolve(&entries, &SnapshotValues::default()).unwrap();
        assert_eq!(
            snap.values.string("server.url").unwrap(),
            "http://localhost:9211/"
        );
        // First resolution against an empty previous view: everything is an addition.
        assert_eq!(snap.delta.len(), 2);
        assert!(snap.delta.iter().all(|d| d.old.is_none()));
    }
}
