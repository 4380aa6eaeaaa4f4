//! Lazy, memoizing resolution of an entry set

use std::cell::RefCell;
use std::collections::HashMap;

use tracing::error;

use crate::entry::{Entries, normalize_key};
use crate::error::{ConfigError, Result};
use crate::expression::{Expression, ExpressionResolver};
use crate::snapshot::{ResolvedEntries, ResolvedEntry};
use crate::value::Value;

/// Expands `${...}` references against one merged entry set.
///
/// Entries are resolved lazily, one at a time, and memoized for the lifetime
/// of the resolver. References are looked up by normalized name against the
/// same entry set, so settings can reference each other. An active-name
/// stack aborts the pass on circular references instead of looping.
pub struct Resolver<'a> {
    entries: &'a Entries,
    index: HashMap<&'a str, usize>,
    state: RefCell<State>,
}

#[derive(Default)]
struct State {
    resolved: HashMap<String, ResolvedEntry>,
    active: Vec<String>,
}

impl<'a> Resolver<'a> {
    pub fn new(entries: &'a Entries) -> Self {
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.normalized_name.as_str(), i))
            .collect();

        Self {
            entries,
            index,
            state: RefCell::new(State::default()),
        }
    }

    /// Resolve every entry in the set, sorted by normalized name,
    /// short-circuiting on the first error.
    pub fn entries(&self) -> Result<ResolvedEntries> {
        let mut resolved = Vec::with_capacity(self.entries.len());
        for entry in self.entries.iter() {
            resolved.push(self.resolve_by_name(&entry.normalized_name)?);
        }

        let mut resolved = ResolvedEntries::new(resolved);
        resolved.sort_by_normalized_name();
        Ok(resolved)
    }
}

impl ExpressionResolver for Resolver<'_> {
    fn resolve_by_name(&self, name: &str) -> Result<ResolvedEntry> {
        let key = normalize_key(name);

        if let Some(entry) = self.state.borrow().resolved.get(&key) {
            return Ok(entry.clone());
        }

        let Some(&idx) = self.index.get(key.as_str()) else {
            return Err(ConfigError::not_found(name));
        };

        {
            let mut state = self.state.borrow_mut();
            if state.active.contains(&key) {
                let mut chain = state.active.clone();
                chain.push(key.clone());
                error!(chain = %chain.join(" -> "), "Circular variable reference");
                return Err(ConfigError::CircularReference { chain });
            }
            state.active.push(key.clone());
        }

        let entry = &self.entries.0[idx];
        let result = Expression::parse(&entry.value).and_then(|expr| expr.resolve(self));

        self.state.borrow_mut().active.pop();

        let value = result?;
        let resolved = ResolvedEntry {
            entry: entry.clone(),
            resolved_value: Value::new(value),
        };
        self.state
            .borrow_mut()
            .resolved
            .insert(key, resolved.clone());
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entry;
    use crate::error::ErrorKind;

    fn entries(pairs: &[(&str, &str)]) -> Entries {
        pairs
            .iter()
            .map(|(k, v)| Entry::new("test", *k, *v))
            .collect()
    }

    fn resolve_one(set: &Entries, name: &str) -> Result<String> {
        let resolver = Resolver::new(set);
        resolver
            .resolve_by_name(name)
            .map(|e| e.resolved_value.into_string())
    }

    #[test]
    fn test_resolve_literal_set_is_identity() {
        let set = entries(&[("a", "1"), ("b", "2")]);
        let resolver = Resolver::new(&set);
        let first = resolver.entries().unwrap();
        let second = resolver.entries().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.iter().map(|e| e.resolved_value.as_str()).collect::<Vec<_>>(), vec!["1", "2"]);
    }

    #[test]
    fn test_resolve_cross_reference() {
        let set = entries(&[
            ("server.host", "localhost"),
            ("server.port", "9211"),
            ("server.url", "http://${server.host}:${server.port}/"),
        ]);
        assert_eq!(
            resolve_one(&set, "server.url").unwrap(),
            "http://localhost:9211/"
        );
    }

    #[test]
    fn test_resolve_default_fallback() {
        let set = entries(&[("present", "actual"), ("uses.missing", "${missing:9213}"), ("uses.present", "${present:9213}")]);
        assert_eq!(resolve_one(&set, "uses.missing").unwrap(), "9213");
        assert_eq!(resolve_one(&set, "uses.present").unwrap(), "actual");
    }

    #[test]
    fn test_resolve_nested_defaults_short_circuit() {
        let set = entries(&[("x", "${a:${b:${c:0}}}"), ("b", "from-b")]);
        assert_eq!(resolve_one(&set, "x").unwrap(), "from-b");

        let set = entries(&[("x", "${a:${b:${c:0}}}")]);
        assert_eq!(resolve_one(&set, "x").unwrap(), "0");

        let set = entries(&[("x", "${a:${b:${c:0}}}"), ("a", "from-a"), ("c", "ignored")]);
        assert_eq!(resolve_one(&set, "x").unwrap(), "from-a");
    }

    #[test]
    fn test_resolve_required_key_missing() {
        let set = entries(&[("x", "${missing:?}")]);
        assert!(resolve_one(&set, "x").unwrap_err().is_not_found());
    }

    #[test]
    fn test_resolve_required_value_empty() {
        let set = entries(&[("empty", ""), ("x", "${empty:!}")]);
        assert!(matches!(
            resolve_one(&set, "x").unwrap_err(),
            ConfigError::EmptyValue { .. }
        ));
    }

    #[test]
    fn test_resolve_unmarked_missing_is_empty_string() {
        let set = entries(&[("x", "left-${missing}-right")]);
        assert_eq!(resolve_one(&set, "x").unwrap(), "left--right");
    }

    #[test]
    fn test_cycle_detection_fails_both_keys() {
        let set = entries(&[("a", "${b}"), ("b", "${a}")]);

        let resolver = Resolver::new(&set);
        let err = resolver.resolve_by_name("a").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CircularReference);
        let err = resolver.resolve_by_name("b").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CircularReference);

        // The whole-set resolution aborts; nothing is published.
        assert!(Resolver::new(&set).entries().is_err());
    }

    #[test]
    fn test_self_reference_detected() {
        let set = entries(&[("a", "${a}")]);
        assert!(matches!(
            resolve_one(&set, "a").unwrap_err(),
            ConfigError::CircularReference { .. }
        ));
    }

    #[test]
    fn test_case_and_separator_insensitive_lookup() {
        let set = entries(&[("test_port", "9211"), ("url", "${TEST.PORT}")]);
        assert_eq!(resolve_one(&set, "url").unwrap(), "9211");
        assert_eq!(resolve_one(&set, "test-port").unwrap(), "9211");
    }
}
