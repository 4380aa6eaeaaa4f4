//! Type-directed population of settings into Rust values
//!
//! [`Populate`] is the decoding contract: each implementing type knows how to
//! build itself from a [`PopulatorSource`] at some dotted key. Scalars decode
//! through [`Populate::from_value`]; containers walk prefix sub-ranges and
//! child node names; structs get an implementation from
//! `#[derive(Populate)]`. Hand-written impls remain the escape hatch for
//! types with their own decoding rules.

use std::collections::HashMap;
use std::time::Duration;

use crate::entry::{Entry, normalize_key, prefix_with_index};
use crate::error::{ConfigError, Result};
use crate::expression::{Expression, ExpressionResolver};
use crate::snapshot::{ResolvedEntry, SnapshotValues};
use crate::value::Value;

/// Read access the populator needs: point lookups, prefix sub-ranges, and
/// expression resolution for `#[setting(default = "...")]` expressions.
pub trait PopulatorSource: ExpressionResolver {
    fn value(&self, key: &str) -> Result<Value>;

    fn values_with_prefix(&self, prefix: &str) -> SnapshotValues;
}

impl PopulatorSource for SnapshotValues {
    fn value(&self, key: &str) -> Result<Value> {
        SnapshotValues::resolve_by_name(self, key).map(|e| e.resolved_value)
    }

    fn values_with_prefix(&self, prefix: &str) -> SnapshotValues {
        SnapshotValues::values_with_prefix(self, prefix)
    }
}

/// A synthetic source over a plain string list, addressed by `[n]` keys.
/// Backs separated-value decoding of `Vec<T>` fields.
pub struct SliceValueSource {
    values: Vec<String>,
}

impl SliceValueSource {
    pub fn new(values: Vec<String>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn lookup(&self, key: &str) -> Option<&str> {
        let index: usize = key.strip_prefix('[')?.strip_suffix(']')?.parse().ok()?;
        self.values.get(index).map(String::as_str)
    }
}

impl ExpressionResolver for SliceValueSource {
    fn resolve_by_name(&self, name: &str) -> Result<ResolvedEntry> {
        match self.lookup(name) {
            Some(value) => Ok(ResolvedEntry {
                entry: Entry::new("slice", name, value),
                resolved_value: Value::new(value),
            }),
            None => Err(ConfigError::not_found(name)),
        }
    }
}

impl PopulatorSource for SliceValueSource {
    fn value(&self, key: &str) -> Result<Value> {
        match self.lookup(key) {
            Some(value) => Ok(Value::new(value)),
            None => Err(ConfigError::not_found(key)),
        }
    }

    fn values_with_prefix(&self, _prefix: &str) -> SnapshotValues {
        SnapshotValues::default()
    }
}

/// A value that can build itself from the settings under a dotted key
pub trait Populate: Sized {
    /// Decode the value rooted at `key`
    fn populate(source: &dyn PopulatorSource, key: &str) -> Result<Self> {
        let value = source.value(&normalize_key(key))?;
        Self::from_value(&value)
    }

    /// Like `populate`, but a missing key falls back to `default`, resolved
    /// as a `${...}` expression against the same source.
    fn populate_with_default(
        source: &dyn PopulatorSource,
        key: &str,
        default: Option<&Expression>,
    ) -> Result<Self> {
        match Self::populate(source, key) {
            Err(e) if e.is_not_found() => match default {
                Some(expression) => {
                    let text = expression.resolve(source)?;
                    Self::from_value(&Value::new(text))
                }
                None => Err(e),
            },
            other => other,
        }
    }

    /// Parse hook for scalar-like types. Containers and structs decode
    /// structurally and leave this unimplemented.
    fn from_value(_value: &Value) -> Result<Self> {
        Err(ConfigError::NoPopulator {
            type_name: std::any::type_name::<Self>(),
        })
    }
}

macro_rules! populate_signed {
    ($($ty:ty),*) => {$(
        impl Populate for $ty {
            fn from_value(value: &Value) -> Result<Self> {
                let wide = value.int()?;
                <$ty>::try_from(wide).map_err(|_| {
                    ConfigError::invalid_value(format!(
                        "{wide} out of range for {}",
                        stringify!($ty)
                    ))
                })
            }
        }
    )*};
}

macro_rules! populate_unsigned {
    ($($ty:ty),*) => {$(
        impl Populate for $ty {
            fn from_value(value: &Value) -> Result<Self> {
                let wide = value.uint()?;
                <$ty>::try_from(wide).map_err(|_| {
                    ConfigError::invalid_value(format!(
                        "{wide} out of range for {}",
                        stringify!($ty)
                    ))
                })
            }
        }
    )*};
}

populate_signed!(i8, i16, i32, i64, isize);
populate_unsigned!(u8, u16, u32, u64, usize);

impl Populate for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.float()
    }
}

impl Populate for f32 {
    fn from_value(value: &Value) -> Result<Self> {
        value.float().map(|f| f as f32)
    }
}

impl Populate for bool {
    fn from_value(value: &Value) -> Result<Self> {
        value.bool()
    }
}

impl Populate for String {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.as_str().to_string())
    }
}

impl Populate for Duration {
    fn from_value(value: &Value) -> Result<Self> {
        value.duration()
    }
}

impl<T: Populate> Populate for Option<T> {
    /// An empty sub-range under `key` is `None`, never an error
    fn populate(source: &dyn PopulatorSource, key: &str) -> Result<Self> {
        let key = normalize_key(key);
        if source.values_with_prefix(&key).is_empty() {
            return Ok(None);
        }
        T::populate(source, &key).map(Some)
    }

    fn populate_with_default(
        source: &dyn PopulatorSource,
        key: &str,
        default: Option<&Expression>,
    ) -> Result<Self> {
        let key = normalize_key(key);
        if source.values_with_prefix(&key).is_empty() {
            return match default {
                Some(_) => T::populate_with_default(source, &key, default).map(Some),
                None => Ok(None),
            };
        }
        T::populate(source, &key).map(Some)
    }
}

impl<T: Populate> Populate for Vec<T> {
    /// Decodes `key[0]`, `key[1]`, ... when indexed children exist, else the
    /// single value at `key` split on `,`. A missing key is an empty vector.
    fn populate(source: &dyn PopulatorSource, key: &str) -> Result<Self> {
        let key = normalize_key(key);
        let sub = source.values_with_prefix(&key);

        let mut indexed: Vec<(usize, String)> = sub
            .entries()
            .child_node_names(&key)
            .into_iter()
            .filter_map(|c| c.index.map(|i| (i, c.normalized_name)))
            .collect();

        if !indexed.is_empty() {
            indexed.sort_by_key(|(i, _)| *i);
            return indexed
                .into_iter()
                .map(|(_, child)| T::populate(source, &child))
                .collect();
        }

        match source.value(&key) {
            Ok(value) => populate_separated(value.string_slice(',')),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// The default expression decodes with a `;` separator, leaving `,` free
    /// for use inside default element values
    fn populate_with_default(
        source: &dyn PopulatorSource,
        key: &str,
        default: Option<&Expression>,
    ) -> Result<Self> {
        let key = normalize_key(key);
        if source.values_with_prefix(&key).is_empty() {
            return match default {
                Some(expression) => {
                    let text = expression.resolve(source)?;
                    populate_separated(Value::new(text).string_slice(';'))
                }
                None => Ok(Vec::new()),
            };
        }
        Self::populate(source, &key)
    }
}

fn populate_separated<T: Populate>(elements: Vec<String>) -> Result<Vec<T>> {
    let source = SliceValueSource::new(elements);
    (0..source.len())
        .map(|i| T::populate(&source, &prefix_with_index("", i)))
        .collect()
}

impl<T: Populate> Populate for HashMap<String, T> {
    /// One map entry per dotted child under `key`. Indexed children belong
    /// to sequences and are skipped.
    fn populate(source: &dyn PopulatorSource, key: &str) -> Result<Self> {
        let key = normalize_key(key);
        let sub = source.values_with_prefix(&key);

        sub.entries()
            .child_node_names(&key)
            .into_iter()
            .filter(|c| c.index.is_none())
            .map(|c| T::populate(source, &c.normalized_name).map(|v| (c.name, v)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::ResolvedEntries;

    fn source(pairs: &[(&str, &str)]) -> SnapshotValues {
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
    fn test_scalar_population() {
        let source = source(&[
            ("server.port", "9211"),
            ("server.enabled", "true"),
            ("server.timeout", "30s"),
            ("server.ratio", "0.5"),
        ]);

        assert_eq!(u16::populate(&source, "server.port").unwrap(), 9211);
        assert!(bool::populate(&source, "server.enabled").unwrap());
        assert_eq!(
            Duration::populate(&source, "server.timeout").unwrap(),
            Duration::from_secs(30)
        );
        assert_eq!(f64::populate(&source, "server.ratio").unwrap(), 0.5);
    }

    #[test]
    fn test_scalar_out_of_range() {
        let source = source(&[("server.port", "70000")]);
        let err = u16::populate(&source, "server.port").unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_missing_scalar_is_not_found() {
        let source = source(&[]);
        assert!(i64::populate(&source, "absent").unwrap_err().is_not_found());
    }

    #[test]
    fn test_default_expression_applies_on_missing() {
        let source = source(&[("fallback.port", "9000")]);
        let default = Expression::parse("${fallback.port}").unwrap();

        let port =
            u16::populate_with_default(&source, "server.port", Some(&default)).unwrap();
        assert_eq!(port, 9000);

        let present = source;
        let port =
            u16::populate_with_default(&present, "fallback.port", Some(&default)).unwrap();
        assert_eq!(port, 9000);
    }

    #[test]
    fn test_option_missing_is_none() {
        let source = source(&[("server.port", "9211")]);
        assert_eq!(
            Option::<u16>::populate(&source, "server.port").unwrap(),
            Some(9211)
        );
        assert_eq!(Option::<u16>::populate(&source, "absent").unwrap(), None);
    }

    #[test]
    fn test_vec_from_indexed_children() {
        let source = source(&[
            ("spring.hosts[0]", "alpha"),
            ("spring.hosts[1]", "beta"),
            ("spring.hosts[2]", "gamma"),
        ]);

        let hosts = Vec::<String>::populate(&source, "spring.hosts").unwrap();
        assert_eq!(hosts, ["alpha", "beta", "gamma"]);
    }

    #[test]
    fn test_vec_from_separated_value() {
        let values = source(&[("spring.hosts", "alpha, beta,gamma")]);
        let hosts = Vec::<String>::populate(&values, "spring.hosts").unwrap();
        assert_eq!(hosts, ["alpha", "beta", "gamma"]);

        let ports = source(&[("ports", "9211,9212")]);
        assert_eq!(Vec::<u16>::populate(&ports, "ports").unwrap(), [9211, 9212]);
    }

    #[test]
    fn test_vec_missing_is_empty() {
        let source = source(&[]);
        assert!(Vec::<String>::populate(&source, "absent").unwrap().is_empty());
    }

    #[test]
    fn test_vec_default_splits_on_semicolon() {
        let source = source(&[]);
        let default = Expression::parse("a;b;c").unwrap();
        let items =
            Vec::<String>::populate_with_default(&source, "absent", Some(&default)).unwrap();
        assert_eq!(items, ["a", "b", "c"]);
    }

    #[test]
    fn test_map_from_dotted_children() {
        let source = source(&[
            ("limits.read", "10"),
            ("limits.write", "5"),
            ("limits.read.burst", "20"),
        ]);

        let limits = HashMap::<String, u32>::populate(&source, "limits");
        // "read" has both a value and a nested child; scalar decode of the
        // child name sees the direct value.
        let limits = limits.unwrap();
        assert_eq!(limits.get("read"), Some(&10));
        assert_eq!(limits.get("write"), Some(&5));
    }

    #[test]
    fn test_slice_value_source_lookup() {
        let slice = SliceValueSource::new(vec!["a".into(), "b".into()]);
        assert_eq!(slice.value("[1]").unwrap().as_str(), "b");
        assert!(slice.value("[2]").unwrap_err().is_not_found());
        assert!(slice.value("name").unwrap_err().is_not_found());
    }
}
