use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// MetricKey identifies a metric within the tag index.
#[derive(Debug, Default, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricKey(pub String);

impl MetricKey {
    pub fn new<S: Into<String>>(key: S) -> Self {
        MetricKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MetricKey {
    fn from(s: &str) -> Self {
        MetricKey(s.to_string())
    }
}

impl From<String> for MetricKey {
    fn from(s: String) -> Self {
        MetricKey(s)
    }
}

/// GraphiteName is a dotted hierarchical identifier used by the upstream
/// store. `.` separates segments.
#[derive(Debug, Default, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphiteName(pub String);

pub const GRAPHITE_SEPARATOR: char = '.';

impl GraphiteName {
    pub fn new<S: Into<String>>(name: S) -> Self {
        GraphiteName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for GraphiteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for GraphiteName {
    fn from(s: &str) -> Self {
        GraphiteName(s.to_string())
    }
}

impl From<String> for GraphiteName {
    fn from(s: String) -> Self {
        GraphiteName(s)
    }
}

/// TagSet maps tag keys to tag values. Storage order is irrelevant; the
/// canonical serialization sorts keys ascending, which the BTreeMap gives
/// us for free.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(BTreeMap<String, String>);

impl TagSet {
    pub fn new() -> Self {
        TagSet(BTreeMap::new())
    }

    /// Builds a tag set from key/value pairs, mostly for tests.
    pub fn from_pairs<K, V>(pairs: &[(K, V)]) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut ts = TagSet::new();
        for (k, v) in pairs {
            ts.set(k.as_ref(), v.as_ref());
        }
        ts
    }

    /// Parses the canonical `k1=v1,k2=v2` form. Malformed entries (no `=`)
    /// are skipped, matching the permissive behavior of the store.
    pub fn parse(serialized: &str) -> Self {
        let mut ts = TagSet::new();
        for part in serialized.split(',') {
            if let Some((key, value)) = part.split_once('=') {
                ts.set(key, value);
            }
        }
        ts
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&str>
    where
        String: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.0.get(key).map(|v| v.as_str())
    }

    /// An absent tag compares as the empty string everywhere in the engine.
    pub fn value_or_empty(&self, key: &str) -> &str {
        self.get(key).unwrap_or("")
    }

    pub fn set<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.0.insert(key.into(), value.into());
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Projects the tag set onto the given keys. Absent keys project to the
    /// empty string so that grouping treats "missing" and "" identically.
    pub fn project(&self, keys: &[String]) -> TagSet {
        let mut ts = TagSet::new();
        for key in keys {
            ts.set(key.clone(), self.value_or_empty(key));
        }
        ts
    }

    /// Returns the union of two tag sets. Shared keys must already agree
    /// (callers check join compatibility first); `other` wins on conflict.
    pub fn union(&self, other: &TagSet) -> TagSet {
        let mut merged = self.clone();
        for (k, v) in other.iter() {
            merged.set(k, v);
        }
        merged
    }

    /// True when the two tag sets agree on every key present in both.
    pub fn join_compatible(&self, other: &TagSet) -> bool {
        for (key, value) in self.iter() {
            if let Some(theirs) = other.get(key) {
                if theirs != value {
                    return false;
                }
            }
        }
        true
    }

    /// Canonical serialization: keys ascending, joined as `k1=v1,k2=v2`.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(k);
            out.push('=');
            out.push_str(v);
        }
        out
    }
}

impl Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.serialize())
    }
}

impl FromIterator<(String, String)> for TagSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        TagSet(BTreeMap::from_iter(iter))
    }
}

/// TaggedMetric pairs a metric key with one concrete tag set, identifying a
/// single stored series.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaggedMetric {
    pub metric_key: MetricKey,
    pub tag_set: TagSet,
}

impl TaggedMetric {
    pub fn new(metric_key: MetricKey, tag_set: TagSet) -> Self {
        TaggedMetric {
            metric_key,
            tag_set,
        }
    }
}

impl Display for TaggedMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.metric_key, self.tag_set)
    }
}
