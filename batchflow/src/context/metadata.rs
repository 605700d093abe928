//! Key/value metadata carried by a dispatch context.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Address of the caller that originated the request.
pub const REMOTE_IP: &str = "remote_ip";
/// Traffic color used for routing.
pub const COLOR: &str = "color";
/// Marks mirrored (shadow) traffic.
pub const MIRROR: &str = "mirror";
/// Name of the calling application.
pub const CALLER: &str = "caller";
/// Member identifier.
pub const MID: &str = "mid";

/// Returns true for keys accepted from inbound requests.
#[must_use]
pub fn is_incoming_key(key: &str) -> bool {
    matches!(key, CALLER | REMOTE_IP | COLOR | MIRROR)
}

/// Returns true for keys forwarded on outbound requests.
#[must_use]
pub fn is_outgoing_key(key: &str) -> bool {
    matches!(key, REMOTE_IP | COLOR | MIRROR)
}

/// A single metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// String value.
    Str(String),
    /// Anything else, kept as JSON.
    Json(serde_json::Value),
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for MetaValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<serde_json::Value> for MetaValue {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

/// A map of metadata entries.
///
/// Treated as immutable once attached to a context; contexts share it
/// behind an `Arc` and copy on write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata {
    entries: HashMap<String, MetaValue>,
}

impl Metadata {
    /// Creates empty metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds metadata from key/value pairs. Later duplicates win.
    pub fn pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<MetaValue>,
    {
        pairs.into_iter().collect()
    }

    /// Merges several maps left to right; later duplicates win.
    pub fn join<'a, I>(mds: I) -> Self
    where
        I: IntoIterator<Item = &'a Self>,
    {
        let mut out = Self::new();
        for md in mds {
            out.extend(md);
        }
        out
    }

    /// Returns a shallow copy with its own key set.
    #[must_use]
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Copies every entry of `other` into `self`, overwriting duplicates.
    pub fn extend(&mut self, other: &Self) {
        for (k, v) in &other.entries {
            self.entries.insert(k.clone(), v.clone());
        }
    }

    /// Inserts a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Option<MetaValue> {
        self.entries.insert(key.into(), value.into())
    }

    /// Removes a value.
    pub fn remove(&mut self, key: &str) -> Option<MetaValue> {
        self.entries.remove(key)
    }

    /// Gets a raw value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.entries.get(key)
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the string value for `key`, or an empty string.
    #[must_use]
    pub fn string(&self, key: &str) -> String {
        match self.entries.get(key) {
            Some(MetaValue::Str(s)) => s.clone(),
            _ => String::new(),
        }
    }

    /// Returns the boolean value for `key`.
    ///
    /// Accepts real booleans and the strings `"true"`/`"1"` and
    /// `"false"`/`"0"`. Anything else reads as `false`.
    #[must_use]
    pub fn bool(&self, key: &str) -> bool {
        match self.entries.get(key) {
            Some(MetaValue::Bool(b)) => *b,
            Some(MetaValue::Str(s)) => matches!(s.as_str(), "true" | "1"),
            _ => false,
        }
    }

    /// Returns the integer value for `key`, or zero.
    #[must_use]
    pub fn int64(&self, key: &str) -> i64 {
        match self.entries.get(key) {
            Some(MetaValue::Int(n)) => *n,
            _ => 0,
        }
    }

    /// Visits every entry, optionally restricted by a key filter.
    ///
    /// Iteration order is unspecified.
    pub fn range<F>(&self, mut f: F, filter: Option<&dyn Fn(&str) -> bool>)
    where
        F: FnMut(&str, &MetaValue),
    {
        for (k, v) in &self.entries {
            if filter.map_or(true, |keep| keep(k.as_str())) {
                f(k.as_str(), v);
            }
        }
    }

    /// Returns an iterator over entries.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetaValue)> {
        self.entries.iter()
    }
}

impl<K, V> FromIterator<(K, V)> for Metadata
where
    K: Into<String>,
    V: Into<MetaValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_pairs_empty() {
        let md = Metadata::pairs(Vec::<(&str, &str)>::new());
        assert!(md.is_empty());
    }

    #[test]
    fn test_pairs_later_duplicate_wins() {
        let md = Metadata::pairs([("k1", "v1"), ("k1", "v2")]);
        assert_eq!(md, Metadata::pairs([("k1", "v2")]));
    }

    #[test]
    fn test_copy_is_independent() {
        let mut orig = Metadata::pairs([("key", "val")]);
        let copy = orig.copy();
        assert_eq!(orig, copy);

        orig.insert("key", "foo");
        assert_eq!(copy.string("key"), "val");
    }

    #[test]
    fn test_join() {
        assert!(Metadata::join(Vec::<&Metadata>::new()).is_empty());

        let single = Metadata::pairs([("foo", "bar")]);
        assert_eq!(Metadata::join([&single]), single);

        let a = Metadata::pairs([("a", "1")]);
        let b = Metadata::pairs([("a", "2")]);
        assert_eq!(Metadata::join([&a, &b]), Metadata::pairs([("a", "2")]));

        let zip = Metadata::pairs([("zip", "zap")]);
        assert_eq!(
            Metadata::join([&a, &b, &zip]),
            Metadata::pairs([("a", "1"), ("a", "2"), ("zip", "zap")])
        );
    }

    #[test]
    fn test_bool_forms() {
        let md = Metadata::pairs([(REMOTE_IP, "127.0.0.1"), (COLOR, "red")]);
        assert!(!md.bool(MIRROR));

        assert!(Metadata::pairs([(MIRROR, true)]).bool(MIRROR));
        assert!(Metadata::pairs([(MIRROR, "true")]).bool(MIRROR));
        assert!(Metadata::pairs([(MIRROR, "1")]).bool(MIRROR));
        assert!(!Metadata::pairs([(MIRROR, "0")]).bool(MIRROR));
        assert!(!Metadata::pairs([(MIRROR, "false")]).bool(MIRROR));
        assert!(!Metadata::pairs([(MIRROR, 1_i64)]).bool(MIRROR));
    }

    #[test]
    fn test_int64() {
        assert_eq!(Metadata::pairs([(MID, 1_i64)]).int64(MID), 1);
        assert_eq!(Metadata::pairs([(MID, 2_i64)]).int64(MID), 2);
        assert_eq!(Metadata::pairs([(MID, "10")]).int64(MID), 0);
        assert_eq!(Metadata::pairs([(MID, 10.0)]).int64(MID), 0);
    }

    #[test]
    fn test_string_incompatible_type() {
        let md = Metadata::pairs([(COLOR, true)]);
        assert_eq!(md.string(COLOR), "");
        assert_eq!(md.string("missing"), "");
    }

    #[test]
    fn test_range_without_filter() {
        let md = Metadata::pairs([("foo", "bar")]);
        let mut seen = Metadata::new();
        md.range(|k, v| { seen.insert(k, v.clone()); }, None);
        assert_eq!(seen, md);
    }

    #[test]
    fn test_range_outgoing_filter() {
        let md = Metadata::pairs([
            ("foo", "bar"),
            (CALLER, "app-feed"),
            (REMOTE_IP, "127.0.0.1"),
            (COLOR, "red"),
            (MIRROR, "true"),
        ]);

        let mut seen = Metadata::new();
        md.range(|k, v| { seen.insert(k, v.clone()); }, Some(&is_outgoing_key));
        assert_eq!(
            seen,
            Metadata::pairs([(REMOTE_IP, "127.0.0.1"), (COLOR, "red"), (MIRROR, "true")])
        );

        let mut seen = Metadata::new();
        md.range(|k, v| { seen.insert(k, v.clone()); }, Some(&is_incoming_key));
        assert_eq!(
            seen,
            Metadata::pairs([
                (CALLER, "app-feed"),
                (REMOTE_IP, "127.0.0.1"),
                (COLOR, "red"),
                (MIRROR, "true"),
            ])
        );
    }

    #[test]
    fn test_serde_roundtrip_keeps_types() {
        let md = Metadata::pairs([(MIRROR, MetaValue::Bool(true)), (MID, MetaValue::Int(7))]);
        let json = serde_json::to_string(&md).unwrap();
        let back: Metadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back.int64(MID), 7);
        assert!(back.bool(MIRROR));
    }
}
