use std::collections::BTreeMap;

use serde::ser::{Serialize, SerializeMap, Serializer};

/// A single field-level change.
#[derive(Clone, Debug, PartialEq)]
pub enum Change<V> {
    /// Replace the field with this value (primitives, whole sequences,
    /// type changes, added keys).
    Set(V),
    /// Recursive patch of a mapping field. Never empty.
    Nested(Patch<V>),
    /// Key present in the baseline, absent in the candidate.
    Removed,
}

/// Minimal set of field-level differences, keyed by field name.
///
/// Keys are kept in a `BTreeMap` so iteration, logging and serialization are
/// deterministic.
#[derive(Clone, Debug, PartialEq)]
pub struct Patch<V> {
    entries: BTreeMap<String, Change<V>>,
}

impl<V> Default for Patch<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Patch<V> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Insert a change for `key`, replacing any previous change.
    pub fn insert(&mut self, key: impl Into<String>, change: Change<V>) {
        self.entries.insert(key.into(), change);
    }

    pub fn get(&self, key: &str) -> Option<&Change<V>> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of top-level fields touched.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Change<V>)> {
        self.entries.iter().map(|(k, c)| (k.as_str(), c))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Wrap into a [`Diff`], mapping an empty patch to [`Diff::Unchanged`].
    pub fn into_diff(self) -> Diff<V> {
        if self.is_empty() {
            Diff::Unchanged
        } else {
            Diff::Changed(self)
        }
    }

    /// JSON pointers of every changed leaf, sorted.
    ///
    /// `{"a": Nested({"y": Set(9)}), "b": Removed}` yields `["/a/y", "/b"]`.
    pub fn leaf_pointers(&self) -> Vec<String> {
        let mut out = Vec::new();
        collect_leaf_pointers(self, "", &mut out);
        out.sort();
        out
    }
}

fn collect_leaf_pointers<V>(patch: &Patch<V>, prefix: &str, out: &mut Vec<String>) {
    for (key, change) in &patch.entries {
        let next = format!("{}/{}", prefix, escape_pointer_token(key));
        match change {
            Change::Nested(inner) => collect_leaf_pointers(inner, &next, out),
            Change::Set(_) | Change::Removed => out.push(next),
        }
    }
}

pub(crate) fn escape_pointer_token(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

/// Result of a structural diff.
///
/// `Unchanged` is an explicit marker: callers never have to infer "no
/// difference" from the truthiness of a map whose values may themselves be
/// falsy (`0`, `false`, `null`).
#[derive(Clone, Debug, PartialEq)]
pub enum Diff<V> {
    Unchanged,
    /// Non-empty patch.
    Changed(Patch<V>),
}

impl<V> Diff<V> {
    pub fn is_changed(&self) -> bool {
        matches!(self, Diff::Changed(_))
    }

    pub fn patch(&self) -> Option<&Patch<V>> {
        match self {
            Diff::Changed(p) => Some(p),
            Diff::Unchanged => None,
        }
    }

    pub fn into_patch(self) -> Option<Patch<V>> {
        match self {
            Diff::Changed(p) => Some(p),
            Diff::Unchanged => None,
        }
    }

    /// Number of top-level fields touched (0 when unchanged).
    pub fn changed_fields(&self) -> usize {
        self.patch().map_or(0, Patch::len)
    }
}

// ---------------------------------------------------------------------------
// Serialization: a patch goes over the wire as a plain nested map.
// ---------------------------------------------------------------------------

/// `Removed` goes over the wire as `null`, the same form as `Set(null)`.
/// A receiver cannot tell "key dropped" from "key set to null"; match on
/// [`Change`] (or use [`Patch::leaf_pointers`]) before serializing when the
/// difference matters.
impl<V: Serialize> Serialize for Change<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Change::Set(v) => v.serialize(serializer),
            Change::Nested(p) => p.serialize(serializer),
            Change::Removed => serializer.serialize_none(),
        }
    }
}

impl<V: Serialize> Serialize for Patch<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, change) in &self.entries {
            map.serialize_entry(key, change)?;
        }
        map.end()
    }
}

impl<V: Serialize> Serialize for Diff<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Diff::Changed(p) => p.serialize(serializer),
            Diff::Unchanged => serializer.serialize_map(Some(0))?.end(),
        }
    }
}
