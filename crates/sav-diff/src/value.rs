//! Structural value model.
//!
//! The diff never guesses at a value's type. It asks for a [`Shape`] and
//! branches on the answer, so any type that can classify itself as a
//! primitive, a sequence or a keyed mapping can be diffed, patched and
//! tracked by the engine.

use serde_json::Value;

/// Classification of a structural value.
#[derive(Debug, PartialEq)]
pub enum Shape<'a, V> {
    /// Leaf value, compared with `PartialEq` only.
    Primitive,
    /// Ordered sequence. Compared element-wise, replaced wholesale.
    Sequence(&'a [V]),
    /// Keyed record, entries in the value's own iteration order.
    Mapping(Vec<(&'a str, &'a V)>),
}

/// A value the structural diff can walk.
///
/// Equality (`PartialEq`) must be deep value equality: two values with equal
/// content compare equal regardless of where they live. Float NaN handling
/// follows the implementor's `PartialEq`; for `f64` a NaN never equals
/// itself and is therefore always reported as changed.
pub trait Structural: Clone + PartialEq {
    fn shape(&self) -> Shape<'_, Self>;

    /// Field lookup. `None` for missing keys and for non-mappings.
    fn field(&self, key: &str) -> Option<&Self>;

    fn field_mut(&mut self, key: &str) -> Option<&mut Self>;

    /// Insert or replace a field.
    ///
    /// Returns `false` and leaves `self` untouched when `self` is not a mapping.
    fn set_field(&mut self, key: &str, value: Self) -> bool;

    fn remove_field(&mut self, key: &str) -> Option<Self>;

    fn is_mapping(&self) -> bool {
        matches!(self.shape(), Shape::Mapping(_))
    }

    /// Top-level keys of a mapping (empty for anything else).
    fn keys(&self) -> Vec<&str> {
        match self.shape() {
            Shape::Mapping(entries) => entries.into_iter().map(|(k, _)| k).collect(),
            _ => Vec::new(),
        }
    }
}

impl Structural for Value {
    fn shape(&self) -> Shape<'_, Self> {
        match self {
            Value::Object(map) => Shape::Mapping(map.iter().map(|(k, v)| (k.as_str(), v)).collect()),
            Value::Array(items) => Shape::Sequence(items.as_slice()),
            _ => Shape::Primitive,
        }
    }

    fn field(&self, key: &str) -> Option<&Self> {
        self.as_object()?.get(key)
    }

    fn field_mut(&mut self, key: &str) -> Option<&mut Self> {
        self.as_object_mut()?.get_mut(key)
    }

    fn set_field(&mut self, key: &str, value: Self) -> bool {
        match self.as_object_mut() {
            Some(map) => {
                map.insert(key.to_string(), value);
                true
            }
            None => false,
        }
    }

    fn remove_field(&mut self, key: &str) -> Option<Self> {
        self.as_object_mut()?.remove(key)
    }

    fn is_mapping(&self) -> bool {
        self.is_object()
    }
}
