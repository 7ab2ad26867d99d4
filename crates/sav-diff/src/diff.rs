use crate::{Change, Diff, Patch, Shape, Structural};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Additions {
    Ignore,
    Include,
}

/// Minimal recursive patch describing how `b` differs from the baseline `a`.
///
/// For each key of `a`:
/// - both mappings: recurse, keep the nested patch only when non-empty
/// - both sequences: equal iff same length and pairwise `==`, otherwise the
///   whole of `b[key]` is taken
/// - otherwise: `b[key]` is taken iff `a[key] != b[key]`
/// - key missing from `b`: [`Change::Removed`]
///
/// Keys that exist only in `b` are **not** visited; use
/// [`structural_diff_with_additions`] when added keys matter.
///
/// A baseline that is not a mapping has no keys and always yields
/// [`Diff::Unchanged`].
pub fn structural_diff<V: Structural>(a: &V, b: &V) -> Diff<V> {
    diff_mappings(a, b, Additions::Ignore).into_diff()
}

/// Same as [`structural_diff`], plus keys present only in `b` (at any depth)
/// reported as [`Change::Set`].
pub fn structural_diff_with_additions<V: Structural>(a: &V, b: &V) -> Diff<V> {
    diff_mappings(a, b, Additions::Include).into_diff()
}

fn diff_mappings<V: Structural>(a: &V, b: &V, additions: Additions) -> Patch<V> {
    let mut patch = Patch::new();

    let entries = match a.shape() {
        Shape::Mapping(entries) => entries,
        _ => return patch,
    };

    for (key, a_val) in entries {
        match b.field(key) {
            Some(b_val) => {
                if let Some(change) = diff_field(a_val, b_val, additions) {
                    patch.insert(key, change);
                }
            }
            None => patch.insert(key, Change::Removed),
        }
    }

    if additions == Additions::Include {
        if let Shape::Mapping(b_entries) = b.shape() {
            for (key, b_val) in b_entries {
                if a.field(key).is_none() {
                    patch.insert(key, Change::Set(b_val.clone()));
                }
            }
        }
    }

    patch
}

fn diff_field<V: Structural>(a: &V, b: &V, additions: Additions) -> Option<Change<V>> {
    if a.is_mapping() && b.is_mapping() {
        let nested = diff_mappings(a, b, additions);
        return if nested.is_empty() {
            None
        } else {
            Some(Change::Nested(nested))
        };
    }

    if let (Shape::Sequence(xs), Shape::Sequence(ys)) = (a.shape(), b.shape()) {
        return if sequences_equal(xs, ys) {
            None
        } else {
            Some(Change::Set(b.clone()))
        };
    }

    // Primitives and mismatched shapes.
    if a != b {
        Some(Change::Set(b.clone()))
    } else {
        None
    }
}

fn sequences_equal<V: PartialEq>(xs: &[V], ys: &[V]) -> bool {
    xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| x == y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;

    fn diff_json(a: Value, b: Value) -> Value {
        serde_json::to_value(structural_diff(&a, &b)).unwrap()
    }

    #[test]
    fn identical_values_are_unchanged_at_any_depth() {
        let x = json!({
            "a": 1,
            "b": {"c": {"d": [1, {"e": [true, null]}]}},
            "f": [],
            "g": {}
        });
        assert_eq!(structural_diff(&x, &x.clone()), Diff::Unchanged);
    }

    #[test]
    fn primitive_change() {
        assert_eq!(diff_json(json!({"a": 1, "b": 2}), json!({"a": 1, "b": 3})), json!({"b": 3}));
    }

    #[test]
    fn nested_change_keeps_only_differing_leaf() {
        assert_eq!(
            diff_json(json!({"a": {"x": 1, "y": 2}}), json!({"a": {"x": 1, "y": 9}})),
            json!({"a": {"y": 9}})
        );
    }

    #[test]
    fn equal_nested_mapping_omits_parent_key() {
        let d = structural_diff(
            &json!({"a": {"x": 1}, "b": 1}),
            &json!({"a": {"x": 1}, "b": 2}),
        );
        let p = d.patch().unwrap();
        assert!(!p.contains_key("a"));
        assert_eq!(p.get("b"), Some(&Change::Set(json!(2))));
    }

    #[test]
    fn arrays_are_replaced_whole() {
        assert_eq!(
            diff_json(json!({"a": [1, 2, 3]}), json!({"a": [1, 2, 4]})),
            json!({"a": [1, 2, 4]})
        );
        assert_eq!(structural_diff(&json!({"a": [1, 2]}), &json!({"a": [1, 2]})), Diff::Unchanged);
        assert_eq!(
            diff_json(json!({"a": [1, 2]}), json!({"a": [1, 2, 3]})),
            json!({"a": [1, 2, 3]})
        );
    }

    #[test]
    fn arrays_of_equal_objects_compare_by_content() {
        let a = json!({"tags": [{"id": 1}, {"id": 2}]});
        let b = json!({"tags": [{"id": 1}, {"id": 2}]});
        assert_eq!(structural_diff(&a, &b), Diff::Unchanged);
    }

    #[test]
    fn candidate_only_keys_are_ignored() {
        assert_eq!(structural_diff(&json!({"a": 1}), &json!({"a": 1, "b": 2})), Diff::Unchanged);
    }

    #[test]
    fn additive_variant_reports_new_keys() {
        let a = json!({"a": 1, "n": {"x": 1}});
        let b = json!({"a": 1, "b": 2, "n": {"x": 1, "y": 2}});
        assert_eq!(
            serde_json::to_value(structural_diff_with_additions(&a, &b)).unwrap(),
            json!({"b": 2, "n": {"y": 2}})
        );
    }

    #[test]
    fn type_changes_take_candidate_value() {
        assert_eq!(
            diff_json(json!({"a": {"x": 1}, "b": [1], "c": 1}), json!({"a": 5, "b": {"0": 1}, "c": "1"})),
            json!({"a": 5, "b": {"0": 1}, "c": "1"})
        );
    }

    #[test]
    fn falsy_changes_are_kept() {
        let d = structural_diff(&json!({"a": 1, "b": true}), &json!({"a": 0, "b": false}));
        let p = d.patch().unwrap();
        assert_eq!(p.get("a"), Some(&Change::Set(json!(0))));
        assert_eq!(p.get("b"), Some(&Change::Set(json!(false))));
    }

    #[test]
    fn missing_candidate_key_is_removed() {
        let d = structural_diff(&json!({"a": 1, "b": 2}), &json!({"a": 1}));
        assert_eq!(d.patch().unwrap().get("b"), Some(&Change::Removed));
    }

    #[test]
    fn non_mapping_baseline_has_no_keys() {
        assert_eq!(structural_diff(&json!(1), &json!(2)), Diff::Unchanged);
        assert_eq!(structural_diff(&json!([1]), &json!([2])), Diff::Unchanged);
    }

    #[test]
    fn non_mapping_candidate_removes_every_key() {
        let d = structural_diff(&json!({"a": 1, "b": 2}), &json!(null));
        assert_eq!(d.patch().unwrap().leaf_pointers(), vec!["/a", "/b"]);
    }

    // -----------------------------------------------------------------------
    // A second value model, to pin the float semantics.
    // -----------------------------------------------------------------------

    #[derive(Clone, Debug, PartialEq)]
    enum Node {
        Num(f64),
        List(Vec<Node>),
        Record(BTreeMap<String, Node>),
    }

    impl Structural for Node {
        fn shape(&self) -> Shape<'_, Self> {
            match self {
                Node::Num(_) => Shape::Primitive,
                Node::List(items) => Shape::Sequence(items),
                Node::Record(m) => Shape::Mapping(m.iter().map(|(k, v)| (k.as_str(), v)).collect()),
            }
        }

        fn field(&self, key: &str) -> Option<&Self> {
            match self {
                Node::Record(m) => m.get(key),
                _ => None,
            }
        }

        fn field_mut(&mut self, key: &str) -> Option<&mut Self> {
            match self {
                Node::Record(m) => m.get_mut(key),
                _ => None,
            }
        }

        fn set_field(&mut self, key: &str, value: Self) -> bool {
            match self {
                Node::Record(m) => {
                    m.insert(key.to_string(), value);
                    true
                }
                _ => false,
            }
        }

        fn remove_field(&mut self, key: &str) -> Option<Self> {
            match self {
                Node::Record(m) => m.remove(key),
                _ => None,
            }
        }
    }

    fn record(fields: &[(&str, Node)]) -> Node {
        Node::Record(fields.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
    }

    #[test]
    fn nan_is_never_equal_to_itself() {
        let a = record(&[("x", Node::Num(f64::NAN)), ("y", Node::Num(1.0))]);
        let d = structural_diff(&a, &a.clone());
        let p = d.patch().expect("NaN field must be reported");
        assert_eq!(p.keys().collect::<Vec<_>>(), vec!["x"]);
    }

    #[test]
    fn nan_inside_sequence_replaces_the_sequence() {
        let a = record(&[("l", Node::List(vec![Node::Num(f64::NAN)]))]);
        assert!(structural_diff(&a, &a.clone()).is_changed());
    }

    #[test]
    fn custom_model_nested_diff() {
        let a = record(&[("r", record(&[("x", Node::Num(1.0)), ("y", Node::Num(2.0))]))]);
        let b = record(&[("r", record(&[("x", Node::Num(1.0)), ("y", Node::Num(3.0))]))]);
        let p = structural_diff(&a, &b).into_patch().unwrap();
        assert_eq!(p.leaf_pointers(), vec!["/r/y"]);
    }
}
