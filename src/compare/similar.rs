use serde_json::{Map, Value};

/// Deep-compare two values, ignoring the listed top-level keys.
///
/// Exclusions only apply when both sides are records. Nested records and
/// arrays are compared element by element, and numbers compare by numeric
/// value so `1` and `1.0` are similar.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use statebox::compare::are_similar;
///
/// let a = json!({"count": 1, "name": "a"});
/// let b = json!({"count": 1, "name": "b"});
///
/// assert!(!are_similar(&a, &b, &[]));
/// assert!(are_similar(&a, &b, &["name"]));
/// ```
pub fn are_similar(a: &Value, b: &Value, excluded: &[&str]) -> bool {
    match (a, b) {
        (Value::Object(a), Value::Object(b)) => are_similar_records(a, b, excluded),
        _ => deep_equal(a, b),
    }
}

/// Record form of [`are_similar`].
pub fn are_similar_records(a: &Map<String, Value>, b: &Map<String, Value>, excluded: &[&str]) -> bool {
    let kept = |key: &&String| !excluded.contains(&key.as_str());

    let a_len = a.keys().filter(kept).count();
    let b_len = b.keys().filter(kept).count();
    if a_len != b_len {
        return false;
    }

    a.iter()
        .filter(|(key, _)| kept(key))
        .all(|(key, left)| b.get(key).is_some_and(|right| deep_equal(left, right)))
}

fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => {
            // Integers first so large values don't lose precision through f64.
            match (a.as_i64(), b.as_i64()) {
                (Some(a), Some(b)) => a == b,
                _ => match (a.as_u64(), b.as_u64()) {
                    (Some(a), Some(b)) => a == b,
                    _ => a.as_f64() == b.as_f64(),
                },
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| deep_equal(a, b))
        }
        (Value::Object(a), Value::Object(b)) => are_similar_records(a, b, &[]),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn identical_content_is_similar() {
        let a = json!({"user": {"name": "ann", "tags": [1, 2, {"x": null}]}, "count": 3});
        let b = json!({"count": 3, "user": {"tags": [1, 2, {"x": null}], "name": "ann"}});
        assert!(are_similar(&a, &b, &[]));
    }

    #[test]
    fn nested_change_is_detected() {
        let a = json!({"user": {"tags": [1, 2]}});
        let b = json!({"user": {"tags": [1, 3]}});
        assert!(!are_similar(&a, &b, &[]));
    }

    #[test]
    fn exclusions_are_top_level_only() {
        let a = json!({"a": 1, "inner": {"b": 1}});
        let b = json!({"a": 2, "inner": {"b": 2}});
        assert!(!are_similar(&a, &b, &["a", "b"]));
        assert!(are_similar(&a, &b, &["a", "inner"]));
    }

    #[test]
    fn missing_key_differs() {
        let a = json!({"a": 1, "b": null});
        let b = json!({"a": 1});
        assert!(!are_similar(&a, &b, &[]));
        assert!(are_similar(&a, &b, &["b"]));
    }

    #[test]
    fn numbers_compare_by_value() {
        assert!(are_similar(&json!({"n": 1}), &json!({"n": 1.0}), &[]));
        assert!(!are_similar(&json!({"n": 1}), &json!({"n": 1.5}), &[]));
        assert!(!are_similar(&json!({"n": 1}), &json!({"n": "1"}), &[]));
    }

    #[test]
    fn array_order_matters() {
        assert!(!are_similar(&json!([1, 2]), &json!([2, 1]), &[]));
    }

    fn leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-z]{0,6}".prop_map(Value::String),
        ]
    }

    fn value() -> impl Strategy<Value = Value> {
        leaf().prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-d]", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn reflexive(v in value()) {
            prop_assert!(are_similar(&v, &v.clone(), &[]));
        }

        #[test]
        fn symmetric(a in value(), b in value()) {
            prop_assert_eq!(are_similar(&a, &b, &[]), are_similar(&b, &a, &[]));
        }

        #[test]
        fn excluded_key_changes_are_invisible(base in value(), x in leaf(), y in leaf()) {
            let mut a = Map::new();
            a.insert("watched".to_string(), base.clone());
            a.insert("ignored".to_string(), x);
            let mut b = Map::new();
            b.insert("watched".to_string(), base);
            b.insert("ignored".to_string(), y);
            prop_assert!(are_similar_records(&a, &b, &["ignored"]));
        }
    }
}
