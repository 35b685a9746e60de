//! Two-way JSON merge patch (RFC 7386) computation
//!
//! Objects are compared key by key, so map ordering never produces a diff.
//! Arrays and scalars are replaced wholesale when they differ; keys removed
//! from the modified document are patched to `null`.

use serde_json::{Map, Value};

/// Compute the merge patch that turns `original` into `modified`
///
/// Returns an empty object when the documents are equal.
pub fn create_merge_patch(original: &Value, modified: &Value) -> Value {
    match (original, modified) {
        (Value::Object(orig), Value::Object(modi)) => Value::Object(diff_objects(orig, modi)),
        _ if original == modified => Value::Object(Map::new()),
        _ => modified.clone(),
    }
}

/// Whether a patch produced by [`create_merge_patch`] changes nothing
pub fn is_empty_patch(patch: &Value) -> bool {
    patch.as_object().is_some_and(Map::is_empty)
}

fn diff_objects(
    original: &Map<String, Value>,
    modified: &Map<String, Value>,
) -> Map<String, Value> {
    let mut patch = Map::new();

    for (key, orig) in original {
        match modified.get(key) {
            None => {
                patch.insert(key.clone(), Value::Null);
            }
            Some(modi) if modi == orig => {}
            Some(Value::Object(modi)) => match orig {
                Value::Object(orig) => {
                    patch.insert(key.clone(), Value::Object(diff_objects(orig, modi)));
                }
                _ => {
                    patch.insert(key.clone(), Value::Object(modi.clone()));
                }
            },
            Some(modi) => {
                patch.insert(key.clone(), modi.clone());
            }
        }
    }

    for (key, modi) in modified {
        if !original.contains_key(key) {
            patch.insert(key.clone(), modi.clone());
        }
    }

    patch
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn round_trip(original: &Value, modified: &Value) -> Value {
        let patch = create_merge_patch(original, modified);
        let mut applied = original.clone();
        json_patch::merge(&mut applied, &patch);
        applied
    }

    #[test]
    fn test_equal_documents_produce_empty_patch() {
        let doc = json!({"metadata": {"name": "a", "labels": {"x": "1"}}, "data": {"k": "v"}});
        let patch = create_merge_patch(&doc, &doc);
        assert!(is_empty_patch(&patch));
    }

    #[test]
    fn test_key_order_is_irrelevant() {
        let a: Value =
            serde_json::from_str(r#"{"labels": {"a": "1", "b": "2", "c": "3"}}"#).unwrap();
        let b: Value =
            serde_json::from_str(r#"{"labels": {"c": "3", "a": "1", "b": "2"}}"#).unwrap();
        assert!(is_empty_patch(&create_merge_patch(&a, &b)));
    }

    #[test]
    fn test_single_field_change_touches_only_that_field() {
        let mut data = Map::new();
        for i in 0..10 {
            data.insert(format!("key{}", i), Value::String(format!("value{}", i)));
        }
        let original = json!({"metadata": {"name": "cm"}, "data": data});
        let mut modified = original.clone();
        modified["data"]["key4"] = json!("changed");

        let patch = create_merge_patch(&original, &modified);
        assert_eq!(patch, json!({"data": {"key4": "changed"}}));
        assert_eq!(round_trip(&original, &modified), modified);
    }

    #[test]
    fn test_removed_key_patched_to_null() {
        let original = json!({"data": {"keep": "1", "drop": "2"}});
        let modified = json!({"data": {"keep": "1"}});
        let patch = create_merge_patch(&original, &modified);
        assert_eq!(patch, json!({"data": {"drop": null}}));
        assert_eq!(round_trip(&original, &modified), modified);
    }

    #[test]
    fn test_added_nested_object() {
        let original = json!({"metadata": {"name": "ns1"}});
        let modified = json!({"metadata": {"name": "ns1", "annotations": {"a": "b"}}});
        let patch = create_merge_patch(&original, &modified);
        assert_eq!(patch, json!({"metadata": {"annotations": {"a": "b"}}}));
        assert_eq!(round_trip(&original, &modified), modified);
    }

    #[test]
    fn test_arrays_are_replaced_wholesale() {
        let original = json!({"spec": {"finalizers": ["a", "b"]}});
        let modified = json!({"spec": {"finalizers": ["a", "c"]}});
        let patch = create_merge_patch(&original, &modified);
        assert_eq!(patch, json!({"spec": {"finalizers": ["a", "c"]}}));
    }

    #[test]
    fn test_scalar_replaced_by_object() {
        let original = json!({"value": "plain"});
        let modified = json!({"value": {"nested": true}});
        assert_eq!(round_trip(&original, &modified), modified);
    }

    #[test]
    fn test_non_object_roots() {
        assert!(is_empty_patch(&create_merge_patch(&json!(1), &json!(1))));
        assert_eq!(create_merge_patch(&json!(1), &json!(2)), json!(2));
    }
}
