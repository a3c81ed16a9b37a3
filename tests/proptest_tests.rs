//! Property-based tests for the structural comparison toolkit using proptest.
//!
//! Random JSON documents exercise the laws the reconcilers rely on:
//! cleaning is stable, merging never loses declared data, and a document
//! never differs from itself.

use opengear_om::connection::Method;
use opengear_om::diff::{
    dict_diff, dict_merge, is_empty_value, is_subset, normalized_eq, remove_empties, values_equal,
};
use opengear_om::modules::network::{command_builder, Command};
use proptest::collection::{btree_map, vec};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

// ============================================================================
// Strategies for generating test data
// ============================================================================

/// Strategy for generating arbitrary JSON values with a bounded depth
fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-1000i64..1000).prop_map(|n| json!(n)),
        "[a-z]{0,6}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            vec(inner.clone(), 0..4).prop_map(Value::Array),
            btree_map("[a-d]{1,2}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

/// Strategy for generating a JSON mapping
fn json_map() -> impl Strategy<Value = Map<String, Value>> {
    btree_map("[a-e]{1,2}", json_value(), 0..5).prop_map(|m| m.into_iter().collect())
}

/// Strategy for generating device-style ids
fn instance_id() -> impl Strategy<Value = String> {
    "(users|groups|pdus)-[1-9][0-9]{0,2}"
}

// ============================================================================
// remove_empties
// ============================================================================

proptest! {
    #[test]
    fn test_remove_empties_is_idempotent(map in json_map()) {
        let once = remove_empties(&map);
        let twice = remove_empties(&once);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn test_remove_empties_leaves_no_empty_values(map in json_map()) {
        let cleaned = remove_empties(&map);
        for (key, value) in &cleaned {
            prop_assert!(!is_empty_value(value), "key {} is still empty", key);
        }
    }

    #[test]
    fn test_normalized_eq_ignores_empties(map in json_map()) {
        prop_assert!(normalized_eq(&map, &remove_empties(&map)));
    }
}

// ============================================================================
// dict_diff / is_subset / dict_merge
// ============================================================================

proptest! {
    #[test]
    fn test_dict_diff_of_self_is_empty(map in json_map()) {
        prop_assert!(dict_diff(&map, &map).is_empty());
    }

    #[test]
    fn test_is_subset_is_reflexive(map in json_map()) {
        prop_assert!(is_subset(&map, &map));
    }

    #[test]
    fn test_merge_with_self_keeps_content(map in json_map()) {
        let merged = dict_merge(&map, &map);
        prop_assert!(is_subset(&map, &merged));
        prop_assert!(is_subset(&merged, &map));
    }

    #[test]
    fn test_merge_contains_overlay(base in json_map(), overlay in json_map()) {
        let merged = dict_merge(&base, &overlay);
        prop_assert!(is_subset(&overlay, &merged));
        for key in base.keys() {
            prop_assert!(merged.contains_key(key));
        }
    }

    #[test]
    fn test_values_equal_ignores_order(items in vec(json_value(), 0..6)) {
        let mut reversed = items.clone();
        reversed.reverse();
        prop_assert!(values_equal(&Value::Array(items), &Value::Array(reversed)));
    }

    #[test]
    fn test_scalars_are_never_empty(flag in any::<bool>(), number in any::<i64>()) {
        prop_assert!(!is_empty_value(&json!(flag)));
        prop_assert!(!is_empty_value(&json!(number)));
    }
}

// ============================================================================
// command_builder
// ============================================================================

proptest! {
    #[test]
    fn test_id_with_data_is_put(id in instance_id(), name in "[a-z]{1,8}") {
        let data = json!({"item": {"name": name}});
        let command = command_builder(Some(data.clone()), "items/", Some(&id), &[], None);
        prop_assert_eq!(command, Some(Command::put(format!("items/{}", id), data)));
    }

    #[test]
    fn test_id_without_data_is_delete_unless_protected(id in instance_id()) {
        let command = command_builder(None, "items/", Some(&id), &[], None);
        prop_assert_eq!(command, Some(Command::delete(format!("items/{}", id))));

        let protected = vec![id.clone()];
        prop_assert_eq!(command_builder(None, "items/", Some(&id), &protected, None), None);
    }

    #[test]
    fn test_empty_data_without_id_builds_nothing(empty in prop_oneof![
        Just(json!(null)),
        Just(json!({})),
        Just(json!([])),
        Just(json!("")),
    ]) {
        prop_assert_eq!(command_builder(Some(empty), "items/", None, &[], None), None);
    }

    #[test]
    fn test_explicit_method_wins(id in instance_id()) {
        let command = command_builder(None, "items/", Some(&id), &[id.clone()], Some(Method::Post));
        prop_assert_eq!(command.map(|c| c.method), Some(Method::Post));
    }
}
