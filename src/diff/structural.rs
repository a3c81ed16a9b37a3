//! Structural comparison of JSON mappings.
//!
//! These helpers decide whether a declared resource differs from what the
//! device reports. `dict_diff`, `is_subset` and `values_equal` treat sequences
//! as unordered collections, so a device that returns `["g2", "g1"]` matches a
//! declaration of `["g1", "g2"]`. [`normalized_eq`], which decides whether a
//! replacement is needed, keeps sequence order significant.

use serde_json::{Map, Value};

/// Returns true if the value counts as "unset".
///
/// `false` and `0` are real values and are not empty.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Recursively drop keys whose value is null, `""`, `[]` or `{}`.
///
/// Nested mappings are cleaned first and dropped if nothing survives.
/// Sequences made entirely of mappings have each element cleaned; other
/// sequences are kept as they are.
pub fn remove_empties(map: &Map<String, Value>) -> Map<String, Value> {
    let mut cleaned = Map::new();

    for (key, value) in map {
        match value {
            Value::Object(inner) => {
                let child = remove_empties(inner);
                if !child.is_empty() {
                    cleaned.insert(key.clone(), Value::Object(child));
                }
            }
            Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_object) => {
                let child = items
                    .iter()
                    .filter_map(Value::as_object)
                    .map(|item| Value::Object(remove_empties(item)))
                    .collect();
                cleaned.insert(key.clone(), Value::Array(child));
            }
            other if is_empty_value(other) => {}
            other => {
                cleaned.insert(key.clone(), other.clone());
            }
        }
    }

    cleaned
}

/// [`remove_empties`] for an arbitrary value; non-mappings pass through.
pub fn remove_empties_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(remove_empties(map)),
        other => other.clone(),
    }
}

/// Recursive difference of `comparable` against `base`.
///
/// Returns the keys of `comparable` whose value differs from `base`, plus
/// keys missing from `base`. Nested mappings contribute only their differing
/// sub-keys. Null values in `comparable` mean "not specified" and never count
/// as a difference for keys `base` already has.
pub fn dict_diff(base: &Map<String, Value>, comparable: &Map<String, Value>) -> Map<String, Value> {
    let mut updates = Map::new();

    for (key, value) in base {
        let other = match comparable.get(key) {
            Some(Value::Null) | None => continue,
            Some(other) => other,
        };

        match (value, other) {
            (Value::Object(inner), Value::Object(other_inner)) => {
                let sub_diff = dict_diff(inner, other_inner);
                if !sub_diff.is_empty() {
                    updates.insert(key.clone(), Value::Object(sub_diff));
                }
            }
            _ => {
                if !values_equal(value, other) {
                    updates.insert(key.clone(), other.clone());
                }
            }
        }
    }

    for (key, value) in comparable {
        if !base.contains_key(key) {
            updates.insert(key.clone(), value.clone());
        }
    }

    updates
}

/// Recursively merge `overlay` onto `base`.
///
/// Scalars from `overlay` win, including an explicit null. Mappings merge key
/// by key. Sequences are unioned: the overlay's items first, then the base
/// items it does not already contain. Keys only present in `overlay` are
/// appended after the base keys.
pub fn dict_merge(base: &Map<String, Value>, overlay: &Map<String, Value>) -> Map<String, Value> {
    let mut combined = Map::new();

    for (key, value) in base {
        let merged = match overlay.get(key) {
            None => value.clone(),
            Some(Value::Null) => Value::Null,
            Some(other) => match (value, other) {
                (Value::Object(inner), Value::Object(other_inner)) => {
                    Value::Object(dict_merge(inner, other_inner))
                }
                (Value::Array(items), Value::Array(other_items)) => {
                    Value::Array(union(other_items, items))
                }
                (_, other) => other.clone(),
            },
        };
        combined.insert(key.clone(), merged);
    }

    for (key, value) in overlay {
        if !base.contains_key(key) {
            combined.insert(key.clone(), value.clone());
        }
    }

    combined
}

/// Returns true if everything `want` declares is already present in `have`.
///
/// Every key of `want` must exist in `have`. Nested mappings recurse,
/// sequences must be contained as sets, and all other values must be equal.
pub fn is_subset(want: &Map<String, Value>, have: &Map<String, Value>) -> bool {
    if want.len() > have.len() {
        return false;
    }

    want.iter().all(|(key, value)| match have.get(key) {
        None => false,
        Some(current) => value_is_subset(value, current),
    })
}

fn value_is_subset(want: &Value, have: &Value) -> bool {
    match (want, have) {
        (Value::Object(w), Value::Object(h)) => is_subset(w, h),
        (Value::Array(w), Value::Array(h)) => w.iter().all(|item| h.contains(item)),
        (w, h) => w == h,
    }
}

/// Equality that ignores sequence order at every level.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Array(x), Value::Array(y)) => {
            if x.len() != y.len() {
                return false;
            }
            let mut remaining: Vec<&Value> = y.iter().collect();
            for item in x {
                match remaining.iter().position(|other| values_equal(item, other)) {
                    Some(idx) => {
                        remaining.swap_remove(idx);
                    }
                    None => return false,
                }
            }
            true
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| values_equal(v, other)))
        }
        (x, y) => x == y,
    }
}

/// Empty-normalized equality: absent, null and empty compare equal.
///
/// Sequences must match element by element; a reordered list is a change.
pub fn normalized_eq(a: &Map<String, Value>, b: &Map<String, Value>) -> bool {
    remove_empties(a) == remove_empties(b)
}

fn union(first: &[Value], second: &[Value]) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::with_capacity(first.len() + second.len());
    for item in first.iter().chain(second) {
        if !out.contains(item) {
            out.push(item.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn test_remove_empties_drops_unset_values() {
        let cleaned = remove_empties(&obj(json!({
            "username": "admin",
            "description": "",
            "groups": [],
            "ipv4": {"gateway": null, "dns": {}},
            "enabled": false,
            "retries": 0,
            "password": null
        })));
        assert_eq!(
            Value::Object(cleaned),
            json!({"username": "admin", "enabled": false, "retries": 0})
        );
    }

    #[test]
    fn test_remove_empties_cleans_lists_of_mappings() {
        let cleaned = remove_empties(&obj(json!({
            "sessions": [{"client_pid": 12, "username": null}, {"client_pid": 13}],
            "tags": ["a", ""]
        })));
        assert_eq!(
            Value::Object(cleaned),
            json!({
                "sessions": [{"client_pid": 12}, {"client_pid": 13}],
                "tags": ["a", ""]
            })
        );
    }

    #[test]
    fn test_dict_diff_reports_changed_and_new_keys() {
        let base = obj(json!({"hostname": "om", "ipv4": {"mode": "static", "mtu": 1500}}));
        let comparable = obj(json!({
            "hostname": "om",
            "ipv4": {"mode": "dhcp", "mtu": 1500},
            "banner": "hello",
            "timezone": null
        }));
        assert_eq!(
            Value::Object(dict_diff(&base, &comparable)),
            json!({"ipv4": {"mode": "dhcp"}, "banner": "hello", "timezone": null})
        );
    }

    #[test]
    fn test_dict_diff_ignores_order_and_nulls() {
        let base = obj(json!({"groups": ["g1", "g2"], "enabled": true}));
        let comparable = obj(json!({"groups": ["g2", "g1"], "enabled": null}));
        assert!(dict_diff(&base, &comparable).is_empty());
    }

    #[test]
    fn test_dict_merge_unions_lists_and_overlays_scalars() {
        let base = obj(json!({
            "id": "users-1",
            "username": "user1",
            "groups": ["g1"],
            "ssh": {"enabled": true, "port": 22}
        }));
        let overlay = obj(json!({
            "username": "user1-modified",
            "groups": ["g2"],
            "ssh": {"port": 2222},
            "description": "ops"
        }));
        assert_eq!(
            Value::Object(dict_merge(&base, &overlay)),
            json!({
                "id": "users-1",
                "username": "user1-modified",
                "groups": ["g2", "g1"],
                "ssh": {"enabled": true, "port": 2222},
                "description": "ops"
            })
        );
    }

    #[test]
    fn test_dict_merge_explicit_null_wins() {
        let base = obj(json!({"password": "secret", "groups": ["g1"]}));
        let overlay = obj(json!({"password": null}));
        assert_eq!(
            Value::Object(dict_merge(&base, &overlay)),
            json!({"password": null, "groups": ["g1"]})
        );
    }

    #[test]
    fn test_is_subset() {
        let have = obj(json!({
            "username": "user1",
            "groups": ["g1", "g2"],
            "ssh": {"enabled": true, "port": 22}
        }));
        assert!(is_subset(&obj(json!({"groups": ["g2"]})), &have));
        assert!(is_subset(&obj(json!({"ssh": {"port": 22}})), &have));
        assert!(!is_subset(&obj(json!({"groups": ["g3"]})), &have));
        assert!(!is_subset(&obj(json!({"description": "x"})), &have));
        assert!(!is_subset(&obj(json!({"username": "user2"})), &have));
    }

    #[test]
    fn test_normalized_eq() {
        let a = obj(json!({"name": "net1", "slaves": [], "description": null}));
        let b = obj(json!({"name": "net1"}));
        assert!(normalized_eq(&a, &b));
        assert!(!normalized_eq(&a, &obj(json!({"name": "net2"}))));
    }

    #[test]
    fn test_normalized_eq_keeps_sequence_order() {
        let a = obj(json!({"dns_servers": ["1.1.1.1", "8.8.8.8"], "mode": "static"}));
        let b = obj(json!({"mode": "static", "dns_servers": ["8.8.8.8", "1.1.1.1"]}));
        assert!(!normalized_eq(&a, &b));
        assert!(normalized_eq(&a, &obj(json!({"mode": "static", "dns_servers": ["1.1.1.1", "8.8.8.8"]}))));
    }

    #[test]
    fn test_values_equal_nested_order() {
        assert!(values_equal(
            &json!([{"a": [1, 2]}, {"b": 1}]),
            &json!([{"b": 1}, {"a": [2, 1]}])
        ));
        assert!(!values_equal(&json!([1, 1, 2]), &json!([1, 2, 2])));
    }
}
