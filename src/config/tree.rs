//! Dotted-path helpers over the `serde_json::Value` configuration tree.

use serde_json::{Map, Value};

pub(crate) fn get_path<'a>(root: &'a Value, key: &str) -> Option<&'a Value> {
    if key.is_empty() {
        return Some(root);
    }
    key.split('.')
        .try_fold(root, |node, segment| node.as_object()?.get(segment))
}

pub(crate) fn set_path(root: &mut Value, key: &str, value: Value) {
    if key.is_empty() {
        *root = value;
        return;
    }
    let segments: Vec<&str> = key.split('.').collect();
    set_segments(root, &segments, value);
}

fn set_segments(node: &mut Value, segments: &[&str], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *node = value;
        return;
    };
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        let child = map.entry(first.to_string()).or_insert(Value::Null);
        set_segments(child, rest, value);
    }
}

/// Deep-merge `overlay` into `base`; objects merge key by key, anything else replaces.
pub(crate) fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// TOML has no null; drop them before serializing.
pub(crate) fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(strip_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_then_get_nested_path() {
        let mut root = json!({});
        set_path(&mut root, "db.primary.host", json!("localhost"));
        assert_eq!(get_path(&root, "db.primary.host"), Some(&json!("localhost")));
        assert_eq!(get_path(&root, "db.replica"), None);
    }

    #[test]
    fn set_path_replaces_scalar_intermediate() {
        let mut root = json!({ "db": 1 });
        set_path(&mut root, "db.port", json!(5432));
        assert_eq!(root, json!({ "db": { "port": 5432 } }));
    }

    #[test]
    fn merge_keeps_unrelated_keys() {
        let mut base = json!({ "base": { "port": "3788", "debug": false } });
        merge(&mut base, json!({ "base": { "debug": true }, "extra": 1 }));
        assert_eq!(
            base,
            json!({ "base": { "port": "3788", "debug": true }, "extra": 1 })
        );
    }

    #[test]
    fn strip_nulls_recurses() {
        let mut value = json!({ "a": null, "b": { "c": null, "d": 1 } });
        strip_nulls(&mut value);
        assert_eq!(value, json!({ "b": { "d": 1 } }));
    }
}
