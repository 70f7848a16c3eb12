//! Read a value from a nested context by a path of keys.

use crate::value::Value;

/// Walk `path` through nested objects starting at `root`.
///
/// Returns [`Value::Null`] on an empty path, a missing key at any link, or
/// a non-object intermediate value. Never coerces.
pub fn select(root: &Value, path: &[String]) -> Value {
    if path.is_empty() {
        return Value::Null;
    }

    let mut current = root;
    for key in path {
        if key.is_empty() {
            return Value::Null;
        }
        let Some(map) = current.as_object() else {
            return Value::Null;
        };
        let Some(next) = map.get(key) else {
            return Value::Null;
        };
        current = next;
    }
    current.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn obj(pairs: Vec<(&str, Value)>) -> Value {
        Value::Object(pairs.into_iter().map(|(k, v)| (k.to_owned(), v)).collect())
    }

    fn path(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn walks_nested_objects() {
        let root = obj(vec![(
            "user",
            obj(vec![("country", Value::String("US".into()))]),
        )]);
        assert_eq!(
            select(&root, &path(&["user", "country"])),
            Value::String("US".into())
        );
    }

    #[test]
    fn missing_link_is_null() {
        let root = obj(vec![("user", obj(vec![]))]);
        assert_eq!(select(&root, &path(&["user", "country"])), Value::Null);
    }

    #[test]
    fn empty_path_is_null() {
        let root = obj(vec![]);
        assert_eq!(select(&root, &[]), Value::Null);
    }

    #[test]
    fn non_object_intermediate_is_null() {
        let root = obj(vec![("user", Value::String("scalar".into()))]);
        assert_eq!(select(&root, &path(&["user", "country"])), Value::Null);
    }

    #[test]
    fn empty_segment_is_null() {
        let root: BTreeMap<String, Value> = BTreeMap::new();
        assert_eq!(select(&Value::Object(root), &path(&[""])), Value::Null);
    }
}
