//! A free-form, tagged-union value type for evaluation contexts and
//! condition operands, with a single coercion boundary used by the
//! evaluation engine before any comparison runs.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Number;

/// A JSON-like value. Evaluation contexts, flag/segment/condition payloads,
/// and the evaluation target tree (context's own keys with `result` merged
/// in as a sibling) are all built from this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// An "empty" value for selector purposes: absent, null, or an empty
    /// string. Used to decide whether a condition falls back to
    /// `matchNull`.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&coerce_string(self).unwrap_or_default())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Coerce a value to a single string, following the evaluation engine's
/// scalar semantics: booleans render as lowercase `"true"`/`"false"`,
/// numbers render without a superfluous decimal point, arrays and objects
/// render as their JSON text, and `null`/absent coerces to `None`.
pub fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(b.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(format_number(n)),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value).ok(),
    }
}

fn format_number(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        i.to_string()
    } else if let Some(u) = n.as_u64() {
        u.to_string()
    } else {
        n.to_string()
    }
}

/// Coerce a value to a list of strings, following the evaluation engine's
/// set semantics: a JSON array coerces element-wise; a scalar string that
/// itself parses as a JSON array is expanded and coerced element-wise;
/// any other scalar is wrapped in a single-element list.
pub fn coerce_string_array(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Null => None,
        Value::Array(items) => Some(items.iter().filter_map(coerce_string).collect()),
        Value::String(s) => {
            if let Ok(parsed) = serde_json::from_str::<Value>(s) {
                if let Value::Array(items) = parsed {
                    return Some(items.iter().filter_map(coerce_string).collect());
                }
            }
            Some(vec![s.clone()])
        }
        other => coerce_string(other).map(|s| vec![s]),
    }
}

/// Attempt to parse a value (or its string coercion) as an `f64`.
pub fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(_) | Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: i64) -> Value {
        Value::Number(Number::from(n))
    }

    #[test]
    fn coerce_string_bool_is_lowercase() {
        assert_eq!(coerce_string(&Value::Bool(true)).as_deref(), Some("true"));
    }

    #[test]
    fn coerce_string_integer_has_no_decimal() {
        assert_eq!(coerce_string(&num(42)).as_deref(), Some("42"));
    }

    #[test]
    fn coerce_string_array_expands_json_encoded_scalar() {
        let v = Value::String(r#"["a","b"]"#.to_owned());
        assert_eq!(
            coerce_string_array(&v),
            Some(vec!["a".to_owned(), "b".to_owned()])
        );
    }

    #[test]
    fn coerce_string_array_wraps_plain_scalar() {
        let v = Value::String("solo".to_owned());
        assert_eq!(coerce_string_array(&v), Some(vec!["solo".to_owned()]));
    }

    #[test]
    fn coerce_string_array_passes_through_native_array() {
        let v = Value::Array(vec![num(1), num(2)]);
        assert_eq!(
            coerce_string_array(&v),
            Some(vec!["1".to_owned(), "2".to_owned()])
        );
    }

    #[test]
    fn parse_number_from_string() {
        assert_eq!(parse_number(&Value::String("3.14".into())), Some(3.14));
        assert_eq!(parse_number(&Value::String("nope".into())), None);
    }
}
