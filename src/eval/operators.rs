//! Operator semantics for condition matching: scalar comparisons, set
//! comparisons, `matchNull`, numeric/version fallback rules.

use std::cmp::Ordering;
use std::collections::HashSet;

use regex::Regex;

use crate::model::Operator;
use crate::semver::SemVer;
use crate::value::{coerce_string, coerce_string_array, Value};

const NULL_SENTINEL: &str = "(none)";

/// `prop` is null/empty: fall back to matching against the sentinel
/// `"(none)"` in `values`, inverted for negative-polarity operators.
pub fn match_null(op: Operator, values: &[String]) -> bool {
    let contains_sentinel = values.iter().any(|v| v == NULL_SENTINEL);
    if op.negates_match_null() {
        !contains_sentinel
    } else {
        contains_sentinel
    }
}

/// Evaluate a non-null, non-set condition against a scalar-coerced `prop`.
pub fn match_scalar(op: Operator, prop: &Value, values: &[String]) -> bool {
    let prop_str = coerce_string(prop).unwrap_or_default();
    match op {
        Operator::Is => matches_is(&prop_str, values),
        Operator::IsNot => !matches_is(&prop_str, values),
        Operator::Contains => matches_contains(&prop_str, values),
        Operator::DoesNotContain => !matches_contains(&prop_str, values),
        Operator::Less => comparator(&prop_str, values, |o| o == Ordering::Less),
        Operator::LessOrEqual => comparator(&prop_str, values, |o| o != Ordering::Greater),
        Operator::Greater => comparator(&prop_str, values, |o| o == Ordering::Greater),
        Operator::GreaterOrEqual => comparator(&prop_str, values, |o| o != Ordering::Less),
        Operator::VersionLess => version_comparator(&prop_str, values, |o| o == Ordering::Less),
        Operator::VersionLessOrEqual => {
            version_comparator(&prop_str, values, |o| o != Ordering::Greater)
        }
        Operator::VersionGreater => {
            version_comparator(&prop_str, values, |o| o == Ordering::Greater)
        }
        Operator::VersionGreaterOrEqual => {
            version_comparator(&prop_str, values, |o| o != Ordering::Less)
        }
        Operator::RegexMatch => matches_regex(&prop_str, values),
        Operator::RegexDoesNotMatch => !matches_regex(&prop_str, values),
        Operator::SetIs
        | Operator::SetIsNot
        | Operator::SetContains
        | Operator::SetDoesNotContain
        | Operator::SetContainsAny
        | Operator::SetDoesNotContainAny => unreachable!("set operator dispatched as scalar"),
    }
}

/// Evaluate a set condition against a set-coerced `prop`.
pub fn match_set(op: Operator, prop: &Value, values: &[String]) -> bool {
    let prop_set: HashSet<String> = coerce_string_array(prop)
        .unwrap_or_default()
        .into_iter()
        .collect();
    let value_set: HashSet<String> = values.iter().cloned().collect();

    match op {
        Operator::SetIs => set_equals(&prop_set, &value_set),
        Operator::SetIsNot => !set_equals(&prop_set, &value_set),
        Operator::SetContains => matches_set_contains_all(&prop_set, &value_set),
        Operator::SetDoesNotContain => !matches_set_contains_all(&prop_set, &value_set),
        Operator::SetContainsAny => matches_set_contains_any(&prop_set, &value_set),
        Operator::SetDoesNotContainAny => !matches_set_contains_any(&prop_set, &value_set),
        _ => unreachable!("scalar operator dispatched as set"),
    }
}

fn matches_is(prop: &str, values: &[String]) -> bool {
    let has_bool_literal = values
        .iter()
        .any(|v| v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("false"));
    if has_bool_literal {
        values.iter().any(|v| v.eq_ignore_ascii_case(prop))
    } else {
        values.iter().any(|v| v == prop)
    }
}

fn matches_contains(prop: &str, values: &[String]) -> bool {
    let prop_lower = prop.to_lowercase();
    values
        .iter()
        .any(|v| prop_lower.contains(&v.to_lowercase()))
}

fn comparator(prop: &str, values: &[String], accept: impl Fn(Ordering) -> bool) -> bool {
    values.iter().any(|v| {
        let ord = match (prop.parse::<f64>(), v.parse::<f64>()) {
            (Ok(a), Ok(b)) => a.partial_cmp(&b),
            _ => prop.partial_cmp(v.as_str()),
        };
        ord.is_some_and(&accept)
    })
}

fn version_comparator(prop: &str, values: &[String], accept: impl Fn(Ordering) -> bool) -> bool {
    values.iter().any(|v| {
        let ord = match (SemVer::parse(prop), SemVer::parse(v)) {
            (Some(a), Some(b)) => Some(a.compare_to(&b)),
            _ => prop.partial_cmp(v.as_str()),
        };
        ord.is_some_and(&accept)
    })
}

fn matches_regex(prop: &str, values: &[String]) -> bool {
    values.iter().any(|pattern| {
        Regex::new(pattern)
            .map(|re| re.is_match(prop))
            .unwrap_or(false)
    })
}

fn set_equals(a: &HashSet<String>, b: &HashSet<String>) -> bool {
    a == b
}

fn matches_set_contains_all(prop: &HashSet<String>, wanted: &HashSet<String>) -> bool {
    wanted.iter().all(|w| prop.contains(w))
}

fn matches_set_contains_any(prop: &HashSet<String>, wanted: &HashSet<String>) -> bool {
    wanted.iter().any(|w| prop.contains(w))
}
