//! The flag configuration data model: the shapes the control plane ships
//! over `/sdk/v2/flags` and `/sdk/stream/v1/flags`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// The closed set of condition operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "is")]
    Is,
    #[serde(rename = "is not")]
    IsNot,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "does not contain")]
    DoesNotContain,
    #[serde(rename = "less")]
    Less,
    #[serde(rename = "less or equal")]
    LessOrEqual,
    #[serde(rename = "greater")]
    Greater,
    #[serde(rename = "greater or equal")]
    GreaterOrEqual,
    #[serde(rename = "version less")]
    VersionLess,
    #[serde(rename = "version less or equal")]
    VersionLessOrEqual,
    #[serde(rename = "version greater")]
    VersionGreater,
    #[serde(rename = "version greater or equal")]
    VersionGreaterOrEqual,
    #[serde(rename = "set is")]
    SetIs,
    #[serde(rename = "set is not")]
    SetIsNot,
    #[serde(rename = "set contains")]
    SetContains,
    #[serde(rename = "set does not contain")]
    SetDoesNotContain,
    #[serde(rename = "set contains any")]
    SetContainsAny,
    #[serde(rename = "set does not contain any")]
    SetDoesNotContainAny,
    #[serde(rename = "regex match")]
    RegexMatch,
    #[serde(rename = "regex does not match")]
    RegexDoesNotMatch,
}

impl Operator {
    /// Whether this operator operates over a set-coerced operand rather
    /// than a single scalar string.
    pub fn is_set_operator(self) -> bool {
        matches!(
            self,
            Operator::SetIs
                | Operator::SetIsNot
                | Operator::SetContains
                | Operator::SetDoesNotContain
                | Operator::SetContainsAny
                | Operator::SetDoesNotContainAny
        )
    }

    /// Whether a `matchNull` result of `true` should be negated for this
    /// operator's "not"/"does not" polarity.
    pub fn negates_match_null(self) -> bool {
        matches!(
            self,
            Operator::IsNot
                | Operator::DoesNotContain
                | Operator::SetIsNot
                | Operator::SetDoesNotContain
                | Operator::SetDoesNotContainAny
                | Operator::RegexDoesNotMatch
        )
    }
}

/// A half-open integer range `[lo, hi)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub lo: u32,
    pub hi: u32,
}

impl Range {
    pub fn contains(self, value: u32) -> bool {
        self.lo <= value && value < self.hi
    }
}

/// A targeting condition: `selector op values`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub selector: Vec<String>,
    pub op: Operator,
    pub values: Vec<String>,
}

/// One slice of a bucket's distribution range, mapped to a variant key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub range: Range,
    pub variant: String,
}

/// One slice of a bucket's allocation range, containing distributions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub range: Range,
    pub distributions: Vec<Distribution>,
}

/// Deterministic bucketing configuration for a segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub selector: Vec<String>,
    pub salt: String,
    pub allocations: Vec<Allocation>,
}

/// A rule within a flag. First match (top-to-bottom within the flag) wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    #[serde(default)]
    pub bucket: Option<Bucket>,
    /// Disjunctive over the outer list, conjunctive over each inner list.
    #[serde(default)]
    pub conditions: Option<Vec<Vec<Condition>>>,
    /// Default variant key on match, used when `bucket` is absent or its
    /// bucketing value selects no allocation.
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    /// Name surfaced in assignment/exposure event details.
    #[serde(default)]
    pub name: Option<String>,
}

/// Well-known metadata flags carried on a [`Variant`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VariantMeta {
    pub default: bool,
    pub deployed: bool,
    pub track_exposure: bool,
}

/// One possible outcome for a flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub key: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl Variant {
    pub fn meta(&self) -> VariantMeta {
        VariantMeta {
            default: self
                .metadata
                .get("default")
                .and_then(|v| matches!(v, Value::Bool(true)).then_some(true))
                .unwrap_or(false),
            deployed: self
                .metadata
                .get("deployed")
                .map(|v| !matches!(v, Value::Bool(false)))
                .unwrap_or(true),
            track_exposure: self
                .metadata
                .get("trackExposure")
                .map(|v| !matches!(v, Value::Bool(false)))
                .unwrap_or(true),
        }
    }
}

/// Flag type used by the event emitter to suppress user-property writes
/// for mutual-exclusion-group flags.
pub const FLAG_TYPE_MUTUAL_EXCLUSION_GROUP: &str = "mutual-exclusion-group";

/// A named decision point with a finite set of variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flag {
    pub key: String,
    pub variants: BTreeMap<String, Variant>,
    pub segments: Vec<Segment>,
    #[serde(default)]
    pub dependencies: Option<Vec<String>>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    #[serde(default)]
    pub flag_version: Option<String>,
    #[serde(rename = "flagType", default)]
    pub flag_type: Option<String>,
}

impl Flag {
    /// The set of cohort ids referenced anywhere in this flag's segment
    /// conditions (via `set` operators against a `cohort_ids` selector).
    pub fn cohort_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        for segment in &self.segments {
            let Some(groups) = &segment.conditions else {
                continue;
            };
            for group in groups {
                for cond in group {
                    if cond.selector.last().map(|s| s.as_str()) == Some("cohort_ids") {
                        ids.extend(cond.values.iter().cloned());
                    }
                }
            }
        }
        ids.sort();
        ids.dedup();
        ids
    }
}

fn default_group_type() -> String {
    "User".to_owned()
}

/// A named set of member IDs maintained upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cohort {
    pub id: String,
    pub last_modified: i64,
    pub size: i64,
    pub member_ids: std::collections::HashSet<String>,
    #[serde(default = "default_group_type")]
    pub group_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_deserializes_from_spec_strings() {
        let op: Operator = serde_json::from_str(r#""set contains any""#).unwrap();
        assert_eq!(op, Operator::SetContainsAny);
        assert!(op.is_set_operator());
    }

    #[test]
    fn variant_default_metadata_reads_booleans() {
        let v: Variant = serde_json::from_str(
            r#"{"key":"on","value":"on","metadata":{"default":true,"trackExposure":false}}"#,
        )
        .unwrap();
        let meta = v.meta();
        assert!(meta.default);
        assert!(!meta.track_exposure);
    }

    #[test]
    fn flag_collects_cohort_ids_from_conditions() {
        let flag: Flag = serde_json::from_str(
            r#"{
                "key": "f",
                "variants": {},
                "segments": [{
                    "conditions": [[{"selector":["context","user","cohort_ids"],"op":"set contains any","values":["c1","c2"]}]]
                }]
            }"#,
        )
        .unwrap();
        assert_eq!(flag.cohort_ids(), vec!["c1".to_owned(), "c2".to_owned()]);
    }
}
