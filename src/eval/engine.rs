//! The pure evaluator: flags (in dependency order) + context -> variants.

use std::collections::BTreeMap;

use crate::eval::operators::{match_null, match_scalar, match_set};
use crate::hashing::murmur3_32;
use crate::model::{Bucket, Condition, Flag, Segment, Variant};
use crate::selector::select;
use crate::value::{coerce_string, Value};

/// A flag's variant assignment, with metadata merged flag -> segment ->
/// result (later writes win) and the name of the segment that matched.
///
/// `flag_version` and `flag_type` are carried alongside the variant (rather
/// than folded into its metadata) because they describe the flag the
/// assignment came from, not the variant itself; the event emitter reads
/// them to build assignment event details and to skip user-property writes
/// for mutual-exclusion-group flags.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub variant: Variant,
    pub segment_name: Option<String>,
    pub flag_version: Option<String>,
    pub flag_type: Option<String>,
}

/// Evaluate `flags` (already topologically sorted) against `context`,
/// returning the assigned variant for each flag that matched.
///
/// Earlier flags' assignments are visible to later flags' selectors as
/// `result.<flag-key>.key`, with `result` a sibling of `context` under the
/// evaluation target root (`{ "context": context, "result": result }`).
pub fn evaluate(context: &Value, flags: &[&Flag]) -> BTreeMap<String, Assignment> {
    let mut result: BTreeMap<String, Value> = BTreeMap::new();
    let mut assignments: BTreeMap<String, Assignment> = BTreeMap::new();

    for flag in flags {
        let Some(assignment) = evaluate_flag(context, &result, flag) else {
            continue;
        };

        if let Some(key) = &assignment.variant.key {
            let mut entry = BTreeMap::new();
            entry.insert("key".to_owned(), Value::String(key.clone()));
            result.insert(flag.key.clone(), Value::Object(entry));
        }
        assignments.insert(flag.key.clone(), assignment);
    }

    assignments
}

/// Builds the tree condition/bucket selectors read from: `context` nested
/// under its own `"context"` key with `result` as a sibling, so
/// `["context","user","country"]` and `["result","A","key"]` both resolve
/// from the same root. This matches the wire format every real flag config
/// selector is rooted at.
fn target_tree(context: &Value, result: &BTreeMap<String, Value>) -> Value {
    let mut root = BTreeMap::new();
    root.insert("context".to_owned(), context.clone());
    root.insert("result".to_owned(), Value::Object(result.clone()));
    Value::Object(root)
}

fn evaluate_flag(
    context: &Value,
    result: &BTreeMap<String, Value>,
    flag: &Flag,
) -> Option<Assignment> {
    let target = target_tree(context, result);

    for segment in &flag.segments {
        let Some(variant_key) = evaluate_segment(&target, segment) else {
            continue;
        };
        let variant_key = variant_key?;
        let variant = flag.variants.get(&variant_key)?;
        let merged = merge_variant(flag, segment, variant);
        return Some(Assignment {
            variant: merged,
            segment_name: segment.name.clone(),
            flag_version: flag.flag_version.clone(),
            flag_type: flag.flag_type.clone(),
        });
    }

    None
}

/// Returns `Some(None)` for "this segment matched but has no variant",
/// `Some(Some(key))` for "this segment matched and assigns `key`", and
/// `None` for "this segment did not match".
fn evaluate_segment(target: &Value, segment: &Segment) -> Option<Option<String>> {
    if !evaluate_conditions(target, segment.conditions.as_deref()) {
        return None;
    }
    Some(bucket(target, segment))
}

fn evaluate_conditions(target: &Value, conditions: Option<&[Vec<Condition>]>) -> bool {
    let Some(groups) = conditions else {
        // No conditions: unconditional match.
        return true;
    };
    groups
        .iter()
        .any(|group| group.iter().all(|cond| match_condition(target, cond)))
}

fn match_condition(target: &Value, condition: &Condition) -> bool {
    let prop = select(target, &condition.selector);
    if prop.is_empty() {
        return match_null(condition.op, &condition.values);
    }
    if condition.op.is_set_operator() {
        match_set(condition.op, &prop, &condition.values)
    } else {
        match_scalar(condition.op, &prop, &condition.values)
    }
}

fn bucket(target: &Value, segment: &Segment) -> Option<String> {
    let Some(bucket) = &segment.bucket else {
        return segment.variant.clone();
    };

    let Some(bv) = bucketing_value(target, bucket) else {
        return segment.variant.clone();
    };

    let h = murmur3_32(&format!("{}/{}", bucket.salt, bv));
    let allocation_value = h % 100;
    let distribution_value = h / 100;

    for allocation in &bucket.allocations {
        if !allocation.range.contains(allocation_value) {
            continue;
        }
        for distribution in &allocation.distributions {
            if distribution.range.contains(distribution_value) {
                return Some(distribution.variant.clone());
            }
        }
        // Matched the allocation but no distribution slice claimed this
        // bucket: fall through to the segment default, same as "no
        // allocation matched".
        return segment.variant.clone();
    }

    segment.variant.clone()
}

fn bucketing_value(target: &Value, bucket: &Bucket) -> Option<String> {
    let raw = select(target, &bucket.selector);
    let s = coerce_string(&raw)?;
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn merge_variant(flag: &Flag, segment: &Segment, variant: &Variant) -> Variant {
    let mut metadata = flag.metadata.clone();
    for (k, v) in &segment.metadata {
        metadata.insert(k.clone(), v.clone());
    }
    for (k, v) in &variant.metadata {
        metadata.insert(k.clone(), v.clone());
    }
    Variant {
        key: variant.key.clone(),
        value: variant.value.clone(),
        payload: variant.payload.clone(),
        metadata,
    }
}
