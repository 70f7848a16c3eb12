//! The bit-stable canonicalization shared by [`crate::dedup::DedupFilter`]
//! and `insert_id` construction: `user_id device_id (flag key)*`, flags in
//! sorted order (free, since results are keyed in a `BTreeMap`).

use std::collections::BTreeMap;

use crate::eval::Assignment;

const NONE: &str = "None";

/// Build the canonical string for a (user, device, results) triple.
pub fn canonicalize(
    user_id: Option<&str>,
    device_id: Option<&str>,
    results: &BTreeMap<String, Assignment>,
) -> String {
    let mut out = String::new();
    out.push_str(user_id.unwrap_or(NONE));
    out.push(' ');
    out.push_str(device_id.unwrap_or(NONE));
    out.push(' ');
    for (flag_key, assignment) in results {
        out.push_str(flag_key);
        out.push(' ');
        out.push_str(assignment.variant.key.as_deref().unwrap_or(NONE));
        out.push(' ');
    }
    out
}
