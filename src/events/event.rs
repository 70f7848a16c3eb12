//! The analytics event shape forwarded to the external sink: a stand-in
//! for Amplitude's `BaseEvent`, carrying only the fields the emitters
//! populate.

use std::collections::BTreeMap;

use crate::value::Value;

/// User-property mutation bundle: `$set`/`$unset` per Amplitude's identify
/// semantics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserProperties {
    pub set: BTreeMap<String, Value>,
    pub unset: BTreeMap<String, Value>,
}

/// One analytics event produced by the assignment or exposure emitter.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub event_type: &'static str,
    pub user_id: Option<String>,
    pub device_id: Option<String>,
    pub event_properties: BTreeMap<String, Value>,
    pub user_properties: UserProperties,
    /// group_type -> group_name, carried through from the evaluated user.
    pub groups: BTreeMap<String, String>,
    /// Gives the sink per-day idempotency: `<user> <device> <hash> <day>`.
    pub insert_id: String,
}
