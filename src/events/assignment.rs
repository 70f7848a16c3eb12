//! Assignment tracking: the deprecated per-flag event flavor, superseded
//! by [`super::exposure`] but still emitted when a caller wires an
//! [`AssignmentService`] alongside (or instead of) the exposure one. One
//! event per evaluated flag, per
//! `original_source/.../assignment/assignment_service.py`, unlike
//! exposure's single bundled event per user.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::dedup::{DedupFilter, Deduplicable};
use crate::eval::Assignment as EvalAssignment;
use crate::model::FLAG_TYPE_MUTUAL_EXCLUSION_GROUP;
use crate::value::Value;

use super::canonical::canonicalize;
use super::event::{Event, UserProperties};
use super::sink::AnalyticsSink;

const DAY_MILLIS: i64 = 86_400_000;

/// A pending "user X was assigned these variants" record, built the same
/// way [`super::exposure::Exposure`] is.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub user_id: Option<String>,
    pub device_id: Option<String>,
    pub groups: BTreeMap<String, String>,
    pub results: BTreeMap<String, EvalAssignment>,
    pub timestamp_millis: i64,
}

impl Assignment {
    fn canonical(&self) -> String {
        canonicalize(self.user_id.as_deref(), self.device_id.as_deref(), &self.results)
    }

    /// One [`Event`] per evaluated flag. Unlike exposure, a default-variant
    /// assignment still produces an event -- it `$unset`s the flag's user
    /// property rather than `$set`ting it, so a user who reverts to the
    /// default has the stale property cleared.
    pub fn to_events(&self) -> Vec<Event> {
        let canonical = self.canonical();
        let day_bucket = self.timestamp_millis / DAY_MILLIS;

        self.results
            .iter()
            .map(|(flag_key, assignment)| {
                let meta = assignment.variant.meta();
                let variant_label = assignment.variant.key.clone().or_else(|| {
                    assignment
                        .variant
                        .value
                        .as_ref()
                        .and_then(|v| v.as_str().map(str::to_owned))
                });

                let mut event_properties = BTreeMap::new();
                event_properties.insert(
                    "[Experiment] Flag Key".to_owned(),
                    Value::String(flag_key.clone()),
                );
                if let Some(label) = &variant_label {
                    event_properties.insert(
                        "[Experiment] Variant".to_owned(),
                        Value::String(label.clone()),
                    );
                }

                let mut set = BTreeMap::new();
                let mut unset = BTreeMap::new();
                let is_mutex_group =
                    assignment.flag_type.as_deref() == Some(FLAG_TYPE_MUTUAL_EXCLUSION_GROUP);
                if !is_mutex_group {
                    let property_key = format!("[Experiment] {flag_key}");
                    if meta.default {
                        unset.insert(property_key, Value::String(String::new()));
                    } else if let Some(label) = &variant_label {
                        set.insert(property_key, Value::String(label.clone()));
                    }
                }

                let insert_id = format!(
                    "{} {} {} {}",
                    self.user_id.as_deref().unwrap_or("None"),
                    self.device_id.as_deref().unwrap_or("None"),
                    hash_hex(&format!("{flag_key} {canonical}")),
                    day_bucket,
                );

                Event {
                    event_type: "[Experiment] Assignment",
                    user_id: self.user_id.clone(),
                    device_id: self.device_id.clone(),
                    event_properties,
                    user_properties: UserProperties { set, unset },
                    groups: self.groups.clone(),
                    insert_id,
                }
            })
            .collect()
    }
}

impl Deduplicable for Assignment {
    fn is_trackable(&self) -> bool {
        !self.results.is_empty()
    }

    fn canonical_key(&self) -> String {
        self.canonical()
    }
}

fn hash_hex(s: &str) -> String {
    format!("{:x}", md5::compute(s.as_bytes()))
}

/// Converts evaluation results into assignment events, gated by a
/// [`DedupFilter`], and forwards admitted events to the sink.
pub struct AssignmentService {
    sink: Arc<dyn AnalyticsSink>,
    filter: DedupFilter,
}

impl AssignmentService {
    pub fn new(sink: Arc<dyn AnalyticsSink>, filter: DedupFilter) -> Self {
        AssignmentService { sink, filter }
    }

    pub fn track(&self, assignment: Assignment) {
        if !self.filter.should_track(&assignment) {
            return;
        }
        for event in assignment.to_events() {
            self.sink.track(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DedupConfig;
    use crate::model::Variant;
    use std::sync::Mutex;

    fn assignment(key: &str, meta: BTreeMap<String, Value>) -> EvalAssignment {
        EvalAssignment {
            variant: Variant {
                key: Some(key.to_owned()),
                value: None,
                payload: None,
                metadata: meta,
            },
            segment_name: None,
            flag_version: None,
            flag_type: None,
        }
    }

    #[test]
    fn default_variant_unsets_rather_than_skips() {
        let mut default_meta = BTreeMap::new();
        default_meta.insert("default".to_owned(), Value::Bool(true));

        let mut results = BTreeMap::new();
        results.insert("f1".to_owned(), assignment("off", default_meta));

        let record = Assignment {
            user_id: Some("u".to_owned()),
            device_id: None,
            groups: BTreeMap::new(),
            results,
            timestamp_millis: 0,
        };

        let events = record.to_events();
        assert_eq!(events.len(), 1);
        assert!(events[0].user_properties.set.is_empty());
        assert!(events[0].user_properties.unset.contains_key("[Experiment] f1"));
    }

    #[test]
    fn non_default_variant_sets_user_property() {
        let mut results = BTreeMap::new();
        results.insert("f1".to_owned(), assignment("on", BTreeMap::new()));

        let record = Assignment {
            user_id: Some("u".to_owned()),
            device_id: None,
            groups: BTreeMap::new(),
            results,
            timestamp_millis: 0,
        };

        let events = record.to_events();
        assert_eq!(
            events[0].user_properties.set.get("[Experiment] f1"),
            Some(&Value::String("on".to_owned()))
        );
    }

    #[test]
    fn empty_assignment_is_never_tracked() {
        let sink = Arc::new(RecordingSink::default());
        let filter = DedupFilter::new(DedupConfig {
            cache_capacity: 16,
            ttl_millis: 60_000,
        });
        let service = AssignmentService::new(sink.clone(), filter);
        service.track(Assignment {
            user_id: Some("u".to_owned()),
            device_id: None,
            groups: BTreeMap::new(),
            results: BTreeMap::new(),
            timestamp_millis: 0,
        });
        assert!(sink.events.lock().unwrap().is_empty());
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<Event>>,
    }

    impl AnalyticsSink for RecordingSink {
        fn track(&self, event: Event) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[test]
    fn mutual_exclusion_group_skips_user_property_writes() {
        let mut assignment = assignment("on", BTreeMap::new());
        assignment.flag_type = Some(crate::model::FLAG_TYPE_MUTUAL_EXCLUSION_GROUP.to_owned());
        let mut results = BTreeMap::new();
        results.insert("f1".to_owned(), assignment);

        let record = Assignment {
            user_id: Some("u".to_owned()),
            device_id: None,
            groups: BTreeMap::new(),
            results,
            timestamp_millis: 0,
        };

        let events = record.to_events();
        assert!(events[0].user_properties.set.is_empty());
        assert!(events[0].user_properties.unset.is_empty());
    }
}
