//! Exposure tracking: the current (non-deprecated) event flavor. One
//! analytics event per exposed variant, per `original_source/.../exposure/
//! exposure_service.py`.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::dedup::{DedupFilter, Deduplicable};
use crate::eval::Assignment;
use crate::model::FLAG_TYPE_MUTUAL_EXCLUSION_GROUP;
use crate::value::Value;

use super::canonical::canonicalize;
use super::event::{Event, UserProperties};
use super::sink::AnalyticsSink;

const DAY_MILLIS: i64 = 86_400_000;

/// A pending "user X saw these variants" record, built by
/// [`crate::client::LocalEvaluationClient::evaluate`] right after
/// evaluation and handed to [`ExposureService::track`].
#[derive(Debug, Clone)]
pub struct Exposure {
    pub user_id: Option<String>,
    pub device_id: Option<String>,
    pub groups: BTreeMap<String, String>,
    pub results: BTreeMap<String, Assignment>,
    pub timestamp_millis: i64,
}

impl Exposure {
    fn canonical(&self) -> String {
        canonicalize(self.user_id.as_deref(), self.device_id.as_deref(), &self.results)
    }

    /// One [`Event`] per variant eligible for exposure tracking: variants
    /// whose metadata marks them `trackExposure=false` or `default=true`
    /// are skipped entirely (spec.md §4.13).
    pub fn to_events(&self) -> Vec<Event> {
        let canonical = self.canonical();
        let day_bucket = self.timestamp_millis / DAY_MILLIS;

        self.results
            .iter()
            .filter_map(|(flag_key, assignment)| {
                let meta = assignment.variant.meta();
                if !meta.track_exposure || meta.default {
                    return None;
                }

                let variant_label = assignment
                    .variant
                    .key
                    .clone()
                    .or_else(|| assignment.variant.value.as_ref().and_then(|v| v.as_str().map(str::to_owned)));

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
                if !assignment.variant.metadata.is_empty() {
                    event_properties.insert(
                        "metadata".to_owned(),
                        Value::Object(assignment.variant.metadata.clone()),
                    );
                }

                let mut set = BTreeMap::new();
                let is_mutex_group =
                    assignment.flag_type.as_deref() == Some(FLAG_TYPE_MUTUAL_EXCLUSION_GROUP);
                if !is_mutex_group {
                    if let Some(label) = &variant_label {
                        set.insert(format!("[Experiment] {flag_key}"), Value::String(label.clone()));
                    }
                }

                let insert_id = format!(
                    "{} {} {} {}",
                    self.user_id.as_deref().unwrap_or("None"),
                    self.device_id.as_deref().unwrap_or("None"),
                    hash_hex(&format!("{flag_key} {canonical}")),
                    day_bucket,
                );

                Some(Event {
                    event_type: "[Experiment] Exposure",
                    user_id: self.user_id.clone(),
                    device_id: self.device_id.clone(),
                    event_properties,
                    user_properties: UserProperties {
                        set,
                        unset: BTreeMap::new(),
                    },
                    groups: self.groups.clone(),
                    insert_id,
                })
            })
            .collect()
    }
}

impl Deduplicable for Exposure {
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

/// Converts evaluation results into exposure events, gated by a
/// [`DedupFilter`], and forwards admitted events to the sink.
pub struct ExposureService {
    sink: Arc<dyn AnalyticsSink>,
    filter: DedupFilter,
}

impl ExposureService {
    pub fn new(sink: Arc<dyn AnalyticsSink>, filter: DedupFilter) -> Self {
        ExposureService { sink, filter }
    }

    pub fn track(&self, exposure: Exposure) {
        if !self.filter.should_track(&exposure) {
            return;
        }
        for event in exposure.to_events() {
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

    fn assignment(key: &str, meta: BTreeMap<String, Value>) -> Assignment {
        Assignment {
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
    fn skips_default_and_no_track_exposure_variants() {
        let mut default_meta = BTreeMap::new();
        default_meta.insert("default".to_owned(), Value::Bool(true));
        let mut no_track_meta = BTreeMap::new();
        no_track_meta.insert("trackExposure".to_owned(), Value::Bool(false));

        let mut results = BTreeMap::new();
        results.insert("f1".to_owned(), assignment("on", BTreeMap::new()));
        results.insert("f2".to_owned(), assignment("off", default_meta));
        results.insert("f3".to_owned(), assignment("ctrl", no_track_meta));

        let exposure = Exposure {
            user_id: Some("u".to_owned()),
            device_id: None,
            groups: BTreeMap::new(),
            results,
            timestamp_millis: 0,
        };

        let events = exposure.to_events();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].event_properties.get("[Experiment] Flag Key"),
            Some(&Value::String("f1".to_owned()))
        );
    }

    #[test]
    fn mutual_exclusion_group_skips_user_property_writes() {
        let mut meta = BTreeMap::new();
        meta.insert(
            "flagType".to_owned(),
            Value::String("ignored-since-flag-level".to_owned()),
        );
        let mut assignment = assignment("on", meta);
        assignment.flag_type = Some(crate::model::FLAG_TYPE_MUTUAL_EXCLUSION_GROUP.to_owned());

        let mut results = BTreeMap::new();
        results.insert("f1".to_owned(), assignment);

        let exposure = Exposure {
            user_id: Some("u".to_owned()),
            device_id: None,
            groups: BTreeMap::new(),
            results,
            timestamp_millis: 0,
        };

        let events = exposure.to_events();
        assert!(events[0].user_properties.set.is_empty());
    }

    #[test]
    fn empty_exposure_is_never_tracked() {
        let sink = Arc::new(RecordingSink::default());
        let filter = DedupFilter::new(DedupConfig {
            cache_capacity: 16,
            ttl_millis: 60_000,
        });
        let service = ExposureService::new(sink.clone(), filter);
        service.track(Exposure {
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
    fn insert_id_is_stable_for_same_user_variants_and_day() {
        let mut results = BTreeMap::new();
        results.insert("f1".to_owned(), assignment("on", BTreeMap::new()));
        let build = || Exposure {
            user_id: Some("u".to_owned()),
            device_id: Some("d".to_owned()),
            groups: BTreeMap::new(),
            results: results.clone(),
            timestamp_millis: 1_000,
        };
        let a = build().to_events();
        let b = build().to_events();
        assert_eq!(a[0].insert_id, b[0].insert_id);
    }
}
