//! The evaluation context: a typed wrapper over the free-form
//! `{ user: {...}, groups: { <group_type>: {...} } }` tree the engine
//! selects over.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::value::Value;

/// One group instance a user belongs to (e.g. `("company", "acme")`).
#[derive(Debug, Clone, Default, Serialize)]
pub struct Group {
    pub group_name: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub group_properties: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cohort_ids: Vec<String>,
}

/// A user/subject to evaluate flags for.
///
/// Mirrors the richer predefined-attribute surface of the original user
/// model (device id, platform, locale, etc.) while still allowing arbitrary
/// `user_properties`.
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    pub user_id: Option<String>,
    pub device_id: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub dma: Option<String>,
    pub language: Option<String>,
    pub platform: Option<String>,
    pub version: Option<String>,
    pub os: Option<String>,
    pub device_manufacturer: Option<String>,
    pub device_brand: Option<String>,
    pub device_model: Option<String>,
    pub carrier: Option<String>,
    pub library: Option<String>,
    pub ip_address: Option<String>,
    pub user_properties: BTreeMap<String, Value>,
    /// group-type -> group instance(s) the user belongs to.
    pub groups: BTreeMap<String, Vec<Group>>,
    pub group_properties: BTreeMap<String, BTreeMap<String, Value>>,
    /// Populated by [`crate::client::LocalEvaluationClient`] from
    /// `CohortStorage` before evaluation; not set by callers directly.
    pub cohort_ids: Vec<String>,
    pub group_cohort_ids: BTreeMap<String, Vec<String>>,
}

impl EvaluationContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        EvaluationContext {
            user_id: Some(user_id.into()),
            ..Default::default()
        }
    }

    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn with_user_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.user_properties.insert(key.into(), value.into());
        self
    }

    pub fn with_group(mut self, group_type: impl Into<String>, group_name: impl Into<String>) -> Self {
        self.groups.entry(group_type.into()).or_default().push(Group {
            group_name: group_name.into(),
            group_properties: BTreeMap::new(),
            cohort_ids: Vec::new(),
        });
        self
    }

    /// Names of the group instances the user belongs to, by group type.
    /// Used by the façade to look up which cohorts apply to each group.
    pub fn group_names(&self) -> BTreeMap<String, Vec<String>> {
        self.groups
            .iter()
            .map(|(ty, groups)| (ty.clone(), groups.iter().map(|g| g.group_name.clone()).collect()))
            .collect()
    }

    /// Build the free-form `{ user, groups }` tree the engine selects over.
    pub fn to_value(&self) -> Value {
        let mut user = BTreeMap::new();
        macro_rules! put {
            ($field:ident, $key:literal) => {
                if let Some(v) = &self.$field {
                    user.insert($key.to_owned(), Value::String(v.clone()));
                }
            };
        }
        put!(user_id, "user_id");
        put!(device_id, "device_id");
        put!(country, "country");
        put!(city, "city");
        put!(region, "region");
        put!(dma, "dma");
        put!(language, "language");
        put!(platform, "platform");
        put!(version, "version");
        put!(os, "os");
        put!(device_manufacturer, "device_manufacturer");
        put!(device_brand, "device_brand");
        put!(device_model, "device_model");
        put!(carrier, "carrier");
        put!(library, "library");
        put!(ip_address, "ip_address");

        for (k, v) in &self.user_properties {
            user.insert(k.clone(), v.clone());
        }
        if !self.cohort_ids.is_empty() {
            user.insert(
                "cohort_ids".to_owned(),
                Value::Array(self.cohort_ids.iter().cloned().map(Value::String).collect()),
            );
        }

        let mut groups = BTreeMap::new();
        for (group_type, instances) in &self.groups {
            if let Some(instance) = instances.first() {
                let mut g = BTreeMap::new();
                g.insert("group_name".to_owned(), Value::String(instance.group_name.clone()));
                for (k, v) in &instance.group_properties {
                    g.insert(k.clone(), v.clone());
                }
                if let Some(props) = self.group_properties.get(group_type) {
                    for (k, v) in props {
                        g.insert(k.clone(), v.clone());
                    }
                }
                let cohort_ids = self
                    .group_cohort_ids
                    .get(group_type)
                    .cloned()
                    .unwrap_or_default();
                if !cohort_ids.is_empty() {
                    g.insert(
                        "cohort_ids".to_owned(),
                        Value::Array(cohort_ids.into_iter().map(Value::String).collect()),
                    );
                }
                groups.insert(group_type.clone(), Value::Object(g));
            }
        }

        let mut root = BTreeMap::new();
        root.insert("user".to_owned(), Value::Object(user));
        root.insert("groups".to_owned(), Value::Object(groups));
        Value::Object(root)
    }
}
