//! `LocalEvaluationConfig`: every synchronization knob from spec.md §6,
//! with the same US/EU base-URL remapping behavior as
//! `original_source/.../local/config.py`.

use std::time::Duration;

/// Which Amplitude data center to pull flags and cohorts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerZone {
    #[default]
    Us,
    Eu,
}

const DEFAULT_SERVER_URL: &str = "https://api.lab.amplitude.com";
const EU_SERVER_URL: &str = "https://flag.lab.eu.amplitude.com";
const DEFAULT_STREAM_URL: &str = "https://stream.lab.amplitude.com";
const EU_STREAM_URL: &str = "https://stream.lab.eu.amplitude.com";
const DEFAULT_COHORT_URL: &str = "https://cohort-v2.lab.amplitude.com";
const EU_COHORT_URL: &str = "https://cohort-v2.lab.eu.amplitude.com";

/// Cohort sync behavior. Absent means "the client never downloads cohorts".
#[derive(Debug, Clone)]
pub struct CohortSyncConfig {
    pub api_key: String,
    pub secret_key: String,
    pub cohort_server_url: String,
    pub max_cohort_size: i64,
    pub cohort_polling_interval_millis: u64,
    pub cohort_request_timeout_millis: u64,
}

impl CohortSyncConfig {
    pub fn new(api_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        CohortSyncConfig {
            api_key: api_key.into(),
            secret_key: secret_key.into(),
            cohort_server_url: DEFAULT_COHORT_URL.to_owned(),
            max_cohort_size: i32::MAX as i64,
            cohort_polling_interval_millis: 60_000,
            cohort_request_timeout_millis: 10_000,
        }
    }
}

/// Dedup-filter sizing shared by the assignment (deprecated) and exposure
/// event emitters.
#[derive(Debug, Clone, Copy)]
pub struct DedupConfig {
    pub cache_capacity: usize,
    pub ttl_millis: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        DedupConfig {
            cache_capacity: 65_536,
            ttl_millis: 86_400_000,
        }
    }
}

/// Configuration for [`crate::client::LocalEvaluationClient`].
#[derive(Debug, Clone)]
pub struct LocalEvaluationConfig {
    pub server_url: String,
    pub server_zone: ServerZone,

    pub flag_config_polling_interval_millis: u64,
    pub flag_config_poller_request_timeout_millis: u64,

    pub stream_updates: bool,
    pub stream_server_url: String,
    pub stream_flag_conn_timeout_millis: u64,
    pub stream_max_conn_duration_millis: u64,
    pub stream_keep_alive_timeout_millis: u64,

    pub cohort_sync_config: Option<CohortSyncConfig>,

    pub assignment_dedup: DedupConfig,
    pub exposure_dedup: DedupConfig,
}

impl Default for LocalEvaluationConfig {
    fn default() -> Self {
        LocalEvaluationConfig {
            server_url: DEFAULT_SERVER_URL.to_owned(),
            server_zone: ServerZone::Us,
            flag_config_polling_interval_millis: 30_000,
            flag_config_poller_request_timeout_millis: 10_000,
            stream_updates: false,
            stream_server_url: DEFAULT_STREAM_URL.to_owned(),
            stream_flag_conn_timeout_millis: 1_500,
            stream_max_conn_duration_millis: 900_000,
            stream_keep_alive_timeout_millis: 17_000,
            cohort_sync_config: None,
            assignment_dedup: DedupConfig::default(),
            exposure_dedup: DedupConfig::default(),
        }
    }
}

impl LocalEvaluationConfig {
    pub fn builder() -> LocalEvaluationConfigBuilder {
        LocalEvaluationConfigBuilder::default()
    }

    pub fn flag_config_polling_interval(&self) -> Duration {
        Duration::from_millis(self.flag_config_polling_interval_millis)
    }

    pub fn flag_config_poller_request_timeout(&self) -> Duration {
        Duration::from_millis(self.flag_config_poller_request_timeout_millis)
    }

    pub fn stream_flag_conn_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_flag_conn_timeout_millis)
    }

    pub fn stream_max_conn_duration(&self) -> Duration {
        Duration::from_millis(self.stream_max_conn_duration_millis)
    }

    pub fn stream_keep_alive_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_keep_alive_timeout_millis)
    }

    /// The cohort-sync poller's period, floored at 60 seconds per spec.md §6.
    pub fn cohort_polling_interval(&self) -> Duration {
        let millis = self
            .cohort_sync_config
            .as_ref()
            .map(|c| c.cohort_polling_interval_millis)
            .unwrap_or(60_000);
        Duration::from_millis(millis.max(60_000))
    }
}

/// Builder for [`LocalEvaluationConfig`], applying the US/EU base-URL
/// remapping rule when the server zone is set to EU and the URLs are still
/// at their defaults (mirrors `local/config.py`'s constructor logic).
#[derive(Debug, Clone, Default)]
pub struct LocalEvaluationConfigBuilder {
    config: LocalEvaluationConfig,
    server_url_overridden: bool,
    stream_url_overridden: bool,
}

impl LocalEvaluationConfigBuilder {
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.config.server_url = url.into();
        self.server_url_overridden = true;
        self
    }

    pub fn stream_server_url(mut self, url: impl Into<String>) -> Self {
        self.config.stream_server_url = url.into();
        self.stream_url_overridden = true;
        self
    }

    pub fn server_zone(mut self, zone: ServerZone) -> Self {
        self.config.server_zone = zone;
        self
    }

    pub fn flag_config_polling_interval_millis(mut self, millis: u64) -> Self {
        self.config.flag_config_polling_interval_millis = millis;
        self
    }

    pub fn flag_config_poller_request_timeout_millis(mut self, millis: u64) -> Self {
        self.config.flag_config_poller_request_timeout_millis = millis;
        self
    }

    pub fn stream_updates(mut self, enabled: bool) -> Self {
        self.config.stream_updates = enabled;
        self
    }

    pub fn cohort_sync_config(mut self, cohort: CohortSyncConfig) -> Self {
        self.config.cohort_sync_config = Some(cohort);
        self
    }

    pub fn assignment_dedup(mut self, dedup: DedupConfig) -> Self {
        self.config.assignment_dedup = dedup;
        self
    }

    pub fn exposure_dedup(mut self, dedup: DedupConfig) -> Self {
        self.config.exposure_dedup = dedup;
        self
    }

    pub fn build(mut self) -> LocalEvaluationConfig {
        if self.config.server_zone == ServerZone::Eu {
            if !self.server_url_overridden {
                self.config.server_url = EU_SERVER_URL.to_owned();
            }
            if !self.stream_url_overridden {
                self.config.stream_server_url = EU_STREAM_URL.to_owned();
            }
            if let Some(cohort) = &mut self.config.cohort_sync_config {
                if cohort.cohort_server_url == DEFAULT_COHORT_URL {
                    cohort.cohort_server_url = EU_COHORT_URL.to_owned();
                }
            }
        }
        self.config
    }
}
