//! Minimal remote-evaluation client: a thin `POST /sdk/v2/vardata?v=0`
//! wrapper for callers who want a one-shot server-side evaluation instead
//! of running the local engine against a synchronized flag set.
//!
//! Grounded on `original_source/.../remote/client.py`'s `__do_fetch`/
//! `__retry_fetch`, trimmed to the single non-deprecated `fetch_v2` path
//! per this crate's scope -- no connection-pool-as-object, no
//! default-variant filtering, no background-thread `fetch_async`.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::ServerZone;
use crate::context::EvaluationContext;
use crate::model::Variant;
use crate::{Error, Result};

const DEFAULT_SERVER_URL: &str = "https://api.lab.amplitude.com";
const EU_SERVER_URL: &str = "https://api.lab.eu.amplitude.com";

/// Per-call overrides for the `X-Amp-Exp-Track`/`X-Amp-Exp-Exposure-Track`
/// headers. `None` omits the header entirely, leaving the decision to the
/// server's default.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    pub track_assignment: Option<bool>,
    pub track_exposure: Option<bool>,
}

/// Configuration for [`RemoteEvaluationClient`].
#[derive(Debug, Clone)]
pub struct RemoteEvaluationConfig {
    pub server_url: String,
    pub fetch_timeout_millis: u64,
    pub fetch_retries: u32,
    pub fetch_retry_backoff_min_millis: u64,
    pub fetch_retry_backoff_max_millis: u64,
    pub fetch_retry_backoff_scalar: f64,
}

impl Default for RemoteEvaluationConfig {
    fn default() -> Self {
        RemoteEvaluationConfig {
            server_url: DEFAULT_SERVER_URL.to_owned(),
            fetch_timeout_millis: 10_000,
            fetch_retries: 0,
            fetch_retry_backoff_min_millis: 500,
            fetch_retry_backoff_max_millis: 10_000,
            fetch_retry_backoff_scalar: 1.5,
        }
    }
}

impl RemoteEvaluationConfig {
    pub fn with_server_zone(mut self, zone: ServerZone) -> Self {
        if zone == ServerZone::Eu && self.server_url == DEFAULT_SERVER_URL {
            self.server_url = EU_SERVER_URL.to_owned();
        }
        self
    }
}

/// Whether a failed fetch attempt is worth retrying, per spec.md §7:
/// anything below 400, a server error, or a rate limit.
fn should_retry(status: u16) -> bool {
    status < 400 || status >= 500 || status == 429
}

/// A thin wrapper around a single remote-evaluation endpoint. Does not
/// synchronize any state locally; every call is a network round trip.
pub struct RemoteEvaluationClient {
    client: reqwest::Client,
    api_key: String,
    config: RemoteEvaluationConfig,
}

impl RemoteEvaluationClient {
    pub fn new(api_key: impl Into<String>, config: RemoteEvaluationConfig) -> Self {
        RemoteEvaluationClient {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            config,
        }
    }

    /// Evaluate every flag for `context` against the remote control plane,
    /// retrying transient failures with exponential backoff
    /// (`fetch_retry_backoff_min_millis` -> `fetch_retry_backoff_max_millis`
    /// scaled by `fetch_retry_backoff_scalar`). Retries are capped at
    /// `fetch_retries` attempts after the first.
    pub async fn evaluate(
        &self,
        context: &EvaluationContext,
        options: FetchOptions,
    ) -> Result<BTreeMap<String, Variant>> {
        let mut delay = Duration::from_millis(self.config.fetch_retry_backoff_min_millis);
        let mut attempt = 0u32;

        loop {
            match self.do_fetch(context, options).await {
                Ok(variants) => return Ok(variants),
                Err(err) => {
                    let retryable = matches!(&err, Error::FetchError(status) if should_retry(*status))
                        || matches!(err, Error::Timeout | Error::Network(_));
                    if !retryable || attempt >= self.config.fetch_retries {
                        return Err(err);
                    }
                    log::warn!(target: "flagcore"; "remote evaluation attempt {attempt} failed: {err}, retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    let max = Duration::from_millis(self.config.fetch_retry_backoff_max_millis);
                    delay = delay.mul_f64(self.config.fetch_retry_backoff_scalar).min(max);
                }
            }
        }
    }

    async fn do_fetch(
        &self,
        context: &EvaluationContext,
        options: FetchOptions,
    ) -> Result<BTreeMap<String, Variant>> {
        let mut request = self
            .client
            .post(format!("{}/sdk/v2/vardata?v=0", self.config.server_url))
            .timeout(Duration::from_millis(self.config.fetch_timeout_millis))
            .header("Authorization", format!("Api-Key {}", self.api_key))
            .header("Content-Type", "application/json;charset=utf-8");

        if let Some(track) = options.track_assignment {
            request = request.header("X-Amp-Exp-Track", if track { "track" } else { "no-track" });
        }
        if let Some(track) = options.track_exposure {
            request = request.header(
                "X-Amp-Exp-Exposure-Track",
                if track { "track" } else { "no-track" },
            );
        }

        let response = request.json(&context.to_value()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::FetchError(status.as_u16()));
        }
        Ok(response.json::<BTreeMap<String, Variant>>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_retry_matches_spec_boundaries() {
        assert!(should_retry(200));
        assert!(should_retry(399));
        assert!(!should_retry(400));
        assert!(!should_retry(404));
        assert!(!should_retry(499));
        assert!(should_retry(500));
        assert!(should_retry(429));
    }

    #[test]
    fn eu_zone_remaps_default_url_only() {
        let config = RemoteEvaluationConfig::default().with_server_zone(ServerZone::Eu);
        assert_eq!(config.server_url, EU_SERVER_URL);

        let custom = RemoteEvaluationConfig {
            server_url: "https://custom.example.com".to_owned(),
            ..RemoteEvaluationConfig::default()
        }
        .with_server_zone(ServerZone::Eu);
        assert_eq!(custom.server_url, "https://custom.example.com");
    }
}
