//! Fetch one cohort (with If-Modified semantics), retry, size-limit.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::model::Cohort;
use crate::{Error, Result};

const COHORT_REQUEST_RETRY_DELAY: Duration = Duration::from_millis(100);
const COHORT_IN_PROGRESS_RETRY_DELAY: Duration = Duration::from_secs(1);
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CohortResponse {
    cohort_id: String,
    last_modified: i64,
    size: i64,
    #[serde(default = "default_group_type")]
    group_type: String,
    #[serde(default)]
    member_ids: Vec<String>,
}

fn default_group_type() -> String {
    "User".to_owned()
}

/// Downloads a single cohort's membership set from the cohort CDN,
/// retrying transient failures per spec.md §4.7.
pub struct CohortDownloader {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    secret_key: String,
    max_cohort_size: i64,
    library_header: String,
    request_timeout: Duration,
}

impl CohortDownloader {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        secret_key: impl Into<String>,
        max_cohort_size: i64,
        request_timeout: Duration,
    ) -> Self {
        CohortDownloader {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            secret_key: secret_key.into(),
            max_cohort_size,
            library_header: format!("experiment-rust-server/{}", env!("CARGO_PKG_VERSION")),
            request_timeout,
        }
    }

    fn basic_auth(&self) -> String {
        BASE64.encode(format!("{}:{}", self.api_key, self.secret_key))
    }

    /// Fetch `id`, passing `existing.last_modified` as the `lastModified`
    /// query parameter when present. Returns `Ok(None)` when the server
    /// reports the caller's copy is current (`204`).
    pub async fn get_cohort(&self, id: &str, existing: Option<&Cohort>) -> Result<Option<Cohort>> {
        let mut errors = 0u32;
        loop {
            let mut url = format!(
                "{}/sdk/v1/cohort/{}?maxCohortSize={}",
                self.base_url, id, self.max_cohort_size
            );
            if let Some(cohort) = existing {
                url.push_str(&format!("&lastModified={}", cohort.last_modified));
            }

            let response = self
                .client
                .get(&url)
                .header(
                    "Authorization",
                    format!("Basic {}", self.basic_auth()),
                )
                .header("X-Amp-Exp-Library", &self.library_header)
                .timeout(self.request_timeout)
                .send()
                .await?;

            match response.status() {
                StatusCode::OK => {
                    let body: CohortResponse = response.json().await?;
                    return Ok(Some(Cohort {
                        id: body.cohort_id,
                        last_modified: body.last_modified,
                        size: body.size,
                        member_ids: body.member_ids.into_iter().collect(),
                        group_type: body.group_type,
                    }));
                }
                StatusCode::NO_CONTENT => return Ok(None),
                StatusCode::PAYLOAD_TOO_LARGE => return Err(Error::CohortTooLarge),
                StatusCode::TOO_MANY_REQUESTS => {
                    // Does not count toward the error budget.
                    tokio::time::sleep(COHORT_REQUEST_RETRY_DELAY).await;
                }
                StatusCode::ACCEPTED => {
                    // Server is still building the cohort.
                    tokio::time::sleep(COHORT_IN_PROGRESS_RETRY_DELAY).await;
                }
                other => {
                    errors += 1;
                    if errors >= MAX_RETRIES {
                        return Err(Error::FetchError(other.as_u16()));
                    }
                    tokio::time::sleep(COHORT_REQUEST_RETRY_DELAY).await;
                }
            }
        }
    }
}
