//! The HTTP client shared by the poller and the streamer: fetches
//! `GET /sdk/v2/flags?v=0` and builds the authenticated request used to
//! open the `GET /sdk/stream/v1/flags` SSE connection.

use std::time::Duration;

use crate::model::Flag;
use crate::{Error, Result};

/// Fetches flag configurations from the control plane.
///
/// Holds a single reused `reqwest::Client`, mirroring
/// `ConfigurationFetcher`'s one-client-per-concern pattern.
pub struct FlagConfigApi {
    client: reqwest::Client,
    base_url: String,
    stream_base_url: String,
    deployment_key: String,
    library_header: String,
    request_timeout: Duration,
}

impl FlagConfigApi {
    pub fn new(
        base_url: impl Into<String>,
        stream_base_url: impl Into<String>,
        deployment_key: impl Into<String>,
        request_timeout: Duration,
    ) -> Self {
        FlagConfigApi {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            stream_base_url: stream_base_url.into(),
            deployment_key: deployment_key.into(),
            library_header: format!("experiment-rust-server/{}", env!("CARGO_PKG_VERSION")),
            request_timeout,
        }
    }

    pub async fn fetch_flag_configs(&self) -> Result<Vec<Flag>> {
        let url = format!("{}/sdk/v2/flags?v=0", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Api-Key {}", self.deployment_key))
            .header("Content-Type", "application/json;charset=utf-8")
            .header("X-Amp-Exp-Library", &self.library_header)
            .timeout(self.request_timeout)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::Unauthorized);
        }
        if !response.status().is_success() {
            return Err(Error::FetchError(response.status().as_u16()));
        }

        Ok(response.json().await?)
    }

    /// Build the (not-yet-sent) request used to open the SSE stream.
    pub fn stream_request(&self) -> reqwest::RequestBuilder {
        let url = format!("{}/sdk/stream/v1/flags", self.stream_base_url);
        self.client
            .get(&url)
            .header("Authorization", format!("Api-Key {}", self.deployment_key))
            .header("Content-Type", "application/json;charset=utf-8")
            .header("X-Amp-Exp-Library", &self.library_header)
    }
}
