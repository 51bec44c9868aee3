//! TrueNAS SCALE app restart through the REST API.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::config::TrueNasConfig;
use crate::error::TrueNasError;

/// Path of the chart release collection.
pub const RELEASES_PATH: &str = "/api/v2.0/chart/release";

/// Path of the chart release restart action.
pub const RESTART_PATH: &str = "/api/v2.0/chart/release/restart";

/// One chart release as returned by the API. Only the name is used.
#[derive(Debug, Clone, Deserialize)]
pub struct ChartRelease {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
struct RestartRequest<'a> {
    release_name: &'a str,
}

/// Client for the TrueNAS app API.
pub struct TrueNasClient {
    config: TrueNasConfig,
    http: Client,
}

impl TrueNasClient {
    /// Builds a client for `config`.
    ///
    /// # Errors
    ///
    /// Returns `TrueNasError::Client` if the HTTP client cannot be built.
    pub fn new(config: TrueNasConfig) -> Result<Self, TrueNasError> {
        let http = Client::builder()
            .danger_accept_invalid_certs(!config.verify_tls)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(TrueNasError::Client)?;

        Ok(Self { config, http })
    }

    /// Returns true if both base URL and API key are set.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    /// The configuration this client was built with.
    #[must_use]
    pub fn config(&self) -> &TrueNasConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    /// Lists chart releases.
    ///
    /// # Errors
    ///
    /// Returns an error if the API is not configured, unreachable, answers
    /// with a non-success status, or returns something other than a list.
    pub async fn list_releases(&self) -> Result<Vec<ChartRelease>, TrueNasError> {
        if !self.is_configured() {
            return Err(TrueNasError::NotConfigured);
        }

        let url = self.url(RELEASES_PATH);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.list_timeout)
            .send()
            .await
            .map_err(|source| TrueNasError::Request {
                url: url.clone(),
                source,
            })?;

        let response = check_status(&url, response).await?;
        response
            .json::<Vec<ChartRelease>>()
            .await
            .map_err(|source| TrueNasError::Decode { url, source })
    }

    /// Returns true if an app called `app_name` exists.
    ///
    /// Every failure is logged and reported as "does not exist", so the
    /// caller falls through to the Docker path.
    #[instrument(skip(self))]
    pub async fn app_exists(&self, app_name: &str) -> bool {
        if !self.is_configured() {
            debug!("TrueNAS API not configured, skipping app lookup");
            return false;
        }

        match self.list_releases().await {
            Ok(releases) => {
                let exists = releases
                    .iter()
                    .any(|release| release.name.as_deref() == Some(app_name));
                debug!(exists, "Checked TrueNAS app existence");
                exists
            }
            Err(e) => {
                warn!("Failed to list TrueNAS apps: {}", describe(&e));
                false
            }
        }
    }

    /// Asks TrueNAS to restart `app_name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the API is not configured, unreachable, or
    /// answers with a non-success status.
    pub async fn try_restart_app(&self, app_name: &str) -> Result<(), TrueNasError> {
        if !self.is_configured() {
            return Err(TrueNasError::NotConfigured);
        }

        let url = self.url(RESTART_PATH);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.restart_timeout)
            .json(&RestartRequest {
                release_name: app_name,
            })
            .send()
            .await
            .map_err(|source| TrueNasError::Request {
                url: url.clone(),
                source,
            })?;

        check_status(&url, response).await?;
        Ok(())
    }

    /// Restarts `app_name`, logging the outcome. Returns true on success.
    #[instrument(skip(self))]
    pub async fn restart_app(&self, app_name: &str) -> bool {
        match self.try_restart_app(app_name).await {
            Ok(()) => {
                info!("Restarted TrueNAS app '{app_name}' through the API");
                true
            }
            Err(TrueNasError::NotConfigured) => false,
            Err(e) => {
                error!("Failed to restart TrueNAS app '{app_name}': {}", describe(&e));
                false
            }
        }
    }
}

impl std::fmt::Debug for TrueNasClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrueNasClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

async fn check_status(
    url: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, TrueNasError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(TrueNasError::Status {
        url: url.to_string(),
        status: status.as_u16(),
        body: truncate(body.trim(), 200),
    })
}

/// Error text including the source chain; reqwest hides the useful part
/// (connection refused, timeout) in the source.
fn describe(error: &TrueNasError) -> String {
    let mut text = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = std::error::Error::source(inner);
    }
    text
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
