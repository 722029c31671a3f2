//! Remote mode: poll another exporter instance instead of the local database

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, info};

use crate::domain::{ExpositionDocument, MetricsSource, ReadError};

/// Fetches the exposition document served by another instance.
#[derive(Debug, Clone)]
pub struct RemoteExporterSource {
    client: reqwest::Client,
    url: String,
}

impl RemoteExporterSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ReadError> {
        let url = url.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReadError::Remote {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn remote_error(&self, reason: impl ToString) -> ReadError {
        ReadError::Remote {
            url: self.url.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl MetricsSource for RemoteExporterSource {
    async fn fetch(&self) -> Result<ExpositionDocument, ReadError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| self.remote_error(e))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(self.remote_error(format!("HTTP {}", status)));
        }

        let body = response.text().await.map_err(|e| self.remote_error(e))?;
        debug!(url = %self.url, bytes = body.len(), "Remote metrics fetched");
        Ok(ExpositionDocument::from_text(body))
    }

    fn describe(&self) -> String {
        format!("remote {}", self.url)
    }
}

/// Check whether another exporter already answers on `url`.
///
/// Only an HTTP 200 counts; timeouts and connection errors mean "not available".
pub async fn probe_exporter(url: &str, timeout: Duration) -> bool {
    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(e) => {
            debug!("Could not build probe client: {}", e);
            return false;
        }
    };

    match client.get(url).send().await {
        Ok(response) if response.status() == StatusCode::OK => {
            info!("🟢 Existing exporter found at {}", url);
            true
        }
        Ok(response) => {
            debug!("Probe of {} answered HTTP {}", url, response.status());
            false
        }
        Err(e) => {
            debug!("Probe of {} failed: {}", url, e);
            false
        }
    }
}
