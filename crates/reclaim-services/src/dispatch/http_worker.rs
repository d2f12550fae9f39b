use anyhow::Context;
use async_trait::async_trait;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::time::Duration;

use super::{DispatchError, ExtractionPayload, ExtractionWorker};

/// Extraction worker reached over HTTP with a shared-secret bearer token.
/// Any 2xx response counts as acceptance; the body is ignored.
pub struct HttpExtractionWorker {
    http_client: reqwest::Client,
    url: String,
    secret: String,
}

impl Debug for HttpExtractionWorker {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("HttpExtractionWorker")
            .field("url", &self.url)
            .finish()
    }
}

impl HttpExtractionWorker {
    pub fn new(
        url: impl Into<String>,
        secret: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client for extraction worker")?;

        Ok(Self {
            http_client,
            url: url.into(),
            secret: secret.into(),
        })
    }

    pub fn from_config(config: &reclaim_core::Config) -> anyhow::Result<Self> {
        Self::new(
            config.extraction_worker_url(),
            config.extraction_worker_secret(),
            Duration::from_secs(config.extraction_timeout_secs()),
        )
    }
}

#[async_trait]
impl ExtractionWorker for HttpExtractionWorker {
    async fn submit(&self, payload: &ExtractionPayload) -> Result<(), DispatchError> {
        let response = self
            .http_client
            .post(&self.url)
            .bearer_auth(&self.secret)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DispatchError::Timeout
                } else {
                    DispatchError::Unreachable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        Ok(())
    }
}
