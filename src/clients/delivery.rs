//! Downstream delivery of a finished batch's file list.

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use super::{build_http_client, error_body};
use crate::config::DeliveryConfig;
use crate::error::{PipelineError, Result};
use crate::models::ProcessableFile;

#[async_trait]
pub trait DeliverySink: Send + Sync + 'static {
    /// Hand off the final file list. Failures are terminal for the batch.
    async fn deliver(&self, batch_id: &str, files: &[ProcessableFile]) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct DeliveryRequest<'a> {
    batch_id: &'a str,
    file_count: usize,
    files: &'a [ProcessableFile],
}

#[derive(Debug, Clone)]
pub struct HttpDeliverySink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpDeliverySink {
    pub fn new(config: &DeliveryConfig) -> Result<Self> {
        Ok(Self {
            client: build_http_client(&config.api_token, config.request_timeout_ms, "delivery")?,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl DeliverySink for HttpDeliverySink {
    async fn deliver(&self, batch_id: &str, files: &[ProcessableFile]) -> Result<()> {
        let body = DeliveryRequest {
            batch_id,
            file_count: files.len(),
            files,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::delivery_failed(batch_id, e.to_string()))?;

        if !response.status().is_success() {
            return Err(PipelineError::delivery_failed(
                batch_id,
                error_body(response).await,
            ));
        }

        info!(batch_id = %batch_id, file_count = files.len(), "Batch delivered downstream");
        Ok(())
    }
}
