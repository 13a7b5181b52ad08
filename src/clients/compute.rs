//! Remote compute provisioning.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use super::{build_http_client, error_body};
use crate::config::ComputeConfig;
use crate::error::{PipelineError, Result};

/// Request for one ephemeral worker instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionRequest {
    pub image: String,
    pub region: String,
    pub auto_terminate: bool,
    pub resources: ResourceSizing,
    /// Parameters handed to the worker process
    pub environment: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSizing {
    pub cpu_cores: u32,
    pub memory_mb: u32,
}

/// Handle of a provisioned instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceHandle {
    #[serde(alias = "id")]
    pub instance_id: String,
}

#[async_trait]
pub trait ComputeProvisioner: Send + Sync + 'static {
    /// Start one worker. Any error is a dispatch failure for that task only.
    async fn provision(&self, request: ProvisionRequest) -> Result<InstanceHandle>;
}

/// Provisioner backed by an HTTP instance API
#[derive(Debug, Clone)]
pub struct HttpComputeProvisioner {
    client: reqwest::Client,
    provision_url: String,
}

impl HttpComputeProvisioner {
    pub fn new(config: &ComputeConfig) -> Result<Self> {
        Ok(Self {
            client: build_http_client(&config.api_token, config.request_timeout_ms, "compute")?,
            provision_url: config.provision_url.clone(),
        })
    }
}

#[async_trait]
impl ComputeProvisioner for HttpComputeProvisioner {
    async fn provision(&self, request: ProvisionRequest) -> Result<InstanceHandle> {
        let task_id = request
            .environment
            .get("TASK_ID")
            .cloned()
            .unwrap_or_default();

        let response = self
            .client
            .post(&self.provision_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::dispatch_failed(&task_id, e.to_string()))?;

        if !response.status().is_success() {
            return Err(PipelineError::dispatch_failed(
                task_id,
                error_body(response).await,
            ));
        }

        let handle: InstanceHandle = response
            .json()
            .await
            .map_err(|e| PipelineError::dispatch_failed(&task_id, format!("bad response: {e}")))?;

        debug!(task_id = %task_id, instance_id = %handle.instance_id, "Instance provisioned");
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_handle_accepts_id_alias() {
        let handle: InstanceHandle = serde_json::from_str(r#"{"id": "i-123"}"#).unwrap();
        assert_eq!(handle.instance_id, "i-123");
    }

    #[test]
    fn test_client_builds_with_token() {
        let config = ComputeConfig {
            api_token: "secret".to_string(),
            ..ComputeConfig::default()
        };
        assert!(HttpComputeProvisioner::new(&config).is_ok());
    }

    #[test]
    fn test_client_rejects_unencodable_token() {
        let config = ComputeConfig {
            api_token: "bad\ntoken".to_string(),
            ..ComputeConfig::default()
        };
        let err = HttpComputeProvisioner::new(&config).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }
}
