//! # External Collaborators
//!
//! Outbound HTTP boundaries of the orchestration core. Each collaborator is a
//! trait so the orchestrator can be driven by in-process fakes in tests and by
//! the reqwest-backed clients in production.

pub mod compute;
pub mod delivery;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use std::time::Duration;

use crate::config::ConfigurationError;
use crate::error::Result;

pub use compute::{
    ComputeProvisioner, HttpComputeProvisioner, InstanceHandle, ProvisionRequest, ResourceSizing,
};
pub use delivery::{DeliverySink, HttpDeliverySink};

/// reqwest client with a per-request timeout and optional bearer token
pub(crate) fn build_http_client(
    api_token: &str,
    timeout_ms: u64,
    component: &str,
) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .user_agent(format!("pipeline-core/{}", env!("CARGO_PKG_VERSION")));

    if !api_token.is_empty() {
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(&format!("Bearer {api_token}")).map_err(|e| {
            ConfigurationError::invalid_value(
                format!("{component}.api_token"),
                "***",
                format!("not a valid header value: {e}"),
            )
        })?;
        headers.insert(AUTHORIZATION, value);
        builder = builder.default_headers(headers);
    }

    Ok(builder.build()?)
}

/// Body text of a failed response, truncated for log and error messages
pub(crate) async fn error_body(response: reqwest::Response) -> String {
    let status = response.status();
    let text = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    let text: String = text.chars().take(512).collect();
    format!("HTTP {status}: {text}")
}
