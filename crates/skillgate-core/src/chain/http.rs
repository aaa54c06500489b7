//! HTTP transport adapter for the chain registry view.
//!
//! Endpoint paths are configuration, not assumptions: both are path
//! templates (with `{user}` / `{tool}` placeholders) that can be swapped to
//! match whatever registry gateway fronts the chain.

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::{ChainView, ChainViewError};
use crate::model::{address_key, LicenseMetadata};

/// HTTP binding configuration for registry view calls.
#[derive(Debug, Clone)]
pub struct ChainRpcConfig {
    pub base_url: String,
    /// Per-request deadline in milliseconds.
    pub timeout_ms: u64,
    /// Path template for the ownership check, e.g.
    /// `/license/{user}/{tool}/valid`.
    pub license_valid_path: String,
    /// Path template for the metadata fetch, e.g. `/license/{tool}/metadata`.
    pub license_metadata_path: String,
}

impl ChainRpcConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_ms: 10_000,
            license_valid_path: "/license/{user}/{tool}/valid".to_string(),
            license_metadata_path: "/license/{tool}/metadata".to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), ChainViewError> {
        if self.base_url.trim().is_empty() {
            return Err(ChainViewError::Protocol("chain base_url is empty".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(ChainViewError::Protocol("chain timeout_ms must be > 0".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ValidResponse {
    valid: bool,
}

#[derive(Debug, Deserialize)]
struct MetadataResponse {
    expires_at: u64,
}

/// Async HTTP client implementing [`ChainView`].
#[derive(Debug, Clone)]
pub struct HttpChainView {
    cfg: ChainRpcConfig,
    client: reqwest::Client,
}

impl HttpChainView {
    pub fn new(cfg: ChainRpcConfig) -> Result<Self, ChainViewError> {
        cfg.validate()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| ChainViewError::Transport(e.to_string()))?;
        Ok(Self { cfg, client })
    }

    fn url(&self, template: &str, user: Option<&str>, tool: &str) -> String {
        let mut path = template.replace("{tool}", tool);
        if let Some(user) = user {
            path = path.replace("{user}", user);
        }
        format!("{}{}", self.cfg.base_url.trim_end_matches('/'), path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<T, ChainViewError> {
        let resp = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                ChainViewError::Timeout
            } else {
                ChainViewError::Transport(e.to_string())
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ChainViewError::Protocol(format!("http status {status}")));
        }

        resp.json::<T>()
            .await
            .map_err(|e| ChainViewError::Protocol(e.to_string()))
    }
}

#[async_trait]
impl ChainView for HttpChainView {
    async fn is_license_valid(
        &self,
        user: Address,
        tool_id: U256,
    ) -> Result<bool, ChainViewError> {
        let url = self.url(
            &self.cfg.license_valid_path,
            Some(&address_key(&user)),
            &tool_id.to_string(),
        );
        let body: ValidResponse = self.get_json(&url).await?;
        Ok(body.valid)
    }

    async fn license_metadata(&self, tool_id: &str) -> Result<LicenseMetadata, ChainViewError> {
        let url = self.url(&self.cfg.license_metadata_path, None, tool_id);
        let body: MetadataResponse = self.get_json(&url).await?;
        Ok(LicenseMetadata {
            expires_at_secs: body.expires_at,
        })
    }
}
