//! Read-only view of the on-chain license registry.
//!
//! The gateway consumes exactly two methods from any chain integration:
//! an ownership check and a metadata fetch. Runtime transports are adapters
//! implementing [`ChainView`]; a null view is a supported mode in which the
//! gateway degrades to free-tier and pending-only behavior.

#[cfg(feature = "chain-http")]
pub mod http;

use std::collections::HashMap;
use std::sync::Mutex;

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use thiserror::Error;

use crate::model::LicenseMetadata;

#[derive(Debug, Error)]
pub enum ChainViewError {
    #[error("chain integration disabled")]
    Disabled,

    #[error("chain request timed out")]
    Timeout,

    #[error("chain transport error: {0}")]
    Transport(String),

    #[error("chain protocol error: {0}")]
    Protocol(String),
}

#[async_trait]
pub trait ChainView: Send + Sync {
    /// Whether `user` holds a currently valid license for `tool_id`.
    async fn is_license_valid(&self, user: Address, tool_id: U256)
        -> Result<bool, ChainViewError>;

    /// On-chain metadata for a tool's license class. `tool_id` arrives in
    /// canonical decimal form.
    async fn license_metadata(&self, tool_id: &str) -> Result<LicenseMetadata, ChainViewError>;
}

/// The "no chain wired" mode: every consult fails and the access engine
/// falls through to the free tier.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullChainView;

#[async_trait]
impl ChainView for NullChainView {
    async fn is_license_valid(
        &self,
        _user: Address,
        _tool_id: U256,
    ) -> Result<bool, ChainViewError> {
        Err(ChainViewError::Disabled)
    }

    async fn license_metadata(&self, _tool_id: &str) -> Result<LicenseMetadata, ChainViewError> {
        Err(ChainViewError::Disabled)
    }
}

/// Deterministic in-memory chain view for tests and offline smoke paths.
#[derive(Debug, Default)]
pub struct MockChainView {
    licenses: Mutex<HashMap<(Address, U256), bool>>,
    metadata: Mutex<HashMap<String, u64>>,
    failing: Mutex<bool>,
}

impl MockChainView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `user` as holding a valid license for `tool_id`.
    pub fn grant(&self, user: Address, tool_id: U256, expires_at_secs: u64) {
        self.licenses
            .lock()
            .expect("mutex poisoned")
            .insert((user, tool_id), true);
        self.metadata
            .lock()
            .expect("mutex poisoned")
            .insert(tool_id.to_string(), expires_at_secs);
    }

    /// Make every subsequent call fail, simulating an unreachable node.
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().expect("mutex poisoned") = failing;
    }

    fn check_reachable(&self) -> Result<(), ChainViewError> {
        if *self.failing.lock().expect("mutex poisoned") {
            return Err(ChainViewError::Transport("mock chain unreachable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainView for MockChainView {
    async fn is_license_valid(
        &self,
        user: Address,
        tool_id: U256,
    ) -> Result<bool, ChainViewError> {
        self.check_reachable()?;
        Ok(self
            .licenses
            .lock()
            .expect("mutex poisoned")
            .get(&(user, tool_id))
            .copied()
            .unwrap_or(false))
    }

    async fn license_metadata(&self, tool_id: &str) -> Result<LicenseMetadata, ChainViewError> {
        self.check_reachable()?;
        self.metadata
            .lock()
            .expect("mutex poisoned")
            .get(tool_id)
            .map(|&expires_at_secs| LicenseMetadata { expires_at_secs })
            .ok_or_else(|| ChainViewError::Protocol(format!("unknown tool {tool_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_view_always_fails() {
        let view = NullChainView;
        assert!(view
            .is_license_valid(Address::ZERO, U256::from(1u64))
            .await
            .is_err());
        assert!(view.license_metadata("1").await.is_err());
    }

    #[tokio::test]
    async fn mock_view_grants_and_fails_on_demand() {
        let view = MockChainView::new();
        let user = Address::repeat_byte(0x11);
        let tool = U256::from(42u64);

        assert!(!view.is_license_valid(user, tool).await.unwrap());

        view.grant(user, tool, 2_000_000_000);
        assert!(view.is_license_valid(user, tool).await.unwrap());
        assert_eq!(
            view.license_metadata("42").await.unwrap().expires_at_secs,
            2_000_000_000
        );

        view.set_failing(true);
        assert!(view.is_license_valid(user, tool).await.is_err());
    }
}
