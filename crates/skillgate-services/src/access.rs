//! Tiered access decision engine.
//!
//! Resolution order is fixed and observable: cached licensed entry, chain
//! consult, free tier, deny. A failed or timed-out chain consult is absorbed
//! as "no license" and the engine continues; the caller never sees it.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, U256};
use sha2::{Digest, Sha256};
use skillgate_core::model::{address_key, tool_key};
use skillgate_core::{
    AccessResult, ChainView, GatewayError, License, StoreValue, Tier, TimeSource,
    REASON_QUOTA_EXHAUSTED,
};
use skillgate_store::TtlStore;
use tracing::{debug, warn};

use crate::keys;

/// Liveness extension applied on every licensed cache hit. The entry's own
/// `expires_at` remains the authoritative 30-day bound.
const LICENSED_CACHE_TTL: Duration = Duration::from_secs(24 * 3600);

/// Rolling free-tier window; slides forward on use.
const FREE_WINDOW: Duration = Duration::from_secs(24 * 3600);

const FREE_LIMIT: i64 = 100;

const USAGE_TTL: Duration = Duration::from_secs(24 * 3600);

const CHAIN_SYNTH_MAX_CALLS: u32 = 1000;

pub struct AccessService {
    store: Arc<TtlStore>,
    chain: Arc<dyn ChainView>,
    time: Arc<dyn TimeSource>,
    signature_nonce: String,
    chain_deadline: Duration,
}

impl AccessService {
    pub fn new(
        store: Arc<TtlStore>,
        chain: Arc<dyn ChainView>,
        time: Arc<dyn TimeSource>,
        signature_nonce: impl Into<String>,
    ) -> Self {
        Self {
            store,
            chain,
            time,
            signature_nonce: signature_nonce.into(),
            chain_deadline: Duration::from_secs(10),
        }
    }

    /// Override the chain consult deadline (default: 10 seconds).
    pub fn with_chain_deadline(mut self, deadline: Duration) -> Self {
        self.chain_deadline = deadline;
        self
    }

    /// Resolve the access tier for one call of `user` against `tool_id`.
    pub async fn verify_access(
        &self,
        user: Address,
        tool_id: U256,
    ) -> Result<AccessResult, GatewayError> {
        let now = self.time.now_secs();
        let license_key = keys::license_key(&user, &tool_id);

        // 1. Cached licensed entry. The usage counter is informational and
        // never exceeds max_calls; it does not gate the licensed tier.
        if let Some(StoreValue::License(mut license)) = self.store.get(&license_key) {
            if !license.is_expired(now) {
                license.calls_used = license.calls_used.saturating_add(1).min(license.max_calls);
                let remaining = license.calls_remaining();
                let expires_at = license.expires_at_secs;
                self.store
                    .set(&license_key, StoreValue::License(license), LICENSED_CACHE_TTL);
                self.record_usage(&user, &tool_id);
                return Ok(AccessResult::licensed(remaining, expires_at));
            }
        }

        // 2. Chain consult; any failure degrades to "no license".
        if let Some(license) = self.consult_chain(user, tool_id, now).await {
            let remaining = license.calls_remaining();
            let expires_at = license.expires_at_secs;
            self.store
                .set(&license_key, StoreValue::License(license), LICENSED_CACHE_TTL);
            self.record_usage(&user, &tool_id);
            return Ok(AccessResult::licensed(remaining, expires_at));
        }

        // 3. Free tier.
        let free_key = keys::free_tier_key(&user, &tool_id);
        let used = self.store.increment(&free_key, 1, FREE_WINDOW);
        if used <= FREE_LIMIT {
            let digest = self.provenance_digest(&tool_id, &user);
            self.record_usage(&user, &tool_id);
            return Ok(AccessResult::free(FREE_LIMIT - used, digest));
        }

        // 4. Deny.
        Ok(AccessResult::denied(REASON_QUOTA_EXHAUSTED))
    }

    /// Query the chain with a deadline; `None` means "no usable license".
    async fn consult_chain(&self, user: Address, tool_id: U256, now: u64) -> Option<License> {
        let valid = tokio::time::timeout(
            self.chain_deadline,
            self.chain.is_license_valid(user, tool_id),
        )
        .await;

        match valid {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => return None,
            Ok(Err(e)) => {
                debug!(user = %user, tool_id = %tool_id, error = %e, "chain consult failed");
                return None;
            }
            Err(_) => {
                warn!(user = %user, tool_id = %tool_id, "chain consult timed out");
                return None;
            }
        }

        let metadata = tokio::time::timeout(
            self.chain_deadline,
            self.chain.license_metadata(&tool_key(&tool_id)),
        )
        .await;

        let metadata = match metadata {
            Ok(Ok(m)) => m,
            Ok(Err(e)) => {
                debug!(tool_id = %tool_id, error = %e, "metadata fetch failed");
                return None;
            }
            Err(_) => {
                warn!(tool_id = %tool_id, "metadata fetch timed out");
                return None;
            }
        };

        if metadata.expires_at_secs <= now {
            return None;
        }

        Some(License {
            user,
            tool_id,
            expires_at_secs: metadata.expires_at_secs,
            nonce: 0,
            price: String::new(),
            created_at_secs: now,
            max_calls: CHAIN_SYNTH_MAX_CALLS,
            calls_used: 1,
            tier: Tier::Licensed,
        })
    }

    /// Audit token for free-tier responses:
    /// `sha256("FREE:{tool}:{user}:{nanos}:{signature_nonce}")`, hex.
    /// Returned to the caller for correlation, never stored.
    fn provenance_digest(&self, tool_id: &U256, user: &Address) -> String {
        let data = format!(
            "FREE:{}:{}:{}:{}",
            tool_key(tool_id),
            address_key(user),
            self.time.now_nanos(),
            self.signature_nonce,
        );
        hex::encode(Sha256::digest(data.as_bytes()))
    }

    /// Usage feeds vote eligibility.
    fn record_usage(&self, user: &Address, tool_id: &U256) {
        self.store
            .increment(&keys::usage_key(user, tool_id), 1, USAGE_TTL);
    }
}
