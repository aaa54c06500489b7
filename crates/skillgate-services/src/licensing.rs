//! License lifecycle: pending → licensed.
//!
//! `request_license` issues a signed mint authorization and reserves it as a
//! pending entry with a 10-minute TTL; `record_license_minted` promotes the
//! pending entry to an active license with a 30-day TTL after cross-checking
//! the nonce. TTL expiry of either entry returns the (user, tool) pair to
//! the absent state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, U256};
use skillgate_core::{
    Eip712Signer, GatewayError, License, LicenseGrant, StoreValue, Tier, TimeSource,
};
use skillgate_store::TtlStore;
use tracing::info;

use crate::keys;

/// Pending entries live 10 minutes, long enough to complete the mint.
const PENDING_TTL: Duration = Duration::from_secs(10 * 60);

/// Active entries live 30 days, the licensed period itself.
const ACTIVE_TTL: Duration = Duration::from_secs(30 * 24 * 3600);

const LICENSE_DURATION_SECS: u64 = 30 * 24 * 3600;

const LICENSED_MAX_CALLS: u32 = 1000;

/// Price policy. Pure and stateless with respect to per-user information:
/// same inputs, same price.
pub fn license_price(_tool_id: &U256) -> String {
    // 0.01 in 18-decimal units.
    "10000000000000000".to_string()
}

pub struct LicenseService {
    store: Arc<TtlStore>,
    signer: Arc<Eip712Signer>,
    time: Arc<dyn TimeSource>,
    contract: Address,
    /// Monotonic sequence seeded from the wall clock; unique within the
    /// process, which is the scope nonce uniqueness requires.
    nonces: AtomicU64,
}

impl LicenseService {
    pub fn new(
        store: Arc<TtlStore>,
        signer: Arc<Eip712Signer>,
        time: Arc<dyn TimeSource>,
        contract: Address,
    ) -> Self {
        let seed = time.now_nanos();
        Self {
            store,
            signer,
            time,
            contract,
            nonces: AtomicU64::new(seed),
        }
    }

    /// Issue a signed mint authorization for (user, tool).
    pub fn request_license(
        &self,
        user: Address,
        tool_id: U256,
    ) -> Result<LicenseGrant, GatewayError> {
        let now = self.time.now_secs();

        // Active check first: an administratively inserted pair of entries
        // must reject as AlreadyActive, not AlreadyPending.
        let license_key = keys::license_key(&user, &tool_id);
        if let Some(value) = self.store.get(&license_key) {
            if let Some(license) = value.as_license() {
                if !license.is_expired(now) {
                    return Err(GatewayError::AlreadyActive);
                }
            }
        }

        let pending_key = keys::pending_license_key(&user, &tool_id);
        if self.store.get(&pending_key).is_some() {
            return Err(GatewayError::AlreadyPending);
        }

        let expires_at_secs = now + LICENSE_DURATION_SECS;
        let nonce = self.nonces.fetch_add(1, Ordering::SeqCst);
        let price = license_price(&tool_id);

        let signature = self
            .signer
            .create_license_signature(
                user,
                tool_id,
                U256::from(expires_at_secs),
                U256::from(nonce),
            )
            .map_err(|e| GatewayError::Internal(format!("signing failed: {e}")))?;

        let pending = License {
            user,
            tool_id,
            expires_at_secs,
            nonce,
            price: price.clone(),
            created_at_secs: now,
            max_calls: 0,
            calls_used: 0,
            tier: Tier::Pending,
        };
        self.store
            .set(&pending_key, StoreValue::License(pending), PENDING_TTL);

        info!(
            user = %user,
            tool_id = %tool_id,
            nonce,
            expires_at = expires_at_secs,
            "issued license authorization"
        );

        Ok(LicenseGrant {
            tool_id,
            user,
            expires_at_secs,
            nonce,
            signature,
            price,
            contract: self.contract,
        })
    }

    /// Promote a pending entry to active after the on-chain mint.
    ///
    /// `expires_at_secs` is trusted as echoed from the mint event and is not
    /// re-validated against the pending entry; a past value is stored and
    /// simply fails subsequent access checks.
    pub fn record_license_minted(
        &self,
        user: Address,
        tool_id: U256,
        expires_at_secs: u64,
        nonce: u64,
    ) -> Result<(), GatewayError> {
        let pending_key = keys::pending_license_key(&user, &tool_id);
        let pending = match self.store.get(&pending_key) {
            Some(StoreValue::License(license)) => license,
            _ => return Err(GatewayError::NoPending),
        };

        if pending.nonce != nonce {
            return Err(GatewayError::NonceMismatch);
        }

        let active = License {
            user,
            tool_id,
            expires_at_secs,
            nonce,
            price: pending.price,
            created_at_secs: self.time.now_secs(),
            max_calls: LICENSED_MAX_CALLS,
            calls_used: 0,
            tier: Tier::Licensed,
        };

        let license_key = keys::license_key(&user, &tool_id);
        self.store
            .set(&license_key, StoreValue::License(active), ACTIVE_TTL);
        self.store.delete(&pending_key);

        info!(user = %user, tool_id = %tool_id, nonce, "license mint recorded");
        Ok(())
    }
}
