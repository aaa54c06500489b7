//! End-to-end license lifecycle scenarios: free quota, pending, mint,
//! licensed access, and the rejection matrix around them.

mod common;

use std::time::Duration;

use alloy_primitives::U256;
use common::{gateway, ManualClock};
use skillgate_core::model::parse_address;
use skillgate_core::{GatewayError, TimeSource, REASON_QUOTA_EXHAUSTED};

const USER: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";

#[tokio::test]
async fn free_tier_then_licensed() {
    let gw = gateway(ManualClock::new(1_700_000_000));
    let user = parse_address(USER).unwrap();
    let tool = U256::from(42u64);

    // 100 free calls count down from 99 to 0.
    for expected_remaining in (0..100).rev() {
        let result = gw.access.verify_access(user, tool).await.unwrap();
        assert!(result.valid);
        assert_eq!(result.tier, "free");
        assert_eq!(result.calls_remaining, expected_remaining);
        assert!(result.provenance_hash.is_some());
    }

    // Call 101 is denied.
    let denied = gw.access.verify_access(user, tool).await.unwrap();
    assert!(!denied.valid);
    assert_eq!(denied.tier, "none");
    assert_eq!(denied.reason.as_deref(), Some(REASON_QUOTA_EXHAUSTED));

    // Request a license: 30-day expiry, signed grant.
    let grant = gw.licensing.request_license(user, tool).unwrap();
    assert_eq!(
        grant.expires_at_secs,
        gw.clock.now_secs() + 30 * 24 * 3600
    );
    assert!(grant.signature.v == 27 || grant.signature.v == 28);
    assert_eq!(grant.price, "10000000000000000");

    // Record the mint, then access resolves to the licensed tier.
    gw.licensing
        .record_license_minted(user, tool, grant.expires_at_secs, grant.nonce)
        .unwrap();

    let licensed = gw.access.verify_access(user, tool).await.unwrap();
    assert!(licensed.valid);
    assert_eq!(licensed.tier, "licensed");
    assert_eq!(licensed.calls_remaining, 999);
    assert_eq!(licensed.expires_at_secs, Some(grant.expires_at_secs));

    // The counter keeps consuming on subsequent calls.
    let again = gw.access.verify_access(user, tool).await.unwrap();
    assert_eq!(again.calls_remaining, 998);
}

#[tokio::test]
async fn double_request_is_rejected() {
    let gw = gateway(ManualClock::new(1_700_000_000));
    let user = parse_address(USER).unwrap();
    let tool = U256::from(43u64);

    let grant = gw.licensing.request_license(user, tool).unwrap();
    assert!(matches!(
        gw.licensing.request_license(user, tool),
        Err(GatewayError::AlreadyPending)
    ));

    gw.licensing
        .record_license_minted(user, tool, grant.expires_at_secs, grant.nonce)
        .unwrap();
    assert!(matches!(
        gw.licensing.request_license(user, tool),
        Err(GatewayError::AlreadyActive)
    ));
}

#[tokio::test]
async fn nonce_mismatch_keeps_the_pending_entry() {
    let gw = gateway(ManualClock::new(1_700_000_000));
    let user = parse_address(USER).unwrap();
    let tool = U256::from(44u64);

    let grant = gw.licensing.request_license(user, tool).unwrap();

    assert!(matches!(
        gw.licensing
            .record_license_minted(user, tool, grant.expires_at_secs, 99_999),
        Err(GatewayError::NonceMismatch)
    ));

    // The pending entry survives a mismatched record and the correct nonce
    // still promotes it, exactly once.
    gw.licensing
        .record_license_minted(user, tool, grant.expires_at_secs, grant.nonce)
        .unwrap();
    assert!(matches!(
        gw.licensing
            .record_license_minted(user, tool, grant.expires_at_secs, grant.nonce),
        Err(GatewayError::NoPending)
    ));
}

#[tokio::test]
async fn pending_entry_expires_after_ten_minutes() {
    let gw = gateway(ManualClock::new(1_700_000_000));
    let user = parse_address(USER).unwrap();
    let tool = U256::from(45u64);

    let grant = gw.licensing.request_license(user, tool).unwrap();

    gw.clock.advance(Duration::from_secs(601));
    assert!(matches!(
        gw.licensing
            .record_license_minted(user, tool, grant.expires_at_secs, grant.nonce),
        Err(GatewayError::NoPending)
    ));

    // The pair returned to the absent state: a fresh request succeeds.
    assert!(gw.licensing.request_license(user, tool).is_ok());
}

#[tokio::test]
async fn expired_license_falls_back_to_free_tier() {
    let gw = gateway(ManualClock::new(1_700_000_000));
    let user = parse_address(USER).unwrap();
    let tool = U256::from(46u64);

    let grant = gw.licensing.request_license(user, tool).unwrap();
    // The mint event echoes a short-lived expiry; it is stored as-is.
    let expires_at = gw.clock.now_secs() + 10;
    gw.licensing
        .record_license_minted(user, tool, expires_at, grant.nonce)
        .unwrap();

    let licensed = gw.access.verify_access(user, tool).await.unwrap();
    assert_eq!(licensed.tier, "licensed");

    gw.clock.advance(Duration::from_secs(11));
    let after = gw.access.verify_access(user, tool).await.unwrap();
    assert_eq!(after.tier, "free");
}
