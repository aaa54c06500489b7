//! HTTP surface tests: request binding, status mapping, and the full
//! license and vote flows over the router.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use skillgate_core::{SystemTimeSource, TimeSource};
use skillgate_node::config::Settings;
use skillgate_node::http_server::{build_state, router};
use tower::ServiceExt;

const USER: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";

fn test_settings() -> Settings {
    Settings {
        server_port: 0,
        chain_id: 31337,
        license_nft_address: "0x1234567890123456789012345678901234567890".to_string(),
        signer_private_key: "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d"
            .to_string(),
        signature_nonce: "test-nonce".to_string(),
        rate_limit: 100,
        cleanup_interval_secs: 0,
        batch_interval_secs: 300,
        cache_ttl_secs: 60,
        enable_blockchain: false,
        eth_node_url: String::new(),
    }
}

fn test_router() -> Router {
    let (state, _store) = build_state(&test_settings()).unwrap();
    router(state)
}

async fn post_json(
    app: &Router,
    path: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::post(path)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, value)
}

#[tokio::test]
async fn health_endpoint() {
    let app = test_router();
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn free_tier_access_counts_down() {
    let app = test_router();
    let body = serde_json::json!({ "user_address": USER, "tool_id": "42" });

    let (status, first) = post_json(&app, "/api/v1/access/verify", body.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["tier"], "free");
    assert_eq!(first["calls_remaining"], 99);
    assert!(first["provenance_hash"].as_str().unwrap().len() == 64);

    let (_, second) = post_json(&app, "/api/v1/access/verify", body).await;
    assert_eq!(second["calls_remaining"], 98);
}

#[tokio::test]
async fn malformed_address_is_a_400() {
    let app = test_router();
    let body = serde_json::json!({ "user_address": "nope", "tool_id": "42" });
    let (status, _) = post_json(&app, "/api/v1/access/verify", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn license_flow_over_http() {
    let app = test_router();
    let request_body = serde_json::json!({ "user_address": USER, "tool_id": "7" });

    let (status, grant) = post_json(&app, "/api/v1/license/request", request_body.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(grant["tool_id"], "7");
    assert_eq!(grant["price"], "10000000000000000");
    assert_eq!(grant["signature_r"].as_str().unwrap().len(), 64);
    let v = grant["signature_v"].as_str().unwrap();
    assert!(v == "1b" || v == "1c");

    // Double request is rejected while pending.
    let (status, err) = post_json(&app, "/api/v1/license/request", request_body.clone()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(err["error"].as_str().unwrap().contains("pending"));

    // Record the mint with the returned nonce.
    let minted = serde_json::json!({
        "user_address": USER,
        "tool_id": "7",
        "expires_at": grant["expires_at"],
        "nonce": grant["nonce"],
    });
    let (status, _) = post_json(&app, "/api/v1/license/record-minted", minted).await;
    assert_eq!(status, StatusCode::OK);

    // Request after mint: already active.
    let (status, err) = post_json(&app, "/api/v1/license/request", request_body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(err["error"].as_str().unwrap().contains("active"));

    // Access now resolves to the licensed tier.
    let verify = serde_json::json!({ "user_address": USER, "tool_id": "7" });
    let (status, result) = post_json(&app, "/api/v1/access/verify", verify).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["tier"], "licensed");
    assert_eq!(result["calls_remaining"], 999);
}

#[tokio::test]
async fn record_minted_without_pending_is_a_400() {
    let app = test_router();
    let minted = serde_json::json!({
        "user_address": USER,
        "tool_id": "9",
        "expires_at": "2000000000",
        "nonce": "1",
    });
    let (status, err) = post_json(&app, "/api/v1/license/record-minted", minted).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(err["error"].as_str().unwrap().contains("no pending"));
}

#[tokio::test]
async fn reputation_of_unvoted_tool_is_empty() {
    let app = test_router();
    let response = app
        .oneshot(
            Request::get("/api/v1/vote/reputation/42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["total_votes"], 0);
    assert_eq!(value["average_score"], "0.0000");
}

#[tokio::test]
async fn process_batch_without_votes_is_a_400() {
    let app = test_router();
    let (status, err) =
        post_json(&app, "/api/v1/vote/process-batch/42", serde_json::Value::Null).await;
    // Path-routed POST with a null body still reaches the handler.
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(err["error"].as_str().unwrap().contains("no pending"));
}

#[tokio::test]
async fn timed_auth_gates_the_verify_path() {
    use skillgate_core::auth::personal_message_hash;
    use skillgate_core::model::address_key;

    let app = test_router();

    let key = k256::ecdsa::SigningKey::from_slice(&[0x42u8; 32]).unwrap();
    let user = skillgate_core::signer::address_of(key.verifying_key());
    let user_hex = address_key(&user);
    let now = SystemTimeSource.now_secs();

    let message = format!("{user_hex}:{now}");
    let digest = personal_message_hash(message.as_bytes());
    let (sig, recid) = key.sign_prehash_recoverable(digest.as_slice()).unwrap();
    let mut raw = [0u8; 65];
    raw[..64].copy_from_slice(&sig.to_bytes());
    raw[64] = 27 + recid.to_byte();

    let good = serde_json::json!({
        "user_address": user_hex,
        "tool_id": "42",
        "auth_timestamp": now.to_string(),
        "auth_signature": hex::encode(raw),
    });
    let (status, body) = post_json(&app, "/api/v1/access/verify", good).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tier"], "free");

    // A garbage signature fails closed.
    let bad = serde_json::json!({
        "user_address": user_hex,
        "tool_id": "42",
        "auth_timestamp": now.to_string(),
        "auth_signature": hex::encode([0u8; 65]),
    });
    let (status, _) = post_json(&app, "/api/v1/access/verify", bad).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // So does a stale timestamp, even correctly signed.
    let stale_ts = now - 301;
    let message = format!("{user_hex}:{stale_ts}");
    let digest = personal_message_hash(message.as_bytes());
    let (sig, recid) = key.sign_prehash_recoverable(digest.as_slice()).unwrap();
    let mut raw = [0u8; 65];
    raw[..64].copy_from_slice(&sig.to_bytes());
    raw[64] = 27 + recid.to_byte();

    let stale = serde_json::json!({
        "user_address": user_hex,
        "tool_id": "42",
        "auth_timestamp": stale_ts.to_string(),
        "auth_signature": hex::encode(raw),
    });
    let (status, _) = post_json(&app, "/api/v1/access/verify", stale).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn vote_with_bad_signature_is_a_401() {
    let app = test_router();

    // Make the voter eligible through a free-tier call first.
    let verify = serde_json::json!({ "user_address": USER, "tool_id": "42" });
    let _ = post_json(&app, "/api/v1/access/verify", verify).await;

    let vote = serde_json::json!({
        "tool_id": "42",
        "voter_address": USER,
        "score": 1,
        "nonce": "1",
        "signature": hex::encode([0u8; 65]),
    });
    let (status, body) = post_json(&app, "/api/v1/vote/submit", vote).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["valid"], false);
}

#[tokio::test]
async fn signed_vote_is_accepted_then_replay_rejected() {
    use skillgate_core::model::{address_key, parse_address};
    use skillgate_services::vote_message_hash;

    let app = test_router();

    let key = k256::ecdsa::SigningKey::from_slice(&[0x42u8; 32]).unwrap();
    let voter = skillgate_core::signer::address_of(key.verifying_key());
    let voter_hex = address_key(&voter);

    // Eligibility via a free-tier call.
    let verify = serde_json::json!({ "user_address": voter_hex, "tool_id": "42" });
    let (status, _) = post_json(&app, "/api/v1/access/verify", verify).await;
    assert_eq!(status, StatusCode::OK);

    let digest = vote_message_hash(
        &alloy_primitives::U256::from(42u64),
        &parse_address(&voter_hex).unwrap(),
        1,
        5,
        31337,
    );
    let (sig, recid) = key.sign_prehash_recoverable(digest.as_slice()).unwrap();
    let mut raw = [0u8; 65];
    raw[..64].copy_from_slice(&sig.to_bytes());
    raw[64] = 27 + recid.to_byte();

    let vote = serde_json::json!({
        "tool_id": "42",
        "voter_address": voter_hex,
        "score": 1,
        "nonce": "5",
        "signature": hex::encode(raw),
    });

    let (status, body) = post_json(&app, "/api/v1/vote/submit", vote.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);

    let (status, body) = post_json(&app, "/api/v1/vote/submit", vote).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["reason"], "vote already submitted");
}
