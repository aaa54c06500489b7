//! HTTP surface of the gateway: routing, request binding, error → status
//! mapping, rate limiting, and the serve loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use axum::extract::{ConnectInfo, Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use skillgate_batcher::BatchRunnerConfig;
use skillgate_core::auth;
use skillgate_core::chain::http::{ChainRpcConfig, HttpChainView};
use skillgate_core::model::{parse_address, parse_tool_id};
use skillgate_core::{
    AccessResult, ChainView, ChainViewError, Eip712Signer, GatewayError, NullChainView,
    SignerError, SystemTimeSource, TimeSource, ToolReputation, VoteBatch, VoteSubmission,
    VoteVerificationResult,
};
use skillgate_services::voting::{REASON_VOTER_INELIGIBLE, REASON_VOTE_REPLAY};
use skillgate_services::{keys, AccessService, LicenseService, VoteService};
use skillgate_store::TtlStore;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::signal;
use tracing::{info, warn};

use crate::config::Settings;
use crate::metrics::Metrics;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("config error: {0}")]
    Config(String),
    #[error("signer error: {0}")]
    Signer(#[from] SignerError),
    #[error("chain adapter error: {0}")]
    Chain(#[from] ChainViewError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

// ============== Shared state ==============

#[derive(Clone)]
pub struct AppState {
    store: Arc<TtlStore>,
    licensing: Arc<LicenseService>,
    access: Arc<AccessService>,
    votes: Arc<VoteService>,
    time: Arc<dyn TimeSource>,
    metrics: Arc<Metrics>,
    rate_limit: i64,
}

// ============== Wire DTOs ==============

#[derive(Debug, Deserialize)]
struct VerifyAccessRequest {
    user_address: String,
    tool_id: String,
    /// Optional request authentication: a personal-message signature over
    /// `"{address}:{timestamp}"` no older than five minutes.
    #[serde(default)]
    auth_timestamp: Option<String>,
    #[serde(default)]
    auth_signature: Option<String>,
}

#[derive(Debug, Serialize)]
struct AccessResponse {
    valid: bool,
    tier: &'static str,
    calls_remaining: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    provenance_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl From<AccessResult> for AccessResponse {
    fn from(result: AccessResult) -> Self {
        Self {
            valid: result.valid,
            tier: result.tier,
            calls_remaining: result.calls_remaining,
            expires_at: result.expires_at_secs.map(|s| s.to_string()),
            provenance_hash: result.provenance_hash,
            reason: result.reason,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LicenseRequestBody {
    user_address: String,
    tool_id: String,
}

#[derive(Debug, Serialize)]
struct LicenseResponseBody {
    tool_id: String,
    user: String,
    expires_at: String,
    nonce: String,
    signature_r: String,
    signature_s: String,
    signature_v: String,
    price: String,
    contract_address: String,
}

#[derive(Debug, Deserialize)]
struct RecordMintedRequest {
    user_address: String,
    tool_id: String,
    expires_at: String,
    nonce: String,
}

#[derive(Debug, Deserialize)]
struct VoteSubmitRequest {
    tool_id: String,
    voter_address: String,
    score: i8,
    nonce: String,
    signature: String,
}

#[derive(Debug, Serialize)]
struct VoteSubmitResponse {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    vote_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ReputationResponse {
    tool_id: String,
    total_score: i64,
    total_votes: i64,
    average_score: String,
    recent_score: String,
    last_calculated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_batch_at: Option<String>,
}

#[derive(Debug, Serialize)]
struct BatchResponse {
    id: String,
    tool_id: String,
    votes_count: u32,
    total_score: i64,
    merkle_root: String,
    created_at: String,
}

impl From<VoteBatch> for BatchResponse {
    fn from(batch: VoteBatch) -> Self {
        Self {
            id: batch.id,
            tool_id: batch.tool_id,
            votes_count: batch.votes_count,
            total_score: batch.total_score,
            merkle_root: batch.merkle_root,
            created_at: batch.created_at_secs.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

// ============== Error mapping ==============

fn error_response(err: GatewayError) -> Response {
    let status = match &err {
        GatewayError::InvalidArgument(_)
        | GatewayError::AlreadyActive
        | GatewayError::AlreadyPending
        | GatewayError::NoPending
        | GatewayError::NonceMismatch
        | GatewayError::Replay => StatusCode::BAD_REQUEST,
        GatewayError::SignatureInvalid => StatusCode::UNAUTHORIZED,
        GatewayError::IneligibleVoter => StatusCode::FORBIDDEN,
        GatewayError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

/// Status for a vote rejected as a value, per the same taxonomy: replay is a
/// conflict-class 400, eligibility a 403, everything else a signature 401.
fn vote_rejection_status(reason: &str) -> StatusCode {
    if reason == REASON_VOTE_REPLAY {
        StatusCode::BAD_REQUEST
    } else if reason == REASON_VOTER_INELIGIBLE {
        StatusCode::FORBIDDEN
    } else {
        StatusCode::UNAUTHORIZED
    }
}

// ============== Handlers ==============

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    state
        .metrics
        .store_entries
        .set(i64::try_from(state.store.len()).unwrap_or(i64::MAX));

    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&state.metrics.registry.gather(), &mut buf) {
        warn!(error = %e, "failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, String::new()).into_response();
    }
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        buf,
    )
        .into_response()
}

async fn verify_access(
    State(state): State<AppState>,
    Json(body): Json<VerifyAccessRequest>,
) -> Response {
    let (user, tool_id) = match parse_pair(&body.user_address, &body.tool_id) {
        Ok(pair) => pair,
        Err(e) => return error_response(e),
    };

    if let (Some(timestamp), Some(signature)) = (&body.auth_timestamp, &body.auth_signature) {
        let timestamp = match parse_u64(timestamp, "auth_timestamp") {
            Ok(v) => v,
            Err(e) => return error_response(e),
        };
        if !auth::verify_timed_signature(user, timestamp, signature, state.time.now_secs()) {
            return error_response(GatewayError::SignatureInvalid);
        }
    }

    match state.access.verify_access(user, tool_id).await {
        Ok(result) if result.valid => {
            state.metrics.access_granted.inc();
            Json(AccessResponse::from(result)).into_response()
        }
        Ok(result) => {
            state.metrics.access_denied.inc();
            (StatusCode::FORBIDDEN, Json(AccessResponse::from(result))).into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn request_license(
    State(state): State<AppState>,
    Json(body): Json<LicenseRequestBody>,
) -> Response {
    let (user, tool_id) = match parse_pair(&body.user_address, &body.tool_id) {
        Ok(pair) => pair,
        Err(e) => return error_response(e),
    };

    match state.licensing.request_license(user, tool_id) {
        Ok(grant) => Json(LicenseResponseBody {
            tool_id: grant.tool_id.to_string(),
            user: grant.user.to_checksum(None),
            expires_at: grant.expires_at_secs.to_string(),
            nonce: grant.nonce.to_string(),
            signature_r: grant.signature.r_hex(),
            signature_s: grant.signature.s_hex(),
            signature_v: grant.signature.v_hex(),
            price: grant.price,
            contract_address: grant.contract.to_checksum(None),
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn record_minted(
    State(state): State<AppState>,
    Json(body): Json<RecordMintedRequest>,
) -> Response {
    let (user, tool_id) = match parse_pair(&body.user_address, &body.tool_id) {
        Ok(pair) => pair,
        Err(e) => return error_response(e),
    };
    let expires_at = match parse_u64(&body.expires_at, "expires_at") {
        Ok(v) => v,
        Err(e) => return error_response(e),
    };
    let nonce = match parse_u64(&body.nonce, "nonce") {
        Ok(v) => v,
        Err(e) => return error_response(e),
    };

    match state
        .licensing
        .record_license_minted(user, tool_id, expires_at, nonce)
    {
        Ok(()) => Json(serde_json::json!({ "status": "recorded" })).into_response(),
        Err(e) => error_response(e),
    }
}

async fn submit_vote(
    State(state): State<AppState>,
    Json(body): Json<VoteSubmitRequest>,
) -> Response {
    let nonce = match parse_u64(&body.nonce, "nonce") {
        Ok(v) => v,
        Err(e) => return error_response(e),
    };

    let submission = VoteSubmission {
        tool_id: body.tool_id,
        voter_address: body.voter_address,
        score: body.score,
        nonce,
        signature: body.signature,
    };

    match state.votes.submit_vote(&submission) {
        Ok(VoteVerificationResult {
            valid: true,
            vote_id,
            ..
        }) => {
            state.metrics.votes_accepted.inc();
            Json(VoteSubmitResponse {
                valid: true,
                reason: None,
                vote_id,
            })
            .into_response()
        }
        Ok(VoteVerificationResult { reason, .. }) => {
            state.metrics.votes_rejected.inc();
            let reason = reason.unwrap_or_default();
            let status = vote_rejection_status(&reason);
            (
                status,
                Json(VoteSubmitResponse {
                    valid: false,
                    reason: Some(reason),
                    vote_id: None,
                }),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn get_reputation(
    State(state): State<AppState>,
    Path(tool_id): Path<String>,
) -> Response {
    match state.votes.get_tool_reputation(&tool_id) {
        Ok(reputation) => match reputation_response(reputation) {
            Ok(body) => Json(body).into_response(),
            Err(e) => error_response(e),
        },
        Err(e) => error_response(e),
    }
}

async fn process_batch(
    State(state): State<AppState>,
    Path(tool_id): Path<String>,
) -> Response {
    match state.votes.process_batch(&tool_id) {
        Ok(batch) => {
            state.metrics.batches_processed.inc();
            Json(BatchResponse::from(batch)).into_response()
        }
        Err(e) => error_response(e),
    }
}

fn parse_pair(user: &str, tool: &str) -> Result<(Address, alloy_primitives::U256), GatewayError> {
    Ok((parse_address(user)?, parse_tool_id(tool)?))
}

fn parse_u64(raw: &str, field: &str) -> Result<u64, GatewayError> {
    raw.parse::<u64>()
        .map_err(|_| GatewayError::InvalidArgument(format!("{field} is not a decimal integer")))
}

fn reputation_response(rep: ToolReputation) -> Result<ReputationResponse, GatewayError> {
    Ok(ReputationResponse {
        tool_id: rep.tool_id,
        total_score: rep.total_score,
        total_votes: rep.total_votes,
        average_score: rep.average_score,
        recent_score: rep.recent_score,
        last_calculated_at: rfc3339(rep.last_calculated_at_secs)?,
        last_batch_at: rep.last_batch_at_secs.map(rfc3339).transpose()?,
    })
}

fn rfc3339(secs: u64) -> Result<String, GatewayError> {
    let ts = i64::try_from(secs)
        .map_err(|_| GatewayError::Internal(format!("timestamp out of range: {secs}")))?;
    OffsetDateTime::from_unix_timestamp(ts)
        .map_err(|e| GatewayError::Internal(format!("timestamp out of range: {e}")))?
        .format(&Rfc3339)
        .map_err(|e| GatewayError::Internal(format!("timestamp formatting: {e}")))
}

// ============== Rate limiting ==============

/// Fixed one-minute window per client IP, backed by the shared store.
/// Health and metrics are exempt.
async fn rate_limit(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path();
    if path == "/health" || path == "/metrics" {
        return next.run(req).await;
    }

    let key = keys::rate_limit_key(&addr.ip().to_string());
    let count = state.store.increment(&key, 1, Duration::from_secs(60));
    if count > state.rate_limit {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorResponse {
                error: "rate limit exceeded".to_string(),
            }),
        )
            .into_response();
    }

    next.run(req).await
}

// ============== Router / startup ==============

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .route("/api/v1/access/verify", post(verify_access))
        .route("/api/v1/license/request", post(request_license))
        .route("/api/v1/license/record-minted", post(record_minted))
        .route("/api/v1/vote/submit", post(submit_vote))
        .route("/api/v1/vote/reputation/{tool_id}", get(get_reputation))
        .route("/api/v1/vote/process-batch/{tool_id}", post(process_batch))
        .with_state(state)
}

pub fn build_state(settings: &Settings) -> Result<(AppState, Arc<TtlStore>), NodeError> {
    let time: Arc<dyn TimeSource> = Arc::new(SystemTimeSource);

    let cleanup = (settings.cleanup_interval_secs > 0)
        .then(|| Duration::from_secs(settings.cleanup_interval_secs));
    let store = Arc::new(TtlStore::new(cleanup, Arc::clone(&time)));

    let contract: Address = settings
        .license_nft_address
        .parse()
        .map_err(|_| NodeError::Config("LICENSE_NFT_ADDRESS is not a valid address".to_string()))?;

    if settings.signer_private_key.is_empty() {
        return Err(NodeError::Config("SIGNER_PRIVATE_KEY is required".to_string()));
    }
    let signer = Arc::new(Eip712Signer::new(
        &settings.signer_private_key,
        settings.chain_id,
        contract,
    )?);
    info!(signer = %signer.address(), chain_id = settings.chain_id, "signer ready");

    let chain: Arc<dyn ChainView> = if settings.enable_blockchain {
        if settings.eth_node_url.is_empty() {
            return Err(NodeError::Config(
                "ETH_NODE_URL is required when ENABLE_BLOCKCHAIN is set".to_string(),
            ));
        }
        Arc::new(HttpChainView::new(ChainRpcConfig::new(
            settings.eth_node_url.clone(),
        ))?)
    } else {
        info!("chain integration disabled, running in free-tier/pending-only mode");
        Arc::new(NullChainView)
    };

    let licensing = Arc::new(LicenseService::new(
        Arc::clone(&store),
        Arc::clone(&signer),
        Arc::clone(&time),
        contract,
    ));
    let access = Arc::new(AccessService::new(
        Arc::clone(&store),
        chain,
        Arc::clone(&time),
        settings.signature_nonce.clone(),
    ));
    let votes = Arc::new(
        VoteService::new(
            Arc::clone(&store),
            Arc::clone(&time),
            settings.chain_id,
            Duration::from_secs(settings.batch_interval_secs),
        )
        .with_reputation_ttl(Duration::from_secs(settings.cache_ttl_secs)),
    );

    let state = AppState {
        store: Arc::clone(&store),
        licensing,
        access,
        votes,
        time,
        metrics: Arc::new(Metrics::new()),
        rate_limit: settings.rate_limit,
    };
    Ok((state, store))
}

/// Bind, serve until shutdown, then stop the batch runner and close the
/// store.
pub async fn serve(settings: Settings) -> Result<(), NodeError> {
    let (state, store) = build_state(&settings)?;

    let batcher = skillgate_batcher::spawn(
        BatchRunnerConfig {
            interval: Duration::from_secs(settings.batch_interval_secs),
        },
        Arc::clone(&store),
        Arc::clone(&state.votes),
    );

    let app = router(state.clone())
        .layer(middleware::from_fn_with_state(state, rate_limit));

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.server_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "gateway listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    batcher.stop();
    store.close();
    info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    info!("shutdown signal received");
}
