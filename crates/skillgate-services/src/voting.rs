//! Vote ingestion and batch aggregation.
//!
//! Votes arrive signed by the voter, pass a replay guard keyed by a stable
//! digest, and queue per tool until a batch is cut. The batch carries a
//! deterministic aggregate root: same sorted vote set, same root.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{keccak256, Address, B256, U256};
use sha2::{Digest, Sha256};
use skillgate_core::model::{address_key, parse_address, parse_tool_id, tool_key};
use skillgate_core::{
    recover_address, GatewayError, StoreValue, TimeSource, ToolReputation, Vote, VoteBatch,
    VoteSubmission, VoteVerificationResult,
};
use skillgate_store::TtlStore;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::info;

use crate::keys;

pub const REASON_VOTE_REPLAY: &str = "vote already submitted";
pub const REASON_SIGNER_MISMATCH: &str = "signature does not match voter address";
pub const REASON_VOTER_INELIGIBLE: &str = "voter not eligible - must use tool before voting";

/// Individual votes stay addressable for a day.
const VOTE_TTL: Duration = Duration::from_secs(24 * 3600);

const BATCH_TTL: Duration = Duration::from_secs(24 * 3600);

/// Default reputation cache TTL; operationally tunable via the node config.
const REPUTATION_TTL: Duration = Duration::from_secs(60);

pub struct VoteService {
    store: Arc<TtlStore>,
    time: Arc<dyn TimeSource>,
    chain_id: u64,
    batch_interval: Duration,
    reputation_ttl: Duration,
}

impl VoteService {
    pub fn new(
        store: Arc<TtlStore>,
        time: Arc<dyn TimeSource>,
        chain_id: u64,
        batch_interval: Duration,
    ) -> Self {
        Self {
            store,
            time,
            chain_id,
            batch_interval,
            reputation_ttl: REPUTATION_TTL,
        }
    }

    /// Override the reputation cache TTL (default: 1 minute).
    pub fn with_reputation_ttl(mut self, ttl: Duration) -> Self {
        self.reputation_ttl = ttl;
        self
    }

    /// Verify and enqueue a vote.
    ///
    /// Malformed score/nonce/address/tool are argument errors; replay, a
    /// signer mismatch, and ineligibility are expected outcomes returned as
    /// `valid = false` values.
    pub fn submit_vote(
        &self,
        submission: &VoteSubmission,
    ) -> Result<VoteVerificationResult, GatewayError> {
        if !matches!(submission.score, -1..=1) {
            return Err(GatewayError::InvalidArgument(format!(
                "score out of range: {}",
                submission.score
            )));
        }
        if submission.nonce == 0 {
            return Err(GatewayError::InvalidArgument("nonce must be non-zero".to_string()));
        }

        let voter = parse_address(&submission.voter_address)?;
        let tool_id = parse_tool_id(&submission.tool_id)?;
        let tool = tool_key(&tool_id);

        let signature = match decode_signature(&submission.signature) {
            Some(bytes) => bytes,
            None => {
                return Ok(VoteVerificationResult::rejected(
                    "signature must be 65 bytes of hex",
                ))
            }
        };

        // Replay guard before any expensive work.
        let id = vote_id(&voter, &tool, submission.score, submission.nonce);
        if self.store.get(&keys::vote_key(&id)).is_some() {
            return Ok(VoteVerificationResult::rejected(REASON_VOTE_REPLAY));
        }

        let digest = vote_message_hash(
            &tool_id,
            &voter,
            submission.score,
            submission.nonce,
            self.chain_id,
        );
        match recover_address(digest, &signature) {
            Ok(recovered) if recovered == voter => {}
            Ok(_) => return Ok(VoteVerificationResult::rejected(REASON_SIGNER_MISMATCH)),
            Err(_) => {
                return Ok(VoteVerificationResult::rejected(
                    "failed to recover public key",
                ))
            }
        }

        if !self.is_eligible(&voter, &tool_id) {
            return Ok(VoteVerificationResult::rejected(REASON_VOTER_INELIGIBLE));
        }

        let vote = Vote {
            id: id.clone(),
            tool_id: tool.clone(),
            voter,
            score: submission.score,
            nonce: submission.nonce,
            signature: hex::encode(&signature),
            created_at_secs: self.time.now_secs(),
            processed: false,
            batch_id: String::new(),
        };

        // Append to the per-tool pending queue.
        let pending_key = keys::pending_votes_key(&tool);
        let mut pending = match self.store.get(&pending_key) {
            Some(StoreValue::VoteList(votes)) => votes,
            _ => Vec::new(),
        };
        pending.push(vote.clone());
        self.store.set(
            &pending_key,
            StoreValue::VoteList(pending),
            self.batch_interval * 2,
        );

        // Individual vote for replay detection and later batch assignment.
        self.store
            .set(&keys::vote_key(&id), StoreValue::Vote(vote), VOTE_TTL);

        self.bump_reputation(&tool, submission.score);

        Ok(VoteVerificationResult::accepted(id))
    }

    /// Cached reputation, or an on-the-fly aggregate of the pending queue.
    pub fn get_tool_reputation(&self, tool_id: &str) -> Result<ToolReputation, GatewayError> {
        let tool = tool_key(&parse_tool_id(tool_id)?);

        let reputation_key = keys::reputation_key(&tool);
        if let Some(StoreValue::Reputation(reputation)) = self.store.get(&reputation_key) {
            return Ok(reputation);
        }

        let now = self.time.now_secs();
        let mut reputation = ToolReputation::empty(&tool, now);
        if let Some(StoreValue::VoteList(votes)) = self.store.get(&keys::pending_votes_key(&tool))
        {
            for vote in &votes {
                reputation.total_score += i64::from(vote.score);
                reputation.total_votes += 1;
            }
        }
        reputation.recalculate(now);

        self.store.set(
            &reputation_key,
            StoreValue::Reputation(reputation.clone()),
            self.reputation_ttl,
        );
        Ok(reputation)
    }

    /// Cut a batch from the pending queue of `tool_id`.
    pub fn process_batch(&self, tool_id: &str) -> Result<VoteBatch, GatewayError> {
        let tool = tool_key(&parse_tool_id(tool_id)?);

        let pending_key = keys::pending_votes_key(&tool);
        let mut votes = match self.store.get(&pending_key) {
            Some(StoreValue::VoteList(votes)) if !votes.is_empty() => votes,
            _ => return Err(GatewayError::NoPending),
        };

        let now = self.time.now_secs();
        let batch_id = format!("batch_{tool}_{now}");

        let mut total_score: i64 = 0;
        for vote in &mut votes {
            total_score += i64::from(vote.score);
            vote.processed = true;
            vote.batch_id = batch_id.clone();
        }

        let merkle_root = aggregate_root(&votes)?;

        let batch = VoteBatch {
            id: batch_id.clone(),
            tool_id: tool.clone(),
            votes_count: u32::try_from(votes.len())
                .map_err(|_| GatewayError::Internal("batch too large".to_string()))?,
            total_score,
            merkle_root,
            created_at_secs: now,
        };

        // Re-persist the frozen votes, then retire the queue.
        for vote in &votes {
            self.store
                .set(&keys::vote_key(&vote.id), StoreValue::Vote(vote.clone()), VOTE_TTL);
        }
        self.store.delete(&pending_key);
        self.store.set(
            &keys::batch_key(&tool, &batch.id),
            StoreValue::Batch(batch.clone()),
            BATCH_TTL,
        );

        self.mark_batched(&tool, now);

        info!(
            tool,
            batch_id = %batch.id,
            votes = batch.votes_count,
            total_score = batch.total_score,
            root = %batch.merkle_root,
            "vote batch processed"
        );

        Ok(batch)
    }

    /// Eligibility: prior usage of the tool, or a cached license entry.
    fn is_eligible(&self, voter: &Address, tool_id: &U256) -> bool {
        let usage = self
            .store
            .get(&keys::usage_key(voter, tool_id))
            .and_then(|v| v.as_counter())
            .unwrap_or(0);
        if usage > 0 {
            return true;
        }
        self.store.get(&keys::license_key(voter, tool_id)).is_some()
    }

    /// Additive update of the cached aggregate on each accepted vote.
    fn bump_reputation(&self, tool: &str, score: i8) {
        let reputation_key = keys::reputation_key(tool);
        let now = self.time.now_secs();
        let mut reputation = match self.store.get(&reputation_key) {
            Some(StoreValue::Reputation(reputation)) => reputation,
            _ => ToolReputation::empty(tool, now),
        };
        reputation.total_score += i64::from(score);
        reputation.total_votes += 1;
        reputation.recalculate(now);
        self.store.set(
            &reputation_key,
            StoreValue::Reputation(reputation),
            self.reputation_ttl,
        );
    }

    fn mark_batched(&self, tool: &str, now: u64) {
        let reputation_key = keys::reputation_key(tool);
        let mut reputation = match self.store.get(&reputation_key) {
            Some(StoreValue::Reputation(reputation)) => reputation,
            _ => ToolReputation::empty(tool, now),
        };
        reputation.last_batch_at_secs = Some(now);
        reputation.last_calculated_at_secs = now;
        self.store.set(
            &reputation_key,
            StoreValue::Reputation(reputation),
            self.reputation_ttl,
        );
    }
}

/// Stable vote id: `sha256(voter:tool:score:nonce)`, lowercase hex. The
/// voter renders checksummed, the tool in decimal.
pub fn vote_id(voter: &Address, tool: &str, score: i8, nonce: u64) -> String {
    let data = format!("{}:{}:{}:{}", address_key(voter), tool, score, nonce);
    hex::encode(Sha256::digest(data.as_bytes()))
}

/// Keccak digest of the human-readable vote message clients sign.
pub fn vote_message_hash(
    tool_id: &U256,
    voter: &Address,
    score: i8,
    nonce: u64,
    chain_id: u64,
) -> B256 {
    let message = format!(
        "Vote\nTool: {}\nVoter: {}\nScore: {}\nNonce: {}\nChain: {}",
        tool_key(tool_id),
        address_key(voter),
        score,
        nonce,
        chain_id,
    );
    keccak256(message.as_bytes())
}

/// Deterministic aggregate root over a vote set.
///
/// Votes sort by id; each leaf is
/// `sha256(id:voter:score:nonce:rfc3339(created_at))`; the root is a single
/// SHA-256 over the concatenated leaves. Same sorted input, same root.
pub fn aggregate_root(votes: &[Vote]) -> Result<String, GatewayError> {
    let mut sorted: Vec<&Vote> = votes.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let mut combined = Vec::with_capacity(sorted.len() * 32);
    for vote in sorted {
        let data = format!(
            "{}:{}:{}:{}:{}",
            vote.id,
            address_key(&vote.voter),
            vote.score,
            vote.nonce,
            rfc3339(vote.created_at_secs)?,
        );
        combined.extend_from_slice(&Sha256::digest(data.as_bytes()));
    }

    Ok(hex::encode(Sha256::digest(&combined)))
}

fn rfc3339(secs: u64) -> Result<String, GatewayError> {
    let ts = i64::try_from(secs)
        .map_err(|_| GatewayError::Internal(format!("timestamp out of range: {secs}")))?;
    OffsetDateTime::from_unix_timestamp(ts)
        .map_err(|e| GatewayError::Internal(format!("timestamp out of range: {e}")))?
        .format(&Rfc3339)
        .map_err(|e| GatewayError::Internal(format!("timestamp formatting: {e}")))
}

/// Decode a hex signature (optional `0x`), requiring exactly 65 bytes.
fn decode_signature(raw: &str) -> Option<Vec<u8>> {
    let bytes = hex::decode(raw.trim_start_matches("0x")).ok()?;
    (bytes.len() == 65).then_some(bytes)
}
