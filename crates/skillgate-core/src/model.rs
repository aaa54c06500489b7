//! Entity definitions shared across the gateway.
//!
//! Entities are value types. The KV store owns the only mutable copy of each
//! entry; services read, mutate a copy, and write back under the store lock.
//!
//! Canonical forms at boundaries:
//! - user addresses key as EIP-55 checksummed hex, lookups are
//!   case-insensitive (normalize through parse → checksum on every use);
//! - tool ids key as decimal strings and sign as 256-bit integers.

use alloy_primitives::{Address, B256, U256};

use crate::error::GatewayError;

/// Resolved access class of a license entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Signed authorization issued, on-chain mint not yet recorded.
    Pending,
    /// Mint recorded (or observed on-chain); entry grants licensed calls.
    Licensed,
}

impl Tier {
    pub const fn as_str(self) -> &'static str {
        match self {
            Tier::Pending => "pending",
            Tier::Licensed => "licensed",
        }
    }
}

/// A cached license entry, pending or active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct License {
    pub user: Address,
    pub tool_id: U256,
    /// Absolute expiry, seconds since the Unix epoch.
    pub expires_at_secs: u64,
    pub nonce: u64,
    /// Price in the smallest on-chain unit, decimal string.
    pub price: String,
    pub created_at_secs: u64,
    pub max_calls: u32,
    pub calls_used: u32,
    pub tier: Tier,
}

impl License {
    pub fn calls_remaining(&self) -> i64 {
        i64::from(self.max_calls) - i64::from(self.calls_used)
    }

    pub fn is_expired(&self, now_secs: u64) -> bool {
        now_secs >= self.expires_at_secs
    }
}

/// On-chain license metadata as exposed by the registry view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LicenseMetadata {
    pub expires_at_secs: u64,
}

/// secp256k1 signature split into the on-chain (r, s, v) triple.
///
/// `v` is normalized to 27 or 28.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureParts {
    pub r: B256,
    pub s: B256,
    pub v: u8,
}

impl SignatureParts {
    pub fn r_hex(&self) -> String {
        hex::encode(self.r)
    }

    pub fn s_hex(&self) -> String {
        hex::encode(self.s)
    }

    pub fn v_hex(&self) -> String {
        hex::encode([self.v])
    }
}

/// Response of a successful license request: everything the client needs to
/// submit the on-chain mint.
#[derive(Debug, Clone)]
pub struct LicenseGrant {
    pub tool_id: U256,
    pub user: Address,
    pub expires_at_secs: u64,
    pub nonce: u64,
    pub signature: SignatureParts,
    pub price: String,
    pub contract: Address,
}

/// Outcome of an access decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessResult {
    pub valid: bool,
    pub tier: &'static str,
    pub calls_remaining: i64,
    pub expires_at_secs: Option<u64>,
    pub provenance_hash: Option<String>,
    pub reason: Option<String>,
}

impl AccessResult {
    pub fn licensed(calls_remaining: i64, expires_at_secs: u64) -> Self {
        Self {
            valid: true,
            tier: Tier::Licensed.as_str(),
            calls_remaining,
            expires_at_secs: Some(expires_at_secs),
            provenance_hash: None,
            reason: None,
        }
    }

    pub fn free(calls_remaining: i64, provenance_hash: String) -> Self {
        Self {
            valid: true,
            tier: "free",
            calls_remaining,
            expires_at_secs: None,
            provenance_hash: Some(provenance_hash),
            reason: None,
        }
    }

    pub fn denied(reason: &str) -> Self {
        Self {
            valid: false,
            tier: "none",
            calls_remaining: 0,
            expires_at_secs: None,
            provenance_hash: None,
            reason: Some(reason.to_string()),
        }
    }
}

/// A single signed vote on a tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    /// Stable digest of the signed fields, lowercase hex.
    pub id: String,
    /// Tool id in canonical decimal form.
    pub tool_id: String,
    pub voter: Address,
    /// -1 (downvote), 0 (neutral), +1 (upvote).
    pub score: i8,
    /// Unique per voter across all tools.
    pub nonce: u64,
    /// 65-byte signature, lowercase hex.
    pub signature: String,
    pub created_at_secs: u64,
    pub processed: bool,
    /// Empty until the vote is assigned to a batch.
    pub batch_id: String,
}

/// A deterministic aggregation of per-tool votes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteBatch {
    pub id: String,
    pub tool_id: String,
    pub votes_count: u32,
    pub total_score: i64,
    /// 32-byte aggregate digest, lowercase hex.
    pub merkle_root: String,
    pub created_at_secs: u64,
}

/// Cached reputation aggregate for a tool.
///
/// Averages are fixed-scale decimal strings (4 fractional digits) computed
/// with integer arithmetic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolReputation {
    pub tool_id: String,
    pub total_score: i64,
    pub total_votes: i64,
    pub average_score: String,
    pub recent_score: String,
    pub last_calculated_at_secs: u64,
    pub last_batch_at_secs: Option<u64>,
}

impl ToolReputation {
    pub fn empty(tool_id: &str, now_secs: u64) -> Self {
        Self {
            tool_id: tool_id.to_string(),
            total_score: 0,
            total_votes: 0,
            average_score: scaled_average(0, 0),
            recent_score: scaled_average(0, 0),
            last_calculated_at_secs: now_secs,
            last_batch_at_secs: None,
        }
    }

    /// Recompute the derived averages from the running totals.
    pub fn recalculate(&mut self, now_secs: u64) {
        self.average_score = scaled_average(self.total_score, self.total_votes);
        self.recent_score = self.average_score.clone();
        self.last_calculated_at_secs = now_secs;
    }
}

/// `total_score / total_votes` rendered with 4 fractional digits, `0.0000`
/// when there are no votes. Integer arithmetic only.
pub fn scaled_average(total_score: i64, total_votes: i64) -> String {
    if total_votes <= 0 {
        return "0.0000".to_string();
    }
    let scaled = total_score.saturating_mul(10_000) / total_votes;
    let sign = if scaled < 0 { "-" } else { "" };
    let abs = scaled.unsigned_abs();
    format!("{sign}{}.{:04}", abs / 10_000, abs % 10_000)
}

/// Boundary payload for vote submission; fields arrive as strings and are
/// validated by the vote service.
#[derive(Debug, Clone)]
pub struct VoteSubmission {
    pub tool_id: String,
    pub voter_address: String,
    pub score: i8,
    pub nonce: u64,
    /// 65-byte signature, hex with optional 0x prefix.
    pub signature: String,
}

/// Outcome of a vote submission. Rejections expected in normal operation
/// (replay, ineligibility, bad signature) are values, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteVerificationResult {
    pub valid: bool,
    pub reason: Option<String>,
    pub vote_id: Option<String>,
}

impl VoteVerificationResult {
    pub fn accepted(vote_id: String) -> Self {
        Self {
            valid: true,
            reason: None,
            vote_id: Some(vote_id),
        }
    }

    pub fn rejected(reason: &str) -> Self {
        Self {
            valid: false,
            reason: Some(reason.to_string()),
            vote_id: None,
        }
    }
}

/// Tagged union of everything the KV store holds.
///
/// The store maps string keys to these variants; each service reads and
/// writes only the variants it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreValue {
    License(License),
    Vote(Vote),
    VoteList(Vec<Vote>),
    Reputation(ToolReputation),
    Batch(VoteBatch),
    Counter(i64),
}

impl StoreValue {
    pub fn as_license(&self) -> Option<&License> {
        match self {
            StoreValue::License(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_vote_list(&self) -> Option<&[Vote]> {
        match self {
            StoreValue::VoteList(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_reputation(&self) -> Option<&ToolReputation> {
        match self {
            StoreValue::Reputation(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_counter(&self) -> Option<i64> {
        match self {
            StoreValue::Counter(n) => Some(*n),
            _ => None,
        }
    }
}

/// Parse a user address from its hex form, case-insensitively.
pub fn parse_address(raw: &str) -> Result<Address, GatewayError> {
    raw.parse::<Address>()
        .map_err(|_| GatewayError::InvalidArgument(format!("malformed address: {raw}")))
}

/// Parse a tool id from its decimal form.
pub fn parse_tool_id(raw: &str) -> Result<U256, GatewayError> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(GatewayError::InvalidArgument(format!(
            "tool id is not a non-negative integer: {raw}"
        )));
    }
    U256::from_str_radix(raw, 10)
        .map_err(|_| GatewayError::InvalidArgument(format!("tool id out of range: {raw}")))
}

/// Canonical keying form of a user address (EIP-55 checksummed hex).
pub fn address_key(addr: &Address) -> String {
    addr.to_checksum(None)
}

/// Canonical keying form of a tool id (decimal).
pub fn tool_key(tool_id: &U256) -> String {
    tool_id.to_string()
}
