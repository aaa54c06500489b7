//! Canonical key schema of the shared store.
//!
//! User addresses key in EIP-55 checksummed form, tool ids in decimal form.
//! Callers must pass canonical forms (`address_key` / `tool_key`).

use alloy_primitives::{Address, U256};
use skillgate_core::model::{address_key, tool_key};

/// Prefix scanned by the batch runner.
pub const PENDING_VOTE_PREFIX: &str = "pending:vote:";

pub fn license_key(user: &Address, tool_id: &U256) -> String {
    format!("license:{}:{}", address_key(user), tool_key(tool_id))
}

pub fn pending_license_key(user: &Address, tool_id: &U256) -> String {
    format!("pending:{}", license_key(user, tool_id))
}

pub fn free_tier_key(user: &Address, tool_id: &U256) -> String {
    format!("free:{}:{}", address_key(user), tool_key(tool_id))
}

pub fn usage_key(user: &Address, tool_id: &U256) -> String {
    format!("usage:{}:{}", address_key(user), tool_key(tool_id))
}

pub fn vote_key(vote_id: &str) -> String {
    format!("vote:{vote_id}")
}

pub fn pending_votes_key(tool: &str) -> String {
    format!("{PENDING_VOTE_PREFIX}{tool}")
}

pub fn reputation_key(tool: &str) -> String {
    format!("reputation:{tool}")
}

pub fn batch_key(tool: &str, batch_id: &str) -> String {
    format!("batch:{tool}:{batch_id}")
}

pub fn rate_limit_key(client: &str) -> String {
    format!("ratelimit:{client}")
}
