//! Timed personal-message authentication.
//!
//! Clients may authenticate a request by signing `"{address}:{timestamp}"`
//! as an EIP-191 personal message. The timestamp must be within a 5-minute
//! window behind the current time and never in the future.

use alloy_primitives::{keccak256, Address, B256};

use crate::model::address_key;
use crate::signer::recover_address;

/// Maximum age of an auth message, in seconds.
pub const MAX_AUTH_AGE_SECS: u64 = 300;

/// `keccak256("\x19Ethereum Signed Message:\n" || len(msg) || msg)`.
pub fn personal_message_hash(message: &[u8]) -> B256 {
    let prefix = format!("\x19Ethereum Signed Message:\n{}", message.len());
    let mut raw = Vec::with_capacity(prefix.len() + message.len());
    raw.extend_from_slice(prefix.as_bytes());
    raw.extend_from_slice(message);
    keccak256(raw)
}

/// Verify a timed auth signature for `address`.
///
/// Returns false for stale timestamps (older than [`MAX_AUTH_AGE_SECS`]),
/// future timestamps, malformed signatures, or a recovered signer other
/// than `address`.
pub fn verify_timed_signature(
    address: Address,
    timestamp_secs: u64,
    signature_hex: &str,
    now_secs: u64,
) -> bool {
    if timestamp_secs > now_secs || now_secs - timestamp_secs > MAX_AUTH_AGE_SECS {
        return false;
    }

    let raw = match hex::decode(signature_hex.trim_start_matches("0x")) {
        Ok(b) => b,
        Err(_) => return false,
    };
    if raw.len() != 65 {
        return false;
    }

    let message = format!("{}:{}", address_key(&address), timestamp_secs);
    let digest = personal_message_hash(message.as_bytes());

    match recover_address(digest, &raw) {
        Ok(recovered) => recovered == address,
        Err(_) => false,
    }
}
