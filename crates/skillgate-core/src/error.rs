//! Gateway error taxonomy.
//!
//! Quota exhaustion is deliberately absent: an exhausted free tier is an
//! expected outcome and travels as an [`crate::AccessResult`] value.
//! `Unavailable` is recovered inside the access engine (a failed chain
//! consult degrades to "no license") and only surfaces from operations with
//! no local fallback. On the vote path, replay, signer mismatch, and
//! ineligibility are likewise expected outcomes carried as
//! [`crate::VoteVerificationResult`] values; the matching kinds here exist
//! for surfaces that need them as hard errors (the transport's request
//! authenticator raises `SignatureInvalid` directly).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("license already active")]
    AlreadyActive,

    #[error("license request already pending")]
    AlreadyPending,

    #[error("no pending license found")]
    NoPending,

    #[error("nonce mismatch")]
    NonceMismatch,

    #[error("vote already submitted")]
    Replay,

    #[error("signature does not match signer")]
    SignatureInvalid,

    #[error("voter not eligible")]
    IneligibleVoter,

    #[error("chain unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}
