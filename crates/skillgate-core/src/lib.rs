#![forbid(unsafe_code)]

//! Core types and primitives for the SkillGate license gateway.
//!
//! This crate defines the shared vocabulary of the gateway: the license and
//! vote entities, the error taxonomy, the EIP-712 structured-data signer,
//! and the narrow [`chain::ChainView`] interface the gateway consumes from
//! any chain integration.

pub mod auth;
pub mod chain;
pub mod error;
pub mod model;
pub mod signer;
pub mod time;

pub use chain::{ChainView, ChainViewError, MockChainView, NullChainView};
pub use error::GatewayError;
pub use model::{
    AccessResult, License, LicenseGrant, LicenseMetadata, SignatureParts, StoreValue, Tier,
    ToolReputation, Vote, VoteBatch, VoteSubmission, VoteVerificationResult,
};
pub use signer::{recover_address, Eip712Signer, SignerError};
pub use time::{SystemTimeSource, TimeSource};

/// Denial reason surfaced when neither a license nor free quota applies.
pub const REASON_QUOTA_EXHAUSTED: &str = "free tier exhausted and no valid license found";
