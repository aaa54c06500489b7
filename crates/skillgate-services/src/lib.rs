#![forbid(unsafe_code)]

//! Gateway services: license lifecycle, tiered access decisions, and vote
//! aggregation. All state lives in the shared [`skillgate_store::TtlStore`];
//! services read, mutate a copy, and write back under the store's lock.

pub mod access;
pub mod keys;
pub mod licensing;
pub mod voting;

pub use access::AccessService;
pub use licensing::{license_price, LicenseService};
pub use voting::{aggregate_root, vote_id, vote_message_hash, VoteService};
