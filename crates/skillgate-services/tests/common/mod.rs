//! Shared fixtures: a pinned clock, a gateway wired against the mock chain
//! view, and client-side vote signing.
#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, U256};
use k256::ecdsa::SigningKey;
use skillgate_core::signer::address_of;
use skillgate_core::{Eip712Signer, MockChainView, TimeSource};
use skillgate_services::{vote_message_hash, AccessService, LicenseService, VoteService};
use skillgate_store::TtlStore;

pub const CHAIN_ID: u64 = 31337;
pub const CONTRACT: &str = "0x1234567890123456789012345678901234567890";
pub const SIGNER_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

/// Clock pinned by the test, advanced explicitly.
pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn new(secs: u64) -> Arc<Self> {
        Arc::new(Self(AtomicU64::new(secs * 1_000_000_000)))
    }

    pub fn advance(&self, d: Duration) {
        self.0
            .fetch_add(u64::try_from(d.as_nanos()).unwrap(), Ordering::SeqCst);
    }
}

impl TimeSource for ManualClock {
    fn now_secs(&self) -> u64 {
        self.0.load(Ordering::SeqCst) / 1_000_000_000
    }

    fn now_nanos(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Gateway {
    pub store: Arc<TtlStore>,
    pub licensing: LicenseService,
    pub access: AccessService,
    pub votes: VoteService,
    pub chain: Arc<MockChainView>,
    pub clock: Arc<ManualClock>,
}

pub fn gateway(clock: Arc<ManualClock>) -> Gateway {
    let time: Arc<dyn TimeSource> = Arc::clone(&clock) as Arc<dyn TimeSource>;
    let store = Arc::new(TtlStore::new(None, Arc::clone(&time)));
    let contract: Address = CONTRACT.parse().unwrap();
    let signer = Arc::new(Eip712Signer::new(SIGNER_KEY, CHAIN_ID, contract).unwrap());
    let chain = Arc::new(MockChainView::new());

    let licensing = LicenseService::new(
        Arc::clone(&store),
        signer,
        Arc::clone(&time),
        contract,
    );
    let access = AccessService::new(
        Arc::clone(&store),
        Arc::clone(&chain) as Arc<dyn skillgate_core::ChainView>,
        Arc::clone(&time),
        "test-nonce",
    );
    let votes = VoteService::new(
        Arc::clone(&store),
        Arc::clone(&time),
        CHAIN_ID,
        Duration::from_secs(300),
    );

    Gateway {
        store,
        licensing,
        access,
        votes,
        chain,
        clock,
    }
}

/// Deterministic client keypair derived from a seed byte.
pub fn client_key(seed: u8) -> (SigningKey, Address) {
    let key = SigningKey::from_slice(&[seed; 32]).unwrap();
    let address = address_of(key.verifying_key());
    (key, address)
}

/// Sign the vote message the way a client wallet would; returns 65-byte hex.
pub fn sign_vote(key: &SigningKey, tool: u64, voter: Address, score: i8, nonce: u64) -> String {
    let digest = vote_message_hash(&U256::from(tool), &voter, score, nonce, CHAIN_ID);
    let (sig, recid) = key.sign_prehash_recoverable(digest.as_slice()).unwrap();
    let mut raw = [0u8; 65];
    raw[..64].copy_from_slice(&sig.to_bytes());
    raw[64] = 27 + recid.to_byte();
    hex::encode(raw)
}
