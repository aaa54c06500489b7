//! Prometheus metrics for the gateway node.

use prometheus::{IntCounter, IntGauge, Opts, Registry};

pub struct Metrics {
    pub(crate) registry: Registry,
    pub(crate) access_granted: IntCounter,
    pub(crate) access_denied: IntCounter,
    pub(crate) votes_accepted: IntCounter,
    pub(crate) votes_rejected: IntCounter,
    pub(crate) batches_processed: IntCounter,
    pub(crate) store_entries: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let access_granted = IntCounter::with_opts(Opts::new(
            "skillgate_access_granted_total",
            "Access checks resolved to free or licensed tier",
        ))
        .expect("access granted counter");

        let access_denied = IntCounter::with_opts(Opts::new(
            "skillgate_access_denied_total",
            "Access checks denied",
        ))
        .expect("access denied counter");

        let votes_accepted = IntCounter::with_opts(Opts::new(
            "skillgate_votes_accepted_total",
            "Votes accepted into a pending queue",
        ))
        .expect("votes accepted counter");

        let votes_rejected = IntCounter::with_opts(Opts::new(
            "skillgate_votes_rejected_total",
            "Votes rejected (replay, signature, eligibility)",
        ))
        .expect("votes rejected counter");

        let batches_processed = IntCounter::with_opts(Opts::new(
            "skillgate_batches_processed_total",
            "Vote batches cut via the HTTP surface",
        ))
        .expect("batches counter");

        let store_entries = IntGauge::with_opts(Opts::new(
            "skillgate_store_entries",
            "Entries currently held by the KV store",
        ))
        .expect("store gauge");

        registry
            .register(Box::new(access_granted.clone()))
            .expect("register access granted");
        registry
            .register(Box::new(access_denied.clone()))
            .expect("register access denied");
        registry
            .register(Box::new(votes_accepted.clone()))
            .expect("register votes accepted");
        registry
            .register(Box::new(votes_rejected.clone()))
            .expect("register votes rejected");
        registry
            .register(Box::new(batches_processed.clone()))
            .expect("register batches");
        registry
            .register(Box::new(store_entries.clone()))
            .expect("register store gauge");

        Self {
            registry,
            access_granted,
            access_denied,
            votes_accepted,
            votes_rejected,
            batches_processed,
            store_entries,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
