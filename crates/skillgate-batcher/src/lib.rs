#![forbid(unsafe_code)]

//! Periodic vote batch runner.
//!
//! Wakes at a configured interval, scans the store for per-tool pending
//! vote queues, and cuts a batch for each. Shutdown is deterministic: the
//! cancellation signal makes the loop exit at the next select point without
//! initiating new work.

use std::sync::Arc;
use std::time::Duration;

use skillgate_core::GatewayError;
use skillgate_services::keys::PENDING_VOTE_PREFIX;
use skillgate_services::VoteService;
use skillgate_store::TtlStore;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct BatchRunnerConfig {
    /// Interval between scans.
    pub interval: Duration,
}

impl Default for BatchRunnerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
        }
    }
}

/// Handle controlling the background runner task.
#[derive(Clone)]
pub struct BatchRunnerHandle {
    cancel: Arc<watch::Sender<bool>>,
}

impl BatchRunnerHandle {
    /// Signal the runner to stop. The task exits at its next select point,
    /// or immediately if idle.
    pub fn stop(&self) {
        let _ = self.cancel.send(true);
    }
}

/// Spawn the batch runner background task.
pub fn spawn(
    config: BatchRunnerConfig,
    store: Arc<TtlStore>,
    votes: Arc<VoteService>,
) -> BatchRunnerHandle {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(run_loop(config, store, votes, cancel_rx));
    BatchRunnerHandle {
        cancel: Arc::new(cancel_tx),
    }
}

async fn run_loop(
    config: BatchRunnerConfig,
    store: Arc<TtlStore>,
    votes: Arc<VoteService>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    info!(interval_secs = config.interval.as_secs(), "batch runner started");
    // interval() panics on zero; treat it as the 1-second floor.
    let period = if config.interval.is_zero() {
        Duration::from_secs(1)
    } else {
        config.interval
    };
    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                process_pending(&store, &votes);
            }
            _ = cancel_rx.changed() => {
                if *cancel_rx.borrow() {
                    info!("batch runner shutting down");
                    break;
                }
            }
        }
    }
}

/// One scan-and-dispatch pass over every tool with queued votes.
fn process_pending(store: &TtlStore, votes: &VoteService) {
    let mut processed = 0usize;

    for key in store.keys() {
        let Some(tool) = key.strip_prefix(PENDING_VOTE_PREFIX) else {
            continue;
        };

        match votes.process_batch(tool) {
            Ok(batch) => {
                processed += 1;
                info!(
                    tool,
                    batch_id = %batch.id,
                    votes = batch.votes_count,
                    "batch cut"
                );
            }
            // The queue emptied (or expired) between the snapshot and the
            // dispatch; nothing to do.
            Err(GatewayError::NoPending) => {
                debug!(tool, "pending queue vanished before dispatch");
            }
            Err(e) => {
                warn!(tool, error = %e, "failed to process batch");
            }
        }
    }

    if processed > 0 {
        info!(processed, "batch scan complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Address;
    use skillgate_core::{StoreValue, SystemTimeSource, TimeSource, Vote};

    fn seeded_queue(store: &TtlStore, tool: &str, now: u64) {
        let vote = Vote {
            id: "aa".repeat(32),
            tool_id: tool.to_string(),
            voter: Address::repeat_byte(0x11),
            score: 1,
            nonce: 1,
            signature: String::new(),
            created_at_secs: now,
            processed: false,
            batch_id: String::new(),
        };
        store.set(
            &format!("{PENDING_VOTE_PREFIX}{tool}"),
            StoreValue::VoteList(vec![vote]),
            Duration::from_secs(600),
        );
    }

    #[tokio::test]
    async fn runner_cuts_batches_and_stops() {
        let time: Arc<dyn TimeSource> = Arc::new(SystemTimeSource);
        let store = Arc::new(TtlStore::new(None, Arc::clone(&time)));
        let votes = Arc::new(VoteService::new(
            Arc::clone(&store),
            Arc::clone(&time),
            31337,
            Duration::from_secs(300),
        ));

        seeded_queue(&store, "42", time.now_secs());

        let handle = spawn(
            BatchRunnerConfig {
                interval: Duration::from_millis(20),
            },
            Arc::clone(&store),
            votes,
        );

        tokio::time::sleep(Duration::from_millis(120)).await;
        handle.stop();

        // Queue retired, batch stored.
        assert!(store.get(&format!("{PENDING_VOTE_PREFIX}42")).is_none());
        assert!(store
            .keys()
            .iter()
            .any(|k| k.starts_with("batch:42:batch_42_")));
    }
}
