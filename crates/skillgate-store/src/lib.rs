#![forbid(unsafe_code)]

//! In-memory TTL key-value store.
//!
//! A concurrent mapping from string keys to `(value, expires_at)` pairs with
//! two eviction paths: lazy (an expired entry found by `get` is removed
//! before reporting a miss) and periodic (an optional background sweeper).
//!
//! Concurrency contract: `get` takes a shared lock and upgrades to exclusive
//! only to evict; every mutating operation takes the exclusive lock;
//! `increment` is the one atomic read-modify-write. `close` joins the
//! sweeper deterministically and is idempotent. The store never fails on
//! valid inputs.

use std::collections::HashMap;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::Duration;

use skillgate_core::{StoreValue, TimeSource};
use tracing::debug;

#[derive(Debug, Clone)]
struct Entry {
    value: StoreValue,
    expires_at_nanos: u64,
}

impl Entry {
    fn is_expired(&self, now_nanos: u64) -> bool {
        now_nanos >= self.expires_at_nanos
    }
}

struct StoreInner {
    data: RwLock<HashMap<String, Entry>>,
    time: Arc<dyn TimeSource>,
}

impl StoreInner {
    fn expiry(&self, ttl: Duration) -> u64 {
        let ttl_nanos = u64::try_from(ttl.as_nanos()).unwrap_or(u64::MAX);
        self.time.now_nanos().saturating_add(ttl_nanos)
    }

    fn sweep(&self) {
        let now = self.time.now_nanos();
        let mut data = self.data.write().expect("store lock poisoned");
        let before = data.len();
        data.retain(|_, entry| !entry.is_expired(now));
        let removed = before - data.len();
        if removed > 0 {
            debug!(removed, remaining = data.len(), "swept expired entries");
        }
    }
}

struct Sweeper {
    stop: mpsc::Sender<()>,
    handle: thread::JoinHandle<()>,
}

pub struct TtlStore {
    inner: Arc<StoreInner>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl TtlStore {
    /// Create a store. A positive `cleanup_interval` starts a background
    /// sweeper that periodically removes expired entries; `None` leaves
    /// eviction entirely lazy.
    pub fn new(cleanup_interval: Option<Duration>, time: Arc<dyn TimeSource>) -> Self {
        let inner = Arc::new(StoreInner {
            data: RwLock::new(HashMap::new()),
            time,
        });

        let sweeper = cleanup_interval
            .filter(|interval| !interval.is_zero())
            .map(|interval| spawn_sweeper(Arc::clone(&inner), interval));

        Self {
            inner,
            sweeper: Mutex::new(sweeper),
        }
    }

    /// Look up a live entry. An entry whose TTL has elapsed is removed and
    /// reported as missing.
    pub fn get(&self, key: &str) -> Option<StoreValue> {
        let now = self.inner.time.now_nanos();

        {
            let data = self.inner.data.read().expect("store lock poisoned");
            match data.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
                Some(_) => {}
            }
        }

        // Lazy eviction: upgrade to the exclusive lock and re-check, the
        // entry may have been replaced since the read lock was dropped.
        let mut data = self.inner.data.write().expect("store lock poisoned");
        match data.get(key) {
            Some(entry) if entry.is_expired(now) => {
                data.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Unconditional overwrite with `expires_at = now + ttl`.
    pub fn set(&self, key: &str, value: StoreValue, ttl: Duration) {
        let expires_at_nanos = self.inner.expiry(ttl);
        let mut data = self.inner.data.write().expect("store lock poisoned");
        data.insert(
            key.to_string(),
            Entry {
                value,
                expires_at_nanos,
            },
        );
    }

    /// Atomic counter update. A missing, expired, or non-counter prior value
    /// counts as 0. The TTL is refreshed on every increment: the window
    /// slides forward on use.
    pub fn increment(&self, key: &str, delta: i64, ttl: Duration) -> i64 {
        let now = self.inner.time.now_nanos();
        let expires_at_nanos = self.inner.expiry(ttl);
        let mut data = self.inner.data.write().expect("store lock poisoned");

        let prior = data
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .and_then(|entry| entry.value.as_counter())
            .unwrap_or(0);

        let next = prior.saturating_add(delta);
        data.insert(
            key.to_string(),
            Entry {
                value: StoreValue::Counter(next),
                expires_at_nanos,
            },
        );
        next
    }

    /// Unconditional removal.
    pub fn delete(&self, key: &str) {
        let mut data = self.inner.data.write().expect("store lock poisoned");
        data.remove(key);
    }

    /// Point-in-time snapshot of stored keys, expired entries included.
    /// Callers scanning by prefix must tolerate entries vanishing between
    /// the snapshot and subsequent reads.
    pub fn keys(&self) -> Vec<String> {
        let data = self.inner.data.read().expect("store lock poisoned");
        data.keys().cloned().collect()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        let mut data = self.inner.data.write().expect("store lock poisoned");
        data.clear();
    }

    /// Number of stored entries, expired included. Exposed for metrics.
    pub fn len(&self) -> usize {
        self.inner.data.read().expect("store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop and join the sweeper. Idempotent; a store without a sweeper
    /// closes trivially.
    pub fn close(&self) {
        let sweeper = self.sweeper.lock().expect("store lock poisoned").take();
        if let Some(Sweeper { stop, handle }) = sweeper {
            let _ = stop.send(());
            let _ = handle.join();
        }
    }
}

impl Drop for TtlStore {
    fn drop(&mut self) {
        self.close();
    }
}

fn spawn_sweeper(inner: Arc<StoreInner>, interval: Duration) -> Sweeper {
    let (stop, stop_rx) = mpsc::channel::<()>();
    let handle = thread::Builder::new()
        .name("ttl-store-sweeper".to_string())
        .spawn(move || loop {
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => inner.sweep(),
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        })
        .expect("failed to spawn sweeper thread");
    Sweeper { stop, handle }
}
