//! In-process counter backend.
//!
//! Keeps windowed counters in a concurrent map. Mutations for a key are
//! serialized by the map's entry lock, so concurrent callers never lose an
//! increment. A periodic sweep removes expired records, bounding memory to
//! live keys; a record being mutated holds its entry lock, so the sweep
//! only ever deletes records that are provably expired at sweep time.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::backend::{BackendError, CounterBackend, CounterResult, WindowConfig};

/// How often the sweep task removes expired records.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// A key's counter and window deadline.
#[derive(Debug, Clone, Copy)]
struct CounterRecord {
    /// Units consumed in the current window
    count: u64,
    /// Absolute deadline of the current window
    expires_at: Instant,
}

/// In-process windowed counter store.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: DashMap<String, CounterRecord>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Number of records currently held, expired or not.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Remove every record whose window has elapsed.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        let before = self.records.len();
        self.records.retain(|_, record| record.expires_at > now);
        let removed = before - self.records.len();
        if removed > 0 {
            debug!(removed, remaining = self.records.len(), "Swept expired counters");
        }
    }

    /// Spawn the background sweep task.
    ///
    /// The task runs until the backend is dropped and the handle aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let backend = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                backend.purge_expired();
            }
        })
    }
}

#[async_trait]
impl CounterBackend for MemoryBackend {
    async fn increment(
        &self,
        key: &str,
        window: &WindowConfig,
    ) -> Result<CounterResult, BackendError> {
        let now = Instant::now();
        let duration = Duration::from_secs(window.duration_secs);

        let mut record = self
            .records
            .entry(key.to_string())
            .or_insert(CounterRecord {
                count: 0,
                expires_at: now + duration,
            });

        if record.expires_at <= now {
            // Window elapsed: replace with a fresh one.
            record.count = 1;
            record.expires_at = now + duration;
        } else {
            record.count += 1;
        }

        let remaining = record.expires_at.saturating_duration_since(now);
        let ttl_seconds = remaining_secs_rounded_up(remaining);

        trace!(key, count = record.count, ttl_seconds, "Incremented local counter");

        Ok(CounterResult {
            count: record.count,
            ttl_seconds,
        })
    }
}

/// Round a remaining duration up to whole seconds.
fn remaining_secs_rounded_up(remaining: Duration) -> u64 {
    let millis = remaining.as_millis() as u64;
    millis.div_ceil(1000)
}
