//! Redis-backed counter backend.
//!
//! The increment-then-conditionally-expire pair executes as a single Lua
//! script server-side. This is the only place that atomicity is enforced:
//! running the two commands as separate round trips would leave a window
//! where a key is incremented but never expires, or expires with the wrong
//! TTL, under concurrent access.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::backend::{BackendError, CounterBackend, CounterResult, WindowConfig};
use super::manager::HealthEvent;

/// Atomic increment with conditional expiry.
///
/// Returns the post-increment count and the key's remaining TTL.
const INCREMENT_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
  redis.call('EXPIRE', KEYS[1], ARGV[1])
end
local ttl = redis.call('TTL', KEYS[1])
return {count, ttl}
"#;

/// Counter backend speaking to a shared Redis store.
///
/// Reconnection policy (bounded retries with backoff) lives inside the
/// [`ConnectionManager`]; a failed call here is surfaced to the backend
/// manager as-is, never retried synchronously.
pub struct RedisBackend {
    connection: ConnectionManager,
    script: Script,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend").finish_non_exhaustive()
    }
}

impl RedisBackend {
    /// Connect to the Redis server at `url`.
    ///
    /// Fails if the initial connection cannot be established; the service
    /// then runs on the local backend alone.
    pub async fn connect(url: &str) -> Result<Self, BackendError> {
        let client = redis::Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        debug!(url, "Connected to Redis");

        Ok(Self {
            connection,
            script: Script::new(INCREMENT_SCRIPT),
        })
    }

    /// Spawn the connection health probe.
    ///
    /// Pings the server on a fixed interval and reports transitions over
    /// `tx` as [`HealthEvent`] messages. The task exits when the receiving
    /// side is dropped.
    pub fn spawn_monitor(
        &self,
        tx: mpsc::Sender<HealthEvent>,
        interval: Duration,
    ) -> JoinHandle<()> {
        let mut connection = self.connection.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut last_up: Option<bool> = None;
            loop {
                ticker.tick().await;
                let up = redis::cmd("PING")
                    .query_async::<String>(&mut connection)
                    .await
                    .is_ok();

                if last_up != Some(up) {
                    last_up = Some(up);
                    let event = if up {
                        HealthEvent::Connected
                    } else {
                        HealthEvent::Disconnected
                    };
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
        })
    }
}

#[async_trait]
impl CounterBackend for RedisBackend {
    async fn increment(
        &self,
        key: &str,
        window: &WindowConfig,
    ) -> Result<CounterResult, BackendError> {
        let mut connection = self.connection.clone();
        let (count, ttl): (i64, i64) = self
            .script
            .key(key)
            .arg(window.duration_secs)
            .invoke_async(&mut connection)
            .await
            .inspect_err(|e| warn!(key, error = %e, "Redis increment failed"))?;

        let result = result_from_reply(count, ttl, window)?;
        trace!(key, count = result.count, ttl_seconds = result.ttl_seconds, "Incremented shared counter");
        Ok(result)
    }
}

/// Interpret the script's `(count, ttl)` reply.
///
/// A negative TTL means the key has no expiry (left behind by an
/// interrupted earlier run) or vanished between commands; report the
/// requested duration rather than a nonsense value.
fn result_from_reply(
    count: i64,
    ttl: i64,
    window: &WindowConfig,
) -> Result<CounterResult, BackendError> {
    let count = u64::try_from(count)
        .map_err(|_| BackendError::UnexpectedReply(format!("negative count {count}")))?;

    let ttl_seconds = if ttl < 0 {
        window.duration_secs
    } else {
        ttl as u64
    };

    Ok(CounterResult { count, ttl_seconds })
}
