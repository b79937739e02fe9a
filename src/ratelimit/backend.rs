//! Counter backend trait for abstracting shared and local implementations.

use async_trait::async_trait;
use thiserror::Error;

/// Limit and window length for a single admission check.
///
/// Both fields travel to the backend, but backends consume only the
/// duration: the allow/deny comparison against the limit belongs to the
/// admission engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    /// Maximum units of work allowed in the window
    pub limit: u64,
    /// Window length in seconds
    pub duration_secs: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            limit: 100,
            duration_secs: 60,
        }
    }
}

/// Post-increment state of a key's current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterResult {
    /// Count after this increment
    pub count: u64,
    /// Remaining seconds in the window, rounded up
    pub ttl_seconds: u64,
}

/// Errors from a counter backend call.
///
/// These never reach the caller of the service: the backend manager
/// recovers by falling back to the local backend for the failing call.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Shared store command or connection failure
    #[error("Redis command failed: {0}")]
    Redis(#[from] redis::RedisError),

    /// Shared store returned a malformed reply
    #[error("Unexpected reply from shared store: {0}")]
    UnexpectedReply(String),
}

/// Trait for counter backend implementations.
///
/// Each call consumes exactly one unit of work against `key`'s current
/// window and reports the post-increment count plus the window's remaining
/// time. Implementations must be atomic with respect to concurrent callers
/// on the same key: two concurrent increments must never observe the same
/// pre-increment count.
#[async_trait]
pub trait CounterBackend: Send + Sync {
    /// Increment the counter for `key` within its current window.
    async fn increment(
        &self,
        key: &str,
        window: &WindowConfig,
    ) -> Result<CounterResult, BackendError>;
}
