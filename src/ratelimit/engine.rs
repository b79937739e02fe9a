//! Admission decisions.
//!
//! The engine is stateless: all counting state lives in the backend layer.
//! It normalizes the caller's key, asks the backend manager for the
//! post-increment window state, and compares against the caller's limit.

use std::sync::Arc;

use tracing::debug;

use super::backend::WindowConfig;
use super::manager::BackendManager;

/// Prefix applied to every caller key before it reaches a backend.
const KEY_PREFIX: &str = "rl:";

/// The allow/deny verdict for a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The unit of work is admitted
    Allow {
        /// Units left in the current window
        remaining: u64,
    },
    /// The window's limit is exhausted
    Deny {
        /// Seconds until the window resets
        retry_after: u64,
    },
}

impl Decision {
    /// Whether the work was admitted.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }
}

/// Combines backend results with caller limits into decisions.
#[derive(Debug, Clone)]
pub struct AdmissionEngine {
    manager: Arc<BackendManager>,
}

impl AdmissionEngine {
    /// Create an engine over the given backend manager.
    pub fn new(manager: Arc<BackendManager>) -> Self {
        Self { manager }
    }

    /// Check whether `key` may perform another unit of work.
    ///
    /// Consumes one unit against the key's current window regardless of
    /// the outcome; there is no compensating decrement.
    pub async fn check(&self, key: &str, window: &WindowConfig) -> Decision {
        let backend_key = format!("{KEY_PREFIX}{key}");
        let result = self.manager.increment(&backend_key, window).await;

        let decision = if result.count > window.limit {
            Decision::Deny {
                retry_after: result.ttl_seconds,
            }
        } else {
            Decision::Allow {
                remaining: window.limit - result.count,
            }
        };

        debug!(
            key,
            count = result.count,
            limit = window.limit,
            allowed = decision.is_allowed(),
            "Admission decision made"
        );

        decision
    }

    /// The backend manager backing this engine.
    pub fn manager(&self) -> &Arc<BackendManager> {
        &self.manager
    }
}
