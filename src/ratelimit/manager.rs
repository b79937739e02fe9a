//! Backend selection and health tracking.
//!
//! The manager owns everything the counting path touches: the shared
//! backend handle, the local fallback store, and the health flag. There
//! are no ambient globals; connection lifecycle events arrive as messages
//! on an internal channel and are the only writer of the health state.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::backend::{CounterBackend, CounterResult, WindowConfig};
use super::local::MemoryBackend;

/// Connection lifecycle notification from the shared backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthEvent {
    /// The shared store is reachable
    Connected,
    /// The shared store errored or closed the connection
    Disconnected,
}

/// Process-wide shared-backend health.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackendHealth {
    /// Whether the shared backend is believed reachable
    pub connected: bool,
}

/// Routes each increment to the shared backend when healthy, with
/// per-call fallback to the local backend on failure.
pub struct BackendManager {
    /// Shared backend, absent when the service runs local-only
    shared: Option<Arc<dyn CounterBackend>>,
    /// In-process fallback store
    local: Arc<MemoryBackend>,
    /// Health flag, written only by the lifecycle listener
    health: RwLock<BackendHealth>,
}

impl std::fmt::Debug for BackendManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendManager")
            .field("shared", &self.shared.is_some())
            .field("health", &self.health())
            .finish()
    }
}

impl BackendManager {
    /// Create a manager with a shared backend and a local fallback.
    ///
    /// The health flag starts disconnected; the lifecycle listener flips
    /// it once the monitor observes a successful connection.
    pub fn new(shared: Arc<dyn CounterBackend>, local: Arc<MemoryBackend>) -> Self {
        Self {
            shared: Some(shared),
            local,
            health: RwLock::new(BackendHealth::default()),
        }
    }

    /// Create a manager that only ever uses the local backend.
    pub fn local_only(local: Arc<MemoryBackend>) -> Self {
        Self {
            shared: None,
            local,
            health: RwLock::new(BackendHealth::default()),
        }
    }

    /// Increment the counter for `key`, never failing the caller.
    ///
    /// Routing policy: attempt the shared backend only while the health
    /// flag is up, skipping it entirely while known-down so no call pays
    /// connection-timeout latency. A shared-backend error falls back to
    /// the local store for that single call; it does not flip the health
    /// flag, which belongs to the connection lifecycle alone.
    pub async fn increment(&self, key: &str, window: &WindowConfig) -> CounterResult {
        if let Some(shared) = &self.shared {
            if self.health().connected {
                match shared.increment(key, window).await {
                    Ok(result) => return result,
                    Err(e) => {
                        warn!(key, error = %e, "Shared backend failed, falling back to memory");
                    }
                }
            }
        }

        self.local
            .increment(key, window)
            .await
            .expect("memory backend increment is infallible")
    }

    /// Current shared-backend health.
    pub fn health(&self) -> BackendHealth {
        *self.health.read()
    }

    /// Number of records in the in-process store.
    pub fn memory_store_size(&self) -> usize {
        self.local.len()
    }

    /// Consume connection lifecycle events, updating the health flag.
    ///
    /// The task ends when the sending side is dropped.
    pub fn spawn_health_listener(
        self: &Arc<Self>,
        mut rx: mpsc::Receiver<HealthEvent>,
    ) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let connected = event == HealthEvent::Connected;
                let changed = {
                    let mut health = manager.health.write();
                    let changed = health.connected != connected;
                    health.connected = connected;
                    changed
                };
                if changed {
                    if connected {
                        info!("Shared backend connected");
                    } else {
                        warn!("Shared backend disconnected, using memory fallback");
                    }
                }
            }
        })
    }
}
