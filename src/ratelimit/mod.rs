//! Rate limiting logic and state management.

pub mod backend;
mod engine;
mod local;
mod manager;
mod shared;

pub use backend::{BackendError, CounterBackend, CounterResult, WindowConfig};
pub use engine::{AdmissionEngine, Decision};
pub use local::{MemoryBackend, SWEEP_INTERVAL};
pub use manager::{BackendHealth, BackendManager, HealthEvent};
pub use shared::RedisBackend;
