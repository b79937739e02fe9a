//! Configuration management for Turnstile.
//!
//! Configuration is layered: an optional YAML file provides the base,
//! environment variables override it, and CLI flags override both.
//! The shared secret is a startup precondition; the process refuses to
//! start without one.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Main configuration for the Turnstile service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Shared counter store configuration
    #[serde(default)]
    pub redis: RedisConfig,

    /// Request authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,
}

impl Default for TurnstileConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            redis: RedisConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server bind address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    "0.0.0.0:3000".parse().unwrap()
}

/// Shared counter store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Health probe interval in seconds
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            probe_interval_secs: default_probe_interval(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_probe_interval() -> u64 {
    5
}

/// Request authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared secret for bearer and signature checks.
    ///
    /// Required: startup fails when this is empty.
    #[serde(default)]
    pub secret: String,

    /// Maximum tolerated clock skew in milliseconds
    #[serde(default = "default_max_skew_ms")]
    pub max_skew_ms: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            max_skew_ms: default_max_skew_ms(),
        }
    }
}

fn default_max_skew_ms() -> i64 {
    30_000
}

impl TurnstileConfig {
    /// Load configuration from a file path.
    pub fn from_file(path: &str) -> crate::error::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: TurnstileConfig = serde_yaml::from_str(&contents)
            .map_err(|e| crate::error::TurnstileError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Load configuration from an optional file, then apply environment
    /// variable overrides.
    ///
    /// Recognized variables: `TURNSTILE_SECRET`, `TURNSTILE_BIND_ADDR`,
    /// `TURNSTILE_REDIS_URL`.
    pub fn load(path: Option<&str>) -> crate::error::Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };

        if let Ok(secret) = std::env::var("TURNSTILE_SECRET") {
            config.auth.secret = secret;
        }
        if let Ok(addr) = std::env::var("TURNSTILE_BIND_ADDR") {
            config.server.bind_addr = addr.parse().map_err(|_| {
                crate::error::TurnstileError::Config(format!(
                    "invalid TURNSTILE_BIND_ADDR: {addr}"
                ))
            })?;
        }
        if let Ok(url) = std::env::var("TURNSTILE_REDIS_URL") {
            config.redis.url = url;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check startup preconditions.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.auth.secret.is_empty() {
            return Err(crate::error::TurnstileError::Config(
                "shared secret is required (set TURNSTILE_SECRET or auth.secret)".to_string(),
            ));
        }
        Ok(())
    }
}
