use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use turnstile::auth::{AuthContext, AuthGuard};
use turnstile::config::TurnstileConfig;
use turnstile::http::{AppState, HttpServer};
use turnstile::ratelimit::{
    AdmissionEngine, BackendManager, MemoryBackend, RedisBackend, SWEEP_INTERVAL,
};

/// Admission-control rate limiting gateway.
#[derive(Debug, Parser)]
#[command(name = "turnstile", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(long)]
    config: Option<String>,

    /// Override the HTTP bind address
    #[arg(long)]
    bind_addr: Option<std::net::SocketAddr>,

    /// Override the Redis connection URL
    #[arg(long)]
    redis_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Starting Turnstile Admission Gateway");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();

    // Load configuration; a missing shared secret is fatal here.
    let mut config = TurnstileConfig::load(cli.config.as_deref())?;
    if let Some(addr) = cli.bind_addr {
        config.server.bind_addr = addr;
    }
    if let Some(url) = cli.redis_url {
        config.redis.url = url;
    }
    info!(
        bind_addr = %config.server.bind_addr,
        redis_url = %config.redis.url,
        "Configuration loaded"
    );

    // Local backend and its sweep task run unconditionally.
    let local = Arc::new(MemoryBackend::new());
    local.spawn_sweeper(SWEEP_INTERVAL);

    // The shared backend is best-effort: when the initial connection
    // fails, the service runs on the local backend alone.
    let manager = match RedisBackend::connect(&config.redis.url).await {
        Ok(redis) => {
            let (tx, rx) = mpsc::channel(16);
            redis.spawn_monitor(tx, Duration::from_secs(config.redis.probe_interval_secs));

            let manager = Arc::new(BackendManager::new(Arc::new(redis), local));
            manager.spawn_health_listener(rx);
            manager
        }
        Err(e) => {
            warn!(error = %e, "Redis unavailable at startup, using memory backend only");
            Arc::new(BackendManager::local_only(local))
        }
    };

    let state = Arc::new(AppState {
        engine: AdmissionEngine::new(manager),
        guard: AuthGuard::new(AuthContext {
            secret: config.auth.secret.clone(),
            max_skew_ms: config.auth.max_skew_ms,
        }),
    });

    let server = HttpServer::new(config.server.bind_addr, state);
    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Turnstile Admission Gateway stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
