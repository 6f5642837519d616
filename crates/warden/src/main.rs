//! # Warden - Adaptive CAPTCHA Gate
//!
//! Serves the gated API surface, challenge issuance/rendering, and sidecar
//! admit/report hooks for upstreams that run the gate out of process.
//!
//! ## Architecture
//! ```text
//! Client → Warden (/api) ──────────► gated actions
//! Upstream → Warden (/gate/*)
//!               ↓
//!       Memory | Redis (challenges)
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use warden::config::{AppConfig, Overrides};
use warden::routes;
use warden::state::AppState;
use warden::sweeper::sweeper;

/// Warden - Adaptive CAPTCHA Gate
#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/warden.toml")]
    config: String,

    /// Redis URL (overrides config)
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Listen address (overrides config)
    #[arg(short, long, env = "LISTEN_ADDR")]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level, args.json_logs)?;

    info!("🛡️ Starting Warden v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let overrides = Overrides {
        redis_url: args.redis_url.clone(),
        listen_addr: args.listen.clone(),
    };
    let config = AppConfig::load(&args.config, &overrides)?;
    info!("📋 Configuration loaded from {}", args.config);

    // Initialize application state (fails on invalid gate configuration)
    let state = AppState::new(config.clone()).await?;

    // Create shutdown broadcast channel
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    // Spawn the expiry sweeper
    let sweep_gate = state.gate.clone();
    let sweep_interval = Duration::from_secs(config.captcha.sweep_interval_secs);
    let sweep_shutdown = shutdown_tx.subscribe();
    let sweep_handle = tokio::spawn(async move {
        sweeper(sweep_gate, sweep_interval, sweep_shutdown).await;
    });

    // Build router
    let app = routes::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("🚀 Warden listening on {}", config.listen_addr);

    // Handle graceful shutdown
    let signal_tx = shutdown_tx.clone();
    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        info!("🛑 Shutdown signal received");
        let _ = signal_tx.send(());
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    let _ = shutdown_tx.send(());
    let _ = sweep_handle.await;

    info!("👋 Warden shutdown complete");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }

    Ok(())
}
