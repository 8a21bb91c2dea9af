//! Upstox bridge server
//!
//! Serves the login/callback flow, proxies broker REST calls and relays the
//! market and portfolio feeds for the authenticated session.

use std::net::SocketAddr;

use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use upstox_bridge::{api, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Upstox bridge");

    // Load configuration; missing credentials stop the process here
    let config = Config::load()?;
    info!(
        client_id = %config.credentials.client_id,
        base_url = %config.credentials.base_url,
        port = config.port,
        "Configuration loaded"
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = AppState::new(config)?;
    let feeds = state.feeds.clone();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server running");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    feeds.shutdown().await;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for interrupt signal");
        std::future::pending::<()>().await;
    }
    info!("Interrupt received, closing feeds");
}
