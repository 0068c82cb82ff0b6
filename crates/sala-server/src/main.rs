//! Relay server binary: wires settings, logging, metrics, and the
//! HTTP/WebSocket surface, then serves until the process is stopped.

use sala_server::{metrics, routes, settings};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = settings::load();
    let handle = metrics::install_recorder();
    let state = routes::RelayState::new(handle);
    let app = routes::router(state);

    let addr = settings.bind_addr();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(bind_error) => {
            error!(%addr, error = %bind_error, "failed to bind listener");
            std::process::exit(1);
        }
    };
    info!(%addr, "relay listening");

    if let Err(serve_error) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %serve_error, "server terminated unexpectedly");
    }
}

async fn shutdown_signal() {
    if let Err(signal_error) = tokio::signal::ctrl_c().await {
        error!(error = %signal_error, "failed to listen for shutdown signal");
        return;
    }
    info!("shutdown signal received");
}
