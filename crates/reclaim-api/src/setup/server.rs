use anyhow::{Context, Result};
use axum::Router;
use reclaim_core::Config;
use std::net::SocketAddr;

/// Serve the API until Ctrl+C or SIGTERM, then flush telemetry.
pub async fn start_server(config: &Config, app: Router) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port()));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!(
        addr = %addr,
        max_receipt_mb = config.max_receipt_size_bytes() / 1024 / 1024,
        content_types = %config.allowed_content_types().join(","),
        warranty_ai_enabled = config.warranty_ai_enabled(),
        "Receipt API listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown())
        .await
        .context("Receipt API server error")?;

    reclaim_infra::shutdown_telemetry().await;
    tracing::info!("Receipt API stopped");
    Ok(())
}

/// # Panics
/// Panics if a signal handler cannot be installed.
async fn wait_for_shutdown() {
    let interrupt = async {
        tokio::signal::ctrl_c()
            .await
            .expect("install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let signal = tokio::select! {
        _ = interrupt => "SIGINT",
        _ = terminate => "SIGTERM",
    };
    tracing::info!(signal, "Shutdown requested, draining in-flight requests");
}
