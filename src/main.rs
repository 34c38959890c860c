//! ILS connector service entry point

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ils_connector::config::ServiceConfig;
use ils_connector::{build_router, ServiceContext};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("===> ILS Connector service starting up <===");

    let config = ServiceConfig::parse();
    config.log_settings();

    let ctx = Arc::new(ServiceContext::new(config)?);
    let app = build_router(ctx.clone());

    let addr = format!("0.0.0.0:{}", ctx.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("start service v{} on port {}", ctx.version, ctx.config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(ctx.clone()))
        .await?;

    Ok(())
}

/// Wait for SIGINT/SIGTERM, then log out of the upstream session
async fn shutdown_signal(ctx: Arc<ServiceContext>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("caught interrupt"),
        _ = terminate => tracing::info!("caught terminate"),
    }

    ctx.terminate_session().await;
}
