use std::net::SocketAddr;

use analytics_service::{
    api::{self, AppState},
    config::AppConfig,
    loader, metrics_server, observability,
};
use anyhow::{Context, Result};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    // The whole dataset is materialized before any request is served.
    let dataset = loader::load_dataset(&cfg).await?;

    let addr: SocketAddr = cfg
        .server
        .bind_addr
        .parse()
        .with_context(|| format!("invalid server.bind_addr '{}'", cfg.server.bind_addr))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let app = api::router(AppState::new(dataset, cfg.analysis.clone()));
    tracing::info!(%addr, "analytics API listening");
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
