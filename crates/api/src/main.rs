use std::sync::Arc;

use anyhow::Context;

use bizhub_api::app::{build_app, services::AppServices};
use bizhub_api::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = AppConfig::load().context("failed to load configuration")?;
    bizhub_observability::init_with(cfg.log.format);

    let services = AppServices::from_config(&cfg).await?;
    let app = build_app(Arc::new(services));

    let addr = cfg.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
