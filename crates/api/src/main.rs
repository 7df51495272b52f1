use anyhow::Context;

use emphub_api::app::{build_app, services::build_services};
use emphub_api::config::ApiConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    emphub_observability::init();

    let config = ApiConfig::from_env()?;
    let services = build_services(&config)
        .await
        .context("failed to initialise services")?;
    let app = build_app(services);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
