use health_rag::api::{create_pool, create_router, AppState};
use health_rag::infrastructure::{init_tracing, AppConfig};
use std::net::SocketAddr;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing("api=debug,health_rag=debug,tower_http=debug");

    let app_config = AppConfig::from_env()?;
    let config = &app_config.config;

    let redis_pool = create_pool(&config.redis_url)?;
    info!("Redis pool initialized");

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    if !config.server.api_keys.is_empty() {
        info!(keys = config.server.api_keys.len(), "API key check enabled");
    }

    let state = AppState::new(redis_pool, app_config)?;
    let app = create_router(state);

    info!("API server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
