//! Main entry point for the resilient API gateway

use care_gateway::{config::Settings, gateway::router::create_router, AppState};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration first so logging can honor it
    let settings = Settings::load()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.logging.level.clone()));
    let registry = tracing_subscriber::registry().with(filter);
    if settings.logging.format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    info!(
        host = %settings.server.host,
        port = settings.server.port,
        services = settings.services.len(),
        routes = settings.routes.len(),
        "Starting gateway"
    );

    let state = AppState::from_settings(settings)?;

    // Keep the aggregate health snapshot current in the background
    state
        .health_monitor
        .start(state.settings.health.interval_secs)
        .await;

    let app = create_router(state.clone());

    let addr = format!("{}:{}", state.settings.server.host, state.settings.server.port);
    info!("Gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.health_monitor.stop().await;
    info!("Gateway stopped");

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
