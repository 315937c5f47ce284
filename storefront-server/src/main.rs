use std::net::SocketAddr;
use std::time::Duration;

use storefront_server::{AppState, Config, api};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storefront_server=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    let http_port = config.http_port;

    tracing::info!("Starting storefront-server (env: {})", config.environment);

    let state = AppState::new(config).await?;
    let app = api::create_router(state.clone());

    // Drop expired rate-limit windows
    let rate_limiter = state.rate_limiter.clone();
    let sweep_every = state.config.rate_limit_window.max(Duration::from_secs(60));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_every);
        loop {
            interval.tick().await;
            rate_limiter.cleanup().await;
        }
    });

    let addr = format!("0.0.0.0:{http_port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("storefront-server listening on {addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Let queued loyalty jobs finish
    state.checkout.loyalty().shutdown().await;
    tracing::info!("storefront-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
