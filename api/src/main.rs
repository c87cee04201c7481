use std::net::SocketAddr;

use axum::{http::HeaderValue, routing::Router};
use pnl_api::{
    app::{build_router, install_metrics_recorder},
    bootstrap::{build_state, start_pipeline},
    config::AppConfig,
    telemetry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing("pnl_api")?;
    install_metrics_recorder();

    let config = AppConfig::from_env()?;
    let allowed_origins = config
        .frontend_origins
        .iter()
        .map(|value| {
            HeaderValue::from_str(value)
                .map_err(|err| anyhow::anyhow!("invalid FRONTEND_ORIGINS entry {value}: {err}"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let state = build_state(&config).await?;
    let pipeline = start_pipeline(&state);

    let app: Router = build_router(state, allowed_origins);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "listening on address");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let app = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(pipeline) = pipeline {
        pipeline.stop().await;
    }
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
