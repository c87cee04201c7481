use pnl_api::{
    app::install_metrics_recorder,
    bootstrap::{self, build_state},
    config::AppConfig,
    services::PipelineSupervisor,
    telemetry,
};

/// Runs the refresh pipeline without the HTTP server. `--worker-only`
/// consumes jobs without scheduling sweeps, for extra consumers next to a
/// process that already schedules.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing("refresh_worker")?;
    install_metrics_recorder();

    let config = AppConfig::from_env()?;
    let state = build_state(&config).await?;
    if !state.queue.is_distributed() {
        tracing::warn!("REDIS_URL not set; this worker only sees jobs it schedules itself");
    }

    let worker_only = std::env::args().skip(1).any(|arg| arg == "--worker-only");
    let pipeline = if worker_only {
        PipelineSupervisor::start_worker(bootstrap::worker(&state))
    } else {
        PipelineSupervisor::start(bootstrap::scheduler(&state), bootstrap::worker(&state))
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    pipeline.stop().await;
    Ok(())
}
