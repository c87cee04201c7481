use std::sync::Arc;

use anyhow::{Context, Result};
use cache::Cache;
use job_queue::RefreshQueue;
use sqlx::PgPool;

use crate::{
    config::AppConfig,
    repositories::PostgresHoldingRepository,
    services::{
        AssetStore, CoingeckoClient, MarketDataClient, PipelineSupervisor, RefreshScheduler,
        RefreshWorker,
    },
    state::AppState,
};

pub async fn build_state(config: &AppConfig) -> Result<AppState> {
    let pool = PgPool::connect(&config.database_url)
        .await
        .context("failed to connect to DATABASE_URL")?;
    sqlx::migrate!("../migrations").run(&pool).await?;

    if config.redis_url.is_none() {
        tracing::warn!("REDIS_URL not set; cache and refresh queue are process-local");
    }
    let cache = Cache::new(config.cache_default_ttl, config.redis_url.clone())
        .context("invalid REDIS_URL for cache")?;
    let queue = RefreshQueue::new(config.refresh_queue_name.clone(), config.redis_url.clone())
        .context("invalid REDIS_URL for refresh queue")?;

    let market: Arc<dyn MarketDataClient> = Arc::new(
        CoingeckoClient::new(
            config.market_api_base.clone(),
            config.market_api_key.clone(),
            Some(cache.clone()),
            config.market_http_timeout,
        )
        .context("failed to build market data client")?,
    );

    let store = AssetStore::new(Arc::new(PostgresHoldingRepository::new(pool)), cache);

    Ok(AppState {
        config: config.clone(),
        store,
        market,
        queue,
    })
}

pub fn scheduler(state: &AppState) -> RefreshScheduler {
    RefreshScheduler::new(
        state.store.clone(),
        state.queue.clone(),
        state.config.refresh_interval,
    )
}

pub fn worker(state: &AppState) -> RefreshWorker {
    RefreshWorker::new(
        state.store.clone(),
        state.market.clone(),
        state.queue.clone(),
        state.config.queue_pop_timeout,
    )
}

/// Starts scheduler and worker when the pipeline is enabled.
pub fn start_pipeline(state: &AppState) -> Option<PipelineSupervisor> {
    if !state.config.enable_refresh_pipeline {
        tracing::info!("refresh pipeline disabled by ENABLE_REFRESH_PIPELINE");
        return None;
    }
    Some(PipelineSupervisor::start(scheduler(state), worker(state)))
}
