#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use cache::Cache;
use chrono::Utc;
use domain::{CachedPrice, Holding, HoldingFilters, MarketFilters, MarketSummary};
use job_queue::RefreshQueue;
use pnl_api::{
    config::AppConfig,
    error::{TrackerError, TrackerResult},
    repositories::{HoldingRepository, InMemoryHoldingRepository},
    services::{AssetStore, MarketDataClient},
    state::AppState,
};
use tokio::sync::Notify;
use uuid::Uuid;

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://localhost/pnl_test".to_string(),
        redis_url: None,
        market_api_base: "http://127.0.0.1:9".to_string(),
        market_api_key: "test-key".to_string(),
        market_http_timeout: Duration::from_secs(2),
        refresh_interval: Duration::from_secs(3600),
        refresh_queue_name: "pnl_queue_test".to_string(),
        queue_pop_timeout: Duration::from_millis(50),
        cache_default_ttl: Duration::from_secs(600),
        enable_refresh_pipeline: false,
        frontend_origins: vec!["http://localhost:3000".to_string()],
        port: 0,
    }
}

pub fn holding(owner_id: Uuid, asset_id: &str, quantity: f64, total_cost: f64) -> Holding {
    Holding {
        asset_id: asset_id.to_string(),
        owner_id,
        symbol: asset_id.to_string(),
        quantity,
        avg_price: total_cost / quantity,
        total_cost,
        pnl: 0.0,
        version: 1,
        created_at: Utc::now(),
    }
}

/// Market client answering from a fixed price table and recording every
/// asset it was asked about.
#[derive(Default)]
pub struct StubMarket {
    prices: HashMap<String, f64>,
    calls: Mutex<Vec<String>>,
}

impl StubMarket {
    pub fn new(prices: &[(&str, f64)]) -> Self {
        Self {
            prices: prices
                .iter()
                .map(|(id, price)| (id.to_string(), *price))
                .collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MarketDataClient for StubMarket {
    async fn current_price_and_symbol(&self, asset_id: &str) -> TrackerResult<CachedPrice> {
        self.calls.lock().unwrap().push(asset_id.to_string());
        self.prices
            .get(asset_id)
            .map(|price| CachedPrice {
                price: *price,
                symbol: asset_id.to_string(),
            })
            .ok_or(TrackerError::NotFound)
    }

    async fn market_snapshot(
        &self,
        _currency: &str,
        filters: &MarketFilters,
    ) -> TrackerResult<Vec<MarketSummary>> {
        Ok(self
            .prices
            .iter()
            .filter(|(id, _)| filters.ids.is_empty() || filters.ids.split(',').any(|i| i == id.as_str()))
            .map(|(id, price)| MarketSummary {
                id: id.clone(),
                symbol: id.clone(),
                current_price: Some(*price),
                ..Default::default()
            })
            .collect())
    }
}

/// Rendezvous for pausing a repository call mid-flight.
#[derive(Default)]
pub struct Gate {
    armed: AtomicBool,
    pub reached: Notify,
    pub release: Notify,
}

impl Gate {
    pub fn armed() -> Arc<Self> {
        let gate = Self::default();
        gate.armed.store(true, Ordering::SeqCst);
        Arc::new(gate)
    }

    /// Parks the first caller until `release` is notified; later callers pass.
    async fn pass(&self) {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.reached.notify_one();
            self.release.notified().await;
        }
    }
}

#[derive(Clone)]
pub enum Interference {
    /// `update_pnl` fails with a storage error for this owner.
    FailPnlWrite(Uuid),
    /// This owner's row is edited right after holders are read, so the
    /// sweep's version check loses.
    ConcurrentEdit(Uuid),
    /// The first full listing of an owner stalls after reading, before the
    /// rows reach the caller.
    StallListing(Arc<Gate>),
    /// A PNL sweep bumps the row right after each `find`, this many times.
    SweepAfterFind(Arc<AtomicUsize>),
    /// `update_pnl` never completes once entered.
    HangPnlWrite(Arc<Gate>),
}

/// Delegates to the in-memory repository while injecting one fault.
#[derive(Clone)]
pub struct InterferingRepository {
    pub inner: InMemoryHoldingRepository,
    pub interference: Interference,
}

#[async_trait]
impl HoldingRepository for InterferingRepository {
    async fn insert(&self, holding: &Holding) -> TrackerResult<Holding> {
        self.inner.insert(holding).await
    }

    async fn find(&self, owner_id: Uuid, asset_id: &str) -> TrackerResult<Option<Holding>> {
        let found = self.inner.find(owner_id, asset_id).await?;
        if let (Interference::SweepAfterFind(remaining), Some(row)) = (&self.interference, &found) {
            let swept = remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if swept {
                self.inner
                    .update_pnl(asset_id, owner_id, row.pnl + 1.0, row.version)
                    .await?;
            }
        }
        Ok(found)
    }

    async fn list_for_owner(
        &self,
        owner_id: Uuid,
        filters: &HoldingFilters,
    ) -> TrackerResult<Vec<Holding>> {
        self.inner.list_for_owner(owner_id, filters).await
    }

    async fn list_all_for_owner(&self, owner_id: Uuid) -> TrackerResult<Vec<Holding>> {
        let rows = self.inner.list_all_for_owner(owner_id).await?;
        if let Interference::StallListing(gate) = &self.interference {
            gate.pass().await;
        }
        Ok(rows)
    }

    async fn distinct_asset_ids(&self) -> TrackerResult<Vec<String>> {
        self.inner.distinct_asset_ids().await
    }

    async fn holders_of(&self, asset_id: &str) -> TrackerResult<Vec<Holding>> {
        let holders = self.inner.holders_of(asset_id).await?;
        if let Interference::ConcurrentEdit(owner_id) = &self.interference {
            if let Some(mut edited) = self.inner.find(*owner_id, asset_id).await? {
                edited.top_up(1.0, edited.avg_price);
                self.inner.update(&edited).await?;
            }
        }
        Ok(holders)
    }

    async fn update(&self, holding: &Holding) -> TrackerResult<i32> {
        self.inner.update(holding).await
    }

    async fn update_pnl(
        &self,
        asset_id: &str,
        owner_id: Uuid,
        pnl: f64,
        expected_version: i32,
    ) -> TrackerResult<i32> {
        match &self.interference {
            Interference::FailPnlWrite(failing) if *failing == owner_id => {
                return Err(TrackerError::Database(sqlx::Error::PoolTimedOut));
            }
            Interference::HangPnlWrite(gate) => {
                gate.reached.notify_one();
                std::future::pending::<()>().await;
            }
            _ => {}
        }
        self.inner
            .update_pnl(asset_id, owner_id, pnl, expected_version)
            .await
    }

    async fn delete(&self, owner_id: Uuid, asset_id: &str) -> TrackerResult<bool> {
        self.inner.delete(owner_id, asset_id).await
    }
}

pub fn memory_store(repo: Arc<dyn HoldingRepository>) -> AssetStore {
    AssetStore::new(repo, Cache::in_memory(Duration::from_secs(600)))
}

pub fn test_state(store: AssetStore, market: Arc<dyn MarketDataClient>) -> AppState {
    let config = test_config();
    AppState {
        queue: RefreshQueue::in_memory(config.refresh_queue_name.clone()),
        config,
        store,
        market,
    }
}
