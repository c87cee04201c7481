use std::time::Duration;

use async_trait::async_trait;
use cache::{keys, Cache};
use domain::{CachedPrice, MarketFilters, MarketSummary, ValidationError};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{TrackerError, TrackerResult};

/// Lifetime of a cached price, independent of the refresh interval.
pub const PRICE_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[async_trait]
pub trait MarketDataClient: Send + Sync {
    async fn current_price_and_symbol(&self, asset_id: &str) -> TrackerResult<CachedPrice>;
    async fn market_snapshot(
        &self,
        currency: &str,
        filters: &MarketFilters,
    ) -> TrackerResult<Vec<MarketSummary>>;
}

#[derive(Deserialize)]
struct CoinResponse {
    symbol: String,
    market_data: CoinMarketData,
}

#[derive(Deserialize)]
struct CoinMarketData {
    current_price: CurrentPrice,
}

#[derive(Deserialize)]
struct CurrentPrice {
    usd: Option<f64>,
}

#[derive(Clone)]
pub struct CoingeckoClient {
    client: Client,
    api_base: Url,
    api_key: String,
    cache: Option<Cache>,
}

impl CoingeckoClient {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        cache: Option<Cache>,
        timeout: Duration,
    ) -> TrackerResult<Self> {
        let api_base = api_base.into();
        let api_base = Url::parse(&api_base).map_err(|err| {
            TrackerError::Transport(format!("invalid market api base {api_base}: {err}"))
        })?;
        if api_base.cannot_be_a_base() {
            return Err(TrackerError::Transport(format!(
                "market api base {api_base} cannot carry a path"
            )));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base,
            api_key: api_key.into(),
            cache,
        })
    }

    /// Appends each segment to the base path, percent-encoded, so an id can
    /// never add a segment, a query or a fragment of its own.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.api_base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn get(&self, segments: &[&str]) -> RequestBuilder {
        self.client
            .get(self.endpoint(segments))
            .header("accept", "application/json")
            .header("x-cg-demo-api-key", &self.api_key)
    }

    async fn cached_price(&self, asset_id: &str) -> Option<CachedPrice> {
        let cache = self.cache.as_ref()?;
        match cache.get::<CachedPrice>(&keys::asset_price(asset_id)).await {
            Ok(hit) => hit,
            Err(err) => {
                warn!(error = %err, asset_id, "price cache read failed");
                None
            }
        }
    }

    async fn store_price(&self, asset_id: &str, price: &CachedPrice) {
        let Some(cache) = &self.cache else {
            return;
        };
        if let Err(err) = cache
            .set(&keys::asset_price(asset_id), price, Some(PRICE_CACHE_TTL))
            .await
        {
            warn!(error = %err, asset_id, "price cache write failed");
        }
    }
}

#[async_trait]
impl MarketDataClient for CoingeckoClient {
    async fn current_price_and_symbol(&self, asset_id: &str) -> TrackerResult<CachedPrice> {
        if let Some(hit) = self.cached_price(asset_id).await {
            debug!(asset_id, "price cache hit");
            return Ok(hit);
        }

        let resp = self.get(&["coins", asset_id]).send().await?;
        let status = resp.status();
        if !status.is_success() {
            debug!(asset_id, %status, "market api has no quote");
            return Err(TrackerError::NotFound);
        }
        let body: CoinResponse = resp.json().await?;
        let price = body.market_data.current_price.usd.ok_or_else(|| {
            TrackerError::Transport(format!("market api returned no usd price for {asset_id}"))
        })?;

        let fetched = CachedPrice {
            price,
            symbol: body.symbol,
        };
        self.store_price(asset_id, &fetched).await;
        Ok(fetched)
    }

    async fn market_snapshot(
        &self,
        currency: &str,
        filters: &MarketFilters,
    ) -> TrackerResult<Vec<MarketSummary>> {
        let mut query: Vec<(&str, String)> = vec![("vs_currency", currency.to_string())];
        if !filters.ids.is_empty() {
            query.push(("ids", filters.ids.clone()));
        }
        query.push(("page", filters.page.to_string()));
        query.push(("per_page", filters.per_page.to_string()));
        query.push(("order", filters.order.clone()));

        let resp = self.get(&["coins", "markets"]).query(&query).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            if body.contains("invalid vs_currency") {
                return Err(ValidationError::new("currency", "must be a supported currency").into());
            }
            if status == StatusCode::NOT_FOUND {
                return Err(TrackerError::NotFound);
            }
            return Err(TrackerError::Transport(format!(
                "market api returned status {status}: {body}"
            )));
        }
        Ok(resp.json().await?)
    }
}
