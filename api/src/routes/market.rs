use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use domain::{MarketFilters, MarketSummary};
use serde::Deserialize;

use crate::{error::TrackerResult, state::AppState};

pub fn router() -> Router<AppState> {
    Router::new().route("/market", get(list_market))
}

#[derive(Debug, Deserialize)]
struct MarketQuery {
    currency: Option<String>,
    ids: Option<String>,
    page: Option<u32>,
    per_page: Option<u32>,
    order: Option<String>,
}

impl MarketQuery {
    fn into_filters(self) -> (String, MarketFilters) {
        let defaults = MarketFilters::default();
        let currency = self
            .currency
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| "usd".to_string());
        let filters = MarketFilters {
            ids: self.ids.unwrap_or(defaults.ids),
            page: self.page.unwrap_or(defaults.page),
            per_page: self.per_page.unwrap_or(defaults.per_page),
            order: self.order.unwrap_or(defaults.order),
        };
        (currency, filters)
    }
}

async fn list_market(
    State(state): State<AppState>,
    Query(query): Query<MarketQuery>,
) -> TrackerResult<Json<Vec<MarketSummary>>> {
    let (currency, filters) = query.into_filters();
    filters.validate()?;
    let coins = state.market.market_snapshot(&currency, &filters).await?;
    Ok(Json(coins))
}
