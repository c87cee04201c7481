use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use domain::{validate_top_up, Holding, HoldingFilters, HoldingSort, NewHolding};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{error::TrackerResult, state::AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/owners/:owner_id/holdings",
            get(list_holdings).post(add_holding),
        )
        .route(
            "/owners/:owner_id/holdings/:asset_id",
            get(get_holding).patch(top_up_holding).delete(delete_holding),
        )
}

#[derive(Debug, Deserialize)]
struct HoldingsQuery {
    search: Option<String>,
    page: Option<u32>,
    per_page: Option<u32>,
    sort: Option<String>,
}

impl HoldingsQuery {
    fn into_filters(self) -> TrackerResult<HoldingFilters> {
        let defaults = HoldingFilters::default();
        let sort = match self.sort.as_deref() {
            Some(raw) => HoldingSort::parse(raw)?,
            None => defaults.sort,
        };
        Ok(HoldingFilters {
            search: self.search.unwrap_or_default(),
            page: self.page.unwrap_or(defaults.page),
            per_page: self.per_page.unwrap_or(defaults.per_page),
            sort,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TopUpRequest {
    quantity: f64,
    purchase_price: f64,
}

async fn list_holdings(
    State(state): State<AppState>,
    Path(owner_id): Path<Uuid>,
    Query(query): Query<HoldingsQuery>,
) -> TrackerResult<Json<Vec<Holding>>> {
    let filters = query.into_filters()?;
    let holdings = state.store.holdings_for_owner(owner_id, &filters).await?;
    Ok(Json(holdings))
}

async fn add_holding(
    State(state): State<AppState>,
    Path(owner_id): Path<Uuid>,
    Json(input): Json<NewHolding>,
) -> TrackerResult<(StatusCode, Json<Holding>)> {
    input.validate()?;
    state.store.ensure_absent(owner_id, &input.asset_id).await?;
    let quote = state
        .market
        .current_price_and_symbol(input.asset_id.trim())
        .await?;
    let holding = state.store.add_holding(owner_id, input, &quote).await?;
    Ok((StatusCode::CREATED, Json(holding)))
}

async fn get_holding(
    State(state): State<AppState>,
    Path((owner_id, asset_id)): Path<(Uuid, String)>,
) -> TrackerResult<Json<Holding>> {
    Ok(Json(state.store.get_holding(owner_id, &asset_id).await?))
}

async fn top_up_holding(
    State(state): State<AppState>,
    Path((owner_id, asset_id)): Path<(Uuid, String)>,
    Json(input): Json<TopUpRequest>,
) -> TrackerResult<Json<Holding>> {
    validate_top_up(input.quantity, input.purchase_price)?;
    state.store.get_holding(owner_id, &asset_id).await?;
    let quote = state.market.current_price_and_symbol(&asset_id).await?;
    let holding = state
        .store
        .top_up(
            owner_id,
            &asset_id,
            input.quantity,
            input.purchase_price,
            quote.price,
        )
        .await?;
    Ok(Json(holding))
}

async fn delete_holding(
    State(state): State<AppState>,
    Path((owner_id, asset_id)): Path<(Uuid, String)>,
) -> TrackerResult<Json<Value>> {
    state.store.delete_holding(owner_id, &asset_id).await?;
    Ok(Json(
        json!({ "message": format!("{asset_id} deleted from portfolio") }),
    ))
}
