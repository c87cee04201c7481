mod common;

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{HeaderValue, Request, StatusCode},
    Router,
};
use common::{holding, memory_store, test_state, StubMarket};
use domain::{Holding, MarketSummary};
use pnl_api::{
    app::build_router,
    repositories::{HoldingRepository, InMemoryHoldingRepository},
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

fn router(repo: InMemoryHoldingRepository) -> Router {
    let market = Arc::new(StubMarket::new(&[("bitcoin", 30.0), ("ethereum", 200.0)]));
    let state = test_state(memory_store(Arc::new(repo)), market);
    build_router(state, vec![HeaderValue::from_static("http://localhost:3000")])
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router response");
    let status = response.status();
    let body = to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("body");
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, value)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_reports_available() {
    let router = router(InMemoryHoldingRepository::new());
    let (status, body) = send(&router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "available");
    assert_eq!(body["distributed_queue"], false);
}

#[tokio::test]
async fn add_then_list_holdings() {
    let router = router(InMemoryHoldingRepository::new());
    let owner = Uuid::new_v4();
    let uri = format!("/api/owners/{owner}/holdings");

    let (status, body) = send(
        &router,
        json_request(
            "POST",
            &uri,
            json!({ "asset_id": "bitcoin", "quantity": 2.0, "purchase_price": 20.0 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let created: Holding = serde_json::from_value(body).unwrap();
    assert_eq!(created.pnl, 20.0);
    assert_eq!(created.symbol, "bitcoin");

    let (status, body) = send(
        &router,
        json_request(
            "POST",
            &uri,
            json!({ "asset_id": "bitcoin", "quantity": 1.0, "purchase_price": 1.0 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "bitcoin already exists in portfolio");

    let (status, body) = send(&router, get(&format!("{uri}?sort=pnl_desc"))).await;
    assert_eq!(status, StatusCode::OK);
    let listed: Vec<Holding> = serde_json::from_value(body).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].asset_id, "bitcoin");
}

#[tokio::test]
async fn unknown_asset_and_bad_input_are_rejected() {
    let router = router(InMemoryHoldingRepository::new());
    let uri = format!("/api/owners/{}/holdings", Uuid::new_v4());

    let (status, _) = send(
        &router,
        json_request(
            "POST",
            &uri,
            json!({ "asset_id": "delisted", "quantity": 1.0, "purchase_price": 1.0 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &router,
        json_request(
            "POST",
            &uri,
            json!({ "asset_id": "bitcoin", "quantity": -1.0, "purchase_price": 1.0 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(&router, get(&format!("{uri}?sort=created_at"))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(&router, get(&format!("{uri}?per_page=101"))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn top_up_and_delete_holding() {
    let repo = InMemoryHoldingRepository::new();
    let owner = Uuid::new_v4();
    repo.insert(&holding(owner, "ethereum", 2.0, 200.0))
        .await
        .unwrap();
    let router = router(repo.clone());
    let uri = format!("/api/owners/{owner}/holdings/ethereum");

    let (status, body) = send(
        &router,
        json_request(
            "PATCH",
            &uri,
            json!({ "quantity": 2.0, "purchase_price": 150.0 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let updated: Holding = serde_json::from_value(body).unwrap();
    assert_eq!(updated.quantity, 4.0);
    assert_eq!(updated.avg_price, 125.0);
    assert_eq!(updated.pnl, 300.0);
    assert_eq!(updated.version, 2);

    let (status, _) = send(
        &router,
        Request::builder()
            .method("DELETE")
            .uri(&uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(repo.find(owner, "ethereum").await.unwrap().is_none());

    let (status, _) = send(&router, get(&uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn market_listing_validates_filters() {
    let router = router(InMemoryHoldingRepository::new());

    let (status, body) = send(&router, get("/api/market?ids=bitcoin")).await;
    assert_eq!(status, StatusCode::OK);
    let coins: Vec<MarketSummary> = serde_json::from_value(body).unwrap();
    assert_eq!(coins.len(), 1);
    assert_eq!(coins[0].id, "bitcoin");

    let (status, body) = send(&router, get("/api/market?order=volume_desc")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation failed: order: must be a valid order type");
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let router = router(InMemoryHoldingRepository::new());
    let response = router.oneshot(get("/health")).await.unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}
