use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "available",
        "version": env!("CARGO_PKG_VERSION"),
        "refresh_pipeline": state.config.enable_refresh_pipeline,
        "distributed_queue": state.queue.is_distributed(),
    }))
}
