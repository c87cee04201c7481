use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, Method, Request},
    response::IntoResponse,
    routing::get,
    Router,
};
use metrics::set_global_recorder;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer},
    LatencyUnit,
};
use tracing::{info_span, Level};

use crate::{
    routes::{health, holdings, market},
    state::AppState,
};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the Prometheus recorder on first use so counters recorded by
/// the refresh pipeline show up at `/metrics`.
pub fn install_metrics_recorder() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            let recorder = builder.build_recorder();
            let handle = recorder.handle();
            if let Err(e) = set_global_recorder(recorder) {
                tracing::warn!("Global metrics recorder already installed: {}", e);
            }
            handle
        })
        .clone()
}

async fn metrics_handler() -> impl IntoResponse {
    install_metrics_recorder().render()
}

pub fn build_router(state: AppState, allowed_origins: Vec<HeaderValue>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list(vec![CONTENT_TYPE]))
        .allow_origin(AllowOrigin::list(allowed_origins));

    let request_id_header = axum::http::header::HeaderName::from_static("x-request-id");
    let request_id_for_span = request_id_header.clone();
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(move |request: &Request<_>| {
            let request_id = request
                .headers()
                .get(&request_id_for_span)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("unknown");
            info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id
            )
        })
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(
            DefaultOnResponse::new()
                .level(Level::INFO)
                .latency_unit(LatencyUnit::Millis),
        );

    Router::<AppState>::new()
        .route("/", get(|| async { "pnl tracker backend" }))
        .route("/metrics", get(metrics_handler))
        .merge(health::router())
        .nest(
            "/api",
            Router::new()
                .merge(market::router())
                .merge(holdings::router()),
        )
        .with_state(state)
        .layer(cors)
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(trace_layer)
        .layer(SetRequestIdLayer::new(
            request_id_header,
            MakeRequestUuid::default(),
        ))
}
