use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderName;
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use hyper::Request;
use serde_json::json;
use tower_http::compression::CompressionLayer;
use tower_http::propagate_header::PropagateHeaderLayer;
use tower_http::request_id::{MakeRequestUuid, SetRequestIdLayer};
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::{Level, Span};

use super::handlers::health_check_handler;
use super::HEALTH_CHECK_API_LOG_TARGET;
use crate::servers::gateway::client::Client;

pub fn router(client: Arc<Client>) -> Router {
    Router::new()
        .route("/", get(|| async { Json(json!({})) }))
        .route("/health_check", get(health_check_handler))
        .with_state(client)
        .layer(CompressionLayer::new())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateHeaderLayer::new(HeaderName::from_static("x-request-id")))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(|request: &Request<axum::body::Body>, _span: &Span| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .map(|v| v.to_str().unwrap_or_default())
                        .unwrap_or_default();

                    tracing::info!(
                        target: HEALTH_CHECK_API_LOG_TARGET,
                        method = %request.method(), uri = %request.uri(), request_id = %request_id, "request");
                })
                .on_response(|response: &Response, latency: Duration, _span: &Span| {
                    let request_id = response
                        .headers()
                        .get("x-request-id")
                        .map(|v| v.to_str().unwrap_or_default())
                        .unwrap_or_default();

                    tracing::info!(
                        target: HEALTH_CHECK_API_LOG_TARGET,
                        latency = %latency.as_millis(), status = %response.status(), request_id = %request_id, "response");
                }),
        )
}
