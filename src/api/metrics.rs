//! Prometheus metrics endpoint and HTTP request tracking middleware.

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;

use super::error::ApiError;
use crate::db::ContainerStatus;
use crate::AppState;

// Metric names as constants for consistency
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const PLACEMENTS_TOTAL: &str = "placements_total";
pub const CONTAINER_TRANSITIONS_TOTAL: &str = "container_transitions_total";
pub const CONTAINERS_TOTAL: &str = "containers_total";

/// Install the Prometheus recorder. Call once during startup.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_counter!(HTTP_REQUESTS_TOTAL, "Total number of HTTP requests received");
    describe_histogram!(HTTP_REQUEST_DURATION_SECONDS, "HTTP request duration in seconds");
    describe_counter!(PLACEMENTS_TOTAL, "Placement decisions by result");
    describe_counter!(
        CONTAINER_TRANSITIONS_TOTAL,
        "Container status changes by target status"
    );
    describe_gauge!(CONTAINERS_TOTAL, "Containers currently recorded, by status");

    Ok(handle)
}

/// GET /metrics - Returns Prometheus-formatted metrics.
pub async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> Response {
    update_gauge_metrics(&state).await;

    match state.metrics_handle.as_ref() {
        Some(h) => (StatusCode::OK, h.render()).into_response(),
        None => ApiError::internal("Metrics not initialized").into_response(),
    }
}

async fn update_gauge_metrics(state: &AppState) {
    let counts: Result<Vec<(String, i64)>, _> =
        sqlx::query_as("SELECT status, COUNT(*) FROM lxc GROUP BY status")
            .fetch_all(state.scheduler.db())
            .await;

    if let Ok(counts) = counts {
        for (status, count) in containers_by_status(counts) {
            gauge!(CONTAINERS_TOTAL, "status" => status).set(count as f64);
        }
    }
}

/// Per-status container counts, with zero for every status that has no rows
fn containers_by_status(rows: Vec<(String, i64)>) -> Vec<(String, i64)> {
    let mut counts: Vec<(String, i64)> = ContainerStatus::ALL
        .iter()
        .map(|status| (status.to_string(), 0))
        .collect();

    for (status, count) in rows {
        match counts.iter_mut().find(|(known, _)| *known == status) {
            Some(entry) => entry.1 = count,
            None => counts.push((status, count)),
        }
    }
    counts
}

/// Middleware to track HTTP request metrics.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();

    // Use the route template so /api/v1/lxd/:lxd_name/lxc is one series
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let method = request.method().to_string();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

/// Record the outcome of a placement attempt.
pub fn record_placement(result: &'static str) {
    counter!(PLACEMENTS_TOTAL, "result" => result).increment(1);
}

/// Record a container entering `status`.
pub fn record_transition(status: ContainerStatus) {
    counter!(CONTAINER_TRANSITIONS_TOTAL, "to" => status.as_str()).increment(1);
}
