//! Host registry endpoints.

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use std::sync::Arc;

use super::error::ApiError;
use crate::db::{Host, RegisterHostRequest};
use crate::AppState;

/// POST /api/v1/lxd
pub async fn register_host(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterHostRequest>, JsonRejection>,
) -> Result<Json<Host>, ApiError> {
    let Json(req) = payload?;
    Ok(Json(state.scheduler.register_host(req).await?))
}

/// GET /api/v1/lxd
pub async fn list_hosts(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Host>>, ApiError> {
    Ok(Json(state.scheduler.list_hosts().await?))
}
