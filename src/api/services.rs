//! Container service (port mapping) endpoints.

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use std::sync::Arc;

use super::error::ApiError;
use crate::db::{
    ContainerServiceResponse, CreateContainerServiceRequest, UpdateServiceStatusRequest,
};
use crate::AppState;

/// POST /api/v1/lxc/services
pub async fn create_service(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateContainerServiceRequest>, JsonRejection>,
) -> Result<Json<ContainerServiceResponse>, ApiError> {
    let Json(req) = payload?;
    let service = state.scheduler.create_container_service(req).await?;
    Ok(Json(service.into()))
}

/// GET /api/v1/lxc/services
pub async fn list_services(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ContainerServiceResponse>>, ApiError> {
    let services = state.scheduler.list_container_services().await?;
    Ok(Json(services.into_iter().map(ContainerServiceResponse::from).collect()))
}

/// PUT /api/v1/lxc/services
pub async fn update_service_status(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<UpdateServiceStatusRequest>, JsonRejection>,
) -> Result<Json<ContainerServiceResponse>, ApiError> {
    let Json(req) = payload?;
    let service = state.scheduler.update_service_status(req).await?;
    Ok(Json(service.into()))
}
