//! Container endpoints.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use super::error::ApiError;
use super::MessageResponse;
use crate::db::{
    Container, ContainerSummary, CreateContainerRequest, DeleteContainerRequest,
    UpdateContainerStatusRequest,
};
use crate::AppState;

/// POST /api/v1/lxc
pub async fn create_container(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateContainerRequest>, JsonRejection>,
) -> Result<Json<Container>, ApiError> {
    let Json(req) = payload?;
    tracing::info!(name = %req.name, alias = %req.alias, "Create container request");

    let container = state.scheduler.create_container(req).await?;
    Ok(Json(container))
}

/// GET /api/v1/lxc
pub async fn list_containers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ContainerSummary>>, ApiError> {
    Ok(Json(state.scheduler.list_containers().await?))
}

/// GET /api/v1/lxc/:id
pub async fn get_container(
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Container>, ApiError> {
    let Path(id) = id?;
    Ok(Json(state.scheduler.get_container(id).await?))
}

/// PUT /api/v1/lxc
pub async fn update_container_status(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<UpdateContainerStatusRequest>, JsonRejection>,
) -> Result<Json<Container>, ApiError> {
    let Json(req) = payload?;
    tracing::info!(container_id = %req.id, status = %req.status, "Update container status request");

    Ok(Json(state.scheduler.update_container_status(req).await?))
}

/// DELETE /api/v1/lxc
pub async fn delete_container(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DeleteContainerRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(req) = payload?;
    tracing::info!(container_id = %req.id, "Delete container request");

    state.scheduler.delete_container(req.id).await?;
    Ok(Json(MessageResponse::new("container deleted")))
}

/// GET /api/v1/lxd/:lxd_name/lxc
pub async fn list_containers_on_host(
    State(state): State<Arc<AppState>>,
    Path(lxd_name): Path<String>,
) -> Result<Json<Vec<Container>>, ApiError> {
    Ok(Json(state.scheduler.list_containers_on_host(&lxd_name).await?))
}
