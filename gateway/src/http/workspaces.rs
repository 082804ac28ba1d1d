//! Workspace routes, all scoped to the signed-in principal.
//!
//! A workspace id that exists but belongs to somebody else is indistinguishable from one that does
//! not exist: both answer 404.

use alloc::borrow::Cow;

use axum::{
    Extension, Json, Router,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    routing::{delete, get},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};
use validator::{Validate, ValidationError};

use crate::{
    app::{
        AppState,
        repository::{PrincipalId, Workspace, WorkspaceId},
    },
    controller::{ControllerError, TenantId, VolumeStatus, WorkloadStatus},
    error::ApiError,
    http::auth::CurrentPrincipal,
};

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_workspaces).post(create_workspace))
        .route("/{id}", delete(delete_workspace))
        .route("/{id}/workload", get(workload_status).post(create_workload))
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct CreateWorkspace {
    #[validate(
        length(min = 3, max = 63, message = "name must be between 3 and 63 characters"),
        custom(function = "not_blank")
    )]
    name: String,
}

fn not_blank(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(
            ValidationError::new("blank").with_message(Cow::Borrowed("name must not be blank"))
        );
    }
    Ok(())
}

#[derive(Debug, Serialize)]
pub(crate) struct WorkloadView {
    workload: WorkloadStatus,
    volume: VolumeStatus,
}

#[axum::debug_handler]
pub(crate) async fn list_workspaces(
    State(state): State<AppState>,
    Extension(CurrentPrincipal(owner)): Extension<CurrentPrincipal>,
) -> Result<Json<Vec<Workspace>>, ApiError> {
    Ok(Json(state.repository.list_workspaces(owner).await?))
}

#[axum::debug_handler]
pub(crate) async fn create_workspace(
    State(state): State<AppState>,
    Extension(CurrentPrincipal(owner)): Extension<CurrentPrincipal>,
    body: Result<Json<CreateWorkspace>, JsonRejection>,
) -> Result<Json<Workspace>, ApiError> {
    let Json(body) = body?;
    body.validate()?;

    let workspace = state.repository.create_workspace(&body.name, owner).await?;
    info!(workspace = %workspace.id, %owner, "Workspace created");
    Ok(Json(workspace))
}

#[axum::debug_handler]
pub(crate) async fn delete_workspace(
    State(state): State<AppState>,
    Extension(CurrentPrincipal(owner)): Extension<CurrentPrincipal>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Value>, ApiError> {
    let Path(id) = id?;
    state
        .repository
        .delete_workspace(WorkspaceId(id), owner)
        .await?;
    info!(workspace = id, %owner, "Workspace deleted");
    Ok(Json(json!({ "message": "workspace deleted" })))
}

/// Tenant of a workspace the caller owns, or 404.
async fn owned_tenant(
    state: &AppState,
    owner: PrincipalId,
    id: Result<Path<i64>, PathRejection>,
) -> Result<TenantId, ApiError> {
    let Path(id) = id?;
    let workspace = state
        .repository
        .find_workspace(WorkspaceId(id), owner)
        .await?
        .ok_or_else(|| ApiError::NotFound("workspace not found".to_owned()))?;
    Ok(TenantId::for_workspace(workspace.id))
}

#[axum::debug_handler]
pub(crate) async fn workload_status(
    State(state): State<AppState>,
    Extension(CurrentPrincipal(owner)): Extension<CurrentPrincipal>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<WorkloadView>, ApiError> {
    let tenant = owned_tenant(&state, owner, id).await?;
    let workload = state.controller.workload_status(&tenant).await?;
    let volume = state.controller.volume_status(&tenant).await?;
    Ok(Json(WorkloadView { workload, volume }))
}

/// Provision storage first, then the workload that mounts it.
///
/// Resources left behind by an earlier, partially failed attempt are reused, so the route can be
/// retried until both exist.
#[axum::debug_handler]
pub(crate) async fn create_workload(
    State(state): State<AppState>,
    Extension(CurrentPrincipal(owner)): Extension<CurrentPrincipal>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<WorkloadView>, ApiError> {
    let tenant = owned_tenant(&state, owner, id).await?;
    let volume = match state.controller.create_volume(&tenant).await {
        Err(ControllerError::AlreadyExists(_)) => {
            debug!(%tenant, "volume already present");
            state.controller.volume_status(&tenant).await?
        }
        other => other?,
    };
    let workload = match state.controller.create_workload(&tenant).await {
        Err(ControllerError::AlreadyExists(_)) => {
            debug!(%tenant, "workload already present");
            state.controller.workload_status(&tenant).await?
        }
        other => other?,
    };
    info!(%tenant, backend = state.controller.backend(), "Workload provisioned");
    Ok(Json(WorkloadView { workload, volume }))
}
