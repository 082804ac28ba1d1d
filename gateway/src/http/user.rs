use axum::{Extension, Json, Router, extract::State, routing::get};

use crate::{
    app::{AppState, repository::Principal},
    error::ApiError,
    http::{auth::CurrentPrincipal, workspaces},
};

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/user", get(current_user))
        .nest("/user/workspaces", workspaces::routes())
}

/// Public record of the signed-in principal.
#[axum::debug_handler]
pub(crate) async fn current_user(
    State(state): State<AppState>,
    Extension(CurrentPrincipal(id)): Extension<CurrentPrincipal>,
) -> Result<Json<Principal>, ApiError> {
    state
        .repository
        .find_principal_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("user not found".to_owned()))
}
