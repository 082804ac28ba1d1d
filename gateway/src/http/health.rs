//! Aggregate health of the gateway and its dependencies.

use std::collections::BTreeMap;

use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde::Serialize;

use crate::app::{AppState, db};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Up,
    Down,
}

#[derive(Debug, Serialize)]
pub struct Detail {
    pub status: Status,
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: Status,
    pub details: BTreeMap<&'static str, Detail>,
}

pub(crate) fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[axum::debug_handler]
pub(crate) async fn health(State(state): State<AppState>) -> (StatusCode, Json<Health>) {
    let database = match db::ping(&state.db_pool).await {
        Ok(()) => Status::Up,
        Err(e) => {
            tracing::warn!(%e, "database health check failed");
            Status::Down
        }
    };
    let controller = match state.controller.ping().await {
        Ok(()) => Status::Up,
        Err(e) => {
            tracing::warn!(%e, backend = state.controller.backend(), "workload controller health check failed");
            Status::Down
        }
    };

    let details = BTreeMap::from([
        ("database", Detail { status: database }),
        ("workload_controller", Detail { status: controller }),
    ]);
    let status = if details.values().all(|d| d.status == Status::Up) {
        Status::Up
    } else {
        Status::Down
    };
    let code = match status {
        Status::Up => StatusCode::OK,
        Status::Down => StatusCode::SERVICE_UNAVAILABLE,
    };

    (code, Json(Health { status, details }))
}
