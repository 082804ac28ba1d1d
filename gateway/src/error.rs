//! HTTP error taxonomy.
//!
//! Every handler returns `Result<_, ApiError>`. Expected outcomes (unauthorized, invalid input,
//! missing resources) are answered quietly; only [`ApiError::Internal`] is logged as an error, and
//! its detail never reaches the client.

use std::collections::BTreeMap;

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;
use tracing::{debug, error};
use validator::ValidationErrors;

use crate::{
    app::{repository::RepositoryError, session::SessionError},
    controller::ControllerError,
};

const INTERNAL_MESSAGE: &str = "internal server error";

#[derive(Debug, ThisError)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,
    /// Field name to human readable problem.
    #[error("validation failed")]
    Validation(BTreeMap<String, String>),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Internal(#[from] eyre::Report),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "message": "unauthorized" })),
            )
                .into_response(),
            Self::Validation(fields) => {
                debug!(?fields, "request failed validation");
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "message": "validation failed", "errors": fields })),
                )
                    .into_response()
            }
            Self::BadRequest(message) => {
                debug!(%message, "bad request");
                (StatusCode::BAD_REQUEST, Json(json!({ "message": message }))).into_response()
            }
            Self::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(json!({ "message": message }))).into_response()
            }
            Self::Internal(report) => {
                error!(error = ?report, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "message": INTERNAL_MESSAGE })),
                )
                    .into_response()
            }
        }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::AlreadyExists(_) => Self::BadRequest(err.to_string()),
            RepositoryError::NotFound(_) => Self::NotFound(err.to_string()),
            RepositoryError::Database(_) => Self::Internal(eyre::Report::new(err)),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        Self::Internal(eyre::Report::new(err))
    }
}

impl From<ControllerError> for ApiError {
    fn from(err: ControllerError) -> Self {
        match err {
            ControllerError::NotFound(_) => Self::NotFound(err.to_string()),
            ControllerError::AlreadyExists(_) => Self::BadRequest(err.to_string()),
            ControllerError::Unavailable(_)
            | ControllerError::PermissionDenied(_)
            | ControllerError::InvalidResponse(_)
            | ControllerError::Internal(_) => Self::Internal(eyre::Report::new(err)),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        let fields = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let message = errs
                    .first()
                    .and_then(|e| e.message.as_ref().map(ToString::to_string))
                    .unwrap_or_else(|| "invalid value".to_owned());
                (field.to_string(), message)
            })
            .collect();
        Self::Validation(fields)
    }
}
