//! Session gate for private routes.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse as _, Response},
};
use axum_extra::extract::cookie::SignedCookieJar;

use crate::{
    app::{AppState, repository::PrincipalId},
    error::ApiError,
    http::auth::cookies::session_token,
};

/// Principal of the live session, inserted into request extensions by [`require`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentPrincipal(pub PrincipalId);

/// Let the request through only with a live session; answer 401 otherwise.
pub async fn require(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let jar = SignedCookieJar::from_headers(req.headers(), state.cookie_key.clone());
    let Some(token) = session_token(&jar) else {
        tracing::debug!("require: no session cookie");
        return ApiError::Unauthorized.into_response();
    };

    match state.sessions.resolve(&token).await {
        Ok(Some(principal)) => {
            req.extensions_mut().insert(CurrentPrincipal(principal));
            next.run(req).await
        }
        Ok(None) => {
            tracing::debug!("require: session unknown or expired");
            ApiError::Unauthorized.into_response()
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}
