//! Login, callback and logout handlers.
//!
//! The callback runs strictly in order: state check, code exchange, ID token verification,
//! principal lookup, session write. The first failure stops the chain. Everything before the
//! session write is an expected rejection and bounces the browser back to `/auth`.

use axum::{
    Router,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::SignedCookieJar;
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    app::{AppState, repository::Principal},
    error::ApiError,
    http::auth::{
        cookies::{
            PendingLogin, add_session_cookie, add_state_cookie, remove_session_cookie,
            session_token, take_state_cookie,
        },
        oidc::{AuthRejected, IdentityProvider, VerifiedClaims},
    },
};

pub(crate) const LOGIN_PATH: &str = "/auth";

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route(LOGIN_PATH, get(login))
        .route("/auth/callback", get(callback))
        .route("/auth/logout", post(logout))
}

/// Start a login attempt: set the state cookie and send the browser to the provider.
#[axum::debug_handler]
pub(crate) async fn login(State(state): State<AppState>, jar: SignedCookieJar) -> Response {
    let pending = PendingLogin::generate(Utc::now().timestamp());
    let auth_url = state.provider.authorization_url(&pending.state);
    let jar = add_state_cookie(jar, &pending, &state.config.cookies.domain);

    info!("Initiating OIDC login");
    (
        StatusCode::FOUND,
        jar,
        [(header::LOCATION, auth_url.to_string())],
    )
        .into_response()
}

#[derive(Debug, Default, Deserialize)]
/// Query parameters of the provider's redirect back to us.
pub(crate) struct CallbackQueryParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

fn validate_state(
    pending: Option<&PendingLogin>,
    state_param: Option<&str>,
    now: i64,
) -> Result<(), AuthRejected> {
    let pending = pending.ok_or(AuthRejected::MissingState)?;
    if state_param != Some(pending.state.as_str()) {
        return Err(AuthRejected::StateMismatch);
    }
    if pending.is_expired(now) {
        return Err(AuthRejected::AttemptExpired);
    }
    Ok(())
}

fn check_provider_error(
    error: Option<String>,
    error_description: Option<&str>,
) -> Result<(), AuthRejected> {
    match error {
        Some(err) => {
            warn!(%err, description = error_description.unwrap_or("No Description"), "OIDC error from provider");
            Err(AuthRejected::Provider(err))
        }
        None => Ok(()),
    }
}

/// Everything up to and including ID token verification. Touches no persistent state.
async fn authenticate(
    provider: &dyn IdentityProvider,
    pending: Option<PendingLogin>,
    params: CallbackQueryParams,
    now: i64,
) -> Result<VerifiedClaims, AuthRejected> {
    validate_state(pending.as_ref(), params.state.as_deref(), now)?;
    check_provider_error(params.error, params.error_description.as_deref())?;
    let code = params.code.ok_or(AuthRejected::MissingCode)?;

    let raw = provider.exchange_code(code).await?;
    // Nonce equals the state, which is already known to match the cookie here.
    let nonce = pending.map(|p| p.state).unwrap_or_default();
    provider.verify_id_token(&raw, &nonce)
}

/// Find or create the principal for a verified email.
async fn resolve_principal(state: &AppState, email: &str) -> Result<Principal, ApiError> {
    if let Some(principal) = state.repository.find_principal_by_email(email).await? {
        return Ok(principal);
    }
    info!("First login, creating principal");
    Ok(state.repository.create_principal(email).await?)
}

/// Provider callback.
#[axum::debug_handler]
pub(crate) async fn callback(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Query(params): Query<CallbackQueryParams>,
) -> Response {
    let domain = state.config.cookies.domain.as_str();
    let (pending, jar) = take_state_cookie(jar, domain);

    let claims = match authenticate(
        state.provider.as_ref(),
        pending,
        params,
        Utc::now().timestamp(),
    )
    .await
    {
        Ok(claims) => claims,
        Err(rejected) => {
            info!(reason = %rejected, "Login rejected, restarting flow");
            return (jar, Redirect::temporary(LOGIN_PATH)).into_response();
        }
    };

    let principal = match resolve_principal(&state, &claims.email).await {
        Ok(p) => p,
        Err(e) => return (jar, e).into_response(),
    };
    let token = match state.sessions.create(principal.id).await {
        Ok(t) => t,
        Err(e) => return (jar, ApiError::from(e)).into_response(),
    };

    info!(principal = %principal.id, subject = %claims.subject, "Login successful");
    let jar = add_session_cookie(jar, token.expose(), domain);
    (jar, Redirect::permanent(state.config.frontend_url.as_str())).into_response()
}

/// Drop the server-side session, if any, and clear the cookie.
#[axum::debug_handler]
pub(crate) async fn logout(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(token) = session_token(&jar) {
        state.sessions.revoke(&token).await?;
        info!("Session revoked");
    }
    let jar = remove_session_cookie(jar, &state.config.cookies.domain);
    Ok((jar, StatusCode::NO_CONTENT))
}
