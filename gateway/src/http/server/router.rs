use core::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{
        Request, StatusCode,
        header::{AUTHORIZATION, COOKIE},
    },
    middleware::{self as ax_middleware},
    routing,
};
use tower::ServiceBuilder;
use tower_http::{
    ServiceBuilderExt as _, request_id::MakeRequestUuid, timeout::TimeoutLayer, trace::TraceLayer,
};

use crate::{
    app::AppState,
    error::ApiError,
    http::{
        auth::{self, login},
        health,
        server::middleware::{LevelAdjustingOnFailure, secure_headers_middleware},
        user,
    },
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Creates the application router by merging public and private routes.
///
/// Public routes are the login flow and the health check. Everything under `/user` sits behind
/// [`auth::require`].
pub(crate) fn create_app_router(app_state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .merge(login::routes())
        .merge(health::routes());

    let private = Router::new()
        .merge(user::routes())
        .route_layer(ax_middleware::from_fn_with_state(
            app_state.clone(),
            auth::require,
        ));

    public.merge(private)
}

/// The complete service with the middleware stack applied.
pub fn create_app(app_state: AppState) -> Router {
    let middleware_stack = ServiceBuilder::new()
        .sensitive_headers([AUTHORIZATION, COOKIE])
        .set_x_request_id(MakeRequestUuid)
        .propagate_x_request_id()
        .layer(TraceLayer::new_for_http().on_failure(LevelAdjustingOnFailure))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            REQUEST_TIMEOUT,
        ))
        .layer(ax_middleware::from_fn(secure_headers_middleware));

    create_app_router(&app_state)
        .with_state(app_state)
        .fallback(routing::any(|req: Request<Body>| async move {
            tracing::debug!(method = %req.method(), uri = %req.uri(), "Unhandled request");
            ApiError::NotFound("not found".to_owned())
        }))
        .layer(middleware_stack)
}
