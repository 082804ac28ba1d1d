//! Health endpoint and the response headers every route carries.

use core::sync::atomic::Ordering;

use axum::http::StatusCode;

use crate::common::{body_json, get, spawn_app};

#[tokio::test]
async fn healthy_dependencies_report_up() {
    let app = spawn_app().await;

    let resp = app.send(get("/health", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["status"], "up");
    assert_eq!(body["details"]["database"]["status"], "up");
    assert_eq!(body["details"]["workload_controller"]["status"], "up");
}

#[tokio::test]
async fn unreachable_controller_reports_down() {
    let app = spawn_app().await;
    app.controller.healthy.store(false, Ordering::SeqCst);

    let resp = app.send(get("/health", None)).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(resp).await;
    assert_eq!(body["status"], "down");
    assert_eq!(body["details"]["database"]["status"], "up");
    assert_eq!(body["details"]["workload_controller"]["status"], "down");
}

#[tokio::test]
async fn responses_carry_security_and_request_id_headers() {
    let app = spawn_app().await;

    for uri in ["/health", "/user", "/does-not-exist"] {
        let resp = app.send(get(uri, None)).await;
        let headers = resp.headers();
        assert!(headers.contains_key("x-request-id"), "{uri}");
        assert_eq!(headers["x-content-type-options"], "nosniff", "{uri}");
        assert!(headers.contains_key("content-security-policy"), "{uri}");
    }
}

#[tokio::test]
async fn unknown_route_is_json_not_found() {
    let app = spawn_app().await;

    let resp = app.send(get("/does-not-exist", None)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(resp).await["message"], "not found");
}
