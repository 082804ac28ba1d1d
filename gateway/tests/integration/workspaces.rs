//! Workspace CRUD and workload provisioning, scoped per principal.

use core::sync::atomic::Ordering;

use axum::http::StatusCode;
use serde_json::{Value, json};

use crate::common::{TestApp, body_json, empty_request, get, json_request, spawn_app};

async fn create(app: &TestApp, session: &str, name: &str) -> (StatusCode, Value) {
    let resp = app
        .send(json_request(
            "POST",
            "/user/workspaces",
            Some(session),
            &json!({ "name": name }),
        ))
        .await;
    let status = resp.status();
    (status, body_json(resp).await)
}

async fn list(app: &TestApp, session: &str) -> Vec<Value> {
    let resp = app.send(get("/user/workspaces", Some(session))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    body_json(resp).await.as_array().unwrap().clone()
}

#[tokio::test]
async fn create_and_list_workspace() {
    let app = spawn_app().await;
    let session = app.login("test@example.com").await;

    let (status, body) = create(&app, &session, "test").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "test");
    assert!(body["id"].is_i64());

    let user = body_json(app.send(get("/user", Some(&session))).await).await;
    assert_eq!(body["owner"], user["id"]);

    let all = list(&app, &session).await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0]["name"], "test");
}

#[tokio::test]
async fn invalid_names_are_rejected_without_a_record() {
    let app = spawn_app().await;
    let session = app.login("test@example.com").await;

    let too_long = "x".repeat(64);
    for name in ["", "ab", "   ", too_long.as_str()] {
        let (status, body) = create(&app, &session, name).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "name {name:?}");
        assert!(body["errors"]["name"].is_string());
    }
    assert!(list(&app, &session).await.is_empty());
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let app = spawn_app().await;
    let session = app.login("test@example.com").await;

    let resp = app
        .send(json_request(
            "POST",
            "/user/workspaces",
            Some(&session),
            &json!({ "title": "test" }),
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(resp).await["message"].is_string());
}

#[tokio::test]
async fn names_are_unique_per_owner_only() {
    let app = spawn_app().await;
    let alice = app.login("alice@example.com").await;
    let bob = app.login("bob@example.com").await;

    assert_eq!(create(&app, &alice, "shared").await.0, StatusCode::OK);
    assert_eq!(create(&app, &alice, "shared").await.0, StatusCode::BAD_REQUEST);
    assert_eq!(create(&app, &bob, "shared").await.0, StatusCode::OK);

    assert_eq!(list(&app, &alice).await.len(), 1);
    assert_eq!(list(&app, &bob).await.len(), 1);
}

#[tokio::test]
async fn principals_only_see_their_own_workspaces() {
    let app = spawn_app().await;
    let alice = app.login("alice@example.com").await;
    let bob = app.login("bob@example.com").await;

    create(&app, &alice, "alpha").await;
    create(&app, &alice, "beta").await;
    create(&app, &bob, "gamma").await;

    let names: Vec<_> = list(&app, &alice)
        .await
        .iter()
        .map(|w| w["name"].as_str().unwrap().to_owned())
        .collect();
    assert_eq!(names, ["alpha", "beta"]);

    let names: Vec<_> = list(&app, &bob)
        .await
        .iter()
        .map(|w| w["name"].as_str().unwrap().to_owned())
        .collect();
    assert_eq!(names, ["gamma"]);
}

#[tokio::test]
async fn delete_is_owner_only() {
    let app = spawn_app().await;
    let alice = app.login("alice@example.com").await;
    let bob = app.login("bob@example.com").await;

    let (_, ws) = create(&app, &alice, "doomed").await;
    let uri = format!("/user/workspaces/{}", ws["id"]);

    let resp = app.send(empty_request("DELETE", &uri, Some(&bob))).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(list(&app, &alice).await.len(), 1);

    let resp = app.send(empty_request("DELETE", &uri, Some(&alice))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["message"], "workspace deleted");
    assert!(list(&app, &alice).await.is_empty());

    let resp = app.send(empty_request("DELETE", &uri, Some(&alice))).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn non_numeric_id_is_bad_request() {
    let app = spawn_app().await;
    let session = app.login("test@example.com").await;

    let resp = app
        .send(empty_request("DELETE", "/user/workspaces/abc", Some(&session)))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn workload_provisioning_uses_tenant_of_workspace() {
    let app = spawn_app().await;
    let session = app.login("test@example.com").await;
    let (_, ws) = create(&app, &session, "dev-box").await;
    let uri = format!("/user/workspaces/{}/workload", ws["id"]);
    let tenant = format!("ws-{}", ws["id"]);

    let resp = app.send(get(&uri, Some(&session))).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app.send(empty_request("POST", &uri, Some(&session))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["workload"]["name"], tenant.as_str());
    assert_eq!(body["volume"]["name"], format!("{tenant}-data"));

    let resp = app.send(get(&uri, Some(&session))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["workload"]["phase"], "running");
    assert_eq!(body["volume"]["phase"], "bound");

    let resp = app.send(empty_request("POST", &uri, Some(&session))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["workload"]["phase"], "running");
    assert_eq!(body["volume"]["phase"], "bound");
}

#[tokio::test]
async fn workload_provisioning_resumes_after_partial_failure() {
    let app = spawn_app().await;
    let session = app.login("test@example.com").await;
    let (_, ws) = create(&app, &session, "flaky").await;
    let uri = format!("/user/workspaces/{}/workload", ws["id"]);
    let tenant = format!("ws-{}", ws["id"]);

    app.controller.fail_next_workload.store(true, Ordering::SeqCst);
    let resp = app.send(empty_request("POST", &uri, Some(&session))).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let resp = app.send(empty_request("POST", &uri, Some(&session))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["workload"]["name"], tenant.as_str());
    assert_eq!(body["volume"]["name"], format!("{tenant}-data"));
    assert_eq!(body["volume"]["phase"], "bound");

    let resp = app.send(get(&uri, Some(&session))).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn workload_of_foreign_workspace_is_not_found() {
    let app = spawn_app().await;
    let alice = app.login("alice@example.com").await;
    let bob = app.login("bob@example.com").await;
    let (_, ws) = create(&app, &alice, "private").await;
    let uri = format!("/user/workspaces/{}/workload", ws["id"]);

    let resp = app.send(empty_request("POST", &uri, Some(&bob))).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let resp = app.send(get(&uri, Some(&bob))).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn workspace_routes_require_session() {
    let app = spawn_app().await;

    for (method, uri) in [
        ("GET", "/user/workspaces"),
        ("POST", "/user/workspaces"),
        ("DELETE", "/user/workspaces/1"),
        ("GET", "/user/workspaces/1/workload"),
        ("POST", "/user/workspaces/1/workload"),
    ] {
        let resp = app.send(empty_request(method, uri, None)).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{method} {uri}");
    }
}
