//! Common utilities for integration tests.
//!
//! Builds the real router around an in-memory database, with fake identity provider and workload
//! controller implementations so the whole login flow runs without a network.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::{collections::HashSet, sync::Mutex};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, Response, header},
};
use serde_json::Value;
use tower::ServiceExt as _;
use url::{Url, form_urlencoded};

use kubeweb_gateway::{
    app::{AppState, db},
    cli::ServiceArgs,
    config::AppConfig,
    controller::{
        ControllerError, TenantId, VolumePhase, VolumeStatus, WorkloadController, WorkloadPhase,
        WorkloadStatus,
    },
    http::{
        self,
        auth::{AuthRejected, IdentityProvider, RawIdToken, VerifiedClaims},
    },
};

pub(crate) const APP_URL: &str = "https://app.example.com/";
pub(crate) const DOMAIN: &str = "example.com";

/// Codes of the form `code-for:<email>` exchange successfully; `code-for:bad-token` yields a token
/// that fails verification. Anything else fails the exchange.
#[derive(Default)]
pub(crate) struct FakeProvider {
    pub exchanges: AtomicUsize,
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn authorization_url(&self, state: &str) -> Url {
        let mut url = Url::parse("https://idp.example.com/authorize").unwrap();
        url.query_pairs_mut()
            .append_pair("state", state)
            .append_pair("nonce", state)
            .append_pair("scope", "openid email");
        url
    }

    async fn exchange_code(&self, code: String) -> Result<RawIdToken, AuthRejected> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        code.strip_prefix("code-for:")
            .map(|email| RawIdToken(email.to_owned()))
            .ok_or_else(|| AuthRejected::Exchange("invalid_grant".to_owned()))
    }

    fn verify_id_token(
        &self,
        token: &RawIdToken,
        nonce: &str,
    ) -> Result<VerifiedClaims, AuthRejected> {
        if token.0 == "bad-token" || nonce.is_empty() {
            return Err(AuthRejected::Verification("bad signature".to_owned()));
        }
        Ok(VerifiedClaims {
            subject: format!("sub-{}", token.0),
            email: token.0.clone(),
        })
    }
}

/// In-memory stand-in for a cluster.
pub(crate) struct FakeController {
    pub healthy: AtomicBool,
    /// Fail the next `create_workload` call with a transient error, before creating anything.
    pub fail_next_workload: AtomicBool,
    created: Mutex<HashSet<String>>,
}

impl Default for FakeController {
    fn default() -> Self {
        Self {
            healthy: AtomicBool::new(true),
            fail_next_workload: AtomicBool::new(false),
            created: Mutex::new(HashSet::new()),
        }
    }
}

impl FakeController {
    fn exists(&self, name: &str) -> bool {
        self.created.lock().unwrap().contains(name)
    }
}

#[async_trait]
impl WorkloadController for FakeController {
    fn backend(&self) -> &'static str {
        "fake"
    }

    async fn ping(&self) -> Result<(), ControllerError> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ControllerError::Unavailable("fake is down".to_owned()))
        }
    }

    async fn workload_status(&self, tenant: &TenantId) -> Result<WorkloadStatus, ControllerError> {
        if !self.exists(tenant.as_str()) {
            return Err(ControllerError::NotFound(tenant.to_string()));
        }
        Ok(WorkloadStatus {
            name: tenant.to_string(),
            phase: WorkloadPhase::Running,
        })
    }

    async fn volume_status(&self, tenant: &TenantId) -> Result<VolumeStatus, ControllerError> {
        let name = format!("{tenant}-data");
        if !self.exists(&name) {
            return Err(ControllerError::NotFound(name));
        }
        Ok(VolumeStatus {
            name,
            phase: VolumePhase::Bound,
        })
    }

    async fn create_workload(&self, tenant: &TenantId) -> Result<WorkloadStatus, ControllerError> {
        if self.fail_next_workload.swap(false, Ordering::SeqCst) {
            return Err(ControllerError::Unavailable("connection reset".to_owned()));
        }
        if !self.created.lock().unwrap().insert(tenant.to_string()) {
            return Err(ControllerError::AlreadyExists(tenant.to_string()));
        }
        Ok(WorkloadStatus {
            name: tenant.to_string(),
            phase: WorkloadPhase::Pending,
        })
    }

    async fn create_volume(&self, tenant: &TenantId) -> Result<VolumeStatus, ControllerError> {
        let name = format!("{tenant}-data");
        if !self.created.lock().unwrap().insert(name.clone()) {
            return Err(ControllerError::AlreadyExists(name));
        }
        Ok(VolumeStatus {
            name,
            phase: VolumePhase::Pending,
        })
    }
}

pub(crate) fn service_args() -> ServiceArgs {
    ServiceArgs {
        database_url: Some("sqlite::memory:".to_owned()),
        app_url: Some(APP_URL.to_owned()),
        domain: Some(DOMAIN.to_owned()),
        oauth_client_id: Some("gateway".to_owned()),
        oauth_client_secret: Some("secret".to_owned()),
        oauth_callback_url: Some("https://api.example.com/auth/callback".to_owned()),
        issuer: Some("https://idp.example.com".to_owned()),
        cluster_type: Some("kubernetes".to_owned()),
        kube_host: Some("127.0.0.1".to_owned()),
        kube_port: Some("6443".to_owned()),
        kube_token: Some("token".to_owned()),
        kube_cert: Some("cert".to_owned()),
        kube_namespace: Some("default".to_owned()),
        ..ServiceArgs::default()
    }
}

pub(crate) struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub provider: Arc<FakeProvider>,
    pub controller: Arc<FakeController>,
}

pub(crate) async fn spawn_app() -> TestApp {
    let config = AppConfig::from_args(&service_args()).unwrap();
    let pool = db::init(&config.database.url).await.unwrap();
    let provider = Arc::new(FakeProvider::default());
    let controller = Arc::new(FakeController::default());

    let state = AppState::new(config, pool, provider.clone(), controller.clone())
        .await
        .unwrap();

    TestApp {
        router: http::create_app(state.clone()),
        state,
        provider,
        controller,
    }
}

/// `name=value` of a Set-Cookie header that sets (not clears) `name`.
pub(crate) fn set_cookie_pair(resp: &Response<Body>, name: &str) -> Option<String> {
    resp.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .find(|pair| {
            pair.split_once('=')
                .is_some_and(|(n, value)| n == name && !value.is_empty())
        })
        .map(ToOwned::to_owned)
}

/// Whether some Set-Cookie header clears `name`.
pub(crate) fn clears_cookie(resp: &Response<Body>, name: &str) -> bool {
    resp.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.starts_with(&format!("{name}=;")) && v.contains("Max-Age=0"))
}

pub(crate) fn location(resp: &Response<Body>) -> String {
    resp.headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_owned()
}

pub(crate) async fn body_json(resp: Response<Body>) -> Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub(crate) fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(c) = cookie {
        builder = builder.header(header::COOKIE, c);
    }
    builder.body(Body::empty()).unwrap()
}

pub(crate) fn json_request(method: &str, uri: &str, cookie: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(c) = cookie {
        builder = builder.header(header::COOKIE, c);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub(crate) fn empty_request(method: &str, uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(c) = cookie {
        builder = builder.header(header::COOKIE, c);
    }
    builder.body(Body::empty()).unwrap()
}

impl TestApp {
    pub(crate) async fn send(&self, req: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(req).await.unwrap()
    }

    /// Hit `/auth` and return the state cookie pair and the state value sent to the provider.
    pub(crate) async fn begin_login(&self) -> (String, String) {
        let resp = self.send(get("/auth", None)).await;
        let state_cookie = set_cookie_pair(&resp, "oauthstate").unwrap();
        let url = Url::parse(&location(&resp)).unwrap();
        let state = url
            .query_pairs()
            .find(|&(ref k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        (state_cookie, state)
    }

    pub(crate) async fn callback(&self, cookie: Option<&str>, params: &[(&str, &str)]) -> Response<Body> {
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();
        self.send(get(&format!("/auth/callback?{query}"), cookie)).await
    }

    /// Run the whole login flow for `email` and return the session cookie pair.
    pub(crate) async fn login(&self, email: &str) -> String {
        let (state_cookie, state) = self.begin_login().await;
        let code = format!("code-for:{email}");
        let resp = self
            .callback(Some(&state_cookie), &[("code", &code), ("state", &state)])
            .await;
        set_cookie_pair(&resp, "session").unwrap()
    }

    pub(crate) async fn session_count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
            .fetch_one(&self.state.db_pool)
            .await
            .unwrap()
    }
}
