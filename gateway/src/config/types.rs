//! Configuration data types for the gateway.
//!
//! These are the validated, typed counterparts of [`crate::cli::ServiceArgs`]. A single
//! [`AppConfig`] is built at startup and handed to every component that needs it.

use alloc::sync::Arc;
use core::{fmt, time::Duration};

use secrecy::{ExposeSecret as _, SecretString};
use url::Url;

/// Deployment environment. Anything but `production` is treated as development.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    Production,
    #[default]
    Development,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Production => f.write_str("production"),
            Self::Development => f.write_str("development"),
        }
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// TCP port for the API.
    pub port: u16,
    /// Bind address for the HTTP listener.
    pub bind: String,
}

/// Database connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    /// sqlx connection URL. `sqlite::memory:` keeps everything in memory.
    pub url: String,
}

/// Cookie scoping and signing.
#[derive(Debug, Clone)]
pub struct CookieConfig {
    /// Domain the state and session cookies are scoped to.
    pub domain: String,
    /// Base64 signing secret. When absent a key is loaded from (or generated into) the database.
    pub secret: Option<Arc<SecretString>>,
}

impl PartialEq for CookieConfig {
    fn eq(&self, other: &Self) -> bool {
        self.domain == other.domain
            && self.secret.as_ref().map(|s| s.expose_secret().to_owned())
                == other.secret.as_ref().map(|s| s.expose_secret().to_owned())
    }
}

/// OpenID Connect relying-party settings.
#[derive(Debug, Clone)]
pub struct OidcConfig {
    /// Issuer URL used for discovery.
    pub issuer: String,
    pub client_id: String,
    pub client_secret: Arc<SecretString>,
    /// Absolute URL of this service's `/auth/callback` route as registered with the provider.
    pub callback_url: String,
}

impl PartialEq for OidcConfig {
    fn eq(&self, other: &Self) -> bool {
        self.issuer == other.issuer
            && self.client_id == other.client_id
            && self.client_secret.expose_secret() == other.client_secret.expose_secret()
            && self.callback_url == other.callback_url
    }
}

/// Cluster API backend settings.
#[derive(Debug, Clone)]
pub struct KubeConfig {
    pub host: String,
    pub port: String,
    /// Bearer token of the service account.
    pub token: Arc<SecretString>,
    /// Base64-encoded PEM CA bundle of the API server.
    pub ca_cert: String,
    /// All workloads and volumes live in this namespace.
    pub namespace: String,
    pub workspace_image: String,
    pub volume_size: String,
}

impl KubeConfig {
    /// Base URL of the cluster API, e.g. `https://10.0.0.1:6443`.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("https://{}:{}", self.host, self.port)
    }
}

impl PartialEq for KubeConfig {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host
            && self.port == other.port
            && self.token.expose_secret() == other.token.expose_secret()
            && self.ca_cert == other.ca_cert
            && self.namespace == other.namespace
            && self.workspace_image == other.workspace_image
            && self.volume_size == other.volume_size
    }
}

/// Workload controller backend, selected by `CLUSTER_TYPE`.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerConfig {
    Kubernetes(KubeConfig),
}

/// Root configuration of the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DbConfig,
    /// Where users land after a successful login.
    pub frontend_url: Url,
    pub cookies: CookieConfig,
    pub oidc: OidcConfig,
    /// Bound for every outbound call to the identity provider and the cluster API.
    pub http_timeout: Duration,
    pub controller: ControllerConfig,
}

pub(crate) const DEFAULT_PORT: u16 = 8080;
pub(crate) const DEFAULT_BIND: &str = "0.0.0.0";
pub(crate) const DEFAULT_DATABASE_URL: &str = "sqlite://kubeweb.db";
pub(crate) const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
pub(crate) const DEFAULT_WORKSPACE_IMAGE: &str = "codercom/code-server:latest";
pub(crate) const DEFAULT_VOLUME_SIZE: &str = "1Gi";
