//! Validation of raw CLI/environment values into an [`AppConfig`].
//!
//! Every required setting is checked here, before any connection is opened, so a misconfigured
//! deployment exits immediately instead of serving traffic half-initialised.

use alloc::sync::Arc;
use core::time::Duration;

use secrecy::SecretString;
use thiserror::Error as ThisError;
use url::Url;

use crate::cli::ServiceArgs;
use crate::config::{
    AppConfig, ControllerConfig, CookieConfig, DEFAULT_BIND, DEFAULT_DATABASE_URL,
    DEFAULT_HTTP_TIMEOUT, DEFAULT_PORT, DEFAULT_VOLUME_SIZE, DEFAULT_WORKSPACE_IMAGE, DbConfig,
    Environment, KubeConfig, OidcConfig, ServerConfig,
};

/// A required setting is missing or malformed.
#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be specified")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
    #[error("unsupported cluster type {0:?}")]
    UnsupportedClusterType(String),
}

/// Empty strings count as missing, the same as an unset variable.
fn required(value: Option<&String>, name: &'static str) -> Result<String, ConfigError> {
    value
        .filter(|v| !v.trim().is_empty())
        .cloned()
        .ok_or(ConfigError::Missing(name))
}

fn optional(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty()).cloned()
}

fn parse_url(raw: &str, name: &'static str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}

fn parse_environment(raw: Option<&String>) -> Environment {
    match raw {
        Some(env) if env.eq_ignore_ascii_case("production") => Environment::Production,
        _ => Environment::Development,
    }
}

fn parse_port(raw: Option<&String>) -> Result<u16, ConfigError> {
    optional(raw).map_or(Ok(DEFAULT_PORT), |p| {
        p.parse().map_err(|_| ConfigError::Invalid {
            name: "PORT",
            reason: format!("unable to load port {p}"),
        })
    })
}

fn parse_timeout(raw: Option<&String>) -> Result<Duration, ConfigError> {
    optional(raw).map_or(Ok(DEFAULT_HTTP_TIMEOUT), |s| match s.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::Invalid {
            name: "HTTP_TIMEOUT_SECS",
            reason: format!("expected a positive number of seconds, got {s:?}"),
        }),
    })
}

fn kube_config_from_args(args: &ServiceArgs) -> Result<KubeConfig, ConfigError> {
    Ok(KubeConfig {
        host: required(args.kube_host.as_ref(), "KUBERNETES_SERVICE_HOST")?,
        port: required(args.kube_port.as_ref(), "KUBERNETES_SERVICE_PORT_HTTPS")?,
        token: Arc::new(SecretString::from(required(
            args.kube_token.as_ref(),
            "KUBE_TOKEN",
        )?)),
        ca_cert: required(args.kube_cert.as_ref(), "KUBE_CERT")?,
        namespace: required(args.kube_namespace.as_ref(), "POD_NAMESPACE")?,
        workspace_image: optional(args.kube_workspace_image.as_ref())
            .unwrap_or_else(|| DEFAULT_WORKSPACE_IMAGE.to_owned()),
        volume_size: optional(args.kube_volume_size.as_ref())
            .unwrap_or_else(|| DEFAULT_VOLUME_SIZE.to_owned()),
    })
}

fn controller_config_from_args(args: &ServiceArgs) -> Result<ControllerConfig, ConfigError> {
    let cluster_type = required(args.cluster_type.as_ref(), "CLUSTER_TYPE")?.to_lowercase();
    match cluster_type.as_str() {
        "kubernetes" => Ok(ControllerConfig::Kubernetes(kube_config_from_args(args)?)),
        _ => Err(ConfigError::UnsupportedClusterType(cluster_type)),
    }
}

impl AppConfig {
    /// Validates the raw arguments into a typed configuration.
    ///
    /// # Errors
    ///
    /// Returns the first missing or malformed setting.
    pub fn from_args(args: &ServiceArgs) -> Result<Self, ConfigError> {
        let frontend_url = parse_url(&required(args.app_url.as_ref(), "APP_URL")?, "APP_URL")?;
        let domain = required(args.domain.as_ref(), "DOMAIN")?;

        let oidc = OidcConfig {
            client_id: required(args.oauth_client_id.as_ref(), "OAUTH_CLIENT_ID")?,
            client_secret: Arc::new(SecretString::from(required(
                args.oauth_client_secret.as_ref(),
                "OAUTH_CLIENT_SECRET",
            )?)),
            callback_url: parse_url(
                &required(args.oauth_callback_url.as_ref(), "OAUTH_CALLBACK_URL")?,
                "OAUTH_CALLBACK_URL",
            )?
            .to_string(),
            issuer: parse_url(&required(args.issuer.as_ref(), "ISSUER")?, "ISSUER")?
                .as_str()
                .trim_end_matches('/')
                .to_owned(),
        };

        Ok(Self {
            environment: parse_environment(args.environment.as_ref()),
            server: ServerConfig {
                port: parse_port(args.port.as_ref())?,
                bind: optional(args.bind.as_ref()).unwrap_or_else(|| DEFAULT_BIND.to_owned()),
            },
            database: DbConfig {
                url: optional(args.database_url.as_ref())
                    .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_owned()),
            },
            frontend_url,
            cookies: CookieConfig {
                domain,
                secret: optional(args.cookie_secret.as_ref())
                    .map(|s| Arc::new(SecretString::from(s))),
            },
            oidc,
            http_timeout: parse_timeout(args.http_timeout_secs.as_ref())?,
            controller: controller_config_from_args(args)?,
        })
    }
}
