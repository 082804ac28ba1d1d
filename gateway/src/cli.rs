//! Command-line interface definitions for the gateway.
//!
//! Every setting can also be supplied through the environment; that is how the gateway is normally
//! deployed. The raw values here are validated into a [`crate::config::AppConfig`] before anything
//! else starts.

use std::env;

use clap::{Parser, Subcommand, ValueEnum};

/// Top-level command-line interface definition.
#[derive(Debug, Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands for the gateway.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the authenticated API.
    Serve(ServiceArgs),
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
    Pretty,
}

/// Arguments for the serve command.
///
/// Required values are `Option`s on purpose: presence is checked in one place
/// ([`crate::config::AppConfig::from_args`]) so every missing setting gets the same treatment.
#[derive(Debug, Default, Parser)]
pub struct ServiceArgs {
    /// Deployment environment; anything but `production` is treated as `development`.
    #[arg(long, env = "ENV")]
    pub environment: Option<String>,

    /// Listen port.
    #[arg(long, env = "PORT")]
    pub port: Option<String>,

    /// Bind address.
    #[arg(long, env = "BIND")]
    pub bind: Option<String>,

    #[arg(long, value_enum, env = "LOG_FORMAT", default_value_t)]
    pub log_format: LogFormat,

    /// Database URL, e.g. `sqlite://kubeweb.db` or `sqlite::memory:`.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Front-end URL users are sent to after logging in.
    #[arg(long, env = "APP_URL")]
    pub app_url: Option<String>,

    /// Domain all cookies are scoped to.
    #[arg(long, env = "DOMAIN")]
    pub domain: Option<String>,

    /// Base64 cookie signing secret (at least 64 bytes once decoded).
    #[arg(long, env = "COOKIE_SECRET", hide_env_values = true)]
    pub cookie_secret: Option<String>,

    #[arg(long, env = "OAUTH_CLIENT_ID")]
    pub oauth_client_id: Option<String>,

    #[arg(long, env = "OAUTH_CLIENT_SECRET", hide_env_values = true)]
    pub oauth_client_secret: Option<String>,

    #[arg(long, env = "OAUTH_CALLBACK_URL")]
    pub oauth_callback_url: Option<String>,

    /// OIDC issuer URL used for discovery.
    #[arg(long, env = "ISSUER")]
    pub issuer: Option<String>,

    /// Upper bound for outbound calls to the identity provider and the cluster API.
    #[arg(long, env = "HTTP_TIMEOUT_SECS")]
    pub http_timeout_secs: Option<String>,

    /// Workload controller backend. Currently only `kubernetes`.
    #[arg(long, env = "CLUSTER_TYPE")]
    pub cluster_type: Option<String>,

    #[arg(long, env = "KUBERNETES_SERVICE_HOST")]
    pub kube_host: Option<String>,

    #[arg(long, env = "KUBERNETES_SERVICE_PORT_HTTPS")]
    pub kube_port: Option<String>,

    #[arg(long, env = "KUBE_TOKEN", hide_env_values = true)]
    pub kube_token: Option<String>,

    /// Base64-encoded PEM CA certificate of the cluster API.
    #[arg(long, env = "KUBE_CERT", hide_env_values = true)]
    pub kube_cert: Option<String>,

    #[arg(long, env = "POD_NAMESPACE")]
    pub kube_namespace: Option<String>,

    /// Container image used for workspace workloads.
    #[arg(long, env = "KUBE_WORKSPACE_IMAGE")]
    pub kube_workspace_image: Option<String>,

    /// Requested storage for workspace volumes.
    #[arg(long, env = "KUBE_VOLUME_SIZE")]
    pub kube_volume_size: Option<String>,
}
