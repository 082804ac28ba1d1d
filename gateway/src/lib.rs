//! Library entry for the `gateway` crate.
//!
//! Exposes `inner_main` so the binary shim can call into the gateway logic, and the state and
//! router constructors so integration tests can drive the HTTP surface in-process.

extern crate alloc;
extern crate core;

pub mod app;
pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod http;

use std::env;
use std::sync::Once;

use eyre::Result;
use tracing::{Instrument as _, info};
use tracing_subscriber::{EnvFilter, fmt::time::ChronoLocal};

use cli::{Cli, Command, LogFormat};
use config::AppConfig;

static INIT_TRACING: Once = Once::new();
static INIT_RUSTLS: Once = Once::new();

/// Install the process-wide rustls crypto provider.
///
/// Every outbound HTTP client (OIDC discovery, token exchange, cluster API) relies on it, so this
/// has to run before any of them is built. Safe to call more than once.
///
/// # Panics
///
/// Panics if the OpenSSL crypto provider cannot be installed.
pub fn install_crypto_provider() {
    INIT_RUSTLS.call_once(|| {
        // A provider installed by someone else first is fine too.
        drop(rustls_openssl::default_provider().install_default());
    });
}

fn init_tracing(log_format: LogFormat) {
    INIT_TRACING.call_once(move || {
        let default_level = if env::var("KUBEWEB_INTEGRATION_TEST").is_ok() {
            "error"
        } else {
            "info"
        };

        let builder = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
            )
            .with_timer(ChronoLocal::rfc_3339());

        match log_format {
            LogFormat::Compact => builder.compact().init(),
            LogFormat::Json => builder.json().init(),
            LogFormat::Pretty => builder.pretty().init(),
        }
    });
}

/// The gateway's main function; can be called from a shim binary.
///
/// # Errors
///
/// Returns an error if the configuration is incomplete, if a startup dependency (database, identity
/// provider, workload controller) cannot be initialised, or if the server fails to bind.
pub async fn inner_main(invocation: Cli) -> Result<()> {
    match invocation.command {
        Command::Serve(args) => {
            init_tracing(args.log_format);

            let startup_span = tracing::info_span!(
                "gateway.startup",
                pid = ?std::process::id(),
                version = env!("CARGO_PKG_VERSION")
            );

            let config = startup_span.in_scope(|| AppConfig::from_args(&args))?;

            install_crypto_provider();

            info!(environment = %config.environment, "Starting gateway");

            app::start(config).instrument(startup_span).await
        }
    }
}
