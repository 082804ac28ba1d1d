use alloc::sync::Arc;

use axum_extra::extract::cookie::Key;
use eyre::WrapErr as _;
use tracing::{info, warn};

use crate::{
    app::{
        db::{self, DbPool},
        repository::Repository,
        session::SessionStore,
    },
    config::{AppConfig, Environment},
    controller::{self, SharedController},
    http::auth::{IdentityProvider, OidcProvider, setup_cookie_key},
};

/// Application state shared across request handlers and background tasks.
///
/// Everything in here is either read-only or a handle to something that does its own
/// synchronisation (the pool, the provider client, the controller).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,

    /// Database connection pool; also backs `repository` and `sessions`.
    pub db_pool: DbPool,
    pub repository: Repository,
    pub sessions: SessionStore,

    pub provider: Arc<dyn IdentityProvider>,
    pub controller: SharedController,

    /// Signs the state and session cookies.
    pub cookie_key: Key,
}

impl AppState {
    /// Assemble the state from already constructed collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if the cookie key cannot be set up.
    pub async fn new(
        config: AppConfig,
        db_pool: DbPool,
        provider: Arc<dyn IdentityProvider>,
        controller: SharedController,
    ) -> eyre::Result<Self> {
        let cookie_key = setup_cookie_key(config.cookies.secret.as_ref(), &db_pool).await?;
        Ok(Self {
            config: Arc::new(config),
            repository: Repository::new(db_pool.clone()),
            sessions: SessionStore::new(db_pool.clone()),
            db_pool,
            provider,
            controller,
            cookie_key,
        })
    }
}

/// Emit startup warnings based on configuration.
fn emit_startup_warnings(config: &AppConfig) {
    if config.environment == Environment::Development {
        warn!(
            "Running in development mode. Cookies are still set with Secure=true and will not be sent by browsers over plain HTTP; run behind an HTTPS reverse proxy."
        );
    }
    if config.cookies.secret.is_none() {
        info!("COOKIE_SECRET not set; using the cookie key persisted in the database");
    }
}

/// Connect every external dependency. Any failure here is fatal: nothing is served with a half
/// initialised state.
#[tracing::instrument(skip_all)]
pub(crate) async fn initialize_state(config: AppConfig) -> eyre::Result<AppState> {
    emit_startup_warnings(&config);

    let db_pool = db::init(&config.database.url)
        .await
        .wrap_err_with(|| format!("Failed to initialize database at: {}", config.database.url))?;

    let provider = OidcProvider::discover(&config.oidc, config.http_timeout)
        .await
        .wrap_err("Failed to build OIDC client")?;

    let controller = controller::from_config(&config.controller, config.http_timeout)
        .await
        .wrap_err("Failed to initialize workload controller")?;
    info!(backend = controller.backend(), "Workload controller ready");

    AppState::new(config, db_pool, Arc::new(provider), controller).await
}
