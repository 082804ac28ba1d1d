//! Authentication for the gateway: OIDC authorization code login, server-side sessions and the
//! gate in front of private routes.
//!
//! - `/auth` starts an attempt and stores a signed, single-use state cookie.
//! - `/auth/callback` validates the attempt, verifies the ID token and issues a session cookie.
//! - [`require`] resolves that cookie to a principal on every private request.

pub mod cookies;
pub mod login;
pub mod middleware;
pub mod oidc;

use alloc::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use base64::{Engine as _, engine::general_purpose::STANDARD as base64_gp_STANDARD};
use eyre::WrapErr as _;
use secrecy::{ExposeSecret as _, SecretString};
use tracing::{info, warn};

use crate::app::{
    AppState,
    db::{DbPool, KV_COOKIE_SECRET, delete_kv, get_kv, store_kv},
};

pub use middleware::{CurrentPrincipal, require};
pub use oidc::{AuthRejected, IdentityProvider, OidcProvider, RawIdToken, VerifiedClaims};

async fn gen_and_store_key(pool: &DbPool) -> eyre::Result<Key> {
    let generated = Key::generate();
    let encoded = base64_gp_STANDARD.encode(generated.master());
    store_kv(pool, KV_COOKIE_SECRET, &encoded).await?;
    Ok(generated)
}

async fn get_or_generate_cookie_key(pool: &DbPool) -> eyre::Result<Key> {
    let Some(stored_secret) = get_kv(pool, KV_COOKIE_SECRET).await? else {
        info!("No cookie key stored; generating one");
        return gen_and_store_key(pool).await;
    };

    match base64_gp_STANDARD.decode(&stored_secret) {
        Ok(bytes) => match Key::try_from(bytes.as_slice()) {
            Ok(key) => Ok(key),
            Err(_) => {
                warn!("Found corrupted cookie key in DB (wrong length); removing and regenerating");
                delete_kv(pool, KV_COOKIE_SECRET).await?;
                gen_and_store_key(pool).await
            }
        },
        Err(_) => {
            warn!("Found corrupted cookie key in DB (invalid base64); removing and regenerating");
            delete_kv(pool, KV_COOKIE_SECRET).await?;
            gen_and_store_key(pool).await
        }
    }
}

/// Cookie signing key from `COOKIE_SECRET`, else the one persisted in the database, else a fresh one
/// that is persisted for the next start.
///
/// # Errors
///
/// Returns an error if the configured secret is not base64 of at least 64 bytes, or if the database
/// cannot be read or written.
#[tracing::instrument(skip_all)]
pub async fn setup_cookie_key(
    cookie_secret: Option<&Arc<SecretString>>,
    pool: &DbPool,
) -> eyre::Result<Key> {
    let Some(cookie_secret_val) = cookie_secret else {
        return get_or_generate_cookie_key(pool).await;
    };

    info!("COOKIE_SECRET configured; removing any stored cookie key from DB to avoid confusion");
    delete_kv(pool, KV_COOKIE_SECRET).await?;

    let bytes = base64_gp_STANDARD
        .decode(cookie_secret_val.expose_secret().as_bytes())
        .wrap_err("COOKIE_SECRET is not valid base64")?;
    Key::try_from(bytes.as_slice()).wrap_err("COOKIE_SECRET must decode to at least 64 bytes")
}

impl FromRef<AppState> for Key {
    fn from_ref(input: &AppState) -> Self {
        input.cookie_key.clone()
    }
}
