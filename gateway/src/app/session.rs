//! Server-side sessions.
//!
//! The client only ever holds an opaque random token. The database stores the SHA-256 of that token
//! next to a versioned payload, so a leaked database cannot be replayed as cookies.

use core::time::Duration;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use secrecy::{ExposeSecret as _, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use thiserror::Error as ThisError;
use tracing::{debug, warn};

use crate::app::{db::DbPool, repository::PrincipalId};

/// Fixed absolute lifetime of a session.
pub const SESSION_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

const PAYLOAD_VERSION: u8 = 1;

#[derive(Debug, ThisError)]
pub enum SessionError {
    #[error("session storage failed")]
    Database(#[from] sqlx::Error),
    #[error("session payload could not be encoded")]
    Payload(#[from] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionPayload {
    version: u8,
    principal: PrincipalId,
    issued_at: i64,
}

/// Opaque session token as handed to the client.
#[derive(Debug, Clone)]
pub struct SessionToken(SecretString);

impl SessionToken {
    fn generate() -> Self {
        let bytes: [u8; 32] = rand::random();
        Self(SecretString::from(URL_SAFE_NO_PAD.encode(bytes)))
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

fn token_hash(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn lifetime_secs() -> i64 {
    i64::try_from(SESSION_LIFETIME.as_secs()).unwrap_or(i64::MAX)
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    pool: DbPool,
}

impl SessionStore {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Issue a new session for `principal`. Earlier sessions of the same principal stay valid.
    ///
    /// # Errors
    ///
    /// Returns an error if the session row cannot be written.
    pub async fn create(&self, principal: PrincipalId) -> Result<SessionToken, SessionError> {
        self.create_at(principal, Utc::now().timestamp()).await
    }

    async fn create_at(
        &self,
        principal: PrincipalId,
        now: i64,
    ) -> Result<SessionToken, SessionError> {
        let token = SessionToken::generate();
        let data = serde_json::to_string(&SessionPayload {
            version: PAYLOAD_VERSION,
            principal,
            issued_at: now,
        })?;

        sqlx::query("INSERT INTO sessions (token_hash, data, expires_at) VALUES (?, ?, ?)")
            .bind(token_hash(token.expose()))
            .bind(data)
            .bind(now.saturating_add(lifetime_secs()))
            .execute(&self.pool)
            .await?;

        debug!(%principal, "session issued");
        Ok(token)
    }

    /// Principal of a live session, or `None` for unknown, expired or unreadable sessions.
    ///
    /// # Errors
    ///
    /// Returns an error only if the database cannot be queried.
    pub async fn resolve(&self, token: &str) -> Result<Option<PrincipalId>, SessionError> {
        self.resolve_at(token, Utc::now().timestamp()).await
    }

    async fn resolve_at(&self, token: &str, now: i64) -> Result<Option<PrincipalId>, SessionError> {
        let Some(data) = sqlx::query_scalar::<_, String>(
            "SELECT data FROM sessions WHERE token_hash = ? AND expires_at > ?",
        )
        .bind(token_hash(token))
        .bind(now)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        match serde_json::from_str::<SessionPayload>(&data) {
            Ok(payload) if payload.version == PAYLOAD_VERSION => Ok(Some(payload.principal)),
            Ok(payload) => {
                warn!(version = payload.version, "ignoring session with unknown payload version");
                Ok(None)
            }
            Err(e) => {
                warn!(%e, "ignoring session with unreadable payload");
                Ok(None)
            }
        }
    }

    /// Delete the session behind `token`. Unknown tokens are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete statement fails.
    pub async fn revoke(&self, token: &str) -> Result<(), SessionError> {
        sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
            .bind(token_hash(token))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Remove every expired session row and return how many were deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete statement fails.
    pub async fn purge_expired(&self) -> Result<u64, SessionError> {
        self.purge_expired_at(Utc::now().timestamp()).await
    }

    async fn purge_expired_at(&self, now: i64) -> Result<u64, SessionError> {
        Ok(sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?
            .rows_affected())
    }
}
