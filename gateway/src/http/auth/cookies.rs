//! Cookie construction and parsing for the login flow and sessions.

use axum_extra::extract::cookie::{Cookie, SignedCookieJar};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use cookie::{SameSite, time::Duration as CookieDuration};

use crate::app::session::SESSION_LIFETIME;

pub const COOKIE_STATE: &str = "oauthstate";
pub const COOKIE_SESSION: &str = "session";

/// Ceiling for the state cookie itself. The attempt it carries expires much sooner, see
/// [`STATE_ATTEMPT_TTL_SECS`].
const STATE_COOKIE_MAX_AGE: CookieDuration = CookieDuration::days(365);

/// How long after `/auth` a callback is still accepted.
pub const STATE_ATTEMPT_TTL_SECS: i64 = 10 * 60;

/// State value and issue time of one authorization attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLogin {
    pub state: String,
    pub issued_at: i64,
}

impl PendingLogin {
    /// Fresh attempt with a 256-bit random state.
    #[must_use]
    pub fn generate(now: i64) -> Self {
        let bytes: [u8; 32] = rand::random();
        Self {
            state: URL_SAFE_NO_PAD.encode(bytes),
            issued_at: now,
        }
    }

    fn encode(&self) -> String {
        format!("{}:{}", self.state, self.issued_at)
    }

    fn decode(raw: &str) -> Option<Self> {
        let (state, issued_at) = raw.rsplit_once(':')?;
        if state.is_empty() {
            return None;
        }
        Some(Self {
            state: state.to_owned(),
            issued_at: issued_at.parse().ok()?,
        })
    }

    #[must_use]
    pub const fn is_expired(&self, now: i64) -> bool {
        now.saturating_sub(self.issued_at) > STATE_ATTEMPT_TTL_SECS
    }
}

fn protected_cookie(
    name: &'static str,
    value: String,
    domain: &str,
    max_age: CookieDuration,
) -> Cookie<'static> {
    Cookie::build((name, value))
        .domain(domain.to_owned())
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .max_age(max_age)
        .build()
}

fn removal_cookie(name: &'static str, domain: &str) -> Cookie<'static> {
    Cookie::build(name)
        .domain(domain.to_owned())
        .path("/")
        .build()
}

pub fn add_state_cookie(jar: SignedCookieJar, pending: &PendingLogin, domain: &str) -> SignedCookieJar {
    jar.add(protected_cookie(
        COOKIE_STATE,
        pending.encode(),
        domain,
        STATE_COOKIE_MAX_AGE,
    ))
}

/// Read the pending login and clear the state cookie in one go. Clearing happens even when the
/// cookie is absent, tampered with or malformed.
pub fn take_state_cookie(
    jar: SignedCookieJar,
    domain: &str,
) -> (Option<PendingLogin>, SignedCookieJar) {
    let pending = jar
        .get(COOKIE_STATE)
        .and_then(|c| PendingLogin::decode(c.value()));
    (pending, jar.remove(removal_cookie(COOKIE_STATE, domain)))
}

pub fn add_session_cookie(jar: SignedCookieJar, token: &str, domain: &str) -> SignedCookieJar {
    let max_age = CookieDuration::seconds(
        i64::try_from(SESSION_LIFETIME.as_secs()).unwrap_or(i64::MAX),
    );
    jar.add(protected_cookie(
        COOKIE_SESSION,
        token.to_owned(),
        domain,
        max_age,
    ))
}

#[must_use]
pub fn session_token(jar: &SignedCookieJar) -> Option<String> {
    jar.get(COOKIE_SESSION).map(|c| c.value().to_owned())
}

pub fn remove_session_cookie(jar: SignedCookieJar, domain: &str) -> SignedCookieJar {
    jar.remove(removal_cookie(COOKIE_SESSION, domain))
}
