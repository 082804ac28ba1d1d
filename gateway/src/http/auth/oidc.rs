//! Identity provider client.
//!
//! [`IdentityProvider`] is the seam the login flow talks to; [`OidcProvider`] is the real
//! implementation on top of `openidconnect`. Discovery happens once, at startup. Everything that can
//! go wrong afterwards is reported as [`AuthRejected`], never as a raw provider error.

use core::{str::FromStr as _, time::Duration};

use async_trait::async_trait;
use eyre::{WrapErr as _, eyre};
use oauth2_reqwest::ReqwestClient;
use openidconnect::{
    AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointMaybeSet, EndpointNotSet,
    EndpointSet, IssuerUrl, Nonce, RedirectUrl, Scope,
    core::{CoreAuthenticationFlow, CoreClient, CoreIdToken, CoreProviderMetadata},
};
use reqwest::redirect::Policy;
use secrecy::ExposeSecret as _;
use thiserror::Error as ThisError;
use url::Url;

use crate::config::OidcConfig;

/// Why a login attempt was turned away. All variants end in a redirect back to `/auth`.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum AuthRejected {
    #[error("state cookie missing or malformed")]
    MissingState,
    #[error("state parameter does not match the state cookie")]
    StateMismatch,
    #[error("authorization attempt expired")]
    AttemptExpired,
    #[error("provider returned an error: {0}")]
    Provider(String),
    #[error("authorization code missing")]
    MissingCode,
    #[error("code exchange failed: {0}")]
    Exchange(String),
    #[error("token response carried no id token")]
    MissingIdToken,
    #[error("id token verification failed: {0}")]
    Verification(String),
    #[error("email claim missing or unverified")]
    Email,
}

/// Serialized ID token exactly as returned by the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawIdToken(pub String);

/// Claims of a verified ID token that the gateway relies on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedClaims {
    pub subject: String,
    pub email: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Authorization endpoint URL for one login attempt. `state` doubles as the OIDC nonce.
    fn authorization_url(&self, state: &str) -> Url;

    /// Trade an authorization code for the ID token of the token response.
    async fn exchange_code(&self, code: String) -> Result<RawIdToken, AuthRejected>;

    /// Check signature, issuer, audience, expiry and nonce, then extract the email claim.
    fn verify_id_token(
        &self,
        token: &RawIdToken,
        nonce: &str,
    ) -> Result<VerifiedClaims, AuthRejected>;
}

// Client type with the endpoints we require set
type OidcClientReady = CoreClient<
    EndpointSet,      // HasAuthUrl
    EndpointNotSet,   // HasDeviceAuthUrl
    EndpointNotSet,   // HasIntrospectionUrl
    EndpointNotSet,   // HasRevocationUrl
    EndpointSet,      // HasTokenUrl
    EndpointMaybeSet, // HasUserInfoUrl
>;

pub struct OidcProvider {
    client: OidcClientReady,
    http: reqwest::Client,
}

impl OidcProvider {
    /// Run provider discovery and build the client.
    ///
    /// # Errors
    ///
    /// Returns an error if the issuer or callback URL is invalid, discovery fails, or the provider
    /// does not advertise a token endpoint.
    #[tracing::instrument(skip_all, fields(issuer = %cfg.issuer))]
    pub async fn discover(cfg: &OidcConfig, timeout: Duration) -> eyre::Result<Self> {
        let http = reqwest::Client::builder()
            .redirect(Policy::none())
            .timeout(timeout)
            .build()
            .wrap_err("failed to build HTTP client")?;

        let issuer = IssuerUrl::new(cfg.issuer.clone()).wrap_err("invalid issuer URL")?;
        let provider_metadata =
            CoreProviderMetadata::discover_async(issuer, &ReqwestClient::from(http.clone()))
                .await
                .wrap_err("OIDC discovery failed")?;

        let client = CoreClient::from_provider_metadata(
            provider_metadata.clone(),
            ClientId::new(cfg.client_id.clone()),
            Some(ClientSecret::new(cfg.client_secret.expose_secret().to_owned())),
        )
        .set_auth_uri(provider_metadata.authorization_endpoint().clone())
        .set_redirect_uri(
            RedirectUrl::new(cfg.callback_url.clone()).wrap_err("invalid OIDC callback URL")?,
        );
        let client = if let Some(token_url) = provider_metadata.token_endpoint().cloned() {
            client.set_token_uri(token_url)
        } else {
            return Err(eyre!("OIDC provider missing token endpoint"));
        };

        tracing::info!("OIDC provider discovered");
        Ok(Self { client, http })
    }
}

#[async_trait]
impl IdentityProvider for OidcProvider {
    fn authorization_url(&self, state: &str) -> Url {
        let csrf = CsrfToken::new(state.to_owned());
        let nonce = Nonce::new(state.to_owned());
        let (url, _, _) = self
            .client
            .authorize_url(
                CoreAuthenticationFlow::AuthorizationCode,
                move || csrf,
                move || nonce,
            )
            .add_scope(Scope::new("email".to_owned()))
            .url();
        url
    }

    async fn exchange_code(&self, code: String) -> Result<RawIdToken, AuthRejected> {
        let response = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .request_async(&ReqwestClient::from(self.http.clone()))
            .await
            .map_err(|e| AuthRejected::Exchange(e.to_string()))?;
        response
            .extra_fields()
            .id_token()
            .map(|id| RawIdToken(id.to_string()))
            .ok_or(AuthRejected::MissingIdToken)
    }

    fn verify_id_token(
        &self,
        token: &RawIdToken,
        nonce: &str,
    ) -> Result<VerifiedClaims, AuthRejected> {
        let id_token = CoreIdToken::from_str(&token.0)
            .map_err(|e| AuthRejected::Verification(e.to_string()))?;
        let claims = id_token
            .claims(
                &self.client.id_token_verifier(),
                &Nonce::new(nonce.to_owned()),
            )
            .map_err(|e| AuthRejected::Verification(e.to_string()))?;

        if claims.email_verified() == Some(false) {
            return Err(AuthRejected::Email);
        }
        let email = claims.email().ok_or(AuthRejected::Email)?;

        Ok(VerifiedClaims {
            subject: claims.subject().as_str().to_owned(),
            email: email.as_str().to_owned(),
        })
    }
}
