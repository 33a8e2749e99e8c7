//! Google OAuth2 bridge: consent URL construction, authorization-code
//! exchange, and profile resolution against the user store.

use anyhow::Result;
use serde::Deserialize;
use tracing::debug;

use super::provider::{Authenticator, AuthorizationCode};
use crate::config::GoogleConfig;
use crate::error::AppError;
use crate::storage::{SharedStore, User};

/// Stable profile as returned by the userinfo endpoint. Only `id` matters:
/// it is the key records are created and looked up under.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleProfile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Client for the provider's authorization, token and userinfo endpoints.
#[derive(Clone)]
pub struct GoogleOAuth {
    cfg: GoogleConfig,
    http: reqwest::Client,
}

impl GoogleOAuth {
    pub fn new(cfg: GoogleConfig) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self { cfg, http })
    }

    /// Consent-screen URL for the authorization-code grant, scope `profile`,
    /// carrying the caller's anti-forgery state token.
    pub fn authorize_url(&self, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope=profile&state={}",
            self.cfg.auth_url,
            urlencoding::encode(&self.cfg.client_id),
            urlencoding::encode(&self.cfg.callback_url),
            urlencoding::encode(state),
        )
    }

    /// Exchange an authorization code for the stable profile id: POST the
    /// code grant to the token endpoint, then fetch userinfo with the bearer
    /// token. Every failure maps to a `Provider` error.
    pub async fn exchange_code(&self, code: &str) -> Result<GoogleProfile> {
        let resp = self
            .http
            .post(&self.cfg.token_url)
            .form(&[
                ("code", code),
                ("client_id", self.cfg.client_id.as_str()),
                ("client_secret", self.cfg.client_secret.as_str()),
                ("redirect_uri", self.cfg.callback_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| AppError::provider("token_request_failed", e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let detail: serde_json::Value =
                resp.json().await.unwrap_or_else(|_| serde_json::json!({}));
            return Err(AppError::provider(
                "token_exchange_rejected",
                format!("token endpoint answered HTTP {}: {}", status, detail),
            )
            .into());
        }
        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| AppError::provider("token_response_invalid", e.to_string()))?;

        let resp = self
            .http
            .get(&self.cfg.userinfo_url)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(|e| AppError::provider("userinfo_request_failed", e.to_string()))?;
        if !resp.status().is_success() {
            return Err(AppError::provider(
                "userinfo_rejected",
                format!("userinfo endpoint answered HTTP {}", resp.status()),
            )
            .into());
        }
        let profile: GoogleProfile = resp
            .json()
            .await
            .map_err(|e| AppError::provider("userinfo_response_invalid", e.to_string()))?;
        if profile.id.is_empty() {
            return Err(AppError::provider("userinfo_missing_id", "profile has no id").into());
        }
        debug!(target: "confide::oauth", "exchange complete for profile id");
        Ok(profile)
    }
}

/// Authorization-code strategy: exchange with the provider, then
/// find-or-create the federated account.
pub struct GoogleAuthenticator {
    oauth: GoogleOAuth,
    store: SharedStore,
}

impl GoogleAuthenticator {
    pub fn new(oauth: GoogleOAuth, store: SharedStore) -> Self {
        Self { oauth, store }
    }

    pub fn authorize_url(&self, state: &str) -> String {
        self.oauth.authorize_url(state)
    }
}

impl Authenticator for GoogleAuthenticator {
    type Request = AuthorizationCode;

    async fn authenticate(&self, req: &AuthorizationCode) -> Result<User> {
        let profile = self.oauth.exchange_code(&req.0).await?;
        let guard = self.store.0.lock();
        guard.find_or_create_by_google_id(&profile.id)
    }
}
