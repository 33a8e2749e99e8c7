//! Runtime configuration, read once from the environment at startup.
//! A `.env` file is honored in development (loaded by main before this runs).

use std::time::Duration;

use tracing::warn;

pub const DEFAULT_HTTP_PORT: u16 = 3000;
pub const DEFAULT_DB_FOLDER: &str = "dbs";
pub const DEFAULT_SESSION_TTL_SECS: u64 = 3600;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// Credentials and endpoints for the Google OAuth2 integration.
/// Endpoint URLs are plain fields so tests can point them at a local mock.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

impl GoogleConfig {
    pub fn new(client_id: String, client_secret: String, callback_url: String) -> Self {
        Self {
            client_id,
            client_secret,
            callback_url,
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            userinfo_url: GOOGLE_USERINFO_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    /// Data root for the user store (the "connection string" of this app).
    pub db_root: String,
    /// Idle lifetime of a session; every resolved request slides it forward.
    pub session_ttl: Duration,
    /// Absent when the provider credentials are not configured; the
    /// /auth/google routes then degrade to a logged redirect.
    pub google: Option<GoogleConfig>,
}

impl Config {
    pub fn from_env() -> Self {
        let http_port = std::env::var("CONFIDE_HTTP_PORT")
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(DEFAULT_HTTP_PORT);
        let db_root =
            std::env::var("CONFIDE_DB_FOLDER").unwrap_or_else(|_| DEFAULT_DB_FOLDER.to_string());
        let ttl_secs = std::env::var("CONFIDE_SESSION_TTL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_SESSION_TTL_SECS);

        let client_id = std::env::var("GOOGLE_CLIENT_ID").unwrap_or_default();
        let client_secret = std::env::var("GOOGLE_CLIENT_SECRET").unwrap_or_default();
        let callback_url = std::env::var("GOOGLE_CALLBACK_URL")
            .unwrap_or_else(|_| format!("http://localhost:{}/auth/google/secrets", http_port));
        let google = if client_id.is_empty() || client_secret.is_empty() {
            warn!(
                target: "startup",
                "GOOGLE_CLIENT_ID/GOOGLE_CLIENT_SECRET not set; Google sign-in disabled"
            );
            None
        } else {
            Some(GoogleConfig::new(client_id, client_secret, callback_url))
        };

        Self { http_port, db_root, session_ttl: Duration::from_secs(ttl_secs), google }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            db_root: DEFAULT_DB_FOLDER.to_string(),
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            google: None,
        }
    }
}
