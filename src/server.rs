//!
//! confide HTTP server
//! -------------------
//! This module defines the Axum-based HTTP surface of the app.
//!
//! Responsibilities:
//! - Session transport via an opaque HttpOnly cookie.
//! - Local login/registration endpoints backed by the `security` module.
//! - Google OAuth2 redirect and callback endpoints with server-side
//!   anti-forgery state tokens.
//! - The public secrets listing and the auth-gated submit endpoints.
//! - The route-boundary error policy: every failure is logged and answered
//!   with a redirect to a safe page, never a raw error.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Form, Router};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::identity::{
    gen_token, Attrs, Authenticator, AuthorizationCode, Credentials, GoogleAuthenticator,
    GoogleOAuth, LocalAuthenticator, Principal, SessionManager,
};
use crate::pages;
use crate::storage::{SharedStore, User};

pub const SESSION_COOKIE: &str = "confide_session";

/// In-flight provider redirects are abandoned after this long.
const OAUTH_STATE_TTL: Duration = Duration::from_secs(600);

/// Shared server state injected into all handlers.
///
/// Holds the user store handle, the session manager, the authenticator
/// strategies, and the pending OAuth state tokens. Everything is created at
/// startup and torn down with the process; nothing is process-global.
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub sessions: Arc<SessionManager>,
    pub local: Arc<LocalAuthenticator>,
    /// Absent when no provider credentials are configured.
    pub google: Option<Arc<GoogleAuthenticator>>,
    /// state token -> issue time, consumed exactly once by the callback
    oauth_states: Arc<RwLock<HashMap<String, Instant>>>,
}

impl AppState {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let store = SharedStore::new(&cfg.db_root)
            .with_context(|| format!("While opening user store under: {}", cfg.db_root))?;
        let sessions = Arc::new(SessionManager::new(cfg.session_ttl));
        let local = Arc::new(LocalAuthenticator::new(store.clone()));
        let google = match &cfg.google {
            Some(g) => Some(Arc::new(GoogleAuthenticator::new(
                GoogleOAuth::new(g.clone())?,
                store.clone(),
            ))),
            None => None,
        };
        Ok(Self {
            store,
            sessions,
            local,
            google,
            oauth_states: Arc::new(RwLock::new(HashMap::new())),
        })
    }
}

/// Mount all routes onto a router carrying the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/login", get(login_page).post(login_submit))
        .route("/register", get(register_page).post(register_submit))
        .route("/secrets", get(secrets_page))
        .route("/logout", get(logout))
        .route("/auth/google", get(google_redirect))
        .route("/auth/google/secrets", get(google_callback))
        .route("/submit", get(submit_page).post(submit_secret))
        .with_state(state)
}

/// Start the HTTP server and serve until a shutdown signal arrives.
pub async fn run(cfg: Config) -> anyhow::Result<()> {
    let state = AppState::new(&cfg)?;
    let app = router(state);
    let addr: SocketAddr = format!("0.0.0.0:{}", cfg.http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        return;
    }
    info!("Shutdown signal received, stopping server");
}

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookie = headers.get("cookie").or_else(|| headers.get("Cookie"))?;
    let s = cookie.to_str().ok()?;
    for part in s.split(';') {
        let p = part.trim();
        if let Some(eq) = p.find('=') {
            let (k, v) = p.split_at(eq);
            if k == name {
                return Some(v[1..].to_string());
            }
        }
    }
    None
}

// SameSite=Lax so the cookie survives the provider's top-level redirect back
fn set_session_cookie(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("{}={}; HttpOnly; SameSite=Lax; Path=/", SESSION_COOKIE, token))
        .unwrap()
}

fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_str(&format!(
        "{}=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; SameSite=Lax; Path=/",
        SESSION_COOKIE
    ))
    .unwrap()
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    let fwd = headers.get("x-forwarded-for")?.to_str().ok()?;
    fwd.split(',').next().map(|s| s.trim().to_string())
}

/// Restore the authenticated principal from the session cookie, if any.
fn current_principal(state: &AppState, headers: &HeaderMap) -> Option<Principal> {
    let token = parse_cookie(headers, SESSION_COOKIE)?;
    state.sessions.resolve(&token)
}

/// Route-boundary error policy: log, then redirect to a safe page.
fn fail_redirect(op: &str, err: &anyhow::Error, target: &str) -> Response {
    match err.downcast_ref::<AppError>() {
        Some(app) => error!(target: "confide::http", "{} failed: {}", op, app),
        None => error!(target: "confide::http", "{} failed: {:#}", op, err),
    }
    Redirect::to(target).into_response()
}

/// Issue a session for a freshly authenticated user and send them on.
fn start_session(state: &AppState, user: &User, ip: Option<String>, dest: &str) -> Response {
    let principal = Principal { user_id: user.id.clone(), attrs: Attrs { ip } };
    let session = state.sessions.issue(principal);
    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, set_session_cookie(&session.token));
    (headers, Redirect::to(dest)).into_response()
}

async fn home() -> Html<String> {
    Html(pages::home())
}

async fn login_page() -> Html<String> {
    Html(pages::login())
}

async fn register_page() -> Html<String> {
    Html(pages::register())
}

#[derive(Debug, Deserialize)]
struct CredentialForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

async fn login_submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<CredentialForm>,
) -> Response {
    let creds = Credentials { username: form.username, password: form.password };
    match state.local.authenticate(&creds).await {
        Ok(user) => start_session(&state, &user, client_ip(&headers), "/secrets"),
        Err(e) => fail_redirect("login", &e, "/login"),
    }
}

async fn register_submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<CredentialForm>,
) -> Response {
    match crate::security::register(&state.store, &form.username, &form.password) {
        Ok(user) => start_session(&state, &user, client_ip(&headers), "/secrets"),
        Err(e) => fail_redirect("register", &e, "/register"),
    }
}

/// Public: every user with a non-null secret, in store order.
async fn secrets_page(State(state): State<AppState>) -> Response {
    let listed = { state.store.0.lock().users_with_secrets() };
    match listed {
        Ok(users) => Html(pages::secrets(&users)).into_response(),
        Err(e) => fail_redirect("secrets", &e, "/"),
    }
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = parse_cookie(&headers, SESSION_COOKIE) {
        state.sessions.destroy(&token);
    }
    let mut h = HeaderMap::new();
    h.insert(header::SET_COOKIE, clear_session_cookie());
    (h, Redirect::to("/")).into_response()
}

async fn google_redirect(State(state): State<AppState>) -> Response {
    let Some(google) = state.google.as_ref() else {
        warn!(target: "confide::http", "Google sign-in requested but no provider is configured");
        return Redirect::to("/login").into_response();
    };
    let st = gen_token();
    {
        let mut states = state.oauth_states.write().await;
        states.retain(|_, issued| issued.elapsed() < OAUTH_STATE_TTL);
        states.insert(st.clone(), Instant::now());
    }
    Redirect::to(&google.authorize_url(&st)).into_response()
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

async fn google_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<CallbackQuery>,
) -> Response {
    let Some(google) = state.google.as_ref() else {
        return Redirect::to("/login").into_response();
    };
    if let Some(denied) = q.error {
        warn!(target: "confide::http", "provider callback reported: {}", denied);
        return Redirect::to("/login").into_response();
    }
    let (Some(code), Some(st)) = (q.code, q.state) else {
        warn!(target: "confide::http", "provider callback missing code or state");
        return Redirect::to("/login").into_response();
    };
    let fresh = {
        let mut states = state.oauth_states.write().await;
        states.remove(&st).map(|issued| issued.elapsed() < OAUTH_STATE_TTL).unwrap_or(false)
    };
    if !fresh {
        warn!(target: "confide::http", "provider callback with unknown or expired state");
        return Redirect::to("/login").into_response();
    }
    match google.authenticate(&AuthorizationCode(code)).await {
        Ok(user) => start_session(&state, &user, client_ip(&headers), "/secrets"),
        Err(e) => fail_redirect("oauth_callback", &e, "/login"),
    }
}

async fn submit_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if current_principal(&state, &headers).is_none() {
        return Redirect::to("/login").into_response();
    }
    Html(pages::submit()).into_response()
}

#[derive(Debug, Deserialize)]
struct SecretForm {
    #[serde(default)]
    secret: String,
}

async fn submit_secret(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<SecretForm>,
) -> Response {
    let Some(principal) = current_principal(&state, &headers) else {
        return Redirect::to("/login").into_response();
    };
    let result = { state.store.0.lock().set_secret(&principal.user_id, form.secret.trim()) };
    match result {
        Ok(_) => Redirect::to("/secrets").into_response(),
        Err(e) => {
            let target =
                e.downcast_ref::<AppError>().map(|a| a.redirect_target()).unwrap_or("/");
            fail_redirect("submit", &e, target)
        }
    }
}
