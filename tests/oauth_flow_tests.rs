use std::time::Duration;

use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tempfile::TempDir;

// Tiny stand-in for the identity provider: a token endpoint and a userinfo
// endpoint on an ephemeral port. `fail_token` makes the code exchange bounce.
async fn start_mock_provider(fail_token: bool) -> String {
    let app = Router::new()
        .route(
            "/token",
            post(move || async move {
                if fail_token {
                    (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid_grant"})))
                } else {
                    (
                        StatusCode::OK,
                        Json(json!({"access_token": "tok-1", "token_type": "Bearer"})),
                    )
                }
            }),
        )
        .route(
            "/userinfo",
            get(|headers: HeaderMap| async move {
                let ok = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v == "Bearer tok-1")
                    .unwrap_or(false);
                if ok {
                    (StatusCode::OK, Json(json!({"id": "g-42", "name": "Zed"})))
                } else {
                    (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad token"})))
                }
            }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind provider");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            eprintln!("mock provider task error: {e:?}");
        }
    });
    format!("http://{}", addr)
}

// Start the app with Google sign-in pointed at the mock provider.
async fn start_http_with_google(tmp: &TempDir, provider_base: &str) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind 127.0.0.1:0");
    let addr = listener.local_addr().unwrap();

    let mut google = confide::config::GoogleConfig::new(
        "cid-1".into(),
        "cs-1".into(),
        format!("http://{}/auth/google/secrets", addr),
    );
    google.auth_url = format!("{provider_base}/authorize");
    google.token_url = format!("{provider_base}/token");
    google.userinfo_url = format!("{provider_base}/userinfo");

    let cfg = confide::config::Config {
        db_root: tmp.path().to_string_lossy().to_string(),
        session_ttl: Duration::from_secs(3600),
        google: Some(google),
        ..Default::default()
    };
    let state = confide::server::AppState::new(&cfg).expect("init AppState");
    let app = confide::server::router(state);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            eprintln!("http server task error: {e:?}");
        }
    });
    format!("http://{}", addr)
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .cookie_store(true)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

fn location(resp: &reqwest::Response) -> &str {
    resp.headers().get("location").and_then(|v| v.to_str().ok()).unwrap_or("")
}

fn state_param(consent_url: &str) -> String {
    consent_url
        .split("state=")
        .nth(1)
        .and_then(|rest| rest.split('&').next())
        .expect("state param present")
        .to_string()
}

#[tokio::test]
async fn full_oauth_flow_is_idempotent_across_logins() {
    let tmp = tempfile::tempdir().unwrap();
    let provider = start_mock_provider(false).await;
    let base = start_http_with_google(&tmp, &provider).await;

    for round in 0..2 {
        let c = client();
        let resp = c.get(format!("{base}/auth/google")).send().await.unwrap();
        assert_eq!(resp.status(), 303);
        let consent = location(&resp).to_string();
        assert!(consent.starts_with(&format!("{provider}/authorize?")), "round {round}: {consent}");
        assert!(consent.contains("scope=profile"));

        // Provider "redirects back" with a code and the same state
        let st = state_param(&consent);
        let resp = c
            .get(format!("{base}/auth/google/secrets?code=code-xyz&state={st}"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 303, "round {round}");
        assert_eq!(location(&resp), "/secrets");

        // The issued session is live
        let resp = c.get(format!("{base}/submit")).send().await.unwrap();
        assert_eq!(resp.status(), 200, "round {round}");
    }

    // Same external profile id both times: exactly one record
    let store = confide::storage::Store::new(tmp.path()).unwrap();
    assert_eq!(store.user_count().unwrap(), 1);
    let user = store.find_by_google_id("g-42").unwrap().unwrap();
    assert!(user.username.is_none());
    assert!(user.password_hash.is_none());
}

#[tokio::test]
async fn oauth_user_can_submit_a_secret() {
    let tmp = tempfile::tempdir().unwrap();
    let provider = start_mock_provider(false).await;
    let base = start_http_with_google(&tmp, &provider).await;
    let c = client();

    let resp = c.get(format!("{base}/auth/google")).send().await.unwrap();
    let st = state_param(location(&resp));
    c.get(format!("{base}/auth/google/secrets?code=code-xyz&state={st}"))
        .send()
        .await
        .unwrap();

    let resp = c
        .post(format!("{base}/submit"))
        .form(&[("secret", "from a federated account")])
        .send()
        .await
        .unwrap();
    assert_eq!(location(&resp), "/secrets");

    let body = reqwest::get(format!("{base}/secrets")).await.unwrap().text().await.unwrap();
    assert!(body.contains("from a federated account"));
}

#[tokio::test]
async fn callback_with_unknown_state_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let provider = start_mock_provider(false).await;
    let base = start_http_with_google(&tmp, &provider).await;
    let c = client();

    let resp = c
        .get(format!("{base}/auth/google/secrets?code=code-xyz&state=bogus"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 303);
    assert_eq!(location(&resp), "/login");

    let store = confide::storage::Store::new(tmp.path()).unwrap();
    assert_eq!(store.user_count().unwrap(), 0);
}

#[tokio::test]
async fn state_tokens_are_single_use() {
    let tmp = tempfile::tempdir().unwrap();
    let provider = start_mock_provider(false).await;
    let base = start_http_with_google(&tmp, &provider).await;
    let c = client();

    let resp = c.get(format!("{base}/auth/google")).send().await.unwrap();
    let st = state_param(location(&resp));

    let resp = c
        .get(format!("{base}/auth/google/secrets?code=code-xyz&state={st}"))
        .send()
        .await
        .unwrap();
    assert_eq!(location(&resp), "/secrets");

    // Replaying the same state is refused
    let resp = c
        .get(format!("{base}/auth/google/secrets?code=code-xyz&state={st}"))
        .send()
        .await
        .unwrap();
    assert_eq!(location(&resp), "/login");
}

#[tokio::test]
async fn provider_rejection_redirects_to_login() {
    let tmp = tempfile::tempdir().unwrap();
    let provider = start_mock_provider(true).await;
    let base = start_http_with_google(&tmp, &provider).await;
    let c = client();

    let resp = c.get(format!("{base}/auth/google")).send().await.unwrap();
    let st = state_param(location(&resp));
    let resp = c
        .get(format!("{base}/auth/google/secrets?code=code-xyz&state={st}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 303);
    assert_eq!(location(&resp), "/login");

    let store = confide::storage::Store::new(tmp.path()).unwrap();
    assert_eq!(store.user_count().unwrap(), 0);
}

#[tokio::test]
async fn consent_denial_redirects_to_login() {
    let tmp = tempfile::tempdir().unwrap();
    let provider = start_mock_provider(false).await;
    let base = start_http_with_google(&tmp, &provider).await;
    let c = client();

    let resp = c
        .get(format!("{base}/auth/google/secrets?error=access_denied"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 303);
    assert_eq!(location(&resp), "/login");
}
