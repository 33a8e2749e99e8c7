use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Honor a .env file in development before anything reads the environment
    dotenvy::dotenv().ok();

    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    fmt().with_env_filter(filter).init();

    let cfg = confide::config::Config::from_env();

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "startup",
        "Confide starting: RUST_LOG='{}', http_port={}, db_root='{}', session_ttl_secs={}, google_sign_in={}",
        rust_log,
        cfg.http_port,
        cfg.db_root,
        cfg.session_ttl.as_secs(),
        cfg.google.is_some()
    );

    confide::server::run(cfg).await
}
