use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use toptabs_api::{router, AppState};
use toptabs_common::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("toptabs=info".parse()?);
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = Config::from_env().context("Invalid configuration")?;
    let refresher = toptabs_scraper::build_refresher(&config)?;
    let state = AppState::new(Arc::new(refresher));

    let app = router(state, &config.static_dir);

    let addr = format!("{}:{}", config.web_host, config.web_port);
    info!(
        cache = %config.cache_path().display(),
        static_dir = %config.static_dir.display(),
        "Top tabs API starting on {addr}"
    );
    info!("Open http://{addr}/index.html");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}
