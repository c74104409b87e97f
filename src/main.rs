mod config;
mod localizer;
mod models;
mod openai;
mod presenter;
mod prompt;
mod routes;
mod session;
mod stylist;
mod tagger;
mod wardrobe;

use anyhow::Context as _;
use routes::{router, AppState};
use std::net::SocketAddr;
use tracing_subscriber::{fmt, EnvFilter};
use std::sync::Arc;

use crate::config::{AppConfig, EnvCredentials};
use crate::session::SessionStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = AppConfig::from_env(&EnvCredentials).context("invalid configuration")?;
    let (stylist, tagger) = config.build(&EnvCredentials).context("could not set up the stylist")?;
    tracing::info!(
        generation = ?config.generation,
        captioning = tagger.is_captioning(),
        localization = stylist.localizes(),
        "Stylist capabilities configured"
    );
    let state = AppState {
        sessions: SessionStore::with_ttl(config.session_ttl),
        stylist: Arc::new(stylist),
        tagger: Arc::new(tagger),
    };

    let app = router(state);

    let addr = SocketAddr::from(([0,0,0,0], config.port));
    tracing::info!(%addr, model = %config.model, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("could not bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
