mod config;
mod error;
mod gate;
mod gemini;
mod models;
mod prompts;
mod repair;
mod retry;
mod routes;
mod schema;
mod studio;
mod trust;
mod validate;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;
use crate::gemini::GeminiBackend;
use crate::routes::AppState;
use crate::studio::Studio;
use crate::trust::{AccessVerifier, TrustVerifier};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = Config::from_env();
    match &config.api_key {
        Some(key) => tracing::info!(
            "Using server API key: {}...",
            &key[..std::cmp::min(6, key.len())]
        ),
        None => tracing::info!("No server API key configured; callers must supply their own"),
    }

    let verifier: Option<Arc<dyn TrustVerifier>> = config
        .trust
        .clone()
        .map(|trust| Arc::new(AccessVerifier::new(trust)) as Arc<dyn TrustVerifier>);
    if verifier.is_some() {
        tracing::info!("Trust-assertion bypass enabled");
    }

    let backend = Arc::new(GeminiBackend::new(&config));
    let port = config.port;
    let state = AppState {
        studio: Arc::new(Studio::new(config, backend, verifier)),
    };

    let app = Router::new()
        .route("/api/analyze", post(routes::analyze))
        .route("/api/plan", post(routes::plan))
        .route("/api/image", post(routes::generate_image))
        .route("/api/image/reference", post(routes::generate_from_reference))
        .route("/api/prompt/regenerate", post(routes::regenerate_prompt))
        .route("/api/credential", get(routes::credential_status))
        .route("/health", get(routes::health))
        .layer(
            ServiceBuilder::new().layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "🚀 Starting Campaign Studio");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .await
        .context("server exited with error")?;
    Ok(())
}
