mod auth;
mod config;
mod error;
mod history;
mod llm;
mod models;
mod normalize;
mod prompt;
mod routes;
mod service;
mod weather;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, EnvFilter};

use crate::{
    auth::UserStore,
    config::Config,
    history::InMemoryHistoryStore,
    llm::ChatCompletionClient,
    normalize::ResponseNormalizer,
    routes::AppState,
    service::RecommendationService,
    weather::{OpenWeatherClient, WeatherLookup},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        "🔑 Model key loaded: {}... (model {})",
        config.llm_api_key.chars().take(6).collect::<String>(),
        config.llm_model
    );

    let weather: Option<Arc<dyn WeatherLookup>> = match &config.weather_api_key {
        Some(key) => Some(Arc::new(OpenWeatherClient::new(
            key.clone(),
            config.weather_api_base.clone(),
            config.llm_timeout,
        ))),
        None => {
            tracing::warn!("WEATHER_API_KEY not set, live weather lookups disabled");
            None
        }
    };

    let service = RecommendationService::new(
        Arc::new(ChatCompletionClient::new(config.llm_api_base.clone())),
        weather,
        ResponseNormalizer::new(config.repair),
        config.call_options(),
    );
    let state = AppState {
        service: Arc::new(service),
        history: Arc::new(InMemoryHistoryStore::default()),
        users: Arc::new(UserStore::new(config.session_ttl)),
    };

    let app = routes::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "🚀 Starting server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
}
