mod config;
mod error;
mod fallback;
mod features;
mod journal;
mod model;
mod predict;
mod scale;
mod web;

use std::sync::Arc;
use tracing::info;

use crate::config::{Config, LogConfig};
use crate::model::ModelLoader;
use crate::predict::Predictor;
use crate::web::server::WebServer;

const DEFAULT_LOG_FILTER: &str = "trust_rater=info,tower_http=info";

fn init_tracing(log: &LogConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(log.level.as_deref().unwrap_or(DEFAULT_LOG_FILTER))
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "trust-rater.toml".to_string());

    let mut config = Config::load(&config_path)?;

    // Initialize tracing
    init_tracing(&config.log);

    info!("⭐ trust-rater v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Config loaded from {}", config_path);
    config.apply_env_overrides();

    // Load the model once; failures leave the process on fallback scoring
    let loaded = ModelLoader::new(&config.model).load();
    info!(
        "📊 Model status: {}",
        if loaded.is_loaded() { "loaded" } else { "using fallback" }
    );

    let predictor = Arc::new(Predictor::new(loaded, &config.journal));
    let config = Arc::new(config);

    let web = WebServer::new(predictor, config);
    web.run().await
}
