use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use newsdrip::aggregator::Aggregator;
use newsdrip::cache::NewsCache;
use newsdrip::config::Config;
use newsdrip::routes::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "newsdrip=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path =
        std::env::var("NEWSDRIP_CONFIG").unwrap_or_else(|_| "news.toml".to_string());
    let config = Config::load(&config_path)?;
    info!(
        "Loaded {} sources from {}",
        config.sources.len(),
        config_path
    );

    let aggregator = Aggregator::from_config(&config)?;
    let cache = NewsCache::new(Arc::new(aggregator), config.cache_ttl());

    // Warm the cache so the first visitor doesn't wait on every feed
    if config.prefetch_on_startup {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache.prefetch().await;
        });
    }

    let app = routes::router(Arc::new(AppState { cache }));

    // Start server
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("Server starting on http://localhost:{}", port);

    axum::serve(listener, app).await?;

    Ok(())
}
