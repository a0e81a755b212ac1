use std::sync::Arc;
use std::time::Duration;

use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use marquee::{
    clock::{Clock, SystemClock},
    config::{Config, StorageBackend},
    db::{create_redis_client, MemoryStorage, RedisStorage, Storage, TtlCache},
    routes::{create_router, AppState},
    services::{providers::TmdbProvider, RecommendationCache},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("marquee=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;

    let storage: Arc<dyn Storage> = match config.storage_backend {
        StorageBackend::Memory => Arc::new(MemoryStorage::new()),
        StorageBackend::Redis => {
            let client = create_redis_client(&config.redis_url)?;
            Arc::new(RedisStorage::new(client))
        }
    };
    tracing::info!(backend = storage.name(), "Storage initialized");

    if config.tmdb_api_key.is_empty() {
        tracing::warn!("TMDB_API_KEY is not set, metadata requests will fail");
    }
    let upstream = Arc::new(TmdbProvider::new(
        config.tmdb_api_key.clone(),
        config.tmdb_api_url.clone(),
    ));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let state = AppState::build(&config, storage, upstream, clock).await?;
    spawn_maintenance(
        state.cache.clone(),
        state.recommendations.clone(),
        Duration::from_secs(config.maintenance_interval_secs.max(1)),
    );

    let app = create_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Periodically sweeps expired cache entries and prunes old dismissals
fn spawn_maintenance(
    cache: Arc<TtlCache>,
    recommendations: Arc<RecommendationCache>,
    period: Duration,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // The first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            let swept = cache.sweep_expired().await;
            match recommendations.prune_dismissed().await {
                Ok(pruned) => {
                    tracing::info!(swept = swept, pruned = pruned, "Maintenance completed")
                }
                Err(e) => tracing::warn!(error = %e, swept = swept, "Dismissal pruning failed"),
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
