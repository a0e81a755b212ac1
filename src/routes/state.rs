use chrono::Duration;
use std::sync::Arc;

use crate::{
    clock::Clock,
    config::Config,
    db::{Storage, TtlCache, TtlTable},
    error::AppResult,
    services::{
        providers::{CachedProvider, MetadataProvider},
        ContentVectorizer, RecommendationCache, RecommendationGenerator, SimilarityIndex,
        WatchlistStore,
    },
};

/// Shared application state
///
/// Every component is owned here and handed to handlers by reference; there
/// is no ambient global state.
#[derive(Clone)]
pub struct AppState {
    pub watchlist: Arc<WatchlistStore>,
    pub recommendations: Arc<RecommendationCache>,
    pub index: Arc<SimilarityIndex>,
    pub cache: Arc<TtlCache>,
    /// Cache-backed provider; handlers never call the upstream directly
    pub provider: Arc<dyn MetadataProvider>,
}

impl AppState {
    /// Wires the components together, loading persisted state from `storage`
    pub async fn build(
        config: &Config,
        storage: Arc<dyn Storage>,
        upstream: Arc<dyn MetadataProvider>,
        clock: Arc<dyn Clock>,
    ) -> AppResult<Self> {
        let cache = Arc::new(
            TtlCache::load(storage.clone(), clock.clone(), TtlTable::from_config(config)).await,
        );
        let watchlist = Arc::new(WatchlistStore::load(storage.clone(), clock.clone()).await?);
        let index = Arc::new(SimilarityIndex::new(
            ContentVectorizer::default(),
            clock.clone(),
            config.index_max_size,
        ));

        let generator = RecommendationGenerator::new(watchlist.clone(), index.clone(), clock.clone());
        let recommendations = RecommendationCache::load(
            generator,
            cache.clone(),
            storage,
            clock,
            watchlist.subscribe(),
        )
        .await?
        .with_horizon(Duration::seconds(config.recommendations_ttl_secs));

        let provider: Arc<dyn MetadataProvider> =
            Arc::new(CachedProvider::new(upstream, cache.clone()));

        Ok(Self {
            watchlist,
            recommendations: Arc::new(recommendations),
            index,
            cache,
            provider,
        })
    }
}
