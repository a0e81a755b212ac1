use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;

use crate::{
    cached,
    db::cache::{CacheKey, TtlCache, TMDB_NAMESPACE, WATCH_PROVIDERS_NAMESPACE},
    error::AppResult,
    models::{ContentMetadata, MediaType, Title},
    services::providers::{InFlight, MetadataProvider},
};

/// Serves provider calls from the TTL cache, falling through to the wrapped
/// provider on a miss. Identical concurrent misses share one upstream request.
pub struct CachedProvider {
    inner: Arc<dyn MetadataProvider>,
    cache: Arc<TtlCache>,
    metadata_flights: InFlight<ContentMetadata>,
    similar_flights: InFlight<Vec<Title>>,
    provider_flights: InFlight<Vec<String>>,
}

impl CachedProvider {
    pub fn new(inner: Arc<dyn MetadataProvider>, cache: Arc<TtlCache>) -> Self {
        Self {
            inner,
            cache,
            metadata_flights: InFlight::new(),
            similar_flights: InFlight::new(),
            provider_flights: InFlight::new(),
        }
    }

    fn key(namespace: &str, operation: &str, id: u64, media_type: MediaType) -> CacheKey {
        CacheKey::derive(
            namespace,
            &[
                ("op", operation.to_string()),
                ("id", id.to_string()),
                ("type", media_type.to_string()),
            ],
        )
    }

    async fn fetch_through<T, Fut>(
        &self,
        flights: &InFlight<T>,
        key: CacheKey,
        fetch: Fut,
    ) -> AppResult<T>
    where
        T: Clone + Serialize + DeserializeOwned,
        Fut: Future<Output = AppResult<T>>,
    {
        flights
            .run(key.as_str(), || async {
                let result: AppResult<T> = cached!(self.cache, key, fetch);
                result
            })
            .await
    }
}

#[async_trait::async_trait]
impl MetadataProvider for CachedProvider {
    async fn fetch_metadata(&self, id: u64, media_type: MediaType) -> AppResult<ContentMetadata> {
        let key = Self::key(TMDB_NAMESPACE, "metadata", id, media_type);
        self.fetch_through(
            &self.metadata_flights,
            key,
            self.inner.fetch_metadata(id, media_type),
        )
        .await
    }

    async fn fetch_similar(&self, id: u64, media_type: MediaType) -> AppResult<Vec<Title>> {
        let key = Self::key(TMDB_NAMESPACE, "similar", id, media_type);
        self.fetch_through(
            &self.similar_flights,
            key,
            self.inner.fetch_similar(id, media_type),
        )
        .await
    }

    async fn fetch_providers(&self, id: u64, media_type: MediaType) -> AppResult<Vec<String>> {
        let key = Self::key(WATCH_PROVIDERS_NAMESPACE, "providers", id, media_type);
        self.fetch_through(
            &self.provider_flights,
            key,
            self.inner.fetch_providers(id, media_type),
        )
        .await
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}
