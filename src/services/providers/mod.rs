//! Metadata provider abstraction
//!
//! The recommendation core only needs three things from the outside world:
//! metadata for a title, titles similar to a title, and the services a title
//! streams on. `TmdbProvider` talks to TMDB; `CachedProvider` decorates any
//! provider with the TTL cache and in-flight de-duplication.

use crate::{
    error::AppResult,
    models::{ContentMetadata, MediaType, Title},
};

pub mod cached;
mod in_flight;
pub mod tmdb;

pub use cached::CachedProvider;
pub use in_flight::InFlight;
pub use tmdb::TmdbProvider;

/// Trait for metadata providers
///
/// Timeouts and retries are the provider's concern. Callers treat any error
/// as "no data for this title".
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Fetch descriptive metadata for one title
    async fn fetch_metadata(&self, id: u64, media_type: MediaType) -> AppResult<ContentMetadata>;

    /// Fetch titles the provider considers similar; the candidate pool for
    /// recommendations
    async fn fetch_similar(&self, id: u64, media_type: MediaType) -> AppResult<Vec<Title>>;

    /// Fetch the streaming services a title is available on
    async fn fetch_providers(&self, id: u64, media_type: MediaType) -> AppResult<Vec<String>>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}
