use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{GenreId, MediaType, TitleKey};

/// Genre id → signed accumulated preference score
pub type GenreAffinityMap = BTreeMap<GenreId, i64>;

/// One row of a ranked genre list
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GenreScore {
    pub genre_id: GenreId,
    pub score: i64,
}

/// Which branch of the generator produced a candidate
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationSource {
    Similar,
    Genre,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationItem {
    pub id: u64,
    pub media_type: MediaType,
    pub title: String,
    pub poster_path: Option<String>,
    pub genre_ids: Vec<GenreId>,
    pub vote_average: f64,
    pub score: f64,
    pub source: RecommendationSource,
    pub reason: String,
}

impl RecommendationItem {
    pub fn key(&self) -> TitleKey {
        TitleKey::new(self.id, self.media_type)
    }
}

/// Inputs a cached recommendation list was derived from
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationBasis {
    pub affinity: GenreAffinityMap,
    pub liked_ids: Vec<TitleKey>,
    /// Watchlist revision read before generation started
    #[serde(default)]
    pub watchlist_revision: u64,
    /// Dismissal epoch read before generation started
    #[serde(default)]
    pub dismissal_epoch: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationCacheEntry {
    pub items: Vec<RecommendationItem>,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub based_on: RecommendationBasis,
}

/// A recommendation the user waved away
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DismissedItem {
    pub id: u64,
    pub media_type: MediaType,
    pub dismissed_at: DateTime<Utc>,
}

impl DismissedItem {
    pub fn key(&self) -> TitleKey {
        TitleKey::new(self.id, self.media_type)
    }
}
