use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ContentMetadata, MediaType, TitleKey};
use crate::error::AppError;

/// Where a title sits in the user's viewing lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WatchStatus {
    WantToWatch,
    Watched,
}

/// Thumbs rating. Serialized as -1, 0 or 1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(try_from = "i8", into = "i8")]
pub enum Rating {
    Disliked,
    #[default]
    Unrated,
    Liked,
}

impl TryFrom<i8> for Rating {
    type Error = AppError;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Rating::Disliked),
            0 => Ok(Rating::Unrated),
            1 => Ok(Rating::Liked),
            other => Err(AppError::Validation(format!(
                "Rating must be -1, 0 or 1, got {}",
                other
            ))),
        }
    }
}

impl From<Rating> for i8 {
    fn from(rating: Rating) -> Self {
        match rating {
            Rating::Disliked => -1,
            Rating::Unrated => 0,
            Rating::Liked => 1,
        }
    }
}

/// Replication state of a watchlist item relative to a (future) sync server
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    LocalOnly,
    PendingSync,
    Synced,
}

/// A title the user saved
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistItem {
    pub id: u64,
    pub media_type: MediaType,
    pub status: WatchStatus,
    #[serde(default)]
    pub rating: Rating,
    pub added_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set iff `status == Watched`
    #[serde(default)]
    pub watched_at: Option<DateTime<Utc>>,
    pub metadata: ContentMetadata,
    #[serde(default)]
    pub sync_status: SyncStatus,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl WatchlistItem {
    pub fn key(&self) -> TitleKey {
        TitleKey::new(self.id, self.media_type)
    }

    /// Watched and not disliked
    pub fn is_seed_candidate(&self) -> bool {
        self.status == WatchStatus::Watched && self.rating != Rating::Disliked
    }
}

/// Partial update to a watchlist item; absent fields are left alone
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistPatch {
    #[serde(default)]
    pub status: Option<WatchStatus>,
    #[serde(default)]
    pub rating: Option<Rating>,
    #[serde(default)]
    pub metadata: Option<ContentMetadata>,
}

impl WatchlistPatch {
    pub fn status(status: WatchStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn rating(rating: Rating) -> Self {
        Self {
            rating: Some(rating),
            ..Self::default()
        }
    }
}

/// Counts over the whole watchlist
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistStats {
    pub total: usize,
    pub want_to_watch: usize,
    pub watched: usize,
    pub liked: usize,
    pub disliked: usize,
    pub pending_sync: usize,
}

/// Kind of watchlist mutation
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Updated,
    Removed,
}

/// Notification emitted after every successful watchlist mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchlistChange {
    pub key: TitleKey,
    pub kind: ChangeKind,
}
