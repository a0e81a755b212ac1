use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod recommendation;
mod title;
mod watchlist;

pub use recommendation::{
    DismissedItem, GenreAffinityMap, GenreScore, RecommendationBasis, RecommendationCacheEntry,
    RecommendationItem, RecommendationSource,
};
pub use title::{ContentMetadata, GenreId, MediaType, Title, TitleKey};
pub use watchlist::{
    ChangeKind, Rating, SyncStatus, WatchStatus, WatchlistChange, WatchlistItem,
    WatchlistPatch, WatchlistStats,
};

// ============================================================================
// Persisted records
// ============================================================================

/// Current shape of every persisted record. Records written before sync
/// metadata existed carry version 0 (or no version at all).
pub const SCHEMA_VERSION: u32 = 1;

/// The watchlist, stored as a single record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistRecord {
    pub items: Vec<WatchlistItem>,
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub schema_version: u32,
}

/// Dismissed recommendations
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DismissedRecord {
    pub items: Vec<DismissedItem>,
    #[serde(default)]
    pub schema_version: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_watchlist_record_loads_with_defaults() {
        // Shape written before version/syncStatus/rating existed
        let json = r#"{
            "items": [{
                "id": 550,
                "mediaType": "movie",
                "status": "watched",
                "addedAt": "2024-01-01T00:00:00Z",
                "updatedAt": "2024-01-02T00:00:00Z",
                "watchedAt": "2024-01-02T00:00:00Z",
                "metadata": { "title": "Fight Club", "genreIds": [18] }
            }],
            "lastModified": "2024-01-02T00:00:00Z"
        }"#;

        let record: WatchlistRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.schema_version, 0);
        let item = &record.items[0];
        assert_eq!(item.sync_status, SyncStatus::LocalOnly);
        assert_eq!(item.version, 0);
        assert_eq!(item.rating, Rating::Unrated);
        assert_eq!(item.last_synced_at, None);
    }

    #[test]
    fn test_dismissed_record_round_trip_shape() {
        let record = DismissedRecord {
            items: vec![DismissedItem {
                id: 123,
                media_type: MediaType::Movie,
                dismissed_at: DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
                    .unwrap()
                    .with_timezone(&Utc),
            }],
            schema_version: SCHEMA_VERSION,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["schemaVersion"], 1);
        assert_eq!(json["items"][0]["mediaType"], "movie");
        assert_eq!(json["items"][0]["dismissedAt"], "2024-05-01T12:00:00Z");
    }
}
