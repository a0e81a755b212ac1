use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};

use crate::{
    clock::Clock,
    db::storage::{read_record, write_record, Storage, StorageError},
    error::{AppError, AppResult},
    models::{
        ChangeKind, ContentMetadata, MediaType, Rating, SyncStatus, TitleKey, WatchStatus,
        WatchlistChange, WatchlistItem, WatchlistPatch, WatchlistRecord, WatchlistStats,
        SCHEMA_VERSION,
    },
};

/// Storage record holding the whole watchlist
pub const WATCHLIST_KEY: &str = "watchlist";

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// The user's saved titles: the source of truth every recommendation is derived from
///
/// Mutations hold the write lock across the storage write so a failed persist
/// can be rolled back before anyone observes it. Every successful mutation
/// bumps the store revision and is broadcast to subscribers.
pub struct WatchlistStore {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    items: RwLock<Vec<WatchlistItem>>,
    revision: AtomicU64,
    changes: broadcast::Sender<WatchlistChange>,
}

impl WatchlistStore {
    /// Creates an empty store
    pub fn new(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>) -> Self {
        Self::with_items(storage, clock, Vec::new())
    }

    fn with_items(
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
        items: Vec<WatchlistItem>,
    ) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            storage,
            clock,
            items: RwLock::new(items),
            revision: AtomicU64::new(0),
            changes,
        }
    }

    /// Loads the persisted watchlist, upgrading older record shapes
    pub async fn load(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>) -> AppResult<Self> {
        let record: Option<WatchlistRecord> = read_record(storage.as_ref(), WATCHLIST_KEY).await?;

        let items = match record {
            None => Vec::new(),
            Some(record) if record.schema_version > SCHEMA_VERSION => {
                return Err(StorageError::Corrupt {
                    key: WATCHLIST_KEY.to_string(),
                    message: format!(
                        "unsupported schema version {} (newest known is {})",
                        record.schema_version, SCHEMA_VERSION
                    ),
                }
                .into());
            }
            Some(record) => {
                if record.schema_version < SCHEMA_VERSION {
                    tracing::info!(
                        from = record.schema_version,
                        to = SCHEMA_VERSION,
                        "Upgrading watchlist record"
                    );
                }
                record.items.into_iter().map(normalize_watched_at).collect()
            }
        };

        tracing::info!(items = items.len(), backend = storage.name(), "Watchlist loaded");
        Ok(Self::with_items(storage, clock, items))
    }

    /// Receives a notification for every successful mutation
    pub fn subscribe(&self) -> broadcast::Receiver<WatchlistChange> {
        self.changes.subscribe()
    }

    /// Number of successful mutations since the store was created or loaded
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// Saves a title. Adding a title that is already saved updates it instead.
    pub async fn add(
        &self,
        id: u64,
        media_type: MediaType,
        metadata: ContentMetadata,
        initial_status: WatchStatus,
    ) -> AppResult<WatchlistItem> {
        validate_id(id)?;
        validate_metadata(&metadata)?;

        let key = TitleKey::new(id, media_type);
        let now = self.clock.now();
        let mut items = self.items.write().await;
        let previous = items.clone();

        let (item, kind) = match items.iter().position(|item| item.key() == key) {
            Some(index) => {
                let existing = &mut items[index];
                existing.metadata = metadata;
                apply_status(existing, initial_status, now);
                touch(existing, now);
                (existing.clone(), ChangeKind::Updated)
            }
            None => {
                let item = WatchlistItem {
                    id,
                    media_type,
                    status: initial_status,
                    rating: Rating::Unrated,
                    added_at: now,
                    updated_at: now,
                    watched_at: (initial_status == WatchStatus::Watched).then_some(now),
                    metadata,
                    sync_status: SyncStatus::PendingSync,
                    version: 1,
                    last_synced_at: None,
                };
                items.push(item.clone());
                (item, ChangeKind::Added)
            }
        };

        self.commit(&mut items, previous, WatchlistChange { key, kind }, "add")
            .await?;
        Ok(item)
    }

    /// Applies a partial update; `None` if the title is not saved
    pub async fn update(
        &self,
        id: u64,
        media_type: MediaType,
        patch: WatchlistPatch,
    ) -> AppResult<Option<WatchlistItem>> {
        validate_id(id)?;
        if let Some(metadata) = &patch.metadata {
            validate_metadata(metadata)?;
        }

        let key = TitleKey::new(id, media_type);
        let now = self.clock.now();
        let mut items = self.items.write().await;
        let previous = items.clone();

        let Some(item) = items.iter_mut().find(|item| item.key() == key) else {
            return Ok(None);
        };

        if let Some(status) = patch.status {
            apply_status(item, status, now);
        }
        if let Some(rating) = patch.rating {
            item.rating = rating;
        }
        if let Some(metadata) = patch.metadata {
            item.metadata = metadata;
        }
        touch(item, now);
        let updated = item.clone();

        self.commit(
            &mut items,
            previous,
            WatchlistChange {
                key,
                kind: ChangeKind::Updated,
            },
            "update",
        )
        .await?;
        Ok(Some(updated))
    }

    /// Deletes a saved title, returning whether it was present
    pub async fn remove(&self, id: u64, media_type: MediaType) -> AppResult<bool> {
        validate_id(id)?;

        let key = TitleKey::new(id, media_type);
        let mut items = self.items.write().await;
        let previous = items.clone();

        let before = items.len();
        items.retain(|item| item.key() != key);
        if items.len() == before {
            return Ok(false);
        }

        self.commit(
            &mut items,
            previous,
            WatchlistChange {
                key,
                kind: ChangeKind::Removed,
            },
            "remove",
        )
        .await?;
        Ok(true)
    }

    pub async fn get(&self, id: u64, media_type: MediaType) -> Option<WatchlistItem> {
        let key = TitleKey::new(id, media_type);
        self.items
            .read()
            .await
            .iter()
            .find(|item| item.key() == key)
            .cloned()
    }

    pub async fn contains(&self, key: &TitleKey) -> bool {
        self.items.read().await.iter().any(|item| item.key() == *key)
    }

    /// Items with the given status, most recently added first
    pub async fn list_by_status(&self, status: WatchStatus) -> Vec<WatchlistItem> {
        let mut items: Vec<WatchlistItem> = self
            .items
            .read()
            .await
            .iter()
            .filter(|item| item.status == status)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.added_at.cmp(&a.added_at));
        items
    }

    /// Every item, in insertion order
    pub async fn all(&self) -> Vec<WatchlistItem> {
        self.items.read().await.clone()
    }

    pub async fn stats(&self) -> WatchlistStats {
        let items = self.items.read().await;
        let mut stats = WatchlistStats {
            total: items.len(),
            ..WatchlistStats::default()
        };
        for item in items.iter() {
            match item.status {
                WatchStatus::WantToWatch => stats.want_to_watch += 1,
                WatchStatus::Watched => stats.watched += 1,
            }
            match item.rating {
                Rating::Liked => stats.liked += 1,
                Rating::Disliked => stats.disliked += 1,
                Rating::Unrated => {}
            }
            if item.sync_status == SyncStatus::PendingSync {
                stats.pending_sync += 1;
            }
        }
        stats
    }

    /// Records a server acknowledgement. Does not bump `version` and is not a
    /// change as far as recommendations are concerned.
    pub async fn mark_synced(
        &self,
        id: u64,
        media_type: MediaType,
    ) -> AppResult<Option<WatchlistItem>> {
        validate_id(id)?;

        let key = TitleKey::new(id, media_type);
        let now = self.clock.now();
        let mut items = self.items.write().await;
        let previous = items.clone();

        let Some(item) = items.iter_mut().find(|item| item.key() == key) else {
            return Ok(None);
        };
        item.sync_status = SyncStatus::Synced;
        item.last_synced_at = Some(now);
        let synced = item.clone();

        if let Err(e) = self.persist(&items).await {
            *items = previous;
            tracing::error!(error = %e, key = %key, operation = "mark_synced", "Watchlist persist failed");
            return Err(e.into());
        }
        Ok(Some(synced))
    }

    /// Persists the mutated list, rolling back on failure, then notifies
    async fn commit(
        &self,
        items: &mut Vec<WatchlistItem>,
        previous: Vec<WatchlistItem>,
        change: WatchlistChange,
        operation: &'static str,
    ) -> AppResult<()> {
        if let Err(e) = self.persist(items).await {
            *items = previous;
            tracing::error!(
                error = %e,
                key = %change.key,
                operation = operation,
                "Watchlist persist failed, mutation rolled back"
            );
            return Err(e.into());
        }

        self.revision.fetch_add(1, Ordering::SeqCst);
        tracing::info!(key = %change.key, kind = ?change.kind, operation = operation, "Watchlist changed");
        // No subscribers is fine
        let _ = self.changes.send(change);
        Ok(())
    }

    async fn persist(&self, items: &[WatchlistItem]) -> Result<(), StorageError> {
        let record = WatchlistRecord {
            items: items.to_vec(),
            last_modified: self.clock.now(),
            schema_version: SCHEMA_VERSION,
        };
        write_record(self.storage.as_ref(), WATCHLIST_KEY, &record).await
    }
}

fn validate_id(id: u64) -> AppResult<()> {
    if id == 0 {
        return Err(AppError::Validation("Title id is required".to_string()));
    }
    Ok(())
}

fn validate_metadata(metadata: &ContentMetadata) -> AppResult<()> {
    if metadata.title.trim().is_empty() {
        return Err(AppError::Validation("Title name cannot be empty".to_string()));
    }
    Ok(())
}

/// `watched_at` is stamped only on the edge into `Watched` and cleared on the
/// edge back to `WantToWatch`
fn apply_status(item: &mut WatchlistItem, status: WatchStatus, now: chrono::DateTime<chrono::Utc>) {
    if item.status == status {
        return;
    }
    item.watched_at = match status {
        WatchStatus::Watched => Some(now),
        WatchStatus::WantToWatch => None,
    };
    item.status = status;
}

fn touch(item: &mut WatchlistItem, now: chrono::DateTime<chrono::Utc>) {
    item.updated_at = now;
    item.version += 1;
    item.sync_status = SyncStatus::PendingSync;
}

/// Repairs records written before `watched_at` tracked the status invariant
fn normalize_watched_at(mut item: WatchlistItem) -> WatchlistItem {
    match item.status {
        WatchStatus::Watched if item.watched_at.is_none() => item.watched_at = Some(item.updated_at),
        WatchStatus::WantToWatch => item.watched_at = None,
        _ => {}
    }
    item
}
