use chrono::Duration;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use crate::{
    clock::Clock,
    db::{
        cache::{CacheKey, TtlCache, RECOMMENDATIONS_NAMESPACE},
        storage::{read_record, write_record, Storage, StorageError},
    },
    error::{AppError, AppResult},
    models::{
        DismissedItem, DismissedRecord, MediaType, RecommendationBasis, RecommendationCacheEntry,
        TitleKey, WatchlistChange, SCHEMA_VERSION,
    },
    services::{providers::MetadataProvider, recommendations::RecommendationGenerator},
};

/// Storage record holding dismissed recommendations
pub const DISMISSED_KEY: &str = "dismissed";

/// How long a dismissal suppresses a title
pub const DISMISSAL_HORIZON_DAYS: i64 = 30;

const CURRENT_ENTRY: &str = "current";

/// Serves the recommendation list from the TTL cache, regenerating it when it
/// has expired, the watchlist has changed, or a title was dismissed
///
/// Each list records the watchlist revision and dismissal epoch it was built
/// from. A list is only served while both are still current, and a run whose
/// inputs moved underneath it is returned to its caller but never cached.
pub struct RecommendationCache {
    generator: RecommendationGenerator,
    cache: Arc<TtlCache>,
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    horizon: Duration,
    changes: Mutex<broadcast::Receiver<WatchlistChange>>,
    dismissed: RwLock<Vec<DismissedItem>>,
    /// Bumped after every change to `dismissed`
    dismissal_epoch: AtomicU64,
}

impl RecommendationCache {
    /// `changes` should be subscribed before any mutation that must invalidate
    /// the first cached list
    pub fn new(
        generator: RecommendationGenerator,
        cache: Arc<TtlCache>,
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
        changes: broadcast::Receiver<WatchlistChange>,
    ) -> Self {
        Self::with_dismissed(generator, cache, storage, clock, changes, Vec::new())
    }

    fn with_dismissed(
        generator: RecommendationGenerator,
        cache: Arc<TtlCache>,
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
        changes: broadcast::Receiver<WatchlistChange>,
        dismissed: Vec<DismissedItem>,
    ) -> Self {
        Self {
            generator,
            cache,
            storage,
            clock,
            horizon: Duration::hours(6),
            changes: Mutex::new(changes),
            dismissed: RwLock::new(dismissed),
            dismissal_epoch: AtomicU64::new(0),
        }
    }

    /// Creates the cache with previously persisted dismissals
    pub async fn load(
        generator: RecommendationGenerator,
        cache: Arc<TtlCache>,
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
        changes: broadcast::Receiver<WatchlistChange>,
    ) -> AppResult<Self> {
        let record: Option<DismissedRecord> = read_record(storage.as_ref(), DISMISSED_KEY).await?;
        let dismissed = match record {
            Some(record) if record.schema_version > SCHEMA_VERSION => {
                return Err(StorageError::Corrupt {
                    key: DISMISSED_KEY.to_string(),
                    message: format!("unsupported schema version {}", record.schema_version),
                }
                .into());
            }
            Some(record) => record.items,
            None => Vec::new(),
        };

        // Revisions restart with the process, so a persisted list cannot be
        // matched against them
        cache.invalidate(Self::entry_key().as_str()).await;

        tracing::info!(dismissed = dismissed.len(), "Dismissed recommendations loaded");
        Ok(Self::with_dismissed(
            generator, cache, storage, clock, changes, dismissed,
        ))
    }

    /// Lifetime of a generated list
    pub fn with_horizon(mut self, horizon: Duration) -> Self {
        self.horizon = horizon;
        self
    }

    fn entry_key() -> CacheKey {
        CacheKey::named(RECOMMENDATIONS_NAMESPACE, CURRENT_ENTRY)
    }

    /// The cached list if still valid, otherwise a freshly generated one
    pub async fn get_or_generate(
        &self,
        supplier: &dyn MetadataProvider,
    ) -> RecommendationCacheEntry {
        if self.drain_changes() {
            self.invalidate().await;
        }

        let now = self.clock.now();
        if let Some(entry) = self
            .cache
            .get::<RecommendationCacheEntry>(&Self::entry_key(), None)
            .await
        {
            if entry.expires_at > now && self.is_current(&entry.based_on) {
                tracing::debug!(items = entry.items.len(), "Serving cached recommendations");
                return entry;
            }
        }

        let dismissal_epoch = self.dismissal_epoch.load(Ordering::SeqCst);
        let dismissed = self.active_dismissals().await;
        let generated = self.generator.generate(supplier, &dismissed).await;
        let generated_at = self.clock.now();
        let entry = RecommendationCacheEntry {
            items: generated.items,
            generated_at,
            expires_at: generated_at + self.horizon,
            based_on: RecommendationBasis {
                dismissal_epoch,
                ..generated.based_on
            },
        };

        if self.is_current(&entry.based_on) {
            self.cache.set(&Self::entry_key(), &entry).await;
        } else {
            tracing::debug!(
                revision = entry.based_on.watchlist_revision,
                dismissal_epoch = dismissal_epoch,
                "Inputs changed during generation, list not cached"
            );
        }
        entry
    }

    /// No watchlist mutation or dismissal change since `basis` was captured
    fn is_current(&self, basis: &RecommendationBasis) -> bool {
        basis.watchlist_revision == self.generator.watchlist_revision()
            && basis.dismissal_epoch == self.dismissal_epoch.load(Ordering::SeqCst)
    }

    /// Hides a title from recommendations for the dismissal horizon and drops
    /// the cached list so the next read reflects it
    pub async fn dismiss(&self, id: u64, media_type: MediaType) -> AppResult<DismissedItem> {
        if id == 0 {
            return Err(AppError::Validation("id must be non-zero".to_string()));
        }

        let item = DismissedItem {
            id,
            media_type,
            dismissed_at: self.clock.now(),
        };

        {
            let mut dismissed = self.dismissed.write().await;
            let previous = dismissed.clone();
            dismissed.retain(|existing| existing.key() != item.key());
            dismissed.push(item);

            if let Err(e) = self.persist(&dismissed).await {
                *dismissed = previous;
                tracing::error!(error = %e, key = %item.key(), operation = "dismiss", "Dismissal persist failed");
                return Err(e.into());
            }
            self.dismissal_epoch.fetch_add(1, Ordering::SeqCst);
        }

        tracing::info!(key = %item.key(), "Recommendation dismissed");
        self.invalidate().await;
        Ok(item)
    }

    /// Drops the cached list
    pub async fn invalidate(&self) {
        let removed = self.cache.invalidate(Self::entry_key().as_str()).await;
        if removed > 0 {
            tracing::debug!("Recommendation cache invalidated");
        }
    }

    /// Forgets dismissals older than the dismissal horizon. Returns how many
    /// were removed.
    pub async fn prune_dismissed(&self) -> AppResult<usize> {
        let cutoff = self.clock.now() - Duration::days(DISMISSAL_HORIZON_DAYS);
        let mut dismissed = self.dismissed.write().await;
        let previous = dismissed.clone();
        dismissed.retain(|item| item.dismissed_at > cutoff);

        let pruned = previous.len() - dismissed.len();
        if pruned == 0 {
            return Ok(0);
        }

        if let Err(e) = self.persist(&dismissed).await {
            *dismissed = previous;
            tracing::error!(error = %e, operation = "prune_dismissed", "Dismissal persist failed");
            return Err(e.into());
        }
        self.dismissal_epoch.fetch_add(1, Ordering::SeqCst);
        drop(dismissed);

        tracing::info!(pruned = pruned, "Expired dismissals pruned");
        // Pruned titles may resurface
        self.invalidate().await;
        Ok(pruned)
    }

    pub async fn dismissed(&self) -> Vec<DismissedItem> {
        self.dismissed.read().await.clone()
    }

    /// Dismissals still inside the horizon
    async fn active_dismissals(&self) -> HashSet<TitleKey> {
        let cutoff = self.clock.now() - Duration::days(DISMISSAL_HORIZON_DAYS);
        self.dismissed
            .read()
            .await
            .iter()
            .filter(|item| item.dismissed_at > cutoff)
            .map(DismissedItem::key)
            .collect()
    }

    /// True when the watchlist changed since the last call. A lagged receiver
    /// missed changes, which counts as a change.
    fn drain_changes(&self) -> bool {
        let mut changes = self.changes.lock();
        let mut changed = false;
        loop {
            match changes.try_recv() {
                Ok(change) => {
                    tracing::debug!(key = %change.key, kind = ?change.kind, "Watchlist change observed");
                    changed = true;
                }
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped = skipped, "Watchlist change receiver lagged");
                    changed = true;
                }
                Err(broadcast::error::TryRecvError::Empty)
                | Err(broadcast::error::TryRecvError::Closed) => return changed,
            }
        }
    }

    async fn persist(&self, items: &[DismissedItem]) -> Result<(), StorageError> {
        let record = DismissedRecord {
            items: items.to_vec(),
            schema_version: SCHEMA_VERSION,
        };
        write_record(self.storage.as_ref(), DISMISSED_KEY, &record).await
    }
}
