use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt::Display;
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::Config;
use crate::db::storage::{read_record, write_record, Storage, StorageError};
use crate::models::SCHEMA_VERSION;

pub const TMDB_NAMESPACE: &str = "tmdb";
pub const WATCH_PROVIDERS_NAMESPACE: &str = "watch_providers";
pub const RECOMMENDATIONS_NAMESPACE: &str = "recommendations";

/// A cache key of the form `{namespace}:{rest}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives a key from request parameters. Parameter order does not matter:
    /// the same set of pairs always lands on the same key.
    pub fn derive(namespace: &str, params: &[(&str, String)]) -> Self {
        let mut sorted: Vec<&(&str, String)> = params.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0).then_with(|| a.1.cmp(&b.1)));

        let canonical = sorted
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("&");

        let hash = blake3::hash(canonical.as_bytes());
        Self(format!("{}:{}", namespace, &hash.to_hex().as_str()[..16]))
    }

    /// A fixed, human-readable key inside a namespace
    pub fn named(namespace: &str, name: &str) -> Self {
        Self(format!("{}:{}", namespace, name))
    }

    pub fn namespace(&self) -> &str {
        self.0.split(':').next().unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Namespace → default TTL. Namespaces missing from the table are not cached.
#[derive(Debug, Clone, Default)]
pub struct TtlTable {
    ttls: HashMap<String, Duration>,
}

impl TtlTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, namespace: &str, ttl: Duration) -> Self {
        self.ttls.insert(namespace.to_string(), ttl);
        self
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new()
            .with(TMDB_NAMESPACE, Duration::seconds(config.tmdb_ttl_secs))
            .with(
                WATCH_PROVIDERS_NAMESPACE,
                Duration::seconds(config.watch_providers_ttl_secs),
            )
            .with(
                RECOMMENDATIONS_NAMESPACE,
                Duration::seconds(config.recommendations_ttl_secs),
            )
    }

    pub fn ttl_for(&self, namespace: &str) -> Option<Duration> {
        self.ttls.get(namespace).copied()
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.ttls.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: String,
    pub payload: serde_json::Value,
    pub stored_at: DateTime<Utc>,
    /// Namespace TTL in force when the entry was written, in seconds
    #[serde(default)]
    pub ttl_secs: i64,
}

/// One persisted record per namespace
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheNamespaceRecord {
    entries: Vec<CacheEntry>,
    #[serde(default)]
    schema_version: u32,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub count: usize,
    pub approx_size_bytes: usize,
}

fn storage_key(namespace: &str) -> String {
    format!("cache:{}", namespace)
}

/// Expiring key/value cache shared by every component that memoizes
///
/// Entries are served from memory and mirrored to storage as one record per
/// namespace. Storage failures never surface to callers: a failed read is a
/// miss and a failed write is skipped after one sweep-and-retry.
pub struct TtlCache {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    ttls: TtlTable,
    namespaces: RwLock<HashMap<String, HashMap<String, CacheEntry>>>,
}

impl TtlCache {
    pub fn new(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>, ttls: TtlTable) -> Self {
        Self {
            storage,
            clock,
            ttls,
            namespaces: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a cache and hydrates it from previously persisted namespace records
    pub async fn load(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>, ttls: TtlTable) -> Self {
        let cache = Self::new(storage, clock, ttls);
        let namespaces: Vec<String> = cache.ttls.namespaces().map(str::to_string).collect();

        for namespace in namespaces {
            let key = storage_key(&namespace);
            let record: Option<CacheNamespaceRecord> =
                match read_record(cache.storage.as_ref(), &key).await {
                    Ok(record) => record,
                    Err(e) => {
                        tracing::warn!(error = %e, namespace = %namespace, "Discarding unreadable cache record");
                        continue;
                    }
                };

            let Some(record) = record else { continue };
            if record.schema_version > SCHEMA_VERSION {
                tracing::warn!(
                    namespace = %namespace,
                    schema_version = record.schema_version,
                    "Discarding cache record with unknown schema"
                );
                continue;
            }

            let entries: HashMap<String, CacheEntry> = record
                .entries
                .into_iter()
                .map(|entry| (entry.key.clone(), entry))
                .collect();
            tracing::info!(namespace = %namespace, entries = entries.len(), "Cache namespace loaded");
            cache.namespaces.write().insert(namespace, entries);
        }

        cache
    }

    /// Returns the cached payload unless it is missing or older than its TTL.
    /// Expired entries are deleted on the way out.
    pub async fn get<T: DeserializeOwned>(
        &self,
        key: &CacheKey,
        ttl_override: Option<Duration>,
    ) -> Option<T> {
        let namespace = key.namespace();
        let default_ttl = match self.ttls.ttl_for(namespace) {
            Some(ttl) => ttl,
            None => {
                tracing::debug!(key = %key, "Unknown cache namespace, skipping read");
                return None;
            }
        };
        let ttl = ttl_override.unwrap_or(default_ttl);
        let now = self.clock.now();

        let entry = self
            .namespaces
            .read()
            .get(namespace)
            .and_then(|entries| entries.get(key.as_str()))
            .cloned()?;

        if now - entry.stored_at > ttl {
            let removed = {
                let mut namespaces = self.namespaces.write();
                let entries = namespaces.entry(namespace.to_string()).or_default();
                match entries.get(key.as_str()) {
                    Some(current) if current.stored_at == entry.stored_at => {
                        entries.remove(key.as_str());
                        true
                    }
                    _ => false,
                }
            };
            if removed {
                tracing::debug!(key = %key, "Cache entry expired, deleted on read");
                self.persist(namespace).await;
            }
            return None;
        }

        match serde_json::from_value(entry.payload) {
            Ok(value) => {
                tracing::debug!(key = %key, "Cache hit");
                Some(value)
            }
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "Cache payload has unexpected shape");
                None
            }
        }
    }

    /// Stores a payload, stamped with the current time
    pub async fn set<T: Serialize>(&self, key: &CacheKey, payload: &T) {
        let namespace = key.namespace();
        let Some(ttl) = self.ttls.ttl_for(namespace) else {
            tracing::debug!(key = %key, "Unknown cache namespace, skipping write");
            return;
        };

        let payload = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(error = %e, key = %key, "Cache serialization error");
                return;
            }
        };

        let entry = CacheEntry {
            key: key.as_str().to_string(),
            payload,
            stored_at: self.clock.now(),
            ttl_secs: ttl.num_seconds(),
        };

        self.namespaces
            .write()
            .entry(namespace.to_string())
            .or_default()
            .insert(entry.key.clone(), entry);

        tracing::debug!(key = %key, ttl_secs = ttl.num_seconds(), "Cache write");
        self.persist(namespace).await;
    }

    /// Deletes one key, or every key starting with `key_or_prefix` when no
    /// exact key matches. Returns how many entries were removed.
    pub async fn invalidate(&self, key_or_prefix: &str) -> usize {
        let mut touched = BTreeSet::new();
        let mut removed = 0;

        {
            let mut namespaces = self.namespaces.write();
            let exact = namespaces
                .iter_mut()
                .find_map(|(ns, entries)| entries.remove(key_or_prefix).map(|_| ns.clone()));

            match exact {
                Some(namespace) => {
                    touched.insert(namespace);
                    removed = 1;
                }
                None => {
                    for (namespace, entries) in namespaces.iter_mut() {
                        let before = entries.len();
                        entries.retain(|key, _| !key.starts_with(key_or_prefix));
                        if entries.len() != before {
                            removed += before - entries.len();
                            touched.insert(namespace.clone());
                        }
                    }
                }
            }
        }

        if removed > 0 {
            tracing::debug!(key = %key_or_prefix, removed = removed, "Cache invalidated");
        }
        for namespace in touched {
            self.persist(&namespace).await;
        }
        removed
    }

    /// Deletes every entry older than its namespace TTL
    pub async fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut touched = Vec::new();
        let mut removed = 0;

        {
            let mut namespaces = self.namespaces.write();
            for (namespace, entries) in namespaces.iter_mut() {
                let Some(ttl) = self.ttls.ttl_for(namespace) else {
                    continue;
                };
                let before = entries.len();
                entries.retain(|_, entry| now - entry.stored_at <= ttl);
                if entries.len() != before {
                    removed += before - entries.len();
                    touched.push(namespace.clone());
                }
            }
        }

        for namespace in &touched {
            if let Err(e) = self.write_namespace(namespace).await {
                tracing::warn!(error = %e, namespace = %namespace, "Failed to persist cache sweep");
            }
        }

        tracing::debug!(removed = removed, "Cache sweep completed");
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let namespaces = self.namespaces.read();
        let mut count = 0;
        let mut approx_size_bytes = 0;
        for entry in namespaces.values().flat_map(|entries| entries.values()) {
            count += 1;
            approx_size_bytes += entry.key.len() + entry.payload.to_string().len();
        }
        CacheStats {
            count,
            approx_size_bytes,
        }
    }

    /// Mirrors a namespace to storage. On quota exhaustion, sweeps expired
    /// entries and retries exactly once; any remaining failure is logged and dropped.
    async fn persist(&self, namespace: &str) {
        match self.write_namespace(namespace).await {
            Ok(()) => {}
            Err(StorageError::QuotaExceeded(_)) => {
                tracing::warn!(namespace = %namespace, "Storage quota exceeded, sweeping expired cache entries");
                self.sweep_expired().await;
                if let Err(e) = self.write_namespace(namespace).await {
                    tracing::warn!(error = %e, namespace = %namespace, "Cache write skipped after retry");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, namespace = %namespace, "Cache write skipped");
            }
        }
    }

    async fn write_namespace(&self, namespace: &str) -> Result<(), StorageError> {
        let mut entries: Vec<CacheEntry> = self
            .namespaces
            .read()
            .get(namespace)
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default();
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        let key = storage_key(namespace);
        if entries.is_empty() {
            return self.storage.delete(&key).await;
        }

        let record = CacheNamespaceRecord {
            entries,
            schema_version: SCHEMA_VERSION,
        };
        write_record(self.storage.as_ref(), &key, &record).await
    }
}
