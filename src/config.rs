use serde::Deserialize;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Which persistent storage engine backs the watchlist and caches
    #[serde(default)]
    pub storage_backend: StorageBackend,

    /// Redis connection URL, used when `storage_backend = redis`
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// TMDB API key (v3 auth)
    #[serde(default)]
    pub tmdb_api_key: String,

    /// TMDB API base URL
    #[serde(default = "default_tmdb_api_url")]
    pub tmdb_api_url: String,

    /// Default TTL for TMDB metadata and similar-title lookups, in seconds
    #[serde(default = "default_tmdb_ttl_secs")]
    pub tmdb_ttl_secs: i64,

    /// Default TTL for watch-provider lookups, in seconds
    #[serde(default = "default_watch_providers_ttl_secs")]
    pub watch_providers_ttl_secs: i64,

    /// Default TTL for generated recommendations, in seconds
    #[serde(default = "default_recommendations_ttl_secs")]
    pub recommendations_ttl_secs: i64,

    /// Maximum number of vectors held by the similarity index
    #[serde(default = "default_index_max_size")]
    pub index_max_size: usize,

    /// How often the cache sweep and dismissal pruning run, in seconds
    #[serde(default = "default_maintenance_interval_secs")]
    pub maintenance_interval_secs: u64,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Redis,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_tmdb_api_url() -> String {
    "https://api.themoviedb.org/3".to_string()
}

fn default_tmdb_ttl_secs() -> i64 {
    24 * 60 * 60
}

fn default_watch_providers_ttl_secs() -> i64 {
    7 * 24 * 60 * 60
}

fn default_recommendations_ttl_secs() -> i64 {
    6 * 60 * 60
}

fn default_index_max_size() -> usize {
    1000
}

fn default_maintenance_interval_secs() -> u64 {
    15 * 60
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_backend: StorageBackend::default(),
            redis_url: default_redis_url(),
            tmdb_api_key: String::new(),
            tmdb_api_url: default_tmdb_api_url(),
            tmdb_ttl_secs: default_tmdb_ttl_secs(),
            watch_providers_ttl_secs: default_watch_providers_ttl_secs(),
            recommendations_ttl_secs: default_recommendations_ttl_secs(),
            index_max_size: default_index_max_size(),
            maintenance_interval_secs: default_maintenance_interval_secs(),
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }
}
