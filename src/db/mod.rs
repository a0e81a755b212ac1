pub mod cache;
pub mod redis;
pub mod storage;

pub use cache::{CacheKey, CacheStats, TtlCache, TtlTable};
pub use self::redis::{create_redis_client, RedisStorage};
pub use storage::{MemoryStorage, Storage, StorageError};
