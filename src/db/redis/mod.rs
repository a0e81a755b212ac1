pub mod storage;

mod macros;

pub use storage::create_redis_client;
pub use storage::RedisStorage;
