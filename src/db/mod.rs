pub mod cache;
pub mod postgres;
pub mod quota;
pub mod redis;
pub mod watchlist;

pub use cache::{Cache, CacheBackend, CacheKey, MemoryCacheBackend};
pub use postgres::{create_pool, run_migrations};
pub use quota::{MemoryQuotaStore, PgQuotaStore, QuotaStore};
pub use self::redis::{create_redis_client, RedisCacheBackend};
pub use watchlist::{MemoryWatchlistStore, PgWatchlistStore, WatchlistStore};
