//! Availability cache: per-item reservation count and limit.
//!
//! The cache is an accelerator, never the authority. Values are populated
//! cache-aside from the store and mutated only inside an item's exclusive
//! section. Keys are plain strings with string-encoded integers so a shared
//! backend (Redis) and the in-process map agree on layout.

mod keys;
mod memory;
#[cfg(feature = "redis")]
mod redis;

use async_trait::async_trait;

use crate::error::CacheError;
use crate::types::ItemId;

pub use keys::{count_key, limit_key, lock_key, waitlist_key};
pub use memory::InMemoryCache;
#[cfg(feature = "redis")]
pub use self::redis::RedisCache;

#[async_trait]
pub trait AvailabilityCache: Send + Sync {
    /// Cached confirmed count, or `None` on miss.
    async fn get_count(&self, item: ItemId) -> Result<Option<u32>, CacheError>;

    /// Populate the count after recomputing it from the store.
    async fn set_count(&self, item: ItemId, count: u32) -> Result<(), CacheError>;

    /// Cached limit, or `None` on miss.
    async fn get_limit(&self, item: ItemId) -> Result<Option<u32>, CacheError>;

    /// Idempotent limit write.
    async fn set_limit(&self, item: ItemId, limit: u32) -> Result<(), CacheError>;

    /// Atomic increment; returns the new count.
    async fn increment_count(&self, item: ItemId) -> Result<u32, CacheError>;

    /// Atomic decrement, floored at zero; returns the new count.
    async fn decrement_count(&self, item: ItemId) -> Result<u32, CacheError>;

    /// Drop the cached count so the next read recomputes it from the store.
    async fn invalidate(&self, item: ItemId) -> Result<(), CacheError>;
}
