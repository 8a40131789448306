use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::keys::{count_key, limit_key};
use super::AvailabilityCache;
use crate::error::CacheError;
use crate::types::ItemId;

/// Process-local cache backed by a string-keyed map.
///
/// Values are stored as decimal strings so this behaves like the Redis
/// backend, including `INCR` on a missing key starting from zero.
#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, String>) -> Result<T, CacheError>,
    ) -> Result<T, CacheError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| CacheError::Backend("cache map poisoned".into()))?;
        f(&mut entries)
    }

    fn read(&self, key: &str) -> Result<Option<u32>, CacheError> {
        self.with_entries(|entries| entries.get(key).map(|v| parse(key, v)).transpose())
    }

    fn add(&self, key: &str, delta: i64) -> Result<u32, CacheError> {
        self.with_entries(|entries| {
            let current = match entries.get(key) {
                Some(v) => parse(key, v)?,
                None => 0,
            };
            let next = (i64::from(current) + delta).max(0) as u32;
            entries.insert(key.to_string(), next.to_string());
            Ok(next)
        })
    }
}

fn parse(key: &str, value: &str) -> Result<u32, CacheError> {
    value.parse::<u32>().map_err(|_| CacheError::Malformed {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[async_trait]
impl AvailabilityCache for InMemoryCache {
    async fn get_count(&self, item: ItemId) -> Result<Option<u32>, CacheError> {
        self.read(&count_key(item))
    }

    async fn set_count(&self, item: ItemId, count: u32) -> Result<(), CacheError> {
        self.with_entries(|entries| {
            entries.insert(count_key(item), count.to_string());
            Ok(())
        })
    }

    async fn get_limit(&self, item: ItemId) -> Result<Option<u32>, CacheError> {
        self.read(&limit_key(item))
    }

    async fn set_limit(&self, item: ItemId, limit: u32) -> Result<(), CacheError> {
        self.with_entries(|entries| {
            entries.insert(limit_key(item), limit.to_string());
            Ok(())
        })
    }

    async fn increment_count(&self, item: ItemId) -> Result<u32, CacheError> {
        self.add(&count_key(item), 1)
    }

    async fn decrement_count(&self, item: ItemId) -> Result<u32, CacheError> {
        self.add(&count_key(item), -1)
    }

    async fn invalidate(&self, item: ItemId) -> Result<(), CacheError> {
        self.with_entries(|entries| {
            entries.remove(&count_key(item));
            Ok(())
        })
    }
}
