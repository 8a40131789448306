//! Shared Redis backend for the availability cache and the waitlist.
//!
//! Counts and limits are string integers under `itemId:{id}` and
//! `itemLimit:{id}`; each waitlist is a Redis list of JSON entries under
//! `waitlist:{id}` (RPUSH at the tail, LPOP at the head).

use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, Client, Script};
use async_trait::async_trait;

use super::keys::{count_key, limit_key, waitlist_key};
use super::AvailabilityCache;
use crate::error::CacheError;
use crate::types::{ItemId, RequesterId, WaitlistEntry};
use crate::waitlist::Waitlist;

const DECREMENT_FLOORED: &str = r#"
local v = redis.call('DECR', KEYS[1])
if v < 0 then
  redis.call('SET', KEYS[1], 0)
  return 0
end
return v
"#;

fn backend(e: ::redis::RedisError) -> CacheError {
    CacheError::Backend(format!("redis: {e}"))
}

fn parse_u32(key: &str, value: String) -> Result<u32, CacheError> {
    value
        .trim()
        .parse()
        .map_err(|_| CacheError::Malformed {
            key: key.to_string(),
            value,
        })
}

fn to_u32(key: &str, n: i64) -> Result<u32, CacheError> {
    u32::try_from(n).map_err(|_| CacheError::Malformed {
        key: key.to_string(),
        value: n.to_string(),
    })
}

fn decode_entry(key: &str, raw: &str) -> Result<WaitlistEntry, CacheError> {
    serde_json::from_str(raw).map_err(|_| CacheError::Malformed {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

fn encode_entry(entry: &WaitlistEntry) -> Result<String, CacheError> {
    serde_json::to_string(entry).map_err(|e| CacheError::Backend(format!("encode entry: {e}")))
}

/// Cache and waitlist on one Redis connection manager (cheap to clone).
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = Client::open(url).map_err(backend)?;
        let conn = ConnectionManager::new(client).await.map_err(backend)?;
        tracing::info!(url, "connected to redis cache");
        Ok(Self { conn })
    }

    async fn get_u32(&self, key: &str) -> Result<Option<u32>, CacheError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await.map_err(backend)?;
        value.map(|v| parse_u32(key, v)).transpose()
    }

    async fn raw_entries(&self, key: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.lrange(key, 0, -1).await.map_err(backend)?;
        Ok(raw)
    }
}

#[async_trait]
impl AvailabilityCache for RedisCache {
    async fn get_count(&self, item: ItemId) -> Result<Option<u32>, CacheError> {
        self.get_u32(&count_key(item)).await
    }

    async fn set_count(&self, item: ItemId, count: u32) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(count_key(item), count).await.map_err(backend)?;
        Ok(())
    }

    async fn get_limit(&self, item: ItemId) -> Result<Option<u32>, CacheError> {
        self.get_u32(&limit_key(item)).await
    }

    async fn set_limit(&self, item: ItemId, limit: u32) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(limit_key(item), limit).await.map_err(backend)?;
        Ok(())
    }

    async fn increment_count(&self, item: ItemId) -> Result<u32, CacheError> {
        let key = count_key(item);
        let mut conn = self.conn.clone();
        let n: i64 = conn.incr(&key, 1).await.map_err(backend)?;
        to_u32(&key, n)
    }

    async fn decrement_count(&self, item: ItemId) -> Result<u32, CacheError> {
        let key = count_key(item);
        let mut conn = self.conn.clone();
        let n: i64 = Script::new(DECREMENT_FLOORED)
            .key(&key)
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;
        to_u32(&key, n)
    }

    async fn invalidate(&self, item: ItemId) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(count_key(item)).await.map_err(backend)?;
        Ok(())
    }
}

#[async_trait]
impl Waitlist for RedisCache {
    async fn push(&self, item: ItemId, entry: WaitlistEntry) -> Result<usize, CacheError> {
        let raw = encode_entry(&entry)?;
        let mut conn = self.conn.clone();
        let len: usize = conn.rpush(waitlist_key(item), raw).await.map_err(backend)?;
        Ok(len)
    }

    async fn pop(&self, item: ItemId) -> Result<Option<WaitlistEntry>, CacheError> {
        let key = waitlist_key(item);
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.lpop(&key, None).await.map_err(backend)?;
        raw.map(|r| decode_entry(&key, &r)).transpose()
    }

    async fn requeue_front(&self, item: ItemId, entry: WaitlistEntry) -> Result<(), CacheError> {
        let raw = encode_entry(&entry)?;
        let mut conn = self.conn.clone();
        let _: usize = conn.lpush(waitlist_key(item), raw).await.map_err(backend)?;
        Ok(())
    }

    async fn len(&self, item: ItemId) -> Result<usize, CacheError> {
        let mut conn = self.conn.clone();
        let len: usize = conn.llen(waitlist_key(item)).await.map_err(backend)?;
        Ok(len)
    }

    async fn position(
        &self,
        item: ItemId,
        requester: RequesterId,
    ) -> Result<Option<usize>, CacheError> {
        let key = waitlist_key(item);
        for (i, raw) in self.raw_entries(&key).await?.iter().enumerate() {
            if decode_entry(&key, raw)?.requester_id == requester {
                return Ok(Some(i + 1));
            }
        }
        Ok(None)
    }

    async fn remove(&self, item: ItemId, requester: RequesterId) -> Result<bool, CacheError> {
        let key = waitlist_key(item);
        for raw in self.raw_entries(&key).await? {
            if decode_entry(&key, &raw)?.requester_id == requester {
                let mut conn = self.conn.clone();
                let removed: usize = conn.lrem(&key, 1, raw).await.map_err(backend)?;
                return Ok(removed > 0);
            }
        }
        Ok(false)
    }

    async fn entries(&self, item: ItemId) -> Result<Vec<WaitlistEntry>, CacheError> {
        let key = waitlist_key(item);
        self.raw_entries(&key)
            .await?
            .iter()
            .map(|raw| decode_entry(&key, raw))
            .collect()
    }
}
