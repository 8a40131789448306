//! Redis lease mutex: `SET key token NX PX lease` to acquire, a
//! compare-and-delete script to release.

use ::redis::aio::ConnectionManager;
use ::redis::{Client, Script};
use async_trait::async_trait;
use std::time::Duration;

use super::{DistributedMutex, LockHandle};
use crate::error::LockError;

const RELEASE_IF_OWNER: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
end
return 0
"#;

fn backend(e: ::redis::RedisError) -> LockError {
    LockError::Backend(format!("redis: {e}"))
}

#[derive(Clone)]
pub struct RedisMutex {
    conn: ConnectionManager,
}

impl RedisMutex {
    pub async fn connect(url: &str) -> Result<Self, LockError> {
        let client = Client::open(url).map_err(backend)?;
        let conn = ConnectionManager::new(client).await.map_err(backend)?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl DistributedMutex for RedisMutex {
    async fn try_acquire(
        &self,
        key: &str,
        lease: Duration,
    ) -> Result<Option<LockHandle>, LockError> {
        let token: u64 = rand::random();
        let lease_ms = u64::try_from(lease.as_millis()).unwrap_or(u64::MAX).max(1);
        let mut conn = self.conn.clone();
        let reply: Option<String> = ::redis::cmd("SET")
            .arg(key)
            .arg(token.to_string())
            .arg("NX")
            .arg("PX")
            .arg(lease_ms)
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(reply.map(|_| LockHandle::new(key, token, lease)))
    }

    async fn release(&self, handle: &LockHandle) -> Result<bool, LockError> {
        let mut conn = self.conn.clone();
        let deleted: i64 = Script::new(RELEASE_IF_OWNER)
            .key(handle.key())
            .arg(handle.token().to_string())
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(deleted == 1 && !handle.is_expired())
    }
}
