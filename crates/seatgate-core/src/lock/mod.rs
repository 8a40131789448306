//! Lease-based mutual exclusion keyed by resource name.
//!
//! At most one holder per key at a time; a lease expires on its own after
//! its duration so a crashed holder cannot wedge an item. Near expiry two
//! holders may briefly overlap, so callers treat the section as best-effort
//! exclusion and rely on the store's guarded insert as the final backstop.

mod memory;
#[cfg(feature = "redis")]
mod redis;

use async_trait::async_trait;
use std::time::{Duration, Instant};

use crate::error::LockError;
use crate::retry::{BackoffPolicy, RetryDecision};

pub use memory::InMemoryMutex;
#[cfg(feature = "redis")]
pub use self::redis::RedisMutex;

/// Proof of a granted lease. The token fences releases: a handle whose
/// lease expired and was re-granted cannot release the new holder's lease.
#[derive(Debug, Clone)]
pub struct LockHandle {
    key: String,
    token: u64,
    acquired_at: Instant,
    lease: Duration,
}

impl LockHandle {
    pub fn new(key: impl Into<String>, token: u64, lease: Duration) -> Self {
        Self {
            key: key.into(),
            token,
            acquired_at: Instant::now(),
            lease,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn lease(&self) -> Duration {
        self.lease
    }

    /// True once the lease may have been granted to someone else.
    pub fn is_expired(&self) -> bool {
        self.acquired_at.elapsed() >= self.lease
    }
}

#[async_trait]
pub trait DistributedMutex: Send + Sync {
    /// Single attempt; `Ok(None)` when another holder has a live lease.
    async fn try_acquire(&self, key: &str, lease: Duration)
        -> Result<Option<LockHandle>, LockError>;

    /// Release the lease. Returns `false` if the lease had already expired
    /// (and possibly been re-granted), which the caller must treat as lost exclusivity.
    async fn release(&self, handle: &LockHandle) -> Result<bool, LockError>;

    /// Retry `try_acquire` with jittered backoff until granted or attempts run out.
    async fn acquire(
        &self,
        key: &str,
        lease: Duration,
        policy: &BackoffPolicy,
    ) -> Result<LockHandle, LockError> {
        let mut attempt = 1u32;
        loop {
            if let Some(handle) = self.try_acquire(key, lease).await? {
                if attempt > 1 {
                    tracing::debug!(key, attempt, "lease acquired after contention");
                }
                return Ok(handle);
            }
            match policy.decide(attempt) {
                RetryDecision::NoRetry => {
                    tracing::warn!(
                        key,
                        attempts = attempt,
                        budget = ?policy.max_total_wait(),
                        "gave up waiting for lease"
                    );
                    return Err(LockError::Timeout {
                        key: key.to_string(),
                        attempts: attempt,
                    });
                }
                RetryDecision::RetryAfter(delay) => {
                    tracing::trace!(key, attempt, ?delay, "lease busy, backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
