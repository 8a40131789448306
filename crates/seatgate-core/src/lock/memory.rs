use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::{DistributedMutex, LockHandle};
use crate::error::LockError;

struct Lease {
    token: u64,
    expires_at: Instant,
}

/// Process-local lease table.
///
/// Same semantics as the shared backend (expiry, fencing tokens) so the
/// lock strategy can run in a single process and in tests.
#[derive(Default)]
pub struct InMemoryMutex {
    leases: Mutex<HashMap<String, Lease>>,
    next_token: AtomicU64,
}

impl InMemoryMutex {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_leases<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, Lease>) -> T,
    ) -> Result<T, LockError> {
        let mut leases = self
            .leases
            .lock()
            .map_err(|_| LockError::Backend("lease table poisoned".into()))?;
        Ok(f(&mut leases))
    }
}

#[async_trait]
impl DistributedMutex for InMemoryMutex {
    async fn try_acquire(
        &self,
        key: &str,
        lease: Duration,
    ) -> Result<Option<LockHandle>, LockError> {
        let now = Instant::now();
        self.with_leases(|leases| {
            if let Some(current) = leases.get(key) {
                if current.expires_at > now {
                    return None;
                }
                tracing::warn!(key, token = current.token, "lease expired without release");
            }
            let token = self.next_token.fetch_add(1, Ordering::Relaxed) + 1;
            leases.insert(
                key.to_string(),
                Lease {
                    token,
                    expires_at: now + lease,
                },
            );
            Some(LockHandle::new(key, token, lease))
        })
    }

    async fn release(&self, handle: &LockHandle) -> Result<bool, LockError> {
        let now = Instant::now();
        self.with_leases(|leases| match leases.get(handle.key()) {
            Some(current) if current.token == handle.token() => {
                let live = current.expires_at > now;
                leases.remove(handle.key());
                live
            }
            _ => false,
        })
    }
}
