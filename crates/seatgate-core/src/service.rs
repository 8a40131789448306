//! Wires backends to an admission controller according to the config.

use anyhow::Result;
use std::sync::Arc;

use crate::admission::{AdmissionController, AdmissionParts};
use crate::cache::{AvailabilityCache, InMemoryCache};
use crate::config::SeatgateConfig;
use crate::lock::DistributedMutex;
use crate::notify::NotificationBroadcaster;
use crate::store::{ReservationStore, SqliteStore};
use crate::types::ItemSummary;
use crate::waitlist::Waitlist;

type Backends = (
    Arc<dyn AvailabilityCache>,
    Arc<dyn Waitlist>,
    Option<Arc<dyn DistributedMutex>>,
);

/// A running admission pipeline over one SQLite store.
pub struct ReservationService {
    controller: AdmissionController,
    store: Arc<SqliteStore>,
}

impl ReservationService {
    /// With `redis_url` set, the cache, waitlist and mutex are shared through
    /// Redis. Otherwise counts are cached in-process and the waitlist lives in
    /// the store, so separate processes still see one queue per item.
    pub async fn start(cfg: &SeatgateConfig, store: SqliteStore) -> Result<Self> {
        let store = Arc::new(store);
        let (cache, waitlist, mutex) = match cfg.redis_url.as_deref() {
            Some(url) => shared_backends(url).await?,
            None => {
                let waitlist: Arc<dyn Waitlist> = store.clone();
                (Arc::new(InMemoryCache::new()) as Arc<dyn AvailabilityCache>, waitlist, None)
            }
        };
        let parts = AdmissionParts {
            store: store.clone() as Arc<dyn ReservationStore>,
            cache,
            waitlist,
            notifier: Arc::new(NotificationBroadcaster::new(cfg.notification_capacity)),
            mutex,
        };
        let controller = AdmissionController::start(parts, cfg);
        Ok(Self { controller, store })
    }

    pub fn controller(&self) -> &AdmissionController {
        &self.controller
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    pub async fn list_items(&self) -> Result<Vec<ItemSummary>> {
        Ok(self.store.list_items().await?)
    }

    /// Drain queued intents and stop the workers.
    pub async fn shutdown(self) {
        self.controller.shutdown().await;
    }
}

#[cfg(feature = "redis")]
async fn shared_backends(url: &str) -> Result<Backends> {
    use crate::cache::RedisCache;
    use crate::lock::RedisMutex;

    let redis = Arc::new(RedisCache::connect(url).await?);
    let cache: Arc<dyn AvailabilityCache> = redis.clone();
    let waitlist: Arc<dyn Waitlist> = redis;
    let mutex: Arc<dyn DistributedMutex> = Arc::new(RedisMutex::connect(url).await?);
    Ok((cache, waitlist, Some(mutex)))
}

#[cfg(not(feature = "redis"))]
async fn shared_backends(url: &str) -> Result<Backends> {
    anyhow::bail!("redis_url is set ({url}) but seatgate was built without the `redis` feature")
}
