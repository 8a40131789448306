//! Admission control: decide, per item, whether a request is admitted or
//! waitlisted without ever confirming more than the item's limit.
//!
//! Every decision runs inside an exclusive section for its item. Exclusivity
//! comes from one of two strategies, picked at construction and never mixed:
//! the request serializer (`Strategy::Queue`, the default) or a lease mutex
//! (`Strategy::Lock`). The store's guarded insert backs both up.

pub(crate) mod section;
mod state;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::cache::{lock_key, AvailabilityCache};
use crate::config::{SeatgateConfig, Strategy};
use crate::error::AdmissionError;
use crate::lock::{DistributedMutex, InMemoryMutex};
use crate::notify::{group_key, NotificationBroadcaster, Subscription};
use crate::retry::BackoffPolicy;
use crate::serializer::{RequestSerializer, Ticket};
use crate::store::ReservationStore;
use crate::types::{Admission, Availability, ItemId, RequesterId, Reservation, ReservationId};
use crate::waitlist::Waitlist;

use section::{AdmissionCore, CancelTarget, Op, OpOutput};

pub use section::AdmissionPolicy;
pub use state::{AdmissionState, IntentTrace, InvalidTransition};

/// Where an item's exclusive section comes from.
enum Exclusivity {
    Queue(RequestSerializer),
    Lock {
        mutex: Arc<dyn DistributedMutex>,
        lease: Duration,
        retry: BackoffPolicy,
    },
}

/// Backends the controller is wired to.
pub struct AdmissionParts {
    pub store: Arc<dyn ReservationStore>,
    pub cache: Arc<dyn AvailabilityCache>,
    pub waitlist: Arc<dyn Waitlist>,
    pub notifier: Arc<NotificationBroadcaster>,
    /// Lease mutex for `Strategy::Lock`.
    pub mutex: Option<Arc<dyn DistributedMutex>>,
}

pub struct AdmissionController {
    core: Arc<AdmissionCore>,
    exclusivity: Exclusivity,
}

impl AdmissionController {
    /// Wire the controller and, for the queue strategy, start the serializer.
    /// Must be called inside a Tokio runtime. The lock strategy falls back to
    /// a process-local mutex when no shared one is supplied.
    pub fn start(parts: AdmissionParts, cfg: &SeatgateConfig) -> Self {
        let core = Arc::new(AdmissionCore::new(
            parts.store,
            parts.cache,
            parts.waitlist,
            parts.notifier,
            AdmissionPolicy::from(cfg),
        ));
        let exclusivity = match cfg.strategy {
            Strategy::Queue => {
                Exclusivity::Queue(RequestSerializer::start(Arc::clone(&core), &cfg.serializer))
            }
            Strategy::Lock => Exclusivity::Lock {
                mutex: parts.mutex.unwrap_or_else(|| -> Arc<dyn DistributedMutex> {
                    tracing::info!("no shared mutex configured; using a process-local one");
                    Arc::new(InMemoryMutex::new())
                }),
                lease: cfg.lock.lease(),
                retry: cfg.lock.retry.to_policy(),
            },
        };
        tracing::info!(strategy = ?cfg.strategy, policy = ?core.policy, "admission controller ready");
        Self { core, exclusivity }
    }

    pub fn strategy(&self) -> Strategy {
        match self.exclusivity {
            Exclusivity::Queue(_) => Strategy::Queue,
            Exclusivity::Lock { .. } => Strategy::Lock,
        }
    }

    pub fn policy(&self) -> AdmissionPolicy {
        self.core.policy
    }

    /// Create an item with a positive limit (idempotent for the same limit).
    pub async fn define_item(&self, item: ItemId, limit: u32) -> Result<(), AdmissionError> {
        if limit == 0 {
            return Err(AdmissionError::InvalidLimit);
        }
        self.core.store.define_item(item, limit).await?;
        Ok(())
    }

    /// Decide one admission and wait for the outcome.
    pub async fn submit_admission(
        &self,
        item: ItemId,
        requester: RequesterId,
    ) -> Result<Admission, AdmissionError> {
        match &self.exclusivity {
            Exclusivity::Queue(_) => self.publish_admission(item, requester)?.outcome().await,
            Exclusivity::Lock {
                mutex,
                lease,
                retry,
            } => {
                let mut trace = IntentTrace::new(item, requester);
                trace.advance(AdmissionState::Serializing);
                let op = Op::Admit(trace);
                locked_section(&self.core, mutex.as_ref(), *lease, retry, item, op)
                    .await?
                    .into_admission()
            }
        }
    }

    /// Accept an admission intent and return immediately with a ticket.
    ///
    /// Under the queue strategy the intent is ordered behind earlier intents
    /// for the same item at this call; under the lock strategy it is decided
    /// by a spawned task that contends for the lease.
    pub fn publish_admission(
        &self,
        item: ItemId,
        requester: RequesterId,
    ) -> Result<Ticket<Admission>, AdmissionError> {
        let mut trace = IntentTrace::new(item, requester);
        trace.advance(AdmissionState::Serializing);
        match &self.exclusivity {
            Exclusivity::Queue(serializer) => match serializer.publish(item, Op::Admit(trace)) {
                Ok(rx) => Ok(Ticket::new(rx, OpOutput::into_admission)),
                Err((e, op)) => {
                    if let Op::Admit(mut trace) = op {
                        trace.fail(&e);
                    }
                    Err(e)
                }
            },
            Exclusivity::Lock {
                mutex,
                lease,
                retry,
            } => {
                let (tx, rx) = oneshot::channel();
                let core = Arc::clone(&self.core);
                let mutex = Arc::clone(mutex);
                let (lease, retry) = (*lease, *retry);
                tokio::spawn(async move {
                    let result =
                        locked_section(&core, mutex.as_ref(), lease, &retry, item, Op::Admit(trace))
                            .await;
                    let _ = tx.send(result);
                });
                Ok(Ticket::new(rx, OpOutput::into_admission))
            }
        }
    }

    /// Cancel the requester's reservation for the item. `Ok(false)` when there was none.
    pub async fn cancel(&self, item: ItemId, requester: RequesterId) -> Result<bool, AdmissionError> {
        self.run(item, Op::Cancel(CancelTarget::Requester(requester)))
            .await?
            .into_cancelled()
    }

    /// Cancel by reservation id. `Ok(false)` when the id is unknown.
    pub async fn cancel_reservation(&self, id: ReservationId) -> Result<bool, AdmissionError> {
        let Some(reservation) = self.core.store.get_reservation(id).await? else {
            return Ok(false);
        };
        self.run(
            reservation.item_id,
            Op::Cancel(CancelTarget::Reservation(id)),
        )
        .await?
        .into_cancelled()
    }

    /// Move waitlisted requesters into free slots, head first.
    pub async fn promote_waitlist(&self, item: ItemId) -> Result<Vec<Reservation>, AdmissionError> {
        self.run(item, Op::Promote).await?.into_promoted()
    }

    /// Reset the cached count and limit from the store.
    pub async fn reconcile(&self, item: ItemId) -> Result<Availability, AdmissionError> {
        self.run(item, Op::Reconcile).await?.into_reconciled()
    }

    /// Authoritative capacity snapshot, read from the store.
    pub async fn availability(&self, item: ItemId) -> Result<Availability, AdmissionError> {
        self.core.availability(item).await
    }

    /// The requester's reservation for the item, if any.
    pub async fn reservation_of(
        &self,
        item: ItemId,
        requester: RequesterId,
    ) -> Result<Option<Reservation>, AdmissionError> {
        Ok(self.core.store.find_reservation(item, requester).await?)
    }

    pub async fn waitlist_position(
        &self,
        item: ItemId,
        requester: RequesterId,
    ) -> Result<Option<usize>, AdmissionError> {
        Ok(self.core.waitlist.position(item, requester).await?)
    }

    pub async fn waitlist_entries(
        &self,
        item: ItemId,
    ) -> Result<Vec<crate::types::WaitlistEntry>, AdmissionError> {
        Ok(self.core.waitlist.entries(item).await?)
    }

    /// Group that outcomes for this (item, requester) are published to.
    pub fn notification_group(&self, item: ItemId, requester: RequesterId) -> String {
        group_key(self.core.policy.addressing, item, requester)
    }

    pub fn subscribe(&self, group: impl Into<String>) -> Subscription {
        self.core.notifier.subscribe(group)
    }

    pub fn notifier(&self) -> &Arc<NotificationBroadcaster> {
        &self.core.notifier
    }

    /// Drain the serializer (queue strategy) and stop.
    pub async fn shutdown(self) {
        if let Exclusivity::Queue(serializer) = self.exclusivity {
            serializer.shutdown().await;
        }
    }

    async fn run(&self, item: ItemId, op: Op) -> Result<OpOutput, AdmissionError> {
        match &self.exclusivity {
            Exclusivity::Queue(serializer) => {
                let rx = serializer.publish(item, op).map_err(|(e, _)| e)?;
                Ticket::<OpOutput>::new(rx, Ok).outcome().await
            }
            Exclusivity::Lock {
                mutex,
                lease,
                retry,
            } => locked_section(&self.core, mutex.as_ref(), *lease, retry, item, op).await,
        }
    }
}

/// Acquire the item's lease, run the section, release, then notify.
///
/// A release that finds the lease expired means another holder may have
/// overlapped: the cached count is dropped so the next section recomputes it
/// from the store.
async fn locked_section(
    core: &AdmissionCore,
    mutex: &dyn DistributedMutex,
    lease: Duration,
    retry: &BackoffPolicy,
    item: ItemId,
    op: Op,
) -> Result<OpOutput, AdmissionError> {
    let key = lock_key(item);
    let handle = match mutex.acquire(&key, lease, retry).await {
        Ok(h) => h,
        Err(e) => {
            let e = AdmissionError::from(e);
            if let Op::Admit(mut trace) = op {
                trace.fail(&e);
            }
            return Err(e);
        }
    };

    let result = core.execute(item, op).await;

    match mutex.release(&handle).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!(key = %key, lease_ms = lease.as_millis() as u64, "lease expired before release");
            core.drop_cached_count(item).await;
        }
        Err(e) => tracing::warn!(key = %key, "lease release failed, it will expire on its own: {e}"),
    }

    Ok(core.finish(result?))
}

#[cfg(test)]
mod tests;
