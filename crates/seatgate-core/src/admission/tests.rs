//! Tests for the admission controller over in-memory cache/waitlist and an
//! in-memory SQLite store, under both exclusivity strategies.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use super::{AdmissionController, AdmissionParts};
use crate::cache::{lock_key, AvailabilityCache, InMemoryCache};
use crate::config::{Addressing, DuplicatePolicy, PromotionPolicy, SeatgateConfig, Strategy};
use crate::error::{AdmissionError, StoreError};
use crate::lock::{DistributedMutex, InMemoryMutex};
use crate::notify::{Notification, NotificationBroadcaster};
use crate::store::{ReservationStore, SqliteStore};
use crate::types::{Admission, ItemId, ItemSummary, RequesterId, Reservation, ReservationId};
use crate::waitlist::{InMemoryWaitlist, Waitlist};

/// Store wrapper that can hold sections open or blow up mid-section.
struct ScriptedStore {
    inner: SqliteStore,
    /// When set, `get_item_limit` waits for a permit.
    gate: Option<Arc<Semaphore>>,
    /// Inserting for this requester panics.
    panic_for: Option<RequesterId>,
}

#[async_trait]
impl ReservationStore for ScriptedStore {
    async fn define_item(&self, item: ItemId, limit: u32) -> Result<(), StoreError> {
        self.inner.define_item(item, limit).await
    }

    async fn get_item_limit(&self, item: ItemId) -> Result<u32, StoreError> {
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.unwrap();
        }
        self.inner.get_item_limit(item).await
    }

    async fn count_reservations(&self, item: ItemId) -> Result<u32, StoreError> {
        self.inner.count_reservations(item).await
    }

    async fn insert_reservation(
        &self,
        item: ItemId,
        requester: RequesterId,
        duplicates: DuplicatePolicy,
    ) -> Result<Reservation, StoreError> {
        if self.panic_for == Some(requester) {
            panic!("store blew up for requester {requester}");
        }
        self.inner.insert_reservation(item, requester, duplicates).await
    }

    async fn delete_reservation(
        &self,
        item: ItemId,
        requester: RequesterId,
    ) -> Result<u64, StoreError> {
        self.inner.delete_reservation(item, requester).await
    }

    async fn delete_reservation_by_id(&self, id: ReservationId) -> Result<u64, StoreError> {
        self.inner.delete_reservation_by_id(id).await
    }

    async fn get_reservation(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        self.inner.get_reservation(id).await
    }

    async fn find_reservation(
        &self,
        item: ItemId,
        requester: RequesterId,
    ) -> Result<Option<Reservation>, StoreError> {
        self.inner.find_reservation(item, requester).await
    }

    async fn list_items(&self) -> Result<Vec<ItemSummary>, StoreError> {
        self.inner.list_items().await
    }
}

struct Harness {
    controller: AdmissionController,
    store: Arc<ScriptedStore>,
    cache: Arc<InMemoryCache>,
    waitlist: Arc<InMemoryWaitlist>,
}

struct Setup {
    cfg: SeatgateConfig,
    gate: Option<Arc<Semaphore>>,
    panic_for: Option<RequesterId>,
}

impl Setup {
    fn new(strategy: Strategy) -> Self {
        let mut cfg = SeatgateConfig::default();
        cfg.strategy = strategy;
        cfg.lock.retry.base_delay_ms = 1;
        cfg.lock.retry.max_delay_ms = 5;
        cfg.lock.retry.jitter_ms = 2;
        cfg.lock.retry.max_attempts = 1_000;
        Self {
            cfg,
            gate: None,
            panic_for: None,
        }
    }

    async fn build(self) -> Harness {
        let store = Arc::new(ScriptedStore {
            inner: SqliteStore::open_in_memory().await.unwrap(),
            gate: self.gate,
            panic_for: self.panic_for,
        });
        let cache = Arc::new(InMemoryCache::new());
        let waitlist = Arc::new(InMemoryWaitlist::new());
        let parts = AdmissionParts {
            store: store.clone(),
            cache: cache.clone(),
            waitlist: waitlist.clone(),
            notifier: Arc::new(NotificationBroadcaster::new(self.cfg.notification_capacity)),
            mutex: Some(Arc::new(InMemoryMutex::new())),
        };
        Harness {
            controller: AdmissionController::start(parts, &self.cfg),
            store,
            cache,
            waitlist,
        }
    }
}

async fn harness(strategy: Strategy) -> Harness {
    Setup::new(strategy).build().await
}

const BOTH: [Strategy; 2] = [Strategy::Queue, Strategy::Lock];

fn admitted(a: &Admission) -> &Reservation {
    match a {
        Admission::Admitted(r) => r,
        other => panic!("expected Admitted, got {other:?}"),
    }
}

#[tokio::test]
async fn fills_to_limit_then_waitlists() {
    for strategy in BOTH {
        let h = harness(strategy).await;
        h.controller.define_item(1, 2).await.unwrap();

        let a = h.controller.submit_admission(1, 10).await.unwrap();
        let b = h.controller.submit_admission(1, 11).await.unwrap();
        let c = h.controller.submit_admission(1, 12).await.unwrap();

        assert_eq!(admitted(&a).requester_id, 10);
        assert_eq!(admitted(&b).requester_id, 11);
        assert_eq!(c, Admission::Waitlisted { position: 1 });

        assert_eq!(h.store.count_reservations(1).await.unwrap(), 2);
        assert_eq!(h.cache.get_count(1).await.unwrap(), Some(2));
        let avail = h.controller.availability(1).await.unwrap();
        assert_eq!(avail.confirmed_count, 2);
        assert_eq!(avail.waitlist_len, 1);
        assert_eq!(avail.remaining(), 0);
        h.controller.shutdown().await;
    }
}

#[tokio::test]
async fn cancel_frees_a_slot_for_the_next_request() {
    for strategy in BOTH {
        let h = harness(strategy).await;
        h.controller.define_item(2, 1).await.unwrap();
        admitted(&h.controller.submit_admission(2, 1).await.unwrap());

        assert!(h.controller.cancel(2, 1).await.unwrap());
        assert_eq!(h.cache.get_count(2).await.unwrap(), Some(0));
        // Nothing left to cancel is a no-op, not an error.
        assert!(!h.controller.cancel(2, 1).await.unwrap());

        let b = h.controller.submit_admission(2, 2).await.unwrap();
        assert_eq!(admitted(&b).requester_id, 2);
        h.controller.shutdown().await;
    }
}

#[tokio::test]
async fn repeat_submission_is_idempotent_under_reject() {
    for strategy in BOTH {
        let h = harness(strategy).await;
        h.controller.define_item(3, 1).await.unwrap();

        let first = h.controller.submit_admission(3, 7).await.unwrap();
        let again = h.controller.submit_admission(3, 7).await.unwrap();
        assert_eq!(again, Admission::AlreadyAdmitted(admitted(&first).clone()));

        assert_eq!(
            h.controller.submit_admission(3, 8).await.unwrap(),
            Admission::Waitlisted { position: 1 }
        );
        assert_eq!(
            h.controller.submit_admission(3, 8).await.unwrap(),
            Admission::Waitlisted { position: 1 }
        );
        assert_eq!(h.waitlist.len(3).await.unwrap(), 1);
        assert_eq!(h.store.count_reservations(3).await.unwrap(), 1);
        h.controller.shutdown().await;
    }
}

#[tokio::test]
async fn waitlisted_requester_resubmitting_into_a_free_slot_is_admitted() {
    for strategy in BOTH {
        let h = harness(strategy).await;
        h.controller.define_item(20, 1).await.unwrap();

        admitted(&h.controller.submit_admission(20, 10).await.unwrap());
        assert_eq!(
            h.controller.submit_admission(20, 11).await.unwrap(),
            Admission::Waitlisted { position: 1 }
        );
        assert!(h.controller.cancel(20, 10).await.unwrap());

        let again = h.controller.submit_admission(20, 11).await.unwrap();
        assert_eq!(admitted(&again).requester_id, 11, "{strategy:?}");
        assert_eq!(h.controller.waitlist_position(20, 11).await.unwrap(), None);

        // The slot is taken, so a newcomer waits instead of jumping in.
        assert_eq!(
            h.controller.submit_admission(20, 12).await.unwrap(),
            Admission::Waitlisted { position: 1 }
        );
        let avail = h.controller.availability(20).await.unwrap();
        assert_eq!(avail.confirmed_count, 1);
        assert_eq!(avail.waitlist_len, 1);
        h.controller.shutdown().await;
    }
}

#[tokio::test]
async fn allow_policy_admits_the_same_requester_twice() {
    let mut setup = Setup::new(Strategy::Queue);
    setup.cfg.duplicate_policy = DuplicatePolicy::Allow;
    let h = setup.build().await;
    h.controller.define_item(4, 3).await.unwrap();

    admitted(&h.controller.submit_admission(4, 1).await.unwrap());
    admitted(&h.controller.submit_admission(4, 1).await.unwrap());
    assert_eq!(h.store.count_reservations(4).await.unwrap(), 2);

    assert!(h.controller.cancel(4, 1).await.unwrap());
    assert_eq!(h.store.count_reservations(4).await.unwrap(), 1);
    h.controller.shutdown().await;
}

#[tokio::test]
async fn unknown_item_and_bad_limit_are_final_errors() {
    let h = harness(Strategy::Queue).await;
    let err = h.controller.submit_admission(404, 1).await.unwrap_err();
    assert!(matches!(err, AdmissionError::UnknownItem(404)));
    assert!(!err.is_retryable());

    let err = h.controller.define_item(5, 0).await.unwrap_err();
    assert!(matches!(err, AdmissionError::InvalidLimit));
    h.controller.shutdown().await;
}

#[tokio::test]
async fn cold_cache_reads_count_from_store() {
    for strategy in BOTH {
        let h = harness(strategy).await;
        h.store.define_item(6, 5).await.unwrap();
        for r in 0..5 {
            h.store
                .insert_reservation(6, r, DuplicatePolicy::Reject)
                .await
                .unwrap();
        }
        assert_eq!(h.cache.get_count(6).await.unwrap(), None);

        assert_eq!(
            h.controller.submit_admission(6, 99).await.unwrap(),
            Admission::Waitlisted { position: 1 }
        );
        assert_eq!(h.cache.get_count(6).await.unwrap(), Some(5));
        assert_eq!(h.cache.get_limit(6).await.unwrap(), Some(5));
        h.controller.shutdown().await;
    }
}

#[tokio::test]
async fn stale_cache_on_first_touch_is_corrected() {
    let h = harness(Strategy::Queue).await;
    h.store.define_item(7, 1).await.unwrap();
    h.store
        .insert_reservation(7, 1, DuplicatePolicy::Reject)
        .await
        .unwrap();
    // Left behind by some earlier process.
    h.cache.set_count(7, 0).await.unwrap();

    assert_eq!(
        h.controller.submit_admission(7, 2).await.unwrap(),
        Admission::Waitlisted { position: 1 }
    );
    assert_eq!(h.cache.get_count(7).await.unwrap(), Some(1));
    h.controller.shutdown().await;
}

#[tokio::test]
async fn store_guard_stops_oversell_when_cache_lies() {
    let h = harness(Strategy::Queue).await;
    h.controller.define_item(8, 1).await.unwrap();
    admitted(&h.controller.submit_admission(8, 1).await.unwrap());

    // Corrupt the validated cache behind the controller's back.
    h.cache.set_count(8, 0).await.unwrap();
    let err = h.controller.submit_admission(8, 2).await.unwrap_err();
    assert!(matches!(err, AdmissionError::StoreConstraint(_)));
    assert!(err.is_retryable());
    assert_eq!(h.store.count_reservations(8).await.unwrap(), 1);
    assert_eq!(h.cache.get_count(8).await.unwrap(), None);

    // The retry sees the real count.
    assert_eq!(
        h.controller.submit_admission(8, 2).await.unwrap(),
        Admission::Waitlisted { position: 1 }
    );
    h.controller.shutdown().await;
}

#[tokio::test]
async fn published_intents_keep_their_order() {
    let h = harness(Strategy::Queue).await;
    h.controller.define_item(9, 1).await.unwrap();

    let tickets: Vec<_> = (1..=4)
        .map(|r| h.controller.publish_admission(9, r).unwrap())
        .collect();
    let mut outcomes = Vec::new();
    for t in tickets {
        outcomes.push(t.outcome().await.unwrap());
    }
    assert_eq!(admitted(&outcomes[0]).requester_id, 1);
    assert_eq!(outcomes[1], Admission::Waitlisted { position: 1 });
    assert_eq!(outcomes[2], Admission::Waitlisted { position: 2 });
    assert_eq!(outcomes[3], Admission::Waitlisted { position: 3 });

    let order: Vec<_> = h
        .controller
        .waitlist_entries(9)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.requester_id)
        .collect();
    assert_eq!(order, vec![2, 3, 4]);
    h.controller.shutdown().await;
}

#[tokio::test]
async fn manual_promotion_fills_freed_slots_in_order() {
    for strategy in BOTH {
        let h = harness(strategy).await;
        h.controller.define_item(10, 2).await.unwrap();
        for r in 1..=4 {
            h.controller.submit_admission(10, r).await.unwrap();
        }
        h.controller.cancel(10, 1).await.unwrap();
        h.controller.cancel(10, 2).await.unwrap();
        // Manual policy: cancelling alone does not promote.
        assert_eq!(h.waitlist.len(10).await.unwrap(), 2);

        let promoted = h.controller.promote_waitlist(10).await.unwrap();
        let ids: Vec<_> = promoted.iter().map(|r| r.requester_id).collect();
        assert_eq!(ids, vec![3, 4]);
        assert_eq!(h.waitlist.len(10).await.unwrap(), 0);
        assert_eq!(h.cache.get_count(10).await.unwrap(), Some(2));

        assert!(h.controller.promote_waitlist(10).await.unwrap().is_empty());
        h.controller.shutdown().await;
    }
}

#[tokio::test]
async fn on_cancel_promotion_notifies_the_promoted_requester() {
    for strategy in BOTH {
        let mut setup = Setup::new(strategy);
        setup.cfg.promotion = PromotionPolicy::OnCancel;
        let h = setup.build().await;
        h.controller.define_item(11, 1).await.unwrap();

        let mut b_events = h.controller.subscribe(h.controller.notification_group(11, 2));
        let mut c_events = h.controller.subscribe(h.controller.notification_group(11, 3));

        admitted(&h.controller.submit_admission(11, 1).await.unwrap());
        h.controller.submit_admission(11, 2).await.unwrap();
        h.controller.submit_admission(11, 3).await.unwrap();
        assert_eq!(b_events.recv().await, Some(Notification::queued(11, 2, 1)));
        assert_eq!(c_events.recv().await, Some(Notification::queued(11, 3, 2)));

        assert!(h.controller.cancel(11, 1).await.unwrap());
        assert_eq!(
            b_events.recv().await,
            Some(Notification::confirmed(11, 2, true))
        );
        // The rest of the line moves up.
        assert_eq!(c_events.recv().await, Some(Notification::queued(11, 3, 1)));
        assert!(h.controller.reservation_of(11, 2).await.unwrap().is_some());
        h.controller.shutdown().await;
    }
}

#[tokio::test]
async fn shared_addressing_uses_one_room() {
    let mut setup = Setup::new(Strategy::Queue);
    setup.cfg.addressing = Addressing::Shared;
    let h = setup.build().await;
    h.controller.define_item(12, 1).await.unwrap();

    let mut room = h.controller.subscribe("common-room");
    h.controller.submit_admission(12, 1).await.unwrap();
    h.controller.submit_admission(12, 2).await.unwrap();
    assert_eq!(room.recv().await, Some(Notification::confirmed(12, 1, true)));
    let queued = room.recv().await.unwrap();
    assert_eq!(queued.to_json().unwrap(), r#"{"requesterId":2,"itemId":12,"queuePosition":1}"#);
    h.controller.shutdown().await;
}

#[tokio::test]
async fn cancel_by_reservation_id() {
    for strategy in BOTH {
        let h = harness(strategy).await;
        h.controller.define_item(13, 2).await.unwrap();
        let r = admitted(&h.controller.submit_admission(13, 5).await.unwrap()).clone();

        assert!(h.controller.cancel_reservation(r.id).await.unwrap());
        assert!(!h.controller.cancel_reservation(r.id).await.unwrap());
        assert!(!h.controller.cancel_reservation(9_999).await.unwrap());
        assert_eq!(h.controller.availability(13).await.unwrap().confirmed_count, 0);
        h.controller.shutdown().await;
    }
}

#[tokio::test]
async fn reconcile_overwrites_drifted_cache() {
    for strategy in BOTH {
        let h = harness(strategy).await;
        h.controller.define_item(14, 3).await.unwrap();
        h.controller.submit_admission(14, 1).await.unwrap();
        h.cache.set_count(14, 3).await.unwrap();

        let avail = h.controller.reconcile(14).await.unwrap();
        assert_eq!(avail.confirmed_count, 1);
        assert_eq!(h.cache.get_count(14).await.unwrap(), Some(1));
        admitted(&h.controller.submit_admission(14, 2).await.unwrap());
        h.controller.shutdown().await;
    }
}

#[tokio::test]
async fn panicking_section_reports_consumer_failure() {
    let mut setup = Setup::new(Strategy::Queue);
    setup.cfg.serializer.shards = 1;
    setup.panic_for = Some(666);
    let h = setup.build().await;
    h.controller.define_item(15, 5).await.unwrap();

    let err = h.controller.submit_admission(15, 666).await.unwrap_err();
    assert!(matches!(err, AdmissionError::ConsumerFailed(_)));
    assert!(err.is_retryable());

    // The shard survives and keeps serving the item.
    admitted(&h.controller.submit_admission(15, 1).await.unwrap());
    assert_eq!(h.store.count_reservations(15).await.unwrap(), 1);
    h.controller.shutdown().await;
}

#[tokio::test]
async fn full_shard_queue_rejects_new_intents() {
    let gate = Arc::new(Semaphore::new(0));
    let mut setup = Setup::new(Strategy::Queue);
    setup.cfg.serializer.shards = 1;
    setup.cfg.serializer.queue_capacity = 1;
    setup.gate = Some(gate.clone());
    let h = setup.build().await;
    h.store.inner.define_item(16, 10).await.unwrap();

    // The worker takes the first intent and blocks inside it.
    let first = h.controller.publish_admission(16, 1).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = h.controller.publish_admission(16, 2).unwrap();

    let err = h.controller.publish_admission(16, 3).err().unwrap();
    assert!(matches!(err, AdmissionError::SerializerUnavailable(_)));
    assert!(err.is_retryable());

    gate.add_permits(100);
    admitted(&first.outcome().await.unwrap());
    admitted(&second.outcome().await.unwrap());
    h.controller.shutdown().await;
}

#[tokio::test]
async fn shutdown_drains_accepted_intents() {
    let h = harness(Strategy::Queue).await;
    h.controller.define_item(17, 2).await.unwrap();
    let tickets: Vec<_> = (1..=5)
        .map(|r| h.controller.publish_admission(17, r).unwrap())
        .collect();
    h.controller.shutdown().await;

    let mut admitted_count = 0;
    for t in tickets {
        if matches!(t.outcome().await.unwrap(), Admission::Admitted(_)) {
            admitted_count += 1;
        }
    }
    assert_eq!(admitted_count, 2);
}

#[tokio::test]
async fn expired_lease_invalidates_cached_count() {
    let gate = Arc::new(Semaphore::new(0));
    let mut setup = Setup::new(Strategy::Lock);
    setup.cfg.lock.lease_ms = 20;
    setup.gate = Some(gate.clone());
    let h = setup.build().await;
    h.store.inner.define_item(18, 3).await.unwrap();

    let ticket = h.controller.publish_admission(18, 1).unwrap();
    // Hold the section past the lease.
    tokio::time::sleep(Duration::from_millis(60)).await;
    gate.add_permits(100);

    admitted(&ticket.outcome().await.unwrap());
    assert_eq!(h.store.count_reservations(18).await.unwrap(), 1);
    assert_eq!(h.cache.get_count(18).await.unwrap(), None);

    // Next section recomputes from the store.
    admitted(&h.controller.submit_admission(18, 2).await.unwrap());
    assert_eq!(h.cache.get_count(18).await.unwrap(), Some(2));
}

#[tokio::test]
async fn lock_timeout_is_retryable() {
    let mut setup = Setup::new(Strategy::Lock);
    setup.cfg.lock.retry.max_attempts = 2;
    let mutex = Arc::new(InMemoryMutex::new());
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    store.define_item(19, 1).await.unwrap();
    let controller = AdmissionController::start(
        AdmissionParts {
            store,
            cache: Arc::new(InMemoryCache::new()),
            waitlist: Arc::new(InMemoryWaitlist::new()),
            notifier: Arc::new(NotificationBroadcaster::new(8)),
            mutex: Some(mutex.clone()),
        },
        &setup.cfg,
    );

    let _held = mutex
        .try_acquire(&lock_key(19), Duration::from_secs(30))
        .await
        .unwrap()
        .unwrap();
    let err = controller.submit_admission(19, 1).await.unwrap_err();
    assert!(matches!(err, AdmissionError::LockTimeout(_)));
    assert!(err.is_retryable());
}
