//! Work done while an item is held exclusively, whichever strategy provides
//! the exclusion. Nothing here may run for the same item concurrently.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use super::state::{AdmissionState, IntentTrace};
use crate::cache::AvailabilityCache;
use crate::config::{Addressing, DuplicatePolicy, PromotionPolicy, SeatgateConfig};
use crate::error::{AdmissionError, StoreError};
use crate::notify::{group_key, Notification, NotificationBroadcaster};
use crate::store::ReservationStore;
use crate::types::{
    Admission, Availability, ItemId, RequesterId, Reservation, ReservationId, WaitlistEntry,
};
use crate::waitlist::Waitlist;

/// Behavioural knobs the section consults.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdmissionPolicy {
    pub duplicates: DuplicatePolicy,
    pub promotion: PromotionPolicy,
    pub addressing: Addressing,
}

impl From<&SeatgateConfig> for AdmissionPolicy {
    fn from(cfg: &SeatgateConfig) -> Self {
        Self {
            duplicates: cfg.duplicate_policy,
            promotion: cfg.promotion,
            addressing: cfg.addressing,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum CancelTarget {
    Requester(RequesterId),
    Reservation(ReservationId),
}

/// One unit of work for an item's exclusive section.
#[derive(Debug)]
pub(crate) enum Op {
    Admit(IntentTrace),
    Cancel(CancelTarget),
    Promote,
    Reconcile,
}

impl Op {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Op::Admit(_) => "admit",
            Op::Cancel(_) => "cancel",
            Op::Promote => "promote",
            Op::Reconcile => "reconcile",
        }
    }
}

#[derive(Debug)]
pub(crate) enum OpOutput {
    Admission(Admission),
    Cancelled(bool),
    Promoted(Vec<Reservation>),
    Reconciled(Availability),
}

fn unexpected(op: &str) -> AdmissionError {
    AdmissionError::ConsumerFailed(format!("section returned a result for another op than {op}"))
}

impl OpOutput {
    pub(crate) fn into_admission(self) -> Result<Admission, AdmissionError> {
        match self {
            OpOutput::Admission(a) => Ok(a),
            _ => Err(unexpected("admit")),
        }
    }

    pub(crate) fn into_cancelled(self) -> Result<bool, AdmissionError> {
        match self {
            OpOutput::Cancelled(b) => Ok(b),
            _ => Err(unexpected("cancel")),
        }
    }

    pub(crate) fn into_promoted(self) -> Result<Vec<Reservation>, AdmissionError> {
        match self {
            OpOutput::Promoted(v) => Ok(v),
            _ => Err(unexpected("promote")),
        }
    }

    pub(crate) fn into_reconciled(self) -> Result<Availability, AdmissionError> {
        match self {
            OpOutput::Reconciled(a) => Ok(a),
            _ => Err(unexpected("reconcile")),
        }
    }
}

/// Result of a section plus the notifications to send once exclusivity is released.
#[derive(Debug)]
pub(crate) struct SectionOutcome {
    pub output: OpOutput,
    pub notices: Vec<Notification>,
    pub trace: Option<IntentTrace>,
}

impl SectionOutcome {
    fn plain(output: OpOutput) -> Self {
        Self {
            output,
            notices: Vec::new(),
            trace: None,
        }
    }
}

/// Shared state of the admission pipeline.
pub(crate) struct AdmissionCore {
    pub store: Arc<dyn ReservationStore>,
    pub cache: Arc<dyn AvailabilityCache>,
    pub waitlist: Arc<dyn Waitlist>,
    pub notifier: Arc<NotificationBroadcaster>,
    pub policy: AdmissionPolicy,
    /// Items whose cached count has been checked against the store by this process.
    validated: Mutex<HashSet<ItemId>>,
}

impl AdmissionCore {
    pub(crate) fn new(
        store: Arc<dyn ReservationStore>,
        cache: Arc<dyn AvailabilityCache>,
        waitlist: Arc<dyn Waitlist>,
        notifier: Arc<NotificationBroadcaster>,
        policy: AdmissionPolicy,
    ) -> Self {
        Self {
            store,
            cache,
            waitlist,
            notifier,
            policy,
            validated: Mutex::new(HashSet::new()),
        }
    }

    /// Run `op` for `item`. The caller must hold the item exclusively.
    pub(crate) async fn execute(
        &self,
        item: ItemId,
        op: Op,
    ) -> Result<SectionOutcome, AdmissionError> {
        match op {
            Op::Admit(mut trace) => {
                trace.advance(AdmissionState::Checking);
                match self.admit(item, trace.requester_id).await {
                    Ok((admission, notice)) => {
                        trace.advance(match admission {
                            Admission::Waitlisted { .. } => AdmissionState::Waitlisted,
                            _ => AdmissionState::Admitted,
                        });
                        Ok(SectionOutcome {
                            output: OpOutput::Admission(admission),
                            notices: vec![notice],
                            trace: Some(trace),
                        })
                    }
                    Err(e) => {
                        trace.fail(&e);
                        Err(e)
                    }
                }
            }
            Op::Cancel(target) => self.cancel(item, target).await,
            Op::Promote => {
                let mut notices = Vec::new();
                let promoted = self.promote(item, &mut notices).await?;
                Ok(SectionOutcome {
                    output: OpOutput::Promoted(promoted),
                    notices,
                    trace: None,
                })
            }
            Op::Reconcile => self
                .reconcile(item)
                .await
                .map(|a| SectionOutcome::plain(OpOutput::Reconciled(a))),
        }
    }

    /// Publish the section's notifications. Call after exclusivity is released.
    pub(crate) fn finish(&self, outcome: SectionOutcome) -> OpOutput {
        for notice in outcome.notices {
            let group = group_key(self.policy.addressing, notice.item_id, notice.requester_id);
            self.notifier.broadcast(&group, notice);
        }
        if let Some(mut trace) = outcome.trace {
            trace.advance(AdmissionState::Notified);
        }
        outcome.output
    }

    async fn admit(
        &self,
        item: ItemId,
        requester: RequesterId,
    ) -> Result<(Admission, Notification), AdmissionError> {
        let limit = self.load_limit(item).await?;
        let rejects_duplicates = self.policy.duplicates == DuplicatePolicy::Reject;

        if rejects_duplicates {
            if let Some(existing) = self.store.find_reservation(item, requester).await? {
                tracing::debug!(item_id = item, requester_id = requester, "already admitted");
                let notice = Notification::confirmed(item, requester, true);
                return Ok((Admission::AlreadyAdmitted(existing), notice));
            }
        }

        let count = self.load_count(item).await?;
        if count >= limit {
            if rejects_duplicates {
                if let Some(position) = self.waitlist.position(item, requester).await? {
                    let notice = Notification::queued(item, requester, position);
                    return Ok((Admission::Waitlisted { position }, notice));
                }
            }
            let position = self
                .waitlist
                .push(item, WaitlistEntry::new(item, requester))
                .await?;
            tracing::info!(item_id = item, requester_id = requester, position, "waitlisted");
            return Ok((
                Admission::Waitlisted { position },
                Notification::queued(item, requester, position),
            ));
        }

        let reservation = self.insert(item, requester).await?;
        self.bump_count(item, count).await;
        if rejects_duplicates {
            self.leave_waitlist(item, requester).await;
        }
        tracing::info!(
            item_id = item,
            requester_id = requester,
            reservation_id = reservation.id,
            "admitted"
        );
        Ok((
            Admission::Admitted(reservation),
            Notification::confirmed(item, requester, true),
        ))
    }

    /// An admitted requester no longer waits. A stale entry left behind is
    /// skipped by promotion, so a failure here is only logged.
    async fn leave_waitlist(&self, item: ItemId, requester: RequesterId) {
        match self.waitlist.remove(item, requester).await {
            Ok(true) => {
                tracing::debug!(item_id = item, requester_id = requester, "left the waitlist on admission");
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(item_id = item, requester_id = requester, "could not drop waitlist entry: {e}");
            }
        }
    }

    /// Guarded store insert. A constraint rejection means the cached count
    /// was behind the store: drop it and let the caller retry.
    async fn insert(
        &self,
        item: ItemId,
        requester: RequesterId,
    ) -> Result<Reservation, AdmissionError> {
        match self
            .store
            .insert_reservation(item, requester, self.policy.duplicates)
            .await
        {
            Ok(r) => Ok(r),
            Err(StoreError::Constraint(msg)) => {
                tracing::warn!(item_id = item, requester_id = requester, "store rejected insert: {msg}");
                self.drop_cached_count(item).await;
                Err(AdmissionError::StoreConstraint(msg))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Mirror a store insert in the cache. The store write stands even if this fails.
    async fn bump_count(&self, item: ItemId, before: u32) {
        match self.cache.increment_count(item).await {
            Ok(after) if after == before + 1 => {}
            Ok(after) => {
                tracing::warn!(item_id = item, before, after, "cached count drifted; invalidating");
                self.drop_cached_count(item).await;
            }
            Err(e) => {
                tracing::error!(item_id = item, "reconciliation defect: store written, cache increment failed: {e}");
                self.drop_cached_count(item).await;
            }
        }
    }

    async fn cancel(
        &self,
        item: ItemId,
        target: CancelTarget,
    ) -> Result<SectionOutcome, AdmissionError> {
        let (removed, requester) = match target {
            CancelTarget::Requester(requester) => {
                (self.store.delete_reservation(item, requester).await?, requester)
            }
            CancelTarget::Reservation(id) => match self.store.get_reservation(id).await? {
                Some(r) if r.item_id == item => {
                    (self.store.delete_reservation_by_id(id).await?, r.requester_id)
                }
                _ => (0, 0),
            },
        };
        if removed == 0 {
            tracing::debug!(item_id = item, ?target, "nothing to cancel");
            return Ok(SectionOutcome::plain(OpOutput::Cancelled(false)));
        }

        self.release_count(item, removed).await;
        tracing::info!(item_id = item, requester_id = requester, "reservation cancelled");

        let mut notices = vec![Notification::confirmed(item, requester, false)];
        if self.policy.promotion == PromotionPolicy::OnCancel {
            if let Err(e) = self.promote(item, &mut notices).await {
                // The cancellation is committed; promotion can be retried manually.
                tracing::warn!(item_id = item, "promotion after cancel failed: {e}");
            }
        }
        Ok(SectionOutcome {
            output: OpOutput::Cancelled(true),
            notices,
            trace: None,
        })
    }

    /// Mirror a store delete. A cached count is decremented; a miss is filled from the store.
    async fn release_count(&self, item: ItemId, removed: u64) {
        match self.cache.get_count(item).await {
            Ok(Some(_)) => {
                for _ in 0..removed {
                    if let Err(e) = self.cache.decrement_count(item).await {
                        tracing::error!(item_id = item, "reconciliation defect: store deleted, cache decrement failed: {e}");
                        self.drop_cached_count(item).await;
                        return;
                    }
                }
            }
            Ok(None) => {
                // Populate from the store so the cache holds the settled count.
                if let Err(e) = self.load_count(item).await {
                    tracing::warn!(item_id = item, "could not reload count after cancel: {e}");
                }
            }
            Err(e) => {
                tracing::warn!(item_id = item, "cache read failed during cancel: {e}");
                self.drop_cached_count(item).await;
            }
        }
    }

    /// Fill free slots from the waitlist head, in order.
    async fn promote(
        &self,
        item: ItemId,
        notices: &mut Vec<Notification>,
    ) -> Result<Vec<Reservation>, AdmissionError> {
        let limit = self.load_limit(item).await?;
        let mut count = self.load_count(item).await?;
        let mut promoted = Vec::new();

        while count < limit {
            let Some(entry) = self.waitlist.pop(item).await? else {
                break;
            };
            let requester = entry.requester_id;
            match self
                .store
                .insert_reservation(item, requester, self.policy.duplicates)
                .await
            {
                Ok(r) => {
                    self.bump_count(item, count).await;
                    count += 1;
                    tracing::info!(item_id = item, requester_id = requester, reservation_id = r.id, "promoted from waitlist");
                    notices.push(Notification::confirmed(item, requester, true));
                    promoted.push(r);
                }
                Err(StoreError::Constraint(msg)) => {
                    let duplicate = self.policy.duplicates == DuplicatePolicy::Reject
                        && self.store.find_reservation(item, requester).await?.is_some();
                    if duplicate {
                        tracing::debug!(item_id = item, requester_id = requester, "waitlisted requester already holds a reservation");
                        continue;
                    }
                    self.waitlist.requeue_front(item, entry).await?;
                    self.drop_cached_count(item).await;
                    return Err(AdmissionError::StoreConstraint(msg));
                }
                Err(e) => {
                    self.waitlist.requeue_front(item, entry).await?;
                    self.drop_cached_count(item).await;
                    return Err(e.into());
                }
            }
        }

        if !promoted.is_empty() {
            for (i, e) in self.waitlist.entries(item).await?.into_iter().enumerate() {
                notices.push(Notification::queued(item, e.requester_id, i + 1));
            }
        }
        Ok(promoted)
    }

    /// Overwrite the cached count and limit with the store's values.
    pub(crate) async fn reconcile(&self, item: ItemId) -> Result<Availability, AdmissionError> {
        let limit = self.store.get_item_limit(item).await?;
        let count = self.store.count_reservations(item).await?;
        self.cache.set_limit(item, limit).await?;
        self.cache.set_count(item, count).await?;
        self.mark_validated(item);
        tracing::info!(item_id = item, limit, count, "cache reconciled from store");
        Ok(Availability {
            item_id: item,
            limit,
            confirmed_count: count,
            waitlist_len: self.waitlist.len(item).await?,
        })
    }

    /// Store-backed snapshot; writes nothing, so it needs no exclusivity.
    pub(crate) async fn availability(&self, item: ItemId) -> Result<Availability, AdmissionError> {
        Ok(Availability {
            item_id: item,
            limit: self.store.get_item_limit(item).await?,
            confirmed_count: self.store.count_reservations(item).await?,
            waitlist_len: self.waitlist.len(item).await?,
        })
    }

    /// Invalidate the cached count after lost or doubtful exclusivity.
    pub(crate) async fn drop_cached_count(&self, item: ItemId) {
        if let Err(e) = self.cache.invalidate(item).await {
            tracing::error!(item_id = item, "cache invalidation failed: {e}");
        }
        self.forget_validated(item);
    }

    async fn load_limit(&self, item: ItemId) -> Result<u32, AdmissionError> {
        match self.cache.get_limit(item).await {
            Ok(Some(limit)) => return Ok(limit),
            Ok(None) => {}
            Err(e) => tracing::warn!(item_id = item, "cache limit read failed, using store: {e}"),
        }
        let limit = self.store.get_item_limit(item).await?;
        if let Err(e) = self.cache.set_limit(item, limit).await {
            tracing::warn!(item_id = item, "could not cache limit: {e}");
        }
        Ok(limit)
    }

    /// Cached count, recomputed from the store on a miss and on the first
    /// touch of the item by this process.
    async fn load_count(&self, item: ItemId) -> Result<u32, AdmissionError> {
        if self.is_validated(item) {
            match self.cache.get_count(item).await {
                Ok(Some(count)) => return Ok(count),
                Ok(None) => {}
                Err(e) => tracing::warn!(item_id = item, "cache count read failed, using store: {e}"),
            }
        }
        let count = self.store.count_reservations(item).await?;
        match self.cache.set_count(item, count).await {
            Ok(()) => self.mark_validated(item),
            Err(e) => tracing::warn!(item_id = item, "could not cache count: {e}"),
        }
        tracing::debug!(item_id = item, count, "count loaded from store");
        Ok(count)
    }

    fn is_validated(&self, item: ItemId) -> bool {
        self.validated
            .lock()
            .map(|v| v.contains(&item))
            .unwrap_or(false)
    }

    fn mark_validated(&self, item: ItemId) {
        if let Ok(mut v) = self.validated.lock() {
            v.insert(item);
        }
    }

    fn forget_validated(&self, item: ItemId) {
        if let Ok(mut v) = self.validated.lock() {
            v.remove(&item);
        }
    }
}
