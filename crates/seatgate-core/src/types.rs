//! Domain types shared across the admission pipeline.

use serde::{Deserialize, Serialize};

/// Sellable item identifier.
pub type ItemId = i64;

/// Identifier of the caller asking for a reservation.
pub type RequesterId = i64;

/// Reservation row identifier (generated by the store on insert).
pub type ReservationId = i64;

/// One confirmed admission, as persisted by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub item_id: ItemId,
    pub requester_id: RequesterId,
    /// Unix seconds.
    pub created_at: i64,
}

/// A request parked behind a full item, in FIFO order per item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitlistEntry {
    pub item_id: ItemId,
    pub requester_id: RequesterId,
    /// Unix seconds at push time.
    pub enqueued_at: i64,
}

impl WaitlistEntry {
    pub fn new(item_id: ItemId, requester_id: RequesterId) -> Self {
        Self {
            item_id,
            requester_id,
            enqueued_at: unix_timestamp(),
        }
    }
}

/// Item metadata as listed by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSummary {
    pub id: ItemId,
    pub limit: u32,
    pub confirmed_count: u32,
}

/// Successful result of an admission intent.
///
/// Capacity exhaustion is a normal outcome (`Waitlisted`), not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// A new reservation was persisted.
    Admitted(Reservation),
    /// The item is full; the requester sits at `position` (1-based) in its waitlist.
    Waitlisted { position: usize },
    /// Duplicates are rejected and the requester already holds this reservation.
    AlreadyAdmitted(Reservation),
}

impl Admission {
    pub fn outcome(&self) -> Outcome {
        match self {
            Admission::Admitted(_) | Admission::AlreadyAdmitted(_) => Outcome::Admitted,
            Admission::Waitlisted { .. } => Outcome::Waitlisted,
        }
    }

    pub fn reservation(&self) -> Option<&Reservation> {
        match self {
            Admission::Admitted(r) | Admission::AlreadyAdmitted(r) => Some(r),
            Admission::Waitlisted { .. } => None,
        }
    }
}

/// Coarse outcome of an intent, for reporting and tallies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Admitted,
    Waitlisted,
    Failed,
}

/// Point-in-time view of one item's capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Availability {
    pub item_id: ItemId,
    pub limit: u32,
    pub confirmed_count: u32,
    pub waitlist_len: usize,
}

impl Availability {
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.confirmed_count)
    }
}

/// Current time as Unix seconds.
pub(crate) fn unix_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
