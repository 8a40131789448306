//! Persistent reservation store (SQLite via sqlx).
//!
//! The store owns the authoritative count: every cached value is derived
//! from it. Inserts are guarded in SQL so that even a caller with a stale
//! view cannot persist more than `limit` reservations for an item.

mod db;
mod reservations;
mod waitlist;

use async_trait::async_trait;

use crate::config::DuplicatePolicy;
use crate::error::StoreError;
use crate::types::{ItemId, ItemSummary, RequesterId, Reservation, ReservationId};

pub use db::SqliteStore;

#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Create the item with `limit`, or confirm it already has exactly that limit.
    async fn define_item(&self, item: ItemId, limit: u32) -> Result<(), StoreError>;

    async fn get_item_limit(&self, item: ItemId) -> Result<u32, StoreError>;

    async fn count_reservations(&self, item: ItemId) -> Result<u32, StoreError>;

    /// Guarded insert: fails with `StoreError::Constraint` when the item is
    /// full, or when `duplicates` is `Reject` and the requester already holds one.
    async fn insert_reservation(
        &self,
        item: ItemId,
        requester: RequesterId,
        duplicates: DuplicatePolicy,
    ) -> Result<Reservation, StoreError>;

    /// Delete the requester's oldest reservation for the item; returns rows affected.
    async fn delete_reservation(
        &self,
        item: ItemId,
        requester: RequesterId,
    ) -> Result<u64, StoreError>;

    async fn delete_reservation_by_id(&self, id: ReservationId) -> Result<u64, StoreError>;

    async fn get_reservation(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError>;

    /// The requester's oldest reservation for the item, if any.
    async fn find_reservation(
        &self,
        item: ItemId,
        requester: RequesterId,
    ) -> Result<Option<Reservation>, StoreError>;

    async fn list_items(&self) -> Result<Vec<ItemSummary>, StoreError>;
}
