//! Per-item FIFO overflow list for requests that arrived after the limit.
//!
//! Entries are pushed inside the item's exclusive section when the count
//! check fails, and popped only by promotion. Backends: in-process
//! (`InMemoryWaitlist`), durable (`SqliteStore`), shared (`RedisCache`).

mod memory;

use async_trait::async_trait;

use crate::error::CacheError;
use crate::types::{ItemId, RequesterId, WaitlistEntry};

pub use memory::InMemoryWaitlist;

#[async_trait]
pub trait Waitlist: Send + Sync {
    /// Append to the tail; returns the 1-based position of the new entry.
    async fn push(&self, item: ItemId, entry: WaitlistEntry) -> Result<usize, CacheError>;

    /// Remove and return the head, if any.
    async fn pop(&self, item: ItemId) -> Result<Option<WaitlistEntry>, CacheError>;

    /// Put a popped entry back at the head (promotion that could not complete).
    async fn requeue_front(&self, item: ItemId, entry: WaitlistEntry) -> Result<(), CacheError>;

    async fn len(&self, item: ItemId) -> Result<usize, CacheError>;

    /// 1-based position of the requester's first entry.
    async fn position(
        &self,
        item: ItemId,
        requester: RequesterId,
    ) -> Result<Option<usize>, CacheError>;

    /// Drop the requester's first entry; returns whether one existed.
    async fn remove(&self, item: ItemId, requester: RequesterId) -> Result<bool, CacheError>;

    /// All entries, head first.
    async fn entries(&self, item: ItemId) -> Result<Vec<WaitlistEntry>, CacheError>;
}
