use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::Waitlist;
use crate::error::CacheError;
use crate::types::{ItemId, RequesterId, WaitlistEntry};

/// Process-local waitlist: one `VecDeque` per item.
#[derive(Default)]
pub struct InMemoryWaitlist {
    lists: Mutex<HashMap<ItemId, VecDeque<WaitlistEntry>>>,
}

impl InMemoryWaitlist {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_lists<T>(
        &self,
        f: impl FnOnce(&mut HashMap<ItemId, VecDeque<WaitlistEntry>>) -> T,
    ) -> Result<T, CacheError> {
        let mut lists = self
            .lists
            .lock()
            .map_err(|_| CacheError::Backend("waitlist map poisoned".into()))?;
        Ok(f(&mut lists))
    }
}

#[async_trait]
impl Waitlist for InMemoryWaitlist {
    async fn push(&self, item: ItemId, entry: WaitlistEntry) -> Result<usize, CacheError> {
        self.with_lists(|lists| {
            let list = lists.entry(item).or_default();
            list.push_back(entry);
            list.len()
        })
    }

    async fn pop(&self, item: ItemId) -> Result<Option<WaitlistEntry>, CacheError> {
        self.with_lists(|lists| lists.get_mut(&item).and_then(VecDeque::pop_front))
    }

    async fn requeue_front(&self, item: ItemId, entry: WaitlistEntry) -> Result<(), CacheError> {
        self.with_lists(|lists| lists.entry(item).or_default().push_front(entry))
    }

    async fn len(&self, item: ItemId) -> Result<usize, CacheError> {
        self.with_lists(|lists| lists.get(&item).map_or(0, VecDeque::len))
    }

    async fn position(
        &self,
        item: ItemId,
        requester: RequesterId,
    ) -> Result<Option<usize>, CacheError> {
        self.with_lists(|lists| {
            lists
                .get(&item)
                .and_then(|l| l.iter().position(|e| e.requester_id == requester))
                .map(|i| i + 1)
        })
    }

    async fn remove(&self, item: ItemId, requester: RequesterId) -> Result<bool, CacheError> {
        self.with_lists(|lists| {
            let Some(list) = lists.get_mut(&item) else {
                return false;
            };
            match list.iter().position(|e| e.requester_id == requester) {
                Some(i) => list.remove(i).is_some(),
                None => false,
            }
        })
    }

    async fn entries(&self, item: ItemId) -> Result<Vec<WaitlistEntry>, CacheError> {
        self.with_lists(|lists| {
            lists
                .get(&item)
                .map(|l| l.iter().cloned().collect())
                .unwrap_or_default()
        })
    }
}
