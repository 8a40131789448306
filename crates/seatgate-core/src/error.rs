//! Error taxonomy for the admission pipeline.
//!
//! Component errors (store, cache, lock) are kept separate so callers can
//! tell infrastructure failures apart; `AdmissionError` wraps them for the
//! controller. Capacity exhaustion is deliberately absent: it is the
//! `Admission::Waitlisted` outcome.

use crate::types::ItemId;

/// Errors from the persistent reservation store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The item has no row (and therefore no limit).
    #[error("item {0} not found")]
    ItemNotFound(ItemId),
    /// A guarded write was rejected (capacity or uniqueness backstop).
    #[error("store constraint rejected write: {0}")]
    Constraint(String),
    /// `define_item` tried to change the limit of an existing item.
    #[error("item {item_id} already has limit {existing}; limits are immutable")]
    LimitMismatch { item_id: ItemId, existing: u32 },
    #[error("store: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store io: {0}")]
    Io(#[from] std::io::Error),
    #[error("store: {0}")]
    Other(String),
}

/// Errors from the availability cache or a cache-backed waitlist.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A value under `key` could not be parsed back.
    #[error("cache value under {key} is malformed: {value}")]
    Malformed { key: String, value: String },
    #[error("cache backend: {0}")]
    Backend(String),
}

/// Errors from the distributed mutex.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// All acquire attempts were exhausted.
    #[error("could not acquire {key} after {attempts} attempts")]
    Timeout { key: String, attempts: u32 },
    #[error("lock backend: {0}")]
    Backend(String),
}

/// Failure of an admission, cancellation or promotion.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("item {0} does not exist")]
    UnknownItem(ItemId),
    #[error("limit must be positive")]
    InvalidLimit,
    #[error("lock timeout: {0}")]
    LockTimeout(#[source] LockError),
    #[error("lock unavailable: {0}")]
    Lock(#[source] LockError),
    /// The serializer queue is full or shut down.
    #[error("serializer unavailable: {0}")]
    SerializerUnavailable(String),
    /// The consumer processing this intent died before producing an outcome.
    #[error("consumer failed while processing intent: {0}")]
    ConsumerFailed(String),
    /// The store rejected the write that would have oversold; nothing was cached.
    #[error("store constraint: {0}")]
    StoreConstraint(String),
    #[error(transparent)]
    Store(StoreError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl AdmissionError {
    /// Whether the caller should retry later. Domain errors are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            AdmissionError::UnknownItem(_) | AdmissionError::InvalidLimit => false,
            AdmissionError::LockTimeout(_)
            | AdmissionError::Lock(_)
            | AdmissionError::SerializerUnavailable(_)
            | AdmissionError::ConsumerFailed(_)
            | AdmissionError::StoreConstraint(_)
            | AdmissionError::Store(_)
            | AdmissionError::Cache(_) => true,
        }
    }
}

impl From<StoreError> for AdmissionError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ItemNotFound(id) => AdmissionError::UnknownItem(id),
            StoreError::Constraint(msg) => AdmissionError::StoreConstraint(msg),
            other => AdmissionError::Store(other),
        }
    }
}

impl From<LockError> for AdmissionError {
    fn from(e: LockError) -> Self {
        match e {
            LockError::Timeout { .. } => AdmissionError::LockTimeout(e),
            LockError::Backend(_) => AdmissionError::Lock(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_admission_taxonomy() {
        let e: AdmissionError = StoreError::ItemNotFound(9).into();
        assert!(matches!(e, AdmissionError::UnknownItem(9)));
        assert!(!e.is_retryable());

        let e: AdmissionError = StoreError::Constraint("full".into()).into();
        assert!(matches!(e, AdmissionError::StoreConstraint(_)));
        assert!(e.is_retryable());
    }

    #[test]
    fn lock_timeout_is_retryable() {
        let e: AdmissionError = LockError::Timeout {
            key: "lock:item:1".into(),
            attempts: 3,
        }
        .into();
        assert!(matches!(e, AdmissionError::LockTimeout(_)));
        assert!(e.is_retryable());
        assert!(e.to_string().contains("lock:item:1"));
    }
}
