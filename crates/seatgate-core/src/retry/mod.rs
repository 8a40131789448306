//! Retry and backoff policy for lease acquisition.
//!
//! The mutex retries contended acquires with capped exponential backoff plus
//! random jitter, so many waiters on a hot item spread out instead of
//! stampeding the lease store on the same tick.

mod policy;

pub use policy::{BackoffPolicy, RetryDecision};
