//! Best-effort fan-out of admission outcomes to subscribed clients.
//!
//! Delivery goes to whoever is subscribed to a group at send time: there is
//! no durable queue and no replay. A group's channel is created on first
//! subscribe and dropped once its last subscriber is gone.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;
use tokio::sync::broadcast;

use crate::config::Addressing;
use crate::types::{ItemId, RequesterId};

/// Room used when every client shares one group.
pub const SHARED_GROUP: &str = "common-room";

/// Group a notification is addressed to.
pub fn group_key(addressing: Addressing, item: ItemId, requester: RequesterId) -> String {
    match addressing {
        Addressing::Shared => SHARED_GROUP.to_string(),
        Addressing::Item => format!("item:{item}"),
        Addressing::Requester => format!("requester:{requester}"),
    }
}

/// What happened to a requester's intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NotificationStatus {
    Queued {
        #[serde(rename = "queuePosition")]
        queue_position: usize,
    },
    Confirmed {
        confirmed: bool,
    },
}

/// Payload pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub requester_id: RequesterId,
    pub item_id: ItemId,
    #[serde(flatten)]
    pub status: NotificationStatus,
}

impl Notification {
    pub fn queued(item_id: ItemId, requester_id: RequesterId, position: usize) -> Self {
        Self {
            requester_id,
            item_id,
            status: NotificationStatus::Queued {
                queue_position: position,
            },
        }
    }

    /// `confirmed: false` announces a cancellation.
    pub fn confirmed(item_id: ItemId, requester_id: RequesterId, confirmed: bool) -> Self {
        Self {
            requester_id,
            item_id,
            status: NotificationStatus::Confirmed { confirmed },
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            NotificationStatus::Queued { queue_position } => write!(
                f,
                "requester {} is number {} in the waitlist for item {}",
                self.requester_id, queue_position, self.item_id
            ),
            NotificationStatus::Confirmed { confirmed: true } => write!(
                f,
                "requester {} has a confirmed reservation for item {}",
                self.requester_id, self.item_id
            ),
            NotificationStatus::Confirmed { confirmed: false } => write!(
                f,
                "requester {} no longer holds a reservation for item {}",
                self.requester_id, self.item_id
            ),
        }
    }
}

/// A client's membership in one group.
pub struct Subscription {
    group: String,
    rx: broadcast::Receiver<Notification>,
}

impl Subscription {
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Next notification; `None` once the broadcaster is gone.
    /// A subscriber that fell behind skips the events it missed.
    pub async fn recv(&mut self) -> Option<Notification> {
        loop {
            match self.rx.recv().await {
                Ok(n) => return Some(n),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(group = %self.group, skipped, "subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of `recv` for polling clients.
    pub fn try_recv(&mut self) -> Option<Notification> {
        loop {
            match self.rx.try_recv() {
                Ok(n) => return Some(n),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(group = %self.group, skipped, "subscriber lagged");
                }
                Err(_) => return None,
            }
        }
    }
}

/// Group-addressed broadcaster.
pub struct NotificationBroadcaster {
    capacity: usize,
    groups: RwLock<HashMap<String, broadcast::Sender<Notification>>>,
}

impl NotificationBroadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            groups: RwLock::new(HashMap::new()),
        }
    }

    /// Join `group`. Only events sent after this call are received.
    pub fn subscribe(&self, group: impl Into<String>) -> Subscription {
        let group = group.into();
        let mut groups = match self.groups.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let rx = groups
            .entry(group.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();
        Subscription { group, rx }
    }

    /// Deliver `event` to current members of `group`; returns how many received it.
    pub fn broadcast(&self, group: &str, event: Notification) -> usize {
        let delivered = {
            let groups = match self.groups.read() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            groups.get(group).and_then(|tx| tx.send(event).ok())
        };
        match delivered {
            Some(n) => n,
            None => {
                tracing::debug!(group, "no subscribers; notification dropped");
                self.prune(group);
                0
            }
        }
    }

    /// Number of live subscribers in `group`.
    pub fn subscriber_count(&self, group: &str) -> usize {
        let groups = match self.groups.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        groups.get(group).map_or(0, broadcast::Sender::receiver_count)
    }

    fn prune(&self, group: &str) {
        let mut groups = match self.groups.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if groups.get(group).is_some_and(|tx| tx.receiver_count() == 0) {
            groups.remove(group);
        }
    }
}
