//! Lifecycle of one admission intent.

use std::fmt;

use crate::types::{ItemId, RequesterId};

/// `Submitted → Serializing → Checking → {Admitted | Waitlisted} → Notified`,
/// with `Failed` reachable from `Serializing` and `Checking`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionState {
    Submitted,
    Serializing,
    Checking,
    Admitted,
    Waitlisted,
    Notified,
    Failed,
}

impl AdmissionState {
    pub fn as_str(self) -> &'static str {
        match self {
            AdmissionState::Submitted => "submitted",
            AdmissionState::Serializing => "serializing",
            AdmissionState::Checking => "checking",
            AdmissionState::Admitted => "admitted",
            AdmissionState::Waitlisted => "waitlisted",
            AdmissionState::Notified => "notified",
            AdmissionState::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AdmissionState::Notified | AdmissionState::Failed)
    }

    /// Move to `next` if the transition is legal.
    pub fn advance(self, next: AdmissionState) -> Result<AdmissionState, InvalidTransition> {
        use AdmissionState::*;
        let legal = matches!(
            (self, next),
            (Submitted, Serializing)
                | (Serializing, Checking)
                | (Serializing, Failed)
                | (Checking, Admitted)
                | (Checking, Waitlisted)
                | (Checking, Failed)
                | (Admitted, Notified)
                | (Waitlisted, Notified)
        );
        if legal {
            Ok(next)
        } else {
            Err(InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for AdmissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal admission transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: AdmissionState,
    pub to: AdmissionState,
}

/// Current state of one intent plus the ids needed to log it.
#[derive(Debug, Clone)]
pub struct IntentTrace {
    pub item_id: ItemId,
    pub requester_id: RequesterId,
    state: AdmissionState,
}

impl IntentTrace {
    pub fn new(item_id: ItemId, requester_id: RequesterId) -> Self {
        tracing::debug!(item_id, requester_id, state = "submitted", "admission intent");
        Self {
            item_id,
            requester_id,
            state: AdmissionState::Submitted,
        }
    }

    pub fn state(&self) -> AdmissionState {
        self.state
    }

    /// Record a transition. An illegal one is a programming error: it is
    /// logged and the trace keeps its current state.
    pub fn advance(&mut self, next: AdmissionState) {
        match self.state.advance(next) {
            Ok(state) => {
                self.state = state;
                tracing::debug!(
                    item_id = self.item_id,
                    requester_id = self.requester_id,
                    state = state.as_str(),
                    "admission intent"
                );
            }
            Err(e) => tracing::error!(
                item_id = self.item_id,
                requester_id = self.requester_id,
                "{e}"
            ),
        }
    }

    /// Terminal failure with the reason.
    pub fn fail(&mut self, reason: &dyn fmt::Display) {
        self.advance(AdmissionState::Failed);
        tracing::info!(
            item_id = self.item_id,
            requester_id = self.requester_id,
            "admission failed: {reason}"
        );
    }
}
