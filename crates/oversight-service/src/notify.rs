//! Workflow notifications

use oversight_types::{ActivityId, RevisionId, UserId};
use serde::Serialize;
use tokio::sync::broadcast;

/// Something reviewers or requesters should hear about
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    RevisionSubmitted {
        revision_id: RevisionId,
        activity_id: ActivityId,
        requested_by: UserId,
        proposed_budget_minor: i64,
    },
    RevisionAutoApproved {
        revision_id: RevisionId,
        activity_id: ActivityId,
        budget_minor: i64,
    },
    RevisionFinanceApproved {
        revision_id: RevisionId,
        activity_id: ActivityId,
        actor: UserId,
    },
    RevisionCommitteeApproved {
        revision_id: RevisionId,
        activity_id: ActivityId,
        actor: UserId,
        budget_minor: i64,
    },
    RevisionRejected {
        revision_id: RevisionId,
        activity_id: ActivityId,
        actor: UserId,
        note: String,
    },
}

impl WorkflowEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RevisionSubmitted { .. } => "revision_submitted",
            Self::RevisionAutoApproved { .. } => "revision_auto_approved",
            Self::RevisionFinanceApproved { .. } => "revision_finance_approved",
            Self::RevisionCommitteeApproved { .. } => "revision_committee_approved",
            Self::RevisionRejected { .. } => "revision_rejected",
        }
    }

    pub fn revision_id(&self) -> RevisionId {
        match self {
            Self::RevisionSubmitted { revision_id, .. }
            | Self::RevisionAutoApproved { revision_id, .. }
            | Self::RevisionFinanceApproved { revision_id, .. }
            | Self::RevisionCommitteeApproved { revision_id, .. }
            | Self::RevisionRejected { revision_id, .. } => *revision_id,
        }
    }
}

/// Delivery channel for workflow events. Delivery is best effort and never
/// fails the request that produced the event.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &WorkflowEvent);
}

/// Emits each event as a structured log line
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, event: &WorkflowEvent) {
        let payload = serde_json::to_string(event).unwrap_or_default();
        tracing::info!(
            target: "oversight::notify",
            event = event.name(),
            revision_id = %event.revision_id(),
            payload = %payload,
            "Workflow notification"
        );
    }
}

/// Publishes events to in-process subscribers
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<WorkflowEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.tx.subscribe()
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, event: &WorkflowEvent) {
        // No subscribers is not an error
        let _ = self.tx.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_reaches_subscribers() {
        let notifier = BroadcastNotifier::new(8);
        let mut rx = notifier.subscribe();
        let event = WorkflowEvent::RevisionRejected {
            revision_id: RevisionId::generate(),
            activity_id: ActivityId::generate(),
            actor: UserId::generate(),
            note: "insufficient justification".to_string(),
        };
        notifier.notify(&event);
        assert_eq!(rx.try_recv().unwrap(), event);
    }

    #[test]
    fn event_serializes_with_tag() {
        let event = WorkflowEvent::RevisionAutoApproved {
            revision_id: RevisionId::generate(),
            activity_id: ActivityId::generate(),
            budget_minor: 1_000,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "revision_auto_approved");
        assert_eq!(event.name(), "revision_auto_approved");
    }
}
