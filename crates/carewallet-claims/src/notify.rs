//! Claim events and the notification outlet
//!
//! Notifications are fire-and-forget: they are sent after a transition has
//! committed, and a failing notifier never undoes the transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;

use carewallet_types::*;

/// Events emitted by the claim workflow and payment reconciler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClaimEvent {
    /// Claim moved between statuses
    StatusChanged {
        claim_id: ClaimId,
        from: ClaimStatus,
        to: ClaimStatus,
        actor_id: UserId,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Claim handed to another reviewer
    Reassigned {
        claim_id: ClaimId,
        previous_assignee: Option<UserId>,
        new_assignee: UserId,
        timestamp: DateTime<Utc>,
    },

    /// Finance recorded the payment
    PaymentCompleted {
        claim_id: ClaimId,
        wallet_id: WalletId,
        amount: Money,
        payment_reference: String,
        timestamp: DateTime<Utc>,
    },
}

impl ClaimEvent {
    pub fn claim_id(&self) -> &ClaimId {
        match self {
            ClaimEvent::StatusChanged { claim_id, .. } => claim_id,
            ClaimEvent::Reassigned { claim_id, .. } => claim_id,
            ClaimEvent::PaymentCompleted { claim_id, .. } => claim_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ClaimEvent::StatusChanged { timestamp, .. } => *timestamp,
            ClaimEvent::Reassigned { timestamp, .. } => *timestamp,
            ClaimEvent::PaymentCompleted { timestamp, .. } => *timestamp,
        }
    }

    /// Get a short description for logging
    pub fn summary(&self) -> String {
        match self {
            ClaimEvent::StatusChanged { claim_id, from, to, .. } => {
                format!("Claim {}: {:?} → {:?}", claim_id, from, to)
            }
            ClaimEvent::Reassigned { claim_id, new_assignee, .. } => {
                format!("Claim {} reassigned to {}", claim_id, new_assignee)
            }
            ClaimEvent::PaymentCompleted { claim_id, amount, .. } => {
                format!("Claim {} paid {}", claim_id, amount)
            }
        }
    }
}

/// Events for everything `after` added on top of `before`: one
/// `StatusChanged` per new history entry that moved the status, one
/// `Reassigned` per new reassignment
pub fn transition_events(before: &Claim, after: &Claim) -> Vec<ClaimEvent> {
    let mut events = Vec::new();
    let mut from = before.status;
    for entry in after.status_history.iter().skip(before.status_history.len()) {
        if entry.status != from {
            events.push(ClaimEvent::StatusChanged {
                claim_id: after.claim_id.clone(),
                from,
                to: entry.status,
                actor_id: entry.actor_id.clone(),
                reason: entry.reason.clone(),
                timestamp: entry.timestamp,
            });
            from = entry.status;
        }
    }
    for r in after.reassignment_history.iter().skip(before.reassignment_history.len()) {
        events.push(ClaimEvent::Reassigned {
            claim_id: after.claim_id.clone(),
            previous_assignee: r.previous_assignee.clone(),
            new_assignee: r.new_assignee.clone(),
            timestamp: r.reassigned_at,
        });
    }
    events
}

/// Deliver events best-effort; failures are logged and dropped
pub async fn dispatch(notifier: &dyn Notifier, events: Vec<ClaimEvent>) {
    for event in events {
        let summary = event.summary();
        if let Err(e) = notifier.notify(event).await {
            warn!(error = %e, event = %summary, "notification failed");
        }
    }
}

/// Outbound notification capability
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: ClaimEvent) -> Result<()>;
}

/// Fans events out to in-process subscribers
#[derive(Clone)]
pub struct BroadcastNotifier {
    events: broadcast::Sender<ClaimEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self { events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClaimEvent> {
        self.events.subscribe()
    }
}

#[async_trait::async_trait]
impl Notifier for BroadcastNotifier {
    async fn notify(&self, event: ClaimEvent) -> Result<()> {
        // Ignore send errors (no subscribers)
        let _ = self.events.send(event);
        Ok(())
    }
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait::async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _event: ClaimEvent) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_subscribers() {
        let notifier = BroadcastNotifier::new(8);
        let mut rx = notifier.subscribe();
        let claim_id = ClaimId::new();
        let at = Utc::now();

        notifier
            .notify(ClaimEvent::StatusChanged {
                claim_id: claim_id.clone(),
                from: ClaimStatus::Submitted,
                to: ClaimStatus::Unassigned,
                actor_id: UserId::new(),
                reason: "queued".into(),
                timestamp: at,
            })
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.claim_id(), &claim_id);
        assert_eq!(event.timestamp(), at);
        assert!(event.summary().contains("Unassigned"));
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers_is_ok() {
        let notifier = BroadcastNotifier::new(8);
        let event = ClaimEvent::Reassigned {
            claim_id: ClaimId::new(),
            previous_assignee: None,
            new_assignee: UserId::new(),
            timestamp: Utc::now(),
        };
        assert!(notifier.notify(event.clone()).await.is_ok());

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Reassigned");
    }
}
