//! Claim transition table
//!
//! The only way a claim's status changes. Anything not listed here is
//! rejected with `InvalidTransition`.

use chrono::Utc;

use carewallet_types::{Actor, BenefitError, Claim, ClaimStatus, Result, StatusEntry};

use ClaimStatus::*;

/// Allowed `(from, to)` pairs
const TRANSITIONS: &[(ClaimStatus, ClaimStatus)] = &[
    (Draft, Submitted),
    (Draft, Cancelled),
    (Submitted, Unassigned),
    (Submitted, Cancelled),
    (Unassigned, Assigned),
    (Unassigned, Cancelled),
    (Assigned, UnderReview),
    (UnderReview, DocumentsRequired),
    (UnderReview, Approved),
    (UnderReview, PartiallyApproved),
    (UnderReview, Rejected),
    (DocumentsRequired, UnderReview),
    (DocumentsRequired, Cancelled),
    (Approved, PaymentPending),
    (PartiallyApproved, PaymentPending),
    (PaymentPending, PaymentProcessing),
    (PaymentProcessing, PaymentCompleted),
];

pub fn is_allowed(from: ClaimStatus, to: ClaimStatus) -> bool {
    TRANSITIONS.contains(&(from, to))
}

/// Move `claim` to `to` and append the history entry.
///
/// The claim is left untouched when the transition is not in the table.
pub fn transition(
    claim: &mut Claim,
    to: ClaimStatus,
    actor: &Actor,
    reason: impl Into<String>,
    notes: Option<String>,
) -> Result<()> {
    if !is_allowed(claim.status, to) {
        return Err(BenefitError::InvalidTransition {
            claim_id: claim.claim_id.clone(),
            from: claim.status,
            to,
        });
    }
    claim.status = to;
    record(claim, actor, reason, notes);
    Ok(())
}

/// Append a history entry for the claim's current status
pub fn record(claim: &mut Claim, actor: &Actor, reason: impl Into<String>, notes: Option<String>) {
    claim.status_history.push(StatusEntry {
        status: claim.status,
        actor_id: actor.id.clone(),
        actor_role: actor.role,
        timestamp: Utc::now(),
        reason: reason.into(),
        notes,
    });
}
