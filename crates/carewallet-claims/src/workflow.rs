//! The claim workflow
//!
//! Every operation follows the same shape: read a snapshot, check the
//! actor's role, apply transitions from the table to a copy, then commit the
//! copy against the snapshot's version. Nothing is retried here; a lost race
//! surfaces as `ConcurrentModification` and the caller re-reads.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use carewallet_ledger::WalletLedger;
use carewallet_types::*;

use crate::adjudication::{adjudicate, Decision};
use crate::directory::ActorDirectory;
use crate::notify::{dispatch, transition_events, Notifier};
use crate::store::ClaimStore;
use crate::transitions::{is_allowed, record, transition};

/// Reviewer's verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

/// A reviewer's decision on a claim under review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub decision: ReviewDecision,
    /// Caps the approved amount; must not exceed the bill
    pub amount: Option<Money>,
    pub reason: String,
    pub notes: Option<String>,
}

impl Review {
    pub fn approve(reason: impl Into<String>) -> Self {
        Self {
            decision: ReviewDecision::Approve,
            amount: None,
            reason: reason.into(),
            notes: None,
        }
    }

    pub fn approve_up_to(amount: Money, reason: impl Into<String>) -> Self {
        Self {
            amount: Some(amount),
            ..Self::approve(reason)
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            decision: ReviewDecision::Reject,
            amount: None,
            reason: reason.into(),
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Drives claims through their lifecycle
#[derive(Clone)]
pub struct ClaimWorkflow {
    store: ClaimStore,
    ledger: WalletLedger,
    directory: Arc<dyn ActorDirectory>,
    notifier: Arc<dyn Notifier>,
}

impl ClaimWorkflow {
    pub fn new(
        store: ClaimStore,
        ledger: WalletLedger,
        directory: Arc<dyn ActorDirectory>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            ledger,
            directory,
            notifier,
        }
    }

    pub fn store(&self) -> &ClaimStore {
        &self.store
    }

    pub async fn claim(&self, claim_id: &ClaimId) -> Result<Claim> {
        self.store.get(claim_id).await
    }

    // ========================================================================
    // Member operations
    // ========================================================================

    /// Create a DRAFT claim against a wallet covering both the member and
    /// the patient
    pub async fn create_draft(&self, actor: &Actor, request: ClaimRequest) -> Result<Claim> {
        actor.require_any(&[Role::Member], "file claims")?;
        self.check_request(actor, &request).await?;

        let mut claim = Claim::draft(request, actor);
        record(&mut claim, actor, "Claim drafted", None);
        let claim = self.store.insert(claim).await?;
        info!(claim_id = %claim.claim_id, wallet_id = %claim.owner_wallet_id, bill = %claim.bill_amount, "claim drafted");
        Ok(claim)
    }

    /// Change the details of a draft
    pub async fn update_draft(&self, actor: &Actor, claim_id: &ClaimId, update: DraftUpdate) -> Result<Claim> {
        let before = self.draft(actor, claim_id).await?;
        let request = ClaimRequest {
            patient_id: update.patient_id.unwrap_or_else(|| before.user_id.clone()),
            wallet_id: before.owner_wallet_id.clone(),
            category: update.category.unwrap_or_else(|| before.category.clone()),
            bill_amount: update.bill_amount.unwrap_or(before.bill_amount),
            treatment_date: update.treatment_date.unwrap_or(before.treatment_date),
            provider_name: update.provider_name.unwrap_or_else(|| before.provider_name.clone()),
            documents: before.documents.clone(),
        };
        self.check_request(actor, &request).await?;

        let mut claim = before.clone();
        claim.user_id = request.patient_id;
        claim.category = request.category;
        claim.bill_amount = request.bill_amount;
        claim.treatment_date = request.treatment_date;
        claim.provider_name = request.provider_name;
        self.commit(&before, claim).await
    }

    /// Attach documents to a draft
    pub async fn add_documents(&self, actor: &Actor, claim_id: &ClaimId, documents: Vec<DocumentRef>) -> Result<Claim> {
        if documents.is_empty() {
            return Err(BenefitError::invalid_input("documents", "at least one document is required"));
        }
        let before = self.draft(actor, claim_id).await?;
        let mut claim = before.clone();
        claim.documents.extend(documents);
        self.commit(&before, claim).await
    }

    /// Detach a document from a draft
    pub async fn remove_document(&self, actor: &Actor, claim_id: &ClaimId, document: &DocumentRef) -> Result<Claim> {
        let before = self.draft(actor, claim_id).await?;
        let mut claim = before.clone();
        let idx = claim
            .documents
            .iter()
            .position(|d| d == document)
            .ok_or_else(|| BenefitError::invalid_input("document", format!("{} is not attached", document.0)))?;
        claim.documents.remove(idx);
        self.commit(&before, claim).await
    }

    /// Discard a draft; submitted claims are cancelled instead
    pub async fn delete_draft(&self, actor: &Actor, claim_id: &ClaimId) -> Result<()> {
        let draft = self.draft(actor, claim_id).await?;
        self.store.remove(claim_id, draft.version).await?;
        info!(claim_id = %claim_id, documents = draft.documents.len(), "draft deleted");
        Ok(())
    }

    /// DRAFT → SUBMITTED → UNASSIGNED
    pub async fn submit(&self, actor: &Actor, claim_id: &ClaimId) -> Result<Claim> {
        let before = self.store.get(claim_id).await?;
        require_submitter(actor, &before)?;
        if before.status == ClaimStatus::Draft && before.documents.is_empty() {
            return Err(BenefitError::invalid_input("documents", "at least one document is required"));
        }

        let mut claim = before.clone();
        transition(&mut claim, ClaimStatus::Submitted, actor, "Claim submitted", None)?;
        transition(&mut claim, ClaimStatus::Unassigned, actor, "Queued for TPA assignment", None)?;
        claim.submitted_at = Some(Utc::now());
        self.commit(&before, claim).await
    }

    /// Draft and submit in one step
    pub async fn submit_claim(&self, actor: &Actor, request: ClaimRequest) -> Result<Claim> {
        if request.documents.is_empty() {
            return Err(BenefitError::invalid_input("documents", "at least one document is required"));
        }
        let draft = self.create_draft(actor, request).await?;
        self.submit(actor, &draft.claim_id).await
    }

    /// DOCUMENTS_REQUIRED → UNDER_REVIEW with the new documents attached
    pub async fn resubmit_documents(
        &self,
        actor: &Actor,
        claim_id: &ClaimId,
        documents: Vec<DocumentRef>,
        notes: Option<String>,
    ) -> Result<Claim> {
        if documents.is_empty() {
            return Err(BenefitError::invalid_input("documents", "at least one document is required"));
        }
        let before = self.store.get(claim_id).await?;
        require_submitter(actor, &before)?;

        let mut claim = before.clone();
        transition(&mut claim, ClaimStatus::UnderReview, actor, "Documents resubmitted", notes)?;
        claim.documents.extend(documents);
        self.commit(&before, claim).await
    }

    /// Withdraw a claim that is not yet decided
    pub async fn cancel_claim(&self, actor: &Actor, claim_id: &ClaimId, reason: impl Into<String>) -> Result<Claim> {
        let before = self.store.get(claim_id).await?;
        require_submitter(actor, &before)?;

        let mut claim = before.clone();
        transition(&mut claim, ClaimStatus::Cancelled, actor, reason, None)?;
        self.commit(&before, claim).await
    }

    // ========================================================================
    // TPA operations
    // ========================================================================

    /// UNASSIGNED → ASSIGNED to a TPA user
    pub async fn assign_claim(
        &self,
        actor: &Actor,
        claim_id: &ClaimId,
        assignee: &UserId,
        notes: Option<String>,
    ) -> Result<Claim> {
        actor.require_any(&[Role::TpaAdmin], "assign claims")?;
        let before = self.store.get(claim_id).await?;
        self.require_tpa_assignee(claim_id, assignee).await?;

        let mut claim = before.clone();
        transition(
            &mut claim,
            ClaimStatus::Assigned,
            actor,
            format!("Assigned to {}", assignee),
            notes,
        )?;
        claim.assigned_to_actor_id = Some(assignee.clone());
        self.commit(&before, claim).await
    }

    /// Hand a claim in review to another TPA user; the status is unchanged
    pub async fn reassign_claim(
        &self,
        actor: &Actor,
        claim_id: &ClaimId,
        new_assignee: &UserId,
        reason: impl Into<String>,
    ) -> Result<Claim> {
        actor.require_any(&[Role::TpaAdmin], "reassign claims")?;
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(BenefitError::invalid_input("reason", "required"));
        }
        let before = self.store.get(claim_id).await?;
        if !before.status.is_in_review() {
            return Err(BenefitError::InvalidTransition {
                claim_id: claim_id.clone(),
                from: before.status,
                to: before.status,
            });
        }
        if before.assigned_to_actor_id.as_ref() == Some(new_assignee) {
            return Err(BenefitError::invalid_input(
                "new_assignee",
                format!("claim is already assigned to {}", new_assignee),
            ));
        }
        self.require_tpa_assignee(claim_id, new_assignee).await?;

        let mut claim = before.clone();
        claim.reassignment_history.push(Reassignment {
            previous_assignee: claim.assigned_to_actor_id.clone(),
            new_assignee: new_assignee.clone(),
            reassigned_by: actor.id.clone(),
            reassigned_at: Utc::now(),
            reason: reason.clone(),
        });
        claim.assigned_to_actor_id = Some(new_assignee.clone());
        record(&mut claim, actor, format!("Reassigned to {}", new_assignee), Some(reason));
        self.commit(&before, claim).await
    }

    /// ASSIGNED → UNDER_REVIEW
    pub async fn start_review(&self, actor: &Actor, claim_id: &ClaimId) -> Result<Claim> {
        let before = self.store.get(claim_id).await?;
        require_reviewer(actor, &before)?;

        let mut claim = before.clone();
        transition(&mut claim, ClaimStatus::UnderReview, actor, "Review started", None)?;
        self.commit(&before, claim).await
    }

    /// UNDER_REVIEW → DOCUMENTS_REQUIRED, recording what is missing
    pub async fn request_documents(
        &self,
        actor: &Actor,
        claim_id: &ClaimId,
        requests: Vec<DocumentRequest>,
        notes: Option<String>,
    ) -> Result<Claim> {
        if requests.is_empty() || requests.iter().any(|r| r.document_type.trim().is_empty()) {
            return Err(BenefitError::invalid_input(
                "documents_requested",
                "each request needs a document type",
            ));
        }
        let before = self.store.get(claim_id).await?;
        require_reviewer(actor, &before)?;

        let mut claim = before.clone();
        begin_review_if_assigned(&mut claim, actor)?;
        let wanted: Vec<&str> = requests.iter().map(|r| r.document_type.as_str()).collect();
        transition(
            &mut claim,
            ClaimStatus::DocumentsRequired,
            actor,
            format!("Documents requested: {}", wanted.join(", ")),
            notes,
        )?;
        claim.documents_requested.extend(requests);
        self.commit(&before, claim).await
    }

    /// Approve or reject a claim under review.
    ///
    /// Approval resolves the plan as of the treatment date and adjudicates
    /// against the current wallet. The wallet is not debited.
    pub async fn review_claim(&self, actor: &Actor, claim_id: &ClaimId, review: Review) -> Result<Claim> {
        if review.reason.trim().is_empty() {
            return Err(BenefitError::invalid_input("reason", "required"));
        }
        let before = self.store.get(claim_id).await?;
        require_reviewer(actor, &before)?;

        let mut claim = before.clone();
        begin_review_if_assigned(&mut claim, actor)?;

        match review.decision {
            ReviewDecision::Reject => {
                transition(&mut claim, ClaimStatus::Rejected, actor, review.reason.clone(), review.notes)?;
                claim.rejection = Some(RejectionReason::Reviewer {
                    reason: review.reason,
                });
            }
            ReviewDecision::Approve => {
                if !is_allowed(claim.status, ClaimStatus::Approved) {
                    return Err(BenefitError::InvalidTransition {
                        claim_id: claim_id.clone(),
                        from: claim.status,
                        to: ClaimStatus::Approved,
                    });
                }
                let wallet = self.ledger.wallet(&claim.owner_wallet_id).await?;
                if !wallet.is_active() {
                    return Err(BenefitError::WalletArchived {
                        wallet_id: wallet.wallet_id,
                    });
                }
                let config = self
                    .ledger
                    .resolver()
                    .resolve(&wallet.policy_id, claim.treatment_date)
                    .await?;

                match adjudicate(&claim, &config, &wallet, review.amount)? {
                    Decision::Approve {
                        status,
                        adjudication,
                    } => {
                        transition(&mut claim, status, actor, review.reason, review.notes)?;
                        claim.approved_amount = Some(adjudication.payable_amount);
                        claim.adjudication = Some(adjudication);
                    }
                    Decision::Reject {
                        reason,
                        adjudication,
                    } => {
                        info!(claim_id = %claim_id, eligible = %adjudication.eligible_amount, rule = ?reason, "approval turned into policy rejection");
                        transition(&mut claim, ClaimStatus::Rejected, actor, reason.describe(), review.notes)?;
                        claim.rejection = Some(reason);
                        claim.adjudication = Some(adjudication);
                    }
                }
            }
        }

        claim.reviewed_at = Some(Utc::now());
        self.commit(&before, claim).await
    }

    // ========================================================================
    // Finance queue
    // ========================================================================

    /// APPROVED/PARTIALLY_APPROVED → PAYMENT_PENDING
    pub async fn queue_payment(&self, actor: &Actor, claim_id: &ClaimId) -> Result<Claim> {
        actor.require_any(&[Role::Finance, Role::OpsAdmin], "queue payments")?;
        let before = self.store.get(claim_id).await?;
        let mut claim = before.clone();
        transition(&mut claim, ClaimStatus::PaymentPending, actor, "Queued for payment", None)?;
        self.commit(&before, claim).await
    }

    /// PAYMENT_PENDING → PAYMENT_PROCESSING
    pub async fn start_payment_processing(&self, actor: &Actor, claim_id: &ClaimId) -> Result<Claim> {
        actor.require_any(&[Role::Finance, Role::OpsAdmin], "process payments")?;
        let before = self.store.get(claim_id).await?;
        let mut claim = before.clone();
        transition(&mut claim, ClaimStatus::PaymentProcessing, actor, "Payment processing started", None)?;
        self.commit(&before, claim).await
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Checks shared by new and edited drafts
    async fn check_request(&self, actor: &Actor, request: &ClaimRequest) -> Result<()> {
        if !request.bill_amount.is_positive() {
            return Err(BenefitError::InvalidAmount {
                amount: request.bill_amount,
                reason: "bill amount must be greater than zero".into(),
            });
        }
        if request.provider_name.trim().is_empty() {
            return Err(BenefitError::invalid_input("provider_name", "required"));
        }
        if request.treatment_date > Utc::now().date_naive() {
            return Err(BenefitError::invalid_input(
                "treatment_date",
                format!("{} is in the future", request.treatment_date),
            ));
        }

        let wallet = self.ledger.wallet(&request.wallet_id).await?;
        if !wallet.is_active() {
            return Err(BenefitError::WalletArchived {
                wallet_id: wallet.wallet_id,
            });
        }
        if !wallet.covers(&actor.id) {
            return Err(BenefitError::forbidden(format!(
                "{} is not covered by wallet {}",
                actor.id, wallet.wallet_id
            )));
        }
        if !wallet.covers(&request.patient_id) {
            return Err(BenefitError::invalid_input(
                "patient_id",
                format!("{} is not covered by wallet {}", request.patient_id, wallet.wallet_id),
            ));
        }
        Ok(())
    }

    /// A draft the actor filed
    async fn draft(&self, actor: &Actor, claim_id: &ClaimId) -> Result<Claim> {
        let claim = self.store.get(claim_id).await?;
        require_submitter(actor, &claim)?;
        if claim.status != ClaimStatus::Draft {
            return Err(BenefitError::ClaimNotDraft {
                claim_id: claim_id.clone(),
                status: claim.status,
            });
        }
        Ok(claim)
    }

    async fn require_tpa_assignee(&self, claim_id: &ClaimId, assignee: &UserId) -> Result<()> {
        let role = self.directory.role_of(assignee).await;
        if role.map_or(false, |r| r.is_tpa()) {
            Ok(())
        } else {
            warn!(claim_id = %claim_id, assignee = %assignee, ?role, "assignment refused");
            Err(BenefitError::InvalidAssignee {
                claim_id: claim_id.clone(),
                assignee: assignee.clone(),
                role,
            })
        }
    }

    /// Commit `after` against `before`'s version, then notify
    async fn commit(&self, before: &Claim, after: Claim) -> Result<Claim> {
        let committed = self.store.commit(after, before.version).await?;
        info!(
            claim_id = %committed.claim_id,
            from = ?before.status,
            to = ?committed.status,
            version = committed.version,
            "claim updated"
        );
        dispatch(self.notifier.as_ref(), transition_events(before, &committed)).await;
        Ok(committed)
    }
}

/// Only the member who filed a claim may act on it as a member
fn require_submitter(actor: &Actor, claim: &Claim) -> Result<()> {
    actor.require_any(&[Role::Member], "act on member claims")?;
    if claim.submitted_by != actor.id {
        return Err(BenefitError::forbidden(format!(
            "{} did not file claim {}",
            actor.id, claim.claim_id
        )));
    }
    Ok(())
}

/// The assigned reviewer or any TPA admin
fn require_reviewer(actor: &Actor, claim: &Claim) -> Result<()> {
    match actor.role {
        Role::TpaAdmin => Ok(()),
        Role::TpaReviewer if claim.assigned_to_actor_id.as_ref() == Some(&actor.id) => Ok(()),
        Role::TpaReviewer => Err(BenefitError::forbidden(format!(
            "claim {} is not assigned to {}",
            claim.claim_id, actor.id
        ))),
        _ => Err(BenefitError::forbidden(format!(
            "{} ({:?}) may not review claims",
            actor.id, actor.role
        ))),
    }
}

fn begin_review_if_assigned(claim: &mut Claim, actor: &Actor) -> Result<()> {
    if claim.status == ClaimStatus::Assigned {
        transition(claim, ClaimStatus::UnderReview, actor, "Review started", None)?;
    }
    Ok(())
}
