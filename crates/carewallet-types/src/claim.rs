//! Claim records
//!
//! Claims are mutated only by the workflow and the payment reconciler.
//! `status_history` is append-only and records one entry per transition.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{Actor, CategoryId, ClaimId, DocumentRef, Money, PolicyId, Role, UserId, WalletId};

/// Claim lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimStatus {
    Draft,
    Submitted,
    Unassigned,
    Assigned,
    UnderReview,
    DocumentsRequired,
    Approved,
    PartiallyApproved,
    Rejected,
    Cancelled,
    PaymentPending,
    PaymentProcessing,
    PaymentCompleted,
}

impl ClaimStatus {
    pub const ALL: [ClaimStatus; 13] = [
        Self::Draft,
        Self::Submitted,
        Self::Unassigned,
        Self::Assigned,
        Self::UnderReview,
        Self::DocumentsRequired,
        Self::Approved,
        Self::PartiallyApproved,
        Self::Rejected,
        Self::Cancelled,
        Self::PaymentPending,
        Self::PaymentProcessing,
        Self::PaymentCompleted,
    ];

    /// No further transitions or wallet effects
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Rejected | Self::Cancelled | Self::PaymentCompleted
        )
    }

    /// States from which finance may complete payment
    pub fn is_payable(&self) -> bool {
        matches!(
            self,
            Self::Approved | Self::PartiallyApproved | Self::PaymentPending | Self::PaymentProcessing
        )
    }

    /// States in which the claim sits with a TPA reviewer
    pub fn is_in_review(&self) -> bool {
        matches!(
            self,
            Self::Assigned | Self::UnderReview | Self::DocumentsRequired
        )
    }
}

/// One status-history entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub status: ClaimStatus,
    pub actor_id: UserId,
    pub actor_role: Role,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
    pub notes: Option<String>,
}

/// A reviewer's request for more documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRequest {
    pub document_type: String,
    pub reason: String,
}

/// Record of moving a claim between reviewers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reassignment {
    pub previous_assignee: Option<UserId>,
    pub new_assignee: UserId,
    pub reassigned_by: UserId,
    pub reassigned_at: DateTime<Utc>,
    pub reason: String,
}

/// Which rule bound the adjudicated amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LimitApplied {
    None,
    ReviewerAmount,
    PerClaimLimit,
    CategoryLimit,
    CategoryBalance,
    WalletBalance,
}

/// Snapshot of how an approval amount was derived
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjudication {
    pub policy_id: PolicyId,
    pub plan_version: u32,
    pub as_of: NaiveDate,
    /// Amount after caps, before copay
    pub eligible_amount: Money,
    pub copay_amount: Money,
    /// `eligible_amount - copay_amount`, floored at zero
    pub payable_amount: Money,
    pub limit_applied: LimitApplied,
}

/// Policy or reviewer reason for rejection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReason {
    /// Caps reduced the amount and the plan forbids partial payment
    ExceedsLimitNoPartial,
    /// Nothing payable after caps and copay
    NoEligibleAmount,
    /// Reviewer decision
    Reviewer { reason: String },
}

impl RejectionReason {
    pub fn describe(&self) -> String {
        match self {
            Self::ExceedsLimitNoPartial => {
                "Eligible amount is below bill amount and partial payment is disabled".to_string()
            }
            Self::NoEligibleAmount => "No eligible amount remains under policy limits".to_string(),
            Self::Reviewer { reason } => reason.clone(),
        }
    }
}

/// Finance actor's payment details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDetails {
    pub amount_paid: Money,
    pub payment_mode: String,
    pub payment_reference: String,
    pub payment_date: NaiveDate,
    pub notes: Option<String>,
}

/// Member-supplied data for a new claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRequest {
    /// Patient: the wallet owner or one of its dependents
    pub patient_id: UserId,
    pub wallet_id: WalletId,
    pub category: CategoryId,
    pub bill_amount: Money,
    pub treatment_date: NaiveDate,
    pub provider_name: String,
    pub documents: Vec<DocumentRef>,
}

/// Edits to a draft claim; `None` keeps the current value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftUpdate {
    pub patient_id: Option<UserId>,
    pub category: Option<CategoryId>,
    pub bill_amount: Option<Money>,
    pub treatment_date: Option<NaiveDate>,
    pub provider_name: Option<String>,
}

/// A reimbursement claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub claim_id: ClaimId,
    /// Patient
    pub user_id: UserId,
    /// Member who filed the claim
    pub submitted_by: UserId,
    pub owner_wallet_id: WalletId,
    pub category: CategoryId,
    pub bill_amount: Money,
    pub approved_amount: Option<Money>,
    pub treatment_date: NaiveDate,
    pub provider_name: String,
    pub status: ClaimStatus,
    pub documents: Vec<DocumentRef>,
    pub documents_requested: Vec<DocumentRequest>,
    pub assigned_to_actor_id: Option<UserId>,
    pub reassignment_history: Vec<Reassignment>,
    pub adjudication: Option<Adjudication>,
    pub rejection: Option<RejectionReason>,
    pub payment_mode: Option<String>,
    pub payment_reference: Option<String>,
    pub payment_date: Option<NaiveDate>,
    pub paid_amount: Option<Money>,
    pub paid_by_actor_id: Option<UserId>,
    pub status_history: Vec<StatusEntry>,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    /// Optimistic-concurrency version; bumped on every commit
    pub version: u64,
}

impl Claim {
    /// New draft claim filed by `member`
    pub fn draft(request: ClaimRequest, member: &Actor) -> Self {
        Self {
            claim_id: ClaimId::new(),
            user_id: request.patient_id,
            submitted_by: member.id.clone(),
            owner_wallet_id: request.wallet_id,
            category: request.category,
            bill_amount: request.bill_amount,
            approved_amount: None,
            treatment_date: request.treatment_date,
            provider_name: request.provider_name,
            status: ClaimStatus::Draft,
            documents: request.documents,
            documents_requested: Vec::new(),
            assigned_to_actor_id: None,
            reassignment_history: Vec::new(),
            adjudication: None,
            rejection: None,
            payment_mode: None,
            payment_reference: None,
            payment_date: None,
            paid_amount: None,
            paid_by_actor_id: None,
            status_history: Vec::new(),
            created_at: Utc::now(),
            submitted_at: None,
            reviewed_at: None,
            paid_at: None,
            version: 0,
        }
    }

    /// Amount rejected: whole bill on rejection, the shortfall on partial approval
    pub fn rejected_amount(&self) -> Money {
        match self.status {
            ClaimStatus::Rejected => self.bill_amount,
            _ => self
                .approved_amount
                .map(|a| self.bill_amount.saturating_sub(a))
                .unwrap_or_default(),
        }
    }

    /// Whether the approval fell short of the bill
    pub fn was_partially_approved(&self) -> bool {
        self.status_history
            .iter()
            .any(|e| e.status == ClaimStatus::PartiallyApproved)
    }

    /// Time of the most recent entry with `status`
    pub fn entered_at(&self, status: ClaimStatus) -> Option<DateTime<Utc>> {
        self.status_history
            .iter()
            .rev()
            .find(|e| e.status == status)
            .map(|e| e.timestamp)
    }
}
