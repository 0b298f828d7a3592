//! Error types for CareWallet
//!
//! Every failure is a typed value carrying enough context (claim/wallet id,
//! attempted amount, current limit) to render a user-facing message.

use crate::{ClaimId, ClaimStatus, Money, PolicyId, Role, TransactionId, UserId, WalletId};
use chrono::NaiveDate;
use thiserror::Error;

/// Result type for CareWallet operations
pub type Result<T> = std::result::Result<T, BenefitError>;

/// Broad failure classes callers branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input shape or required field missing
    Validation,
    /// Operation not legal from the current status
    State,
    /// Balance or policy limit prevents the operation
    Limit,
    /// Payment details do not reconcile with the claim
    Reconciliation,
    /// Lost an optimistic race or timed out waiting for a lock
    Concurrency,
    /// No usable policy configuration
    Config,
    /// Actor lacks the role or ownership required
    Authorization,
    /// Referenced record does not exist
    NotFound,
}

/// CareWallet error types
#[derive(Debug, Clone, Error)]
pub enum BenefitError {
    // ========================================================================
    // Validation Errors
    // ========================================================================

    /// Invalid input
    #[error("Invalid input: {field} - {reason}")]
    InvalidInput { field: String, reason: String },

    /// Amount must be strictly positive
    #[error("Invalid amount {amount}: {reason}")]
    InvalidAmount { amount: Money, reason: String },

    /// Amount overflow during arithmetic
    #[error("Amount overflow during arithmetic operation")]
    AmountOverflow,

    /// Assignment target does not hold a TPA role
    #[error("User {assignee} cannot be assigned claim {claim_id}: role {role:?} is not a TPA role")]
    InvalidAssignee {
        claim_id: ClaimId,
        assignee: UserId,
        role: Option<Role>,
    },

    // ========================================================================
    // State Errors
    // ========================================================================

    /// Transition not present in the claim transition table
    #[error("Claim {claim_id}: cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        claim_id: ClaimId,
        from: ClaimStatus,
        to: ClaimStatus,
    },

    /// Payment attempted on a claim that is not approved
    #[error("Claim {claim_id} is not approved for payment (status {status:?})")]
    ClaimNotApproved {
        claim_id: ClaimId,
        status: ClaimStatus,
    },

    /// Draft-only operation on a claim that has been submitted
    #[error("Claim {claim_id} is no longer a draft (status {status:?})")]
    ClaimNotDraft {
        claim_id: ClaimId,
        status: ClaimStatus,
    },

    /// Wallet has been archived
    #[error("Wallet {wallet_id} is archived")]
    WalletArchived { wallet_id: WalletId },

    // ========================================================================
    // Limit Errors
    // ========================================================================

    /// Not enough balance in the wallet
    #[error("Insufficient balance in wallet {wallet_id}: requested {requested}, available {available}")]
    InsufficientBalance {
        wallet_id: WalletId,
        claim_id: Option<ClaimId>,
        requested: Money,
        available: Money,
    },

    /// Category sub-limit would be exceeded
    #[error("Category {category} limit exceeded in wallet {wallet_id}: requested {requested}, remaining {remaining}")]
    CategoryLimitExceeded {
        wallet_id: WalletId,
        category: String,
        requested: Money,
        remaining: Money,
    },

    /// Plan does not allow top-ups
    #[error("Top-up not allowed for wallet {wallet_id} under policy {policy_id}")]
    TopUpNotAllowed {
        wallet_id: WalletId,
        policy_id: PolicyId,
    },

    // ========================================================================
    // Reconciliation Errors
    // ========================================================================

    /// Paid amount differs from approved amount
    #[error("Claim {claim_id}: payment amount {paid} does not match approved amount {approved}")]
    AmountMismatch {
        claim_id: ClaimId,
        paid: Money,
        approved: Money,
    },

    // ========================================================================
    // Concurrency Errors
    // ========================================================================

    /// Record changed since it was read
    #[error("Concurrent modification of {resource}: expected version {expected}, found {actual}")]
    ConcurrentModification {
        resource: String,
        expected: u64,
        actual: u64,
    },

    // ========================================================================
    // Config Errors
    // ========================================================================

    /// No active plan version covers the date
    #[error("No active plan version for policy {policy_id} on {as_of}")]
    NoActivePlanVersion { policy_id: PolicyId, as_of: NaiveDate },

    // ========================================================================
    // Authorization Errors
    // ========================================================================

    /// Actor lacks permission
    #[error("Forbidden: {reason}")]
    Forbidden { reason: String },

    // ========================================================================
    // Lookup Errors
    // ========================================================================

    #[error("Claim {claim_id} not found")]
    ClaimNotFound { claim_id: ClaimId },

    #[error("Wallet {wallet_id} not found")]
    WalletNotFound { wallet_id: WalletId },

    #[error("Transaction {transaction_id} not found")]
    TransactionNotFound { transaction_id: TransactionId },

    #[error("Plan version {version} not found for policy {policy_id}")]
    PlanVersionNotFound { policy_id: PolicyId, version: u32 },
}

impl BenefitError {
    /// Create an invalid input error
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a forbidden error
    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    /// Create a concurrent modification error
    pub fn conflict(resource: impl Into<String>, expected: u64, actual: u64) -> Self {
        Self::ConcurrentModification {
            resource: resource.into(),
            expected,
            actual,
        }
    }

    /// Failure class
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput { .. }
            | Self::InvalidAmount { .. }
            | Self::AmountOverflow
            | Self::InvalidAssignee { .. } => ErrorKind::Validation,
            Self::InvalidTransition { .. }
            | Self::ClaimNotApproved { .. }
            | Self::ClaimNotDraft { .. }
            | Self::WalletArchived { .. } => ErrorKind::State,
            Self::InsufficientBalance { .. }
            | Self::CategoryLimitExceeded { .. }
            | Self::TopUpNotAllowed { .. } => ErrorKind::Limit,
            Self::AmountMismatch { .. } => ErrorKind::Reconciliation,
            Self::ConcurrentModification { .. } => ErrorKind::Concurrency,
            Self::NoActivePlanVersion { .. } => ErrorKind::Config,
            Self::Forbidden { .. } => ErrorKind::Authorization,
            Self::ClaimNotFound { .. }
            | Self::WalletNotFound { .. }
            | Self::TransactionNotFound { .. }
            | Self::PlanVersionNotFound { .. } => ErrorKind::NotFound,
        }
    }

    /// Only concurrency failures may be retried automatically
    pub fn is_retriable(&self) -> bool {
        self.kind() == ErrorKind::Concurrency
    }

    /// Get an error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::InvalidAmount { .. } => "INVALID_AMOUNT",
            Self::AmountOverflow => "AMOUNT_OVERFLOW",
            Self::InvalidAssignee { .. } => "INVALID_ASSIGNEE",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::ClaimNotApproved { .. } => "CLAIM_NOT_APPROVED",
            Self::ClaimNotDraft { .. } => "CLAIM_NOT_DRAFT",
            Self::WalletArchived { .. } => "WALLET_ARCHIVED",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::CategoryLimitExceeded { .. } => "CATEGORY_LIMIT_EXCEEDED",
            Self::TopUpNotAllowed { .. } => "TOP_UP_NOT_ALLOWED",
            Self::AmountMismatch { .. } => "AMOUNT_MISMATCH",
            Self::ConcurrentModification { .. } => "CONCURRENT_MODIFICATION",
            Self::NoActivePlanVersion { .. } => "NO_ACTIVE_PLAN_VERSION",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::ClaimNotFound { .. } => "CLAIM_NOT_FOUND",
            Self::WalletNotFound { .. } => "WALLET_NOT_FOUND",
            Self::TransactionNotFound { .. } => "TRANSACTION_NOT_FOUND",
            Self::PlanVersionNotFound { .. } => "PLAN_VERSION_NOT_FOUND",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = BenefitError::InsufficientBalance {
            wallet_id: WalletId::new(),
            claim_id: None,
            requested: Money::from_minor(100),
            available: Money::from_minor(50),
        };
        assert_eq!(err.error_code(), "INSUFFICIENT_BALANCE");
        assert_eq!(err.kind(), ErrorKind::Limit);
    }

    #[test]
    fn test_only_concurrency_is_retriable() {
        assert!(BenefitError::conflict("claim", 1, 2).is_retriable());

        let mismatch = BenefitError::AmountMismatch {
            claim_id: ClaimId::new(),
            paid: Money::from_minor(1999),
            approved: Money::from_minor(2000),
        };
        assert!(!mismatch.is_retriable());
        assert!(!BenefitError::forbidden("nope").is_retriable());
    }
}
