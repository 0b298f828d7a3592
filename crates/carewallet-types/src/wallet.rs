//! Wallet and ledger records
//!
//! A wallet's live balance is a materialized view of its ledger transactions.
//! Both the live path and replay go through [`Wallet::apply`], so the two
//! cannot drift apart.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{BenefitError, CategoryId, ClaimId, Money, PolicyId, Result, TransactionId, UserId, WalletId};

/// A policy period, half-open `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl PolicyPeriod {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end <= start {
            return Err(BenefitError::invalid_input(
                "period",
                format!("end {} must be after start {}", end, start),
            ));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }

    /// The period of equal length starting where this one ends
    pub fn next(&self) -> Result<Self> {
        let end = self
            .end
            .checked_add_signed(self.end - self.start)
            .ok_or_else(|| {
                BenefitError::invalid_input("period", format!("no period of equal length follows {}", self.end))
            })?;
        Ok(Self { start: self.end, end })
    }
}

/// Headline balance; `current = allocated - consumed` always
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub allocated: Money,
    pub consumed: Money,
    pub current: Money,
}

impl Balance {
    fn check(&self) -> Result<()> {
        if self.allocated.checked_sub(self.consumed)? != self.current {
            return Err(BenefitError::invalid_input(
                "balance",
                format!(
                    "current {} != allocated {} - consumed {}",
                    self.current, self.allocated, self.consumed
                ),
            ));
        }
        Ok(())
    }
}

/// Per-category sub-limit usage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryBalance {
    pub category_id: CategoryId,
    pub total: Money,
    pub consumed: Money,
}

impl CategoryBalance {
    pub fn remaining(&self) -> Money {
        self.total.saturating_sub(self.consumed)
    }
}

/// Wallet lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletStatus {
    Active,
    Archived,
}

/// A member's or family pool's benefit wallet for one policy period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub wallet_id: WalletId,
    pub owner_user_id: UserId,
    /// Dependents sharing this wallet; fixed at assignment
    pub members: Vec<UserId>,
    pub policy_id: PolicyId,
    pub period: PolicyPeriod,
    pub balance: Balance,
    pub categories: Vec<CategoryBalance>,
    pub status: WalletStatus,
    /// Bumped on every applied transaction
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

impl Wallet {
    /// Whether `user` may claim against this wallet
    pub fn covers(&self, user: &UserId) -> bool {
        &self.owner_user_id == user || self.members.contains(user)
    }

    pub fn is_active(&self) -> bool {
        self.status == WalletStatus::Active
    }

    pub fn category(&self, category: &CategoryId) -> Option<&CategoryBalance> {
        self.categories.iter().find(|c| &c.category_id == category)
    }

    fn category_mut(&mut self, category: &CategoryId) -> Option<&mut CategoryBalance> {
        self.categories.iter_mut().find(|c| &c.category_id == category)
    }

    /// Same wallet with balances zeroed, the starting point for replay
    pub fn empty_copy(&self) -> Self {
        let mut copy = self.clone();
        copy.balance = Balance::default();
        for c in &mut copy.categories {
            c.consumed = Money::zero();
        }
        copy.version = 0;
        copy
    }

    /// Apply one ledger transaction to the balance fields.
    ///
    /// Limit checks belong to the ledger; this only enforces arithmetic
    /// consistency.
    pub fn apply(&mut self, txn: &LedgerTransaction) -> Result<()> {
        let amount = txn.amount;
        let mut next = self.balance;
        let mut category_delta = Money::zero();
        match txn.effect() {
            BalanceEffect::Fund => {
                next.allocated = next.allocated.checked_add(amount)?;
            }
            BalanceEffect::Unfund => {
                next.allocated = next.allocated.checked_sub(amount)?;
            }
            BalanceEffect::Consume => {
                next.consumed = next.consumed.checked_add(amount)?;
                category_delta = amount;
            }
            BalanceEffect::Restore => {
                next.consumed = next.consumed.checked_sub(amount)?;
                category_delta = Money::zero().checked_sub(amount)?;
            }
        }
        next.current = next.allocated.checked_sub(next.consumed)?;
        next.check()?;

        if let (Some(category), false) = (&txn.category_id, category_delta.is_zero()) {
            if let Some(cat) = self.category_mut(category) {
                cat.consumed = cat.consumed.checked_add(category_delta)?;
            }
        }
        self.balance = next;
        self.version += 1;
        Ok(())
    }
}

/// Ledger transaction type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Debit,
    Credit,
    Adjustment,
    #[serde(rename = "TOPUP")]
    TopUp,
}

/// Why a transaction exists; also the tag audit and analytics read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransactionReason {
    /// Opening allocation from the plan version
    Allocation { plan_version: u32 },
    /// Payment of an approved claim
    ClaimPayment { claim_id: ClaimId },
    /// Member or ops top-up
    TopUp { actor: UserId },
    /// Unused balance carried from the prior period
    CarryForward {
        period: PolicyPeriod,
        source_wallet: WalletId,
        valid_until: NaiveDate,
    },
    /// Unused carried balance removed after its window closed
    CarryForwardExpiry { period: PolicyPeriod },
    /// Compensation for a debit whose claim could not be committed
    Reversal {
        reverses: TransactionId,
        note: String,
    },
}

/// How a transaction moves the balance fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceEffect {
    /// allocated += amount
    Fund,
    /// allocated -= amount
    Unfund,
    /// consumed += amount
    Consume,
    /// consumed -= amount
    Restore,
}

/// An append-only ledger record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub transaction_id: TransactionId,
    pub wallet_id: WalletId,
    pub claim_id: Option<ClaimId>,
    pub transaction_type: TransactionType,
    pub amount: Money,
    pub category_id: Option<CategoryId>,
    /// `balance.current` after this transaction
    pub balance_after: Money,
    pub reason: TransactionReason,
    /// Per-wallet sequence; breaks `created_at` ties during replay
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
}

impl LedgerTransaction {
    pub fn effect(&self) -> BalanceEffect {
        match (&self.transaction_type, &self.reason) {
            (TransactionType::Debit, _) => BalanceEffect::Consume,
            (TransactionType::Credit | TransactionType::TopUp, _) => BalanceEffect::Fund,
            (TransactionType::Adjustment, TransactionReason::Reversal { .. }) => {
                BalanceEffect::Restore
            }
            (TransactionType::Adjustment, _) => BalanceEffect::Unfund,
        }
    }

    pub fn is_carry_forward(&self) -> bool {
        matches!(self.reason, TransactionReason::CarryForward { .. })
    }
}
