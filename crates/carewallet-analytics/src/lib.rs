//! CareWallet Analytics - Read-only rollups over claims and wallets
//!
//! Everything here is computed on demand from the claim store and the ledger
//! journal. Nothing is cached and nothing is written back.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use carewallet_claims::ClaimStore;
use carewallet_ledger::WalletLedger;
use carewallet_types::*;

/// Time window over claim submission (or creation, for drafts)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Start time (inclusive)
    pub start: Option<DateTime<Utc>>,
    /// End time (exclusive)
    pub end: Option<DateTime<Utc>>,
}

impl TimeWindow {
    /// Unbounded window
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// The trailing `duration` up to now
    pub fn last(duration: Duration) -> Self {
        Self {
            start: Some(Utc::now() - duration),
            end: None,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| at >= s) && self.end.map_or(true, |e| at < e)
    }

    fn includes(&self, claim: &Claim) -> bool {
        self.contains(claim.submitted_at.unwrap_or(claim.created_at))
    }
}

/// Claim counts, amounts and outcome rates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimSummary {
    pub window: TimeWindow,
    pub total_claims: usize,
    pub by_status: BTreeMap<ClaimStatus, usize>,
    pub total_claimed: Money,
    pub total_approved: Money,
    /// Bill for rejections, shortfall for partial approvals
    pub total_rejected: Money,
    /// Claims with a review outcome
    pub processed_claims: usize,
    /// Full and partial approvals
    pub approved_claims: usize,
    pub partially_approved_claims: usize,
    pub rejected_claims: usize,
    /// Percent of processed claims, one decimal
    pub approval_rate: Decimal,
    pub rejection_rate: Decimal,
    /// Mean hours from submission to review decision
    pub average_processing_hours: Option<Decimal>,
}

/// Finance queue overview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinanceSummary {
    pub window: TimeWindow,
    /// APPROVED or PARTIALLY_APPROVED, not yet queued
    pub awaiting_payment: usize,
    pub payment_pending: usize,
    pub payment_processing: usize,
    pub payment_completed: usize,
    /// Approved amount of every claim that reached approval
    pub total_approved: Money,
    pub total_paid: Money,
    /// Approved but not yet paid
    pub total_outstanding: Money,
    pub payment_modes: BTreeMap<String, usize>,
}

/// One member's claims, as filer or patient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberClaimsSummary {
    pub member_id: UserId,
    pub total: usize,
    pub draft: usize,
    /// Submitted and waiting for a reviewer
    pub submitted: usize,
    /// With a reviewer, including waits on documents
    pub under_review: usize,
    /// Approved in full or in part, paid or not
    pub approved: usize,
    pub rejected: usize,
    pub cancelled: usize,
    /// Bills of claims past draft, cancelled claims excluded
    pub total_claimed: Money,
    pub total_approved: Money,
    pub total_paid: Money,
}

/// One reviewer's queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewerWorkload {
    pub reviewer_id: UserId,
    /// Assigned, under review or waiting on documents
    pub open: usize,
    pub decided: usize,
    pub approved: usize,
    pub rejected: usize,
}

/// Per-category sub-limit usage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryUsage {
    pub category_id: CategoryId,
    pub total: Money,
    pub consumed: Money,
    pub remaining: Money,
}

/// Wallet usage, split by where the money came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletUtilisation {
    pub wallet_id: WalletId,
    pub status: WalletStatus,
    pub allocated: Money,
    pub consumed: Money,
    pub current: Money,
    /// consumed / allocated, percent with one decimal
    pub utilisation_percent: Decimal,
    pub categories: Vec<CategoryUsage>,
    pub allocation_credits: Money,
    pub carry_forward_credits: Money,
    pub top_up_credits: Money,
    pub expired_carry_forward: Money,
    pub claim_payments: Money,
    pub reversals: Money,
    pub transaction_count: usize,
}

/// A status-history entry with its claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub claim_id: ClaimId,
    pub status: ClaimStatus,
    pub actor_id: UserId,
    pub actor_role: Role,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Computes rollups from the claim store and ledger
#[derive(Clone)]
pub struct AnalyticsAggregator {
    claims: ClaimStore,
    ledger: WalletLedger,
}

impl AnalyticsAggregator {
    pub fn new(claims: ClaimStore, ledger: WalletLedger) -> Self {
        Self { claims, ledger }
    }

    async fn claims_in(&self, window: &TimeWindow) -> Vec<Claim> {
        self.claims
            .all()
            .await
            .into_iter()
            .filter(|c| window.includes(c))
            .collect()
    }

    pub async fn claim_summary(&self, window: TimeWindow) -> Result<ClaimSummary> {
        let claims = self.claims_in(&window).await;

        let mut by_status = BTreeMap::new();
        for claim in &claims {
            *by_status.entry(claim.status).or_insert(0) += 1;
        }

        let approved: Vec<&Claim> = claims
            .iter()
            .filter(|c| c.approved_amount.is_some() && c.status != ClaimStatus::Rejected)
            .collect();
        let rejected = claims
            .iter()
            .filter(|c| c.status == ClaimStatus::Rejected)
            .count();
        let partial = approved.iter().filter(|c| c.was_partially_approved()).count();
        let processed = approved.len() + rejected;

        let processing_seconds: Vec<i64> = claims
            .iter()
            .filter_map(|c| Some((c.reviewed_at? - c.submitted_at?).num_seconds()))
            .collect();
        let average_processing_hours = if processing_seconds.is_empty() {
            None
        } else {
            let mean = Decimal::from(processing_seconds.iter().sum::<i64>())
                / Decimal::from(processing_seconds.len() as u64);
            Some(round1(mean / Decimal::from(3600)))
        };

        Ok(ClaimSummary {
            window,
            total_claims: claims.len(),
            by_status,
            total_claimed: Money::sum(claims.iter().map(|c| c.bill_amount))?,
            total_approved: Money::sum(approved.iter().filter_map(|c| c.approved_amount))?,
            total_rejected: Money::sum(claims.iter().map(Claim::rejected_amount))?,
            processed_claims: processed,
            approved_claims: approved.len(),
            partially_approved_claims: partial,
            rejected_claims: rejected,
            approval_rate: percent_of(approved.len(), processed),
            rejection_rate: percent_of(rejected, processed),
            average_processing_hours,
        })
    }

    pub async fn finance_summary(&self, window: TimeWindow) -> Result<FinanceSummary> {
        let claims = self.claims_in(&window).await;
        let count = |status: ClaimStatus| claims.iter().filter(|c| c.status == status).count();

        let reached_approval: Vec<&Claim> = claims
            .iter()
            .filter(|c| c.status.is_payable() || c.status == ClaimStatus::PaymentCompleted)
            .collect();
        let total_approved = Money::sum(reached_approval.iter().filter_map(|c| c.approved_amount))?;
        let total_paid = Money::sum(claims.iter().filter_map(|c| c.paid_amount))?;
        let total_outstanding = Money::sum(
            reached_approval
                .iter()
                .filter(|c| c.status.is_payable())
                .filter_map(|c| c.approved_amount),
        )?;

        let mut payment_modes = BTreeMap::new();
        for mode in claims.iter().filter_map(|c| c.payment_mode.as_ref()) {
            *payment_modes.entry(mode.clone()).or_insert(0) += 1;
        }

        Ok(FinanceSummary {
            window,
            awaiting_payment: count(ClaimStatus::Approved) + count(ClaimStatus::PartiallyApproved),
            payment_pending: count(ClaimStatus::PaymentPending),
            payment_processing: count(ClaimStatus::PaymentProcessing),
            payment_completed: count(ClaimStatus::PaymentCompleted),
            total_approved,
            total_paid,
            total_outstanding,
            payment_modes,
        })
    }

    pub async fn member_claims_summary(&self, member_id: &UserId) -> Result<MemberClaimsSummary> {
        let claims = self.claims.by_member(member_id).await;
        let mut summary = MemberClaimsSummary {
            member_id: member_id.clone(),
            total: claims.len(),
            draft: 0,
            submitted: 0,
            under_review: 0,
            approved: 0,
            rejected: 0,
            cancelled: 0,
            total_claimed: Money::zero(),
            total_approved: Money::zero(),
            total_paid: Money::zero(),
        };

        for claim in &claims {
            match claim.status {
                ClaimStatus::Draft => summary.draft += 1,
                ClaimStatus::Submitted | ClaimStatus::Unassigned => summary.submitted += 1,
                ClaimStatus::Rejected => summary.rejected += 1,
                ClaimStatus::Cancelled => summary.cancelled += 1,
                status if status.is_in_review() => summary.under_review += 1,
                _ => {
                    summary.approved += 1;
                    if let Some(amount) = claim.approved_amount {
                        summary.total_approved = summary.total_approved.checked_add(amount)?;
                    }
                }
            }
            if !matches!(claim.status, ClaimStatus::Draft | ClaimStatus::Cancelled) {
                summary.total_claimed = summary.total_claimed.checked_add(claim.bill_amount)?;
            }
            if let Some(paid) = claim.paid_amount {
                summary.total_paid = summary.total_paid.checked_add(paid)?;
            }
        }
        Ok(summary)
    }

    /// Workload for every reviewer who holds or held an assignment, busiest first
    pub async fn reviewer_workload(&self) -> Vec<ReviewerWorkload> {
        let mut by_reviewer: HashMap<UserId, ReviewerWorkload> = HashMap::new();
        for claim in self.claims.all().await {
            let Some(reviewer) = claim.assigned_to_actor_id.clone() else {
                continue;
            };
            let entry = by_reviewer
                .entry(reviewer.clone())
                .or_insert_with(|| ReviewerWorkload {
                    reviewer_id: reviewer,
                    open: 0,
                    decided: 0,
                    approved: 0,
                    rejected: 0,
                });
            if claim.status.is_in_review() {
                entry.open += 1;
            }
            if claim.reviewed_at.is_some() {
                entry.decided += 1;
                if claim.status == ClaimStatus::Rejected {
                    entry.rejected += 1;
                } else if claim.approved_amount.is_some() {
                    entry.approved += 1;
                }
            }
        }

        let mut workloads: Vec<_> = by_reviewer.into_values().collect();
        workloads.sort_by(|a, b| b.open.cmp(&a.open).then_with(|| a.reviewer_id.cmp(&b.reviewer_id)));
        workloads
    }

    pub async fn wallet_utilisation(&self, wallet_id: &WalletId) -> Result<WalletUtilisation> {
        let wallet = self.ledger.wallet(wallet_id).await?;
        let transactions = self.ledger.transactions(wallet_id).await;

        let total = |pred: fn(&LedgerTransaction) -> bool| {
            Money::sum(transactions.iter().filter(|t| pred(t)).map(|t| t.amount))
        };

        Ok(WalletUtilisation {
            wallet_id: wallet.wallet_id.clone(),
            status: wallet.status,
            allocated: wallet.balance.allocated,
            consumed: wallet.balance.consumed,
            current: wallet.balance.current,
            utilisation_percent: percent_of_money(wallet.balance.consumed, wallet.balance.allocated),
            categories: wallet
                .categories
                .iter()
                .map(|c| CategoryUsage {
                    category_id: c.category_id.clone(),
                    total: c.total,
                    consumed: c.consumed,
                    remaining: c.remaining(),
                })
                .collect(),
            allocation_credits: total(|t| matches!(t.reason, TransactionReason::Allocation { .. }))?,
            carry_forward_credits: total(LedgerTransaction::is_carry_forward)?,
            top_up_credits: total(|t| t.transaction_type == TransactionType::TopUp)?,
            expired_carry_forward: total(|t| {
                matches!(t.reason, TransactionReason::CarryForwardExpiry { .. })
            })?,
            claim_payments: total(|t| t.transaction_type == TransactionType::Debit)?,
            reversals: total(|t| matches!(t.reason, TransactionReason::Reversal { .. }))?,
            transaction_count: transactions.len(),
        })
    }

    /// Most recent status-history entries across all claims, newest first
    pub async fn recent_activity(&self, limit: usize) -> Vec<ActivityEntry> {
        let mut entries: Vec<ActivityEntry> = self
            .claims
            .all()
            .await
            .into_iter()
            .flat_map(|claim| {
                let claim_id = claim.claim_id;
                claim.status_history.into_iter().map(move |e| ActivityEntry {
                    claim_id: claim_id.clone(),
                    status: e.status,
                    actor_id: e.actor_id,
                    actor_role: e.actor_role,
                    reason: e.reason,
                    timestamp: e.timestamp,
                })
            })
            .collect();
        // Later entries first on timestamp ties
        entries.reverse();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(limit);
        entries
    }
}

fn round1(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero)
}

fn percent_of(part: usize, whole: usize) -> Decimal {
    if whole == 0 {
        return Decimal::ZERO;
    }
    round1(Decimal::from(part as u64) * Decimal::ONE_HUNDRED / Decimal::from(whole as u64))
}

fn percent_of_money(part: Money, whole: Money) -> Decimal {
    if !whole.is_positive() {
        return Decimal::ZERO;
    }
    round1(Decimal::from(part.minor()) * Decimal::ONE_HUNDRED / Decimal::from(whole.minor()))
}
