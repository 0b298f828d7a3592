//! CareWallet Ledger - Benefit wallet balances and their transaction log
//!
//! The ledger is:
//! - Wallet-keyed (one wallet per member or family pool per policy period)
//! - Append-only (transactions are never updated or deleted)
//! - Serialized per wallet (every mutation runs under that wallet's mutex)
//! - Replayable (the live balance is a materialized view of the log)
//!
//! # Invariants
//!
//! 1. `balance.current = balance.allocated - balance.consumed`
//! 2. A debit never exceeds `balance.current` or the category's remaining sub-limit
//! 3. At most one live DEBIT per claim
//! 4. Replaying a wallet's transactions reproduces its balance exactly

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use carewallet_policy::PolicyConfigResolver;
use carewallet_types::*;
use chrono::{NaiveDate, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};

mod rollover;

/// Default bound on waiting for a wallet lock
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// (owner, policy, period start) → wallet
type PeriodKey = (UserId, PolicyId, NaiveDate);

/// The CareWallet ledger
///
/// Thread-safe; clones share state.
#[derive(Clone)]
pub struct WalletLedger {
    /// Live wallet state, one mutex per wallet
    wallets: Arc<DashMap<WalletId, Arc<Mutex<Wallet>>>>,
    /// Wallet lookup by owner, policy and period
    by_period: Arc<DashMap<PeriodKey, WalletId>>,
    /// All transactions (append-only)
    journal: Arc<RwLock<Vec<LedgerTransaction>>>,
    resolver: PolicyConfigResolver,
    lock_timeout: Duration,
}

impl WalletLedger {
    /// Create a new in-memory ledger
    pub fn new(resolver: PolicyConfigResolver) -> Self {
        Self {
            wallets: Arc::new(DashMap::new()),
            by_period: Arc::new(DashMap::new()),
            journal: Arc::new(RwLock::new(Vec::new())),
            resolver,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn resolver(&self) -> &PolicyConfigResolver {
        &self.resolver
    }

    // ========================================================================
    // Wallet lifecycle
    // ========================================================================

    /// Open a wallet for a policy period and fund it from the plan version
    /// in force on `period.start`.
    ///
    /// `members` are the dependents who may claim against it; the set is
    /// fixed from here on.
    pub async fn open_wallet(
        &self,
        owner: UserId,
        members: Vec<UserId>,
        policy_id: PolicyId,
        period: PolicyPeriod,
    ) -> Result<Wallet> {
        let wallet_id = WalletId::new();
        let key = (owner.clone(), policy_id.clone(), period.start);
        match self.by_period.entry(key.clone()) {
            Entry::Occupied(existing) => {
                return Err(BenefitError::invalid_input(
                    "period",
                    format!(
                        "wallet {} already covers {} for this owner and policy",
                        existing.get(),
                        period.start
                    ),
                ));
            }
            Entry::Vacant(slot) => {
                slot.insert(wallet_id.clone());
            }
        }

        let config = match self.resolver.resolve(&policy_id, period.start).await {
            Ok(config) => config,
            Err(e) => {
                self.by_period.remove(&key);
                return Err(e);
            }
        };

        let wallet = Wallet {
            wallet_id: wallet_id.clone(),
            owner_user_id: owner,
            members,
            policy_id,
            period,
            balance: Balance::default(),
            categories: config
                .category_allocations
                .iter()
                .map(|(category, total)| CategoryBalance {
                    category_id: category.clone(),
                    total: *total,
                    consumed: Money::zero(),
                })
                .collect(),
            status: WalletStatus::Active,
            version: 0,
            created_at: Utc::now(),
        };

        // Hold the lock until the allocation lands so nobody sees an unfunded wallet
        let cell = Arc::new(Mutex::new(wallet));
        let mut guard = Arc::clone(&cell).lock_owned().await;
        self.wallets.insert(wallet_id.clone(), cell);

        if config.total_annual_amount.is_positive() {
            self.append(
                &mut guard,
                TransactionType::Credit,
                config.total_annual_amount,
                None,
                None,
                TransactionReason::Allocation {
                    plan_version: config.plan_version,
                },
            )
            .await?;
        }

        info!(
            wallet_id = %wallet_id,
            owner = %guard.owner_user_id,
            plan_version = config.plan_version,
            allocated = %guard.balance.allocated,
            "wallet opened"
        );
        Ok(guard.clone())
    }

    /// Archive a wallet; it keeps its history but refuses debits and top-ups
    pub async fn archive_wallet(&self, wallet_id: &WalletId) -> Result<Wallet> {
        let mut wallet = self.lock(wallet_id).await?;
        if wallet.is_active() {
            wallet.status = WalletStatus::Archived;
            info!(wallet_id = %wallet_id, current = %wallet.balance.current, "wallet archived");
        }
        Ok(wallet.clone())
    }

    // ========================================================================
    // Balance mutations
    // ========================================================================

    /// Debit a wallet for a claim payment.
    ///
    /// Idempotent per claim: if the claim already has a live DEBIT, that
    /// transaction is returned and nothing is applied.
    pub async fn debit(
        &self,
        wallet_id: &WalletId,
        claim_id: &ClaimId,
        amount: Money,
        category: Option<&CategoryId>,
    ) -> Result<LedgerTransaction> {
        ensure_positive(amount, "debit")?;
        let mut wallet = self.lock(wallet_id).await?;

        if let Some(existing) = self.claim_debit(claim_id).await {
            debug!(claim_id = %claim_id, transaction_id = %existing.transaction_id, "debit already recorded");
            return Ok(existing);
        }
        ensure_active(&wallet)?;

        if amount > wallet.balance.current {
            warn!(wallet_id = %wallet_id, claim_id = %claim_id, requested = %amount, available = %wallet.balance.current, "debit refused: insufficient balance");
            return Err(BenefitError::InsufficientBalance {
                wallet_id: wallet_id.clone(),
                claim_id: Some(claim_id.clone()),
                requested: amount,
                available: wallet.balance.current,
            });
        }
        if let Some(sub_limit) = category.and_then(|c| wallet.category(c)) {
            let remaining = sub_limit.remaining();
            if amount > remaining {
                warn!(wallet_id = %wallet_id, claim_id = %claim_id, category = %sub_limit.category_id, requested = %amount, %remaining, "debit refused: category limit");
                return Err(BenefitError::CategoryLimitExceeded {
                    wallet_id: wallet_id.clone(),
                    category: sub_limit.category_id.to_string(),
                    requested: amount,
                    remaining,
                });
            }
        }

        let txn = self
            .append(
                &mut wallet,
                TransactionType::Debit,
                amount,
                Some(claim_id.clone()),
                category.cloned(),
                TransactionReason::ClaimPayment {
                    claim_id: claim_id.clone(),
                },
            )
            .await?;
        info!(wallet_id = %wallet_id, claim_id = %claim_id, amount = %amount, balance_after = %txn.balance_after, "wallet debited");
        Ok(txn)
    }

    /// Credit a wallet with an allocation or carried balance
    pub async fn credit(
        &self,
        wallet_id: &WalletId,
        amount: Money,
        reason: TransactionReason,
    ) -> Result<LedgerTransaction> {
        ensure_positive(amount, "credit")?;
        if !matches!(
            reason,
            TransactionReason::Allocation { .. } | TransactionReason::CarryForward { .. }
        ) {
            return Err(BenefitError::invalid_input(
                "reason",
                "credits carry an allocation or carry-forward reason",
            ));
        }
        let mut wallet = self.lock(wallet_id).await?;
        ensure_active(&wallet)?;
        let txn = self
            .append(&mut wallet, TransactionType::Credit, amount, None, None, reason)
            .await?;
        info!(wallet_id = %wallet_id, amount = %amount, balance_after = %txn.balance_after, "wallet credited");
        Ok(txn)
    }

    /// Top up a wallet, if the plan in force allows it
    pub async fn top_up(
        &self,
        wallet_id: &WalletId,
        amount: Money,
        actor: &UserId,
    ) -> Result<LedgerTransaction> {
        ensure_positive(amount, "top-up")?;
        let mut wallet = self.lock(wallet_id).await?;
        ensure_active(&wallet)?;

        let as_of = clamp_to_period(&wallet.period, Utc::now().date_naive());
        let config = self.resolver.resolve(&wallet.policy_id, as_of).await?;
        if !config.top_up_allowed {
            warn!(wallet_id = %wallet_id, policy_id = %wallet.policy_id, "top-up refused by plan");
            return Err(BenefitError::TopUpNotAllowed {
                wallet_id: wallet_id.clone(),
                policy_id: wallet.policy_id.clone(),
            });
        }

        let txn = self
            .append(
                &mut wallet,
                TransactionType::TopUp,
                amount,
                None,
                None,
                TransactionReason::TopUp {
                    actor: actor.clone(),
                },
            )
            .await?;
        info!(wallet_id = %wallet_id, actor = %actor, amount = %amount, balance_after = %txn.balance_after, "wallet topped up");
        Ok(txn)
    }

    /// Compensate a debit with an ADJUSTMENT that restores its amount.
    ///
    /// Reversing the same debit twice returns the first reversal.
    pub async fn reverse_debit(
        &self,
        transaction_id: &TransactionId,
        note: impl Into<String>,
    ) -> Result<LedgerTransaction> {
        let original = self.transaction(transaction_id).await?;
        if original.transaction_type != TransactionType::Debit {
            return Err(BenefitError::invalid_input(
                "transaction_id",
                format!("{} is not a debit", transaction_id),
            ));
        }

        let mut wallet = self.lock(&original.wallet_id).await?;
        if let Some(existing) = self
            .find(|t| matches!(&t.reason, TransactionReason::Reversal { reverses, .. } if reverses == transaction_id))
            .await
        {
            return Ok(existing);
        }

        let txn = self
            .append(
                &mut wallet,
                TransactionType::Adjustment,
                original.amount,
                original.claim_id.clone(),
                original.category_id.clone(),
                TransactionReason::Reversal {
                    reverses: transaction_id.clone(),
                    note: note.into(),
                },
            )
            .await?;
        warn!(wallet_id = %original.wallet_id, reverses = %transaction_id, amount = %original.amount, "debit reversed");
        Ok(txn)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Snapshot of a wallet
    pub async fn wallet(&self, wallet_id: &WalletId) -> Result<Wallet> {
        Ok(self.lock(wallet_id).await?.clone())
    }

    /// Wallet for an owner, policy and period, if one was opened
    pub fn wallet_for(&self, owner: &UserId, policy_id: &PolicyId, period: &PolicyPeriod) -> Option<WalletId> {
        self.by_period
            .get(&(owner.clone(), policy_id.clone(), period.start))
            .map(|entry| entry.value().clone())
    }

    /// A wallet's transactions in append order
    pub async fn transactions(&self, wallet_id: &WalletId) -> Vec<LedgerTransaction> {
        let journal = self.journal.read().await;
        journal
            .iter()
            .filter(|t| &t.wallet_id == wallet_id)
            .cloned()
            .collect()
    }

    pub async fn transaction(&self, transaction_id: &TransactionId) -> Result<LedgerTransaction> {
        self.find(|t| &t.transaction_id == transaction_id)
            .await
            .ok_or_else(|| BenefitError::TransactionNotFound {
                transaction_id: transaction_id.clone(),
            })
    }

    /// The claim's DEBIT, unless it has been reversed
    pub async fn claim_debit(&self, claim_id: &ClaimId) -> Option<LedgerTransaction> {
        let journal = self.journal.read().await;
        let reversed: HashSet<&TransactionId> = journal
            .iter()
            .filter_map(|t| match &t.reason {
                TransactionReason::Reversal { reverses, .. } => Some(reverses),
                _ => None,
            })
            .collect();
        journal
            .iter()
            .find(|t| {
                t.transaction_type == TransactionType::Debit
                    && t.claim_id.as_ref() == Some(claim_id)
                    && !reversed.contains(&t.transaction_id)
            })
            .cloned()
    }

    pub async fn transaction_count(&self) -> usize {
        self.journal.read().await.len()
    }

    // ========================================================================
    // Replay
    // ========================================================================

    /// Rebuild a wallet's balances from its transactions in
    /// `(created_at, sequence)` order
    pub async fn replay(&self, wallet_id: &WalletId) -> Result<Wallet> {
        let live = self.lock(wallet_id).await?;
        self.rebuild(&live).await
    }

    /// Whether replay reproduces the live balance and category usage
    pub async fn verify(&self, wallet_id: &WalletId) -> Result<bool> {
        let live = self.lock(wallet_id).await?;
        let rebuilt = self.rebuild(&live).await?;
        let consistent = rebuilt.balance == live.balance && rebuilt.categories == live.categories;
        if !consistent {
            warn!(wallet_id = %wallet_id, live = ?live.balance, replayed = ?rebuilt.balance, "ledger replay mismatch");
        }
        Ok(consistent)
    }

    async fn rebuild(&self, live: &Wallet) -> Result<Wallet> {
        let mut txns = self.transactions(&live.wallet_id).await;
        txns.sort_by(|a, b| (a.created_at, a.sequence).cmp(&(b.created_at, b.sequence)));

        let mut rebuilt = live.empty_copy();
        for txn in &txns {
            rebuilt.apply(txn)?;
        }
        Ok(rebuilt)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Acquire a wallet's lock, bounded by `lock_timeout`
    async fn lock(&self, wallet_id: &WalletId) -> Result<OwnedMutexGuard<Wallet>> {
        let cell = self
            .wallets
            .get(wallet_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| BenefitError::WalletNotFound {
                wallet_id: wallet_id.clone(),
            })?;
        tokio::time::timeout(self.lock_timeout, cell.lock_owned())
            .await
            .map_err(|_| {
                warn!(wallet_id = %wallet_id, timeout_ms = self.lock_timeout.as_millis() as u64, "wallet lock wait timed out");
                BenefitError::conflict(format!("wallet {}", wallet_id), 0, 0)
            })
    }

    async fn find<F>(&self, predicate: F) -> Option<LedgerTransaction>
    where
        F: Fn(&LedgerTransaction) -> bool,
    {
        let journal = self.journal.read().await;
        journal.iter().find(|t| predicate(t)).cloned()
    }

    /// Apply a transaction to the locked wallet and journal it.
    ///
    /// The wallet is only updated once the transaction applies cleanly.
    async fn append(
        &self,
        wallet: &mut Wallet,
        transaction_type: TransactionType,
        amount: Money,
        claim_id: Option<ClaimId>,
        category_id: Option<CategoryId>,
        reason: TransactionReason,
    ) -> Result<LedgerTransaction> {
        let mut txn = LedgerTransaction {
            transaction_id: TransactionId::new(),
            wallet_id: wallet.wallet_id.clone(),
            claim_id,
            transaction_type,
            amount,
            category_id,
            balance_after: Money::zero(),
            reason,
            sequence: wallet.version + 1,
            created_at: Utc::now(),
        };

        let mut next = wallet.clone();
        next.apply(&txn)?;
        txn.balance_after = next.balance.current;

        self.journal.write().await.push(txn.clone());
        *wallet = next;
        Ok(txn)
    }
}

fn ensure_positive(amount: Money, what: &str) -> Result<()> {
    if amount.is_positive() {
        Ok(())
    } else {
        Err(BenefitError::InvalidAmount {
            amount,
            reason: format!("{} amount must be greater than zero", what),
        })
    }
}

fn ensure_active(wallet: &Wallet) -> Result<()> {
    if wallet.is_active() {
        Ok(())
    } else {
        Err(BenefitError::WalletArchived {
            wallet_id: wallet.wallet_id.clone(),
        })
    }
}

/// `date` clamped into the period's inclusive day range
fn clamp_to_period(period: &PolicyPeriod, date: NaiveDate) -> NaiveDate {
    let last_day = period.end.pred_opt().unwrap_or(period.start);
    date.clamp(period.start, last_day)
}
