//! CareWallet Settlement - Payment reconciliation for approved claims
//!
//! The reconciler is the only path to PAYMENT_COMPLETED. It guarantees:
//! - Amount-exactness (paid must equal approved, no tolerance)
//! - Exactly-once debit (the ledger debit is idempotent per claim)
//! - No half-paid claims (a debit whose claim commit fails is reversed)

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use carewallet_claims::notify::{dispatch, transition_events};
use carewallet_claims::transitions::transition;
use carewallet_claims::{ClaimEvent, ClaimStore, Notifier};
use carewallet_ledger::WalletLedger;
use carewallet_types::*;

/// Default attempts at committing a paid claim after a version conflict
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Records finance's payment of approved claims
#[derive(Clone)]
pub struct PaymentReconciler {
    store: ClaimStore,
    ledger: WalletLedger,
    notifier: Arc<dyn Notifier>,
    /// One guard per claim; serializes payment attempts on the same claim
    guards: Arc<DashMap<ClaimId, Arc<Mutex<()>>>>,
    max_retries: u32,
    lock_timeout: Duration,
}

impl PaymentReconciler {
    pub fn new(store: ClaimStore, ledger: WalletLedger, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            ledger,
            notifier,
            guards: Arc::new(DashMap::new()),
            max_retries: DEFAULT_MAX_RETRIES,
            lock_timeout: carewallet_ledger::DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Complete payment of an approved claim.
    ///
    /// Approved claims are stepped through PAYMENT_PENDING and
    /// PAYMENT_PROCESSING as needed. Repeating a completed payment with the
    /// same reference returns the claim unchanged.
    pub async fn complete_payment(
        &self,
        claim_id: &ClaimId,
        details: PaymentDetails,
        actor: &Actor,
    ) -> Result<Claim> {
        actor.require_any(&[Role::Finance], "complete payments")?;
        validate_details(&details)?;
        let guard = self.guard(claim_id).await?;
        let result = self.pay(claim_id, &details, actor).await;
        drop(guard);
        self.release(claim_id);
        result
    }

    async fn pay(&self, claim_id: &ClaimId, details: &PaymentDetails, actor: &Actor) -> Result<Claim> {
        let claim = self.store.get(claim_id).await?;
        if claim.status == ClaimStatus::PaymentCompleted {
            if claim.payment_reference.as_deref() == Some(details.payment_reference.as_str())
                && claim.paid_amount == Some(details.amount_paid)
            {
                debug!(claim_id = %claim_id, reference = %details.payment_reference, "payment already recorded");
                return Ok(claim);
            }
            return Err(BenefitError::ClaimNotApproved {
                claim_id: claim_id.clone(),
                status: claim.status,
            });
        }
        let approved = payable_amount(&claim)?;
        if details.amount_paid != approved {
            warn!(claim_id = %claim_id, paid = %details.amount_paid, %approved, "payment amount mismatch");
            return Err(BenefitError::AmountMismatch {
                claim_id: claim_id.clone(),
                paid: details.amount_paid,
                approved,
            });
        }

        let debit = self
            .ledger
            .debit(&claim.owner_wallet_id, claim_id, approved, Some(&claim.category))
            .await?;
        self.settle(claim, &debit, details, actor).await
    }

    /// Commit the paid claim read as `before` against an existing debit,
    /// reversing the debit if the commit cannot be made
    async fn settle(
        &self,
        mut before: Claim,
        debit: &LedgerTransaction,
        details: &PaymentDetails,
        actor: &Actor,
    ) -> Result<Claim> {
        let claim_id = before.claim_id.clone();
        let approved = debit.amount;
        let mut attempt = 0;
        let failure = loop {
            let mut paid = before.clone();
            if let Err(e) = mark_paid(&mut paid, details, actor) {
                break e;
            }
            match self.store.commit(paid, before.version).await {
                Ok(committed) => {
                    info!(
                        claim_id = %claim_id,
                        wallet_id = %committed.owner_wallet_id,
                        amount = %approved,
                        reference = %details.payment_reference,
                        transaction_id = %debit.transaction_id,
                        "claim payment completed"
                    );
                    let mut events = transition_events(&before, &committed);
                    events.push(ClaimEvent::PaymentCompleted {
                        claim_id: claim_id.clone(),
                        wallet_id: committed.owner_wallet_id.clone(),
                        amount: approved,
                        payment_reference: details.payment_reference.clone(),
                        timestamp: Utc::now(),
                    });
                    dispatch(self.notifier.as_ref(), events).await;
                    return Ok(committed);
                }
                Err(e) if e.is_retriable() && attempt < self.max_retries => {
                    attempt += 1;
                    debug!(claim_id = %claim_id, attempt, "retrying paid-claim commit");
                    before = match self.store.get(&claim_id).await {
                        Ok(fresh) => fresh,
                        Err(e) => break e,
                    };
                    if !before.status.is_payable() || before.approved_amount != Some(approved) {
                        break BenefitError::ClaimNotApproved {
                            claim_id: claim_id.clone(),
                            status: before.status,
                        };
                    }
                }
                Err(e) => break e,
            }
        };

        warn!(claim_id = %claim_id, error = %failure, attempts = attempt + 1, "paid-claim commit failed, reversing debit");
        let note = format!("payment of {} not committed: {}", claim_id, failure);
        if let Err(reversal) = self.ledger.reverse_debit(&debit.transaction_id, note).await {
            error!(
                claim_id = %claim_id,
                wallet_id = %debit.wallet_id,
                transaction_id = %debit.transaction_id,
                amount = %approved,
                error = %reversal,
                "debit left without a paid claim"
            );
        }
        Err(failure)
    }

    async fn guard(&self, claim_id: &ClaimId) -> Result<OwnedMutexGuard<()>> {
        let cell = Arc::clone(
            self.guards
                .entry(claim_id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        tokio::time::timeout(self.lock_timeout, cell.lock_owned())
            .await
            .map_err(|_| BenefitError::conflict(format!("payment of {}", claim_id), 0, 0))
    }

    /// Drop the claim's guard once nobody else holds or awaits it
    fn release(&self, claim_id: &ClaimId) {
        self.guards.remove_if(claim_id, |_, cell| Arc::strong_count(cell) == 1);
    }
}

fn validate_details(details: &PaymentDetails) -> Result<()> {
    if !details.amount_paid.is_positive() {
        return Err(BenefitError::InvalidAmount {
            amount: details.amount_paid,
            reason: "amount paid must be greater than zero".into(),
        });
    }
    if details.payment_reference.trim().is_empty() {
        return Err(BenefitError::invalid_input("payment_reference", "required"));
    }
    if details.payment_mode.trim().is_empty() {
        return Err(BenefitError::invalid_input("payment_mode", "required"));
    }
    Ok(())
}

/// Approved amount of a claim that may be paid
fn payable_amount(claim: &Claim) -> Result<Money> {
    match claim.approved_amount {
        Some(amount) if claim.status.is_payable() => Ok(amount),
        _ => Err(BenefitError::ClaimNotApproved {
            claim_id: claim.claim_id.clone(),
            status: claim.status,
        }),
    }
}

/// Step the claim to PAYMENT_COMPLETED and stamp the payment fields
fn mark_paid(claim: &mut Claim, details: &PaymentDetails, actor: &Actor) -> Result<()> {
    if matches!(claim.status, ClaimStatus::Approved | ClaimStatus::PartiallyApproved) {
        transition(claim, ClaimStatus::PaymentPending, actor, "Queued for payment", None)?;
    }
    if claim.status == ClaimStatus::PaymentPending {
        transition(claim, ClaimStatus::PaymentProcessing, actor, "Payment processing started", None)?;
    }
    transition(
        claim,
        ClaimStatus::PaymentCompleted,
        actor,
        format!("Paid via {} (ref {})", details.payment_mode, details.payment_reference),
        details.notes.clone(),
    )?;
    claim.paid_amount = Some(details.amount_paid);
    claim.payment_mode = Some(details.payment_mode.clone());
    claim.payment_reference = Some(details.payment_reference.clone());
    claim.payment_date = Some(details.payment_date);
    claim.paid_by_actor_id = Some(actor.id.clone());
    claim.paid_at = Some(Utc::now());
    Ok(())
}
