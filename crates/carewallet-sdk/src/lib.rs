//! CareWallet SDK - The benefit core behind one role-checked API
//!
//! `BenefitEngine` wires the plan store, wallet ledger, claim workflow,
//! payment reconciler and analytics together over shared in-memory state.
//!
//! # Quick Start
//!
//! ```ignore
//! use carewallet_sdk::{BenefitEngine, EngineConfig, Review};
//!
//! let engine = BenefitEngine::new(EngineConfig::from_env());
//! let claim = engine.submit_claim(&member, request).await?;
//! engine.assign_claim(&admin, &claim.claim_id, &reviewer.id).await?;
//! let claim = engine.review_claim(&reviewer, &claim.claim_id, Review::approve("ok")).await?;
//! engine.complete_payment(&finance, &claim.claim_id, details).await?;
//! ```

pub mod config;

pub use carewallet_analytics::{
    ActivityEntry, AnalyticsAggregator, ClaimSummary, FinanceSummary, MemberClaimsSummary, ReviewerWorkload,
    TimeWindow, WalletUtilisation,
};
pub use carewallet_claims::{ClaimEvent, Review, ReviewDecision};
pub use carewallet_policy::{InMemoryPlanStore, PlanVersion, PlanVersionStatus};
pub use carewallet_types::*;
pub use config::EngineConfig;

use std::sync::Arc;

use carewallet_claims::{BroadcastNotifier, ClaimStore, ClaimWorkflow, InMemoryActorDirectory};
use carewallet_ledger::WalletLedger;
use carewallet_policy::PolicyConfigResolver;
use carewallet_settlement::PaymentReconciler;
use tokio::sync::broadcast;
use tracing::info;

/// The assembled benefit core
#[derive(Clone)]
pub struct BenefitEngine {
    config: EngineConfig,
    plans: InMemoryPlanStore,
    ledger: WalletLedger,
    workflow: ClaimWorkflow,
    reconciler: PaymentReconciler,
    analytics: AnalyticsAggregator,
    directory: InMemoryActorDirectory,
    notifier: BroadcastNotifier,
}

impl BenefitEngine {
    pub fn new(config: EngineConfig) -> Self {
        let plans = InMemoryPlanStore::new();
        let resolver = PolicyConfigResolver::new(Arc::new(plans.clone()));
        let ledger = WalletLedger::new(resolver).with_lock_timeout(config.lock_timeout());
        let claims = ClaimStore::new();
        let directory = InMemoryActorDirectory::new();
        let notifier = BroadcastNotifier::new(config.notification_buffer);

        let workflow = ClaimWorkflow::new(
            claims.clone(),
            ledger.clone(),
            Arc::new(directory.clone()),
            Arc::new(notifier.clone()),
        );
        let reconciler = PaymentReconciler::new(claims.clone(), ledger.clone(), Arc::new(notifier.clone()))
            .with_max_retries(config.max_retries)
            .with_lock_timeout(config.lock_timeout());
        let analytics = AnalyticsAggregator::new(claims, ledger.clone());

        info!(
            max_retries = config.max_retries,
            lock_timeout_ms = config.lock_timeout_ms,
            currency = %config.currency,
            "benefit engine ready"
        );

        Self {
            config,
            plans,
            ledger,
            workflow,
            reconciler,
            analytics,
            directory,
            notifier,
        }
    }

    /// Engine with default configuration
    pub fn local() -> Self {
        Self::new(EngineConfig::default())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn plans(&self) -> &InMemoryPlanStore {
        &self.plans
    }

    pub fn ledger(&self) -> &WalletLedger {
        &self.ledger
    }

    pub fn workflow(&self) -> &ClaimWorkflow {
        &self.workflow
    }

    pub fn analytics(&self) -> &AnalyticsAggregator {
        &self.analytics
    }

    /// Claim events as they commit
    pub fn subscribe(&self) -> broadcast::Receiver<ClaimEvent> {
        self.notifier.subscribe()
    }

    /// Make an actor known for assignment-target checks
    pub fn register_actor(&self, actor: &Actor) {
        self.directory.register(actor);
    }

    // ========================================================================
    // Wallet operations
    // ========================================================================

    /// Open a wallet for `owner` and their dependents
    pub async fn open_wallet(
        &self,
        actor: &Actor,
        owner: &UserId,
        members: Vec<UserId>,
        policy_id: &PolicyId,
        period: PolicyPeriod,
    ) -> Result<Wallet> {
        actor.require_any(&[Role::OpsAdmin], "open wallets")?;
        self.ledger
            .open_wallet(owner.clone(), members, policy_id.clone(), period)
            .await
    }

    /// Top up a wallet: its owner, or ops on their behalf
    pub async fn top_up_wallet(
        &self,
        actor: &Actor,
        wallet_id: &WalletId,
        amount: Money,
    ) -> Result<LedgerTransaction> {
        match actor.role {
            Role::OpsAdmin => {}
            Role::Member => {
                let wallet = self.ledger.wallet(wallet_id).await?;
                if wallet.owner_user_id != actor.id {
                    return Err(BenefitError::forbidden(format!(
                        "{} does not own wallet {}",
                        actor.id, wallet_id
                    )));
                }
            }
            _ => actor.require_any(&[Role::Member, Role::OpsAdmin], "top up wallets")?,
        }
        self.ledger.top_up(wallet_id, amount, &actor.id).await
    }

    /// Carry a wallet's unused balance into the next period
    pub async fn rollover_wallet(
        &self,
        actor: &Actor,
        wallet_id: &WalletId,
        next_period: PolicyPeriod,
    ) -> Result<Option<LedgerTransaction>> {
        actor.require_any(&[Role::OpsAdmin], "roll over wallets")?;
        self.ledger.rollover(wallet_id, next_period).await
    }

    pub async fn wallet(&self, wallet_id: &WalletId) -> Result<Wallet> {
        self.ledger.wallet(wallet_id).await
    }

    // ========================================================================
    // Claim operations
    // ========================================================================

    pub async fn submit_claim(&self, actor: &Actor, request: ClaimRequest) -> Result<Claim> {
        self.workflow.submit_claim(actor, request).await
    }

    pub async fn create_draft(&self, actor: &Actor, request: ClaimRequest) -> Result<Claim> {
        self.workflow.create_draft(actor, request).await
    }

    pub async fn update_draft(&self, actor: &Actor, claim_id: &ClaimId, update: DraftUpdate) -> Result<Claim> {
        self.workflow.update_draft(actor, claim_id, update).await
    }

    pub async fn add_documents(
        &self,
        actor: &Actor,
        claim_id: &ClaimId,
        documents: Vec<DocumentRef>,
    ) -> Result<Claim> {
        self.workflow.add_documents(actor, claim_id, documents).await
    }

    pub async fn remove_document(&self, actor: &Actor, claim_id: &ClaimId, document: &DocumentRef) -> Result<Claim> {
        self.workflow.remove_document(actor, claim_id, document).await
    }

    pub async fn delete_draft(&self, actor: &Actor, claim_id: &ClaimId) -> Result<()> {
        self.workflow.delete_draft(actor, claim_id).await
    }

    pub async fn submit_draft(&self, actor: &Actor, claim_id: &ClaimId) -> Result<Claim> {
        self.workflow.submit(actor, claim_id).await
    }

    /// A member's own claims summary; TPA and ops staff may view anyone's
    pub async fn member_claims_summary(&self, actor: &Actor, member_id: &UserId) -> Result<MemberClaimsSummary> {
        if !(actor.role == Role::Member && &actor.id == member_id) {
            actor.require_any(&[Role::TpaAdmin, Role::OpsAdmin], "view member claim summaries")?;
        }
        self.analytics.member_claims_summary(member_id).await
    }

    pub async fn assign_claim(&self, actor: &Actor, claim_id: &ClaimId, assignee: &UserId) -> Result<Claim> {
        self.workflow.assign_claim(actor, claim_id, assignee, None).await
    }

    pub async fn review_claim(&self, actor: &Actor, claim_id: &ClaimId, review: Review) -> Result<Claim> {
        self.workflow.review_claim(actor, claim_id, review).await
    }

    pub async fn request_documents(
        &self,
        actor: &Actor,
        claim_id: &ClaimId,
        requests: Vec<DocumentRequest>,
    ) -> Result<Claim> {
        self.workflow.request_documents(actor, claim_id, requests, None).await
    }

    pub async fn resubmit_documents(
        &self,
        actor: &Actor,
        claim_id: &ClaimId,
        documents: Vec<DocumentRef>,
    ) -> Result<Claim> {
        self.workflow.resubmit_documents(actor, claim_id, documents, None).await
    }

    pub async fn cancel_claim(&self, actor: &Actor, claim_id: &ClaimId, reason: &str) -> Result<Claim> {
        self.workflow.cancel_claim(actor, claim_id, reason).await
    }

    pub async fn complete_payment(
        &self,
        actor: &Actor,
        claim_id: &ClaimId,
        details: PaymentDetails,
    ) -> Result<Claim> {
        self.reconciler.complete_payment(claim_id, details, actor).await
    }

    pub async fn claim(&self, claim_id: &ClaimId) -> Result<Claim> {
        self.workflow.claim(claim_id).await
    }
}
