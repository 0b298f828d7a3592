//! CareWallet Policy - date-effective plan versions
//!
//! A policy owns a sequence of plan versions, each valid over a half-open
//! interval `[effective_from, effective_to)`. Resolving a policy for a date
//! yields the immutable [`EffectiveWalletConfig`] of the ACTIVE version
//! covering that date.
//!
//! Resolution is a pure read: it never mutates the store, so an approval
//! computed at time T can be recomputed later from `(policy_id, plan_version)`
//! even after a newer version has gone live.

use std::collections::HashMap;
use std::sync::Arc;

use carewallet_types::*;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Plan version lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanVersionStatus {
    /// Editable, not used for resolution
    Draft,
    /// Published and used for resolution
    Active,
    /// Withdrawn
    Retired,
}

/// One version of a policy's wallet rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanVersion {
    pub policy_id: PolicyId,
    pub version: u32,
    pub status: PlanVersionStatus,
    pub effective_from: NaiveDate,
    /// Exclusive; `None` means open-ended
    pub effective_to: Option<NaiveDate>,
    pub rules: EffectiveWalletConfig,
}

impl PlanVersion {
    /// A draft version; `rules.policy_id`/`plan_version` are overwritten to match
    pub fn draft(
        policy_id: PolicyId,
        version: u32,
        effective_from: NaiveDate,
        effective_to: Option<NaiveDate>,
        mut rules: EffectiveWalletConfig,
    ) -> Self {
        rules.policy_id = policy_id.clone();
        rules.plan_version = version;
        Self {
            policy_id,
            version,
            status: PlanVersionStatus::Draft,
            effective_from,
            effective_to,
            rules,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.effective_from <= date && self.effective_to.map_or(true, |to| date < to)
    }

    fn overlaps(&self, other: &PlanVersion) -> bool {
        let self_end_after_other_start = self.effective_to.map_or(true, |to| to > other.effective_from);
        let other_end_after_self_start = other.effective_to.map_or(true, |to| to > self.effective_from);
        self_end_after_other_start && other_end_after_self_start
    }

    /// Publish readiness: interval sane and rules consistent
    pub fn validate(&self) -> Result<()> {
        if let Some(to) = self.effective_to {
            if to <= self.effective_from {
                return Err(BenefitError::invalid_input(
                    "effective_to",
                    format!("{} must be after effective_from {}", to, self.effective_from),
                ));
            }
        }
        self.rules.validate()
    }
}

/// Store of plan versions, queried by policy
#[async_trait::async_trait]
pub trait PlanVersionStore: Send + Sync {
    /// All versions of a policy, any status
    async fn versions(&self, policy_id: &PolicyId) -> Result<Vec<PlanVersion>>;
}

/// In-memory plan-version store
#[derive(Clone, Default)]
pub struct InMemoryPlanStore {
    versions: Arc<RwLock<HashMap<PolicyId, Vec<PlanVersion>>>>,
}

impl InMemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a draft version
    pub async fn insert_draft(&self, mut plan: PlanVersion) -> Result<()> {
        plan.status = PlanVersionStatus::Draft;
        plan.rules.policy_id = plan.policy_id.clone();
        plan.rules.plan_version = plan.version;
        if let Some(cf) = plan.rules.carry_forward {
            plan.rules.carry_forward = Some(cf.with_defaults());
        }

        let mut versions = self.versions.write().await;
        let list = versions.entry(plan.policy_id.clone()).or_default();
        if let Some(existing) = list.iter_mut().find(|v| v.version == plan.version) {
            if existing.status != PlanVersionStatus::Draft {
                return Err(BenefitError::invalid_input(
                    "version",
                    format!("plan version {} is {:?} and cannot be edited", plan.version, existing.status),
                ));
            }
            *existing = plan;
        } else {
            list.push(plan);
        }
        Ok(())
    }

    /// Draft → Active, after validation and an overlap check against other
    /// active versions
    pub async fn publish(&self, policy_id: &PolicyId, version: u32) -> Result<()> {
        let mut versions = self.versions.write().await;
        let list = versions
            .get_mut(policy_id)
            .ok_or_else(|| BenefitError::PlanVersionNotFound {
                policy_id: policy_id.clone(),
                version,
            })?;
        let idx = list
            .iter()
            .position(|v| v.version == version)
            .ok_or_else(|| BenefitError::PlanVersionNotFound {
                policy_id: policy_id.clone(),
                version,
            })?;

        let candidate = &list[idx];
        if candidate.status != PlanVersionStatus::Draft {
            return Err(BenefitError::invalid_input(
                "status",
                format!("plan version {} is {:?}, only drafts can be published", version, candidate.status),
            ));
        }
        candidate.validate()?;
        if let Some(clash) = list.iter().find(|v| {
            v.version != version && v.status == PlanVersionStatus::Active && v.overlaps(candidate)
        }) {
            return Err(BenefitError::invalid_input(
                "effective_from",
                format!("overlaps active plan version {}", clash.version),
            ));
        }

        list[idx].status = PlanVersionStatus::Active;
        info!(policy_id = %policy_id, version, "plan version published");
        Ok(())
    }

    /// Active → Retired
    pub async fn retire(&self, policy_id: &PolicyId, version: u32) -> Result<()> {
        let mut versions = self.versions.write().await;
        let plan = versions
            .get_mut(policy_id)
            .and_then(|list| list.iter_mut().find(|v| v.version == version))
            .ok_or_else(|| BenefitError::PlanVersionNotFound {
                policy_id: policy_id.clone(),
                version,
            })?;
        if plan.status != PlanVersionStatus::Active {
            return Err(BenefitError::invalid_input(
                "status",
                format!("plan version {} is {:?}, only active versions can be retired", version, plan.status),
            ));
        }
        plan.status = PlanVersionStatus::Retired;
        info!(policy_id = %policy_id, version, "plan version retired");
        Ok(())
    }
}

#[async_trait::async_trait]
impl PlanVersionStore for InMemoryPlanStore {
    async fn versions(&self, policy_id: &PolicyId) -> Result<Vec<PlanVersion>> {
        Ok(self
            .versions
            .read()
            .await
            .get(policy_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Resolves the effective wallet rules for a policy on a date
#[derive(Clone)]
pub struct PolicyConfigResolver {
    store: Arc<dyn PlanVersionStore>,
}

impl PolicyConfigResolver {
    pub fn new(store: Arc<dyn PlanVersionStore>) -> Self {
        Self { store }
    }

    /// Rules of the ACTIVE version whose interval contains `as_of`.
    ///
    /// If several active versions match, the highest version number wins.
    pub async fn resolve(&self, policy_id: &PolicyId, as_of: NaiveDate) -> Result<EffectiveWalletConfig> {
        let versions = self.store.versions(policy_id).await?;
        let chosen = versions
            .into_iter()
            .filter(|v| v.contains(as_of) && v.status == PlanVersionStatus::Active)
            .max_by_key(|v| v.version)
            .ok_or_else(|| BenefitError::NoActivePlanVersion {
                policy_id: policy_id.clone(),
                as_of,
            })?;
        debug!(policy_id = %policy_id, %as_of, version = chosen.version, "resolved plan version");
        Ok(chosen.rules)
    }

    /// Rules of a specific version regardless of status, for audit
    pub async fn resolve_version(&self, policy_id: &PolicyId, version: u32) -> Result<EffectiveWalletConfig> {
        self.store
            .versions(policy_id)
            .await?
            .into_iter()
            .find(|v| v.version == version)
            .map(|v| v.rules)
            .ok_or_else(|| BenefitError::PlanVersionNotFound {
                policy_id: policy_id.clone(),
                version,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn rules(policy: &PolicyId, amount: i64) -> EffectiveWalletConfig {
        EffectiveWalletConfig::new(policy.clone(), 0, Money::from_minor(amount))
    }

    async fn setup() -> (InMemoryPlanStore, PolicyConfigResolver, PolicyId) {
        let store = InMemoryPlanStore::new();
        let resolver = PolicyConfigResolver::new(Arc::new(store.clone()));
        (store, resolver, PolicyId::new())
    }

    #[tokio::test]
    async fn test_resolves_version_covering_date() {
        let (store, resolver, policy) = setup().await;
        store
            .insert_draft(PlanVersion::draft(policy.clone(), 1, d(2025, 1, 1), Some(d(2025, 7, 1)), rules(&policy, 10_000)))
            .await
            .unwrap();
        store
            .insert_draft(PlanVersion::draft(policy.clone(), 2, d(2025, 7, 1), None, rules(&policy, 20_000)))
            .await
            .unwrap();
        store.publish(&policy, 1).await.unwrap();
        store.publish(&policy, 2).await.unwrap();

        let early = resolver.resolve(&policy, d(2025, 6, 30)).await.unwrap();
        assert_eq!(early.plan_version, 1);
        assert_eq!(early.total_annual_amount, Money::from_minor(10_000));

        // effective_to is exclusive
        let boundary = resolver.resolve(&policy, d(2025, 7, 1)).await.unwrap();
        assert_eq!(boundary.plan_version, 2);
    }

    #[tokio::test]
    async fn test_draft_only_match_is_not_active() {
        let (store, resolver, policy) = setup().await;
        store
            .insert_draft(PlanVersion::draft(policy.clone(), 1, d(2025, 1, 1), None, rules(&policy, 10_000)))
            .await
            .unwrap();

        let err = resolver.resolve(&policy, d(2025, 3, 1)).await.unwrap_err();
        assert!(matches!(err, BenefitError::NoActivePlanVersion { .. }));
        assert_eq!(err.kind(), ErrorKind::Config);

        let before = resolver.resolve(&PolicyId::new(), d(2025, 3, 1)).await;
        assert!(matches!(before, Err(BenefitError::NoActivePlanVersion { .. })));
    }

    #[tokio::test]
    async fn test_publish_rejects_overlap_and_bad_rules() {
        let (store, _resolver, policy) = setup().await;
        store
            .insert_draft(PlanVersion::draft(policy.clone(), 1, d(2025, 1, 1), None, rules(&policy, 10_000)))
            .await
            .unwrap();
        store.publish(&policy, 1).await.unwrap();

        store
            .insert_draft(PlanVersion::draft(policy.clone(), 2, d(2025, 6, 1), None, rules(&policy, 10_000)))
            .await
            .unwrap();
        assert!(matches!(
            store.publish(&policy, 2).await,
            Err(BenefitError::InvalidInput { .. })
        ));

        let bad = rules(&policy, 10_000).with_copay(Copay::percent(dec!(150)));
        store
            .insert_draft(PlanVersion::draft(policy.clone(), 3, d(2030, 1, 1), None, bad))
            .await
            .unwrap();
        assert!(store.publish(&policy, 3).await.is_err());

        // Published versions are frozen
        assert!(store
            .insert_draft(PlanVersion::draft(policy.clone(), 1, d(2025, 1, 1), None, rules(&policy, 1)))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_resolution_is_reproducible_after_newer_version() {
        let (store, resolver, policy) = setup().await;
        store
            .insert_draft(PlanVersion::draft(policy.clone(), 1, d(2025, 1, 1), Some(d(2026, 1, 1)), rules(&policy, 10_000)))
            .await
            .unwrap();
        store.publish(&policy, 1).await.unwrap();
        let before = resolver.resolve(&policy, d(2025, 5, 1)).await.unwrap();

        store
            .insert_draft(PlanVersion::draft(policy.clone(), 2, d(2026, 1, 1), None, rules(&policy, 99_000)))
            .await
            .unwrap();
        store.publish(&policy, 2).await.unwrap();

        assert_eq!(resolver.resolve(&policy, d(2025, 5, 1)).await.unwrap(), before);
        assert_eq!(resolver.resolve_version(&policy, 1).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_retired_version_no_longer_resolves() {
        let (store, resolver, policy) = setup().await;
        store
            .insert_draft(PlanVersion::draft(policy.clone(), 1, d(2025, 1, 1), None, rules(&policy, 10_000)))
            .await
            .unwrap();
        store
            .insert_draft(PlanVersion::draft(policy.clone(), 2, d(2026, 1, 1), None, rules(&policy, 10_000)))
            .await
            .unwrap();

        // Drafts cannot be retired
        assert!(matches!(
            store.retire(&policy, 2).await,
            Err(BenefitError::InvalidInput { .. })
        ));

        store.publish(&policy, 1).await.unwrap();
        store.retire(&policy, 1).await.unwrap();
        assert!(matches!(
            store.retire(&policy, 1).await,
            Err(BenefitError::InvalidInput { .. })
        ));
        assert!(matches!(
            store.retire(&policy, 9).await,
            Err(BenefitError::PlanVersionNotFound { .. })
        ));

        let err = resolver.resolve(&policy, d(2025, 3, 1)).await.unwrap_err();
        assert!(matches!(err, BenefitError::NoActivePlanVersion { .. }));
        // Still available for audit
        assert_eq!(resolver.resolve_version(&policy, 1).await.unwrap().plan_version, 1);
    }
}
