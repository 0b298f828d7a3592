//! Optimistic claim store
//!
//! Claims are read as snapshots and written back with the version they were
//! read at. A commit against a stale version fails with
//! `ConcurrentModification`, so two actors racing on one claim cannot both win.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use carewallet_types::*;

/// In-memory claim records
#[derive(Clone, Default)]
pub struct ClaimStore {
    claims: Arc<DashMap<ClaimId, Claim>>,
}

impl ClaimStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new claim at version 1
    pub async fn insert(&self, mut claim: Claim) -> Result<Claim> {
        claim.version = 1;
        let claim_id = claim.claim_id.clone();
        match self.claims.entry(claim_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(BenefitError::invalid_input(
                "claim_id",
                format!("{} already exists", claim_id),
            )),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(claim.clone());
                Ok(claim)
            }
        }
    }

    pub async fn get(&self, claim_id: &ClaimId) -> Result<Claim> {
        self.claims
            .get(claim_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| BenefitError::ClaimNotFound {
                claim_id: claim_id.clone(),
            })
    }

    /// Write `claim` back if the stored version still equals `expected_version`.
    ///
    /// Returns the stored claim with its version bumped.
    pub async fn commit(&self, mut claim: Claim, expected_version: u64) -> Result<Claim> {
        let mut stored = self
            .claims
            .get_mut(&claim.claim_id)
            .ok_or_else(|| BenefitError::ClaimNotFound {
                claim_id: claim.claim_id.clone(),
            })?;

        if stored.version != expected_version {
            debug!(claim_id = %claim.claim_id, expected_version, actual = stored.version, "stale claim commit");
            return Err(BenefitError::conflict(
                format!("claim {}", claim.claim_id),
                expected_version,
                stored.version,
            ));
        }

        claim.version = expected_version + 1;
        *stored = claim.clone();
        Ok(claim)
    }

    /// All claims, oldest first
    pub async fn all(&self) -> Vec<Claim> {
        let mut claims: Vec<Claim> = self.claims.iter().map(|entry| entry.value().clone()).collect();
        claims.sort_by_key(|c| c.created_at);
        claims
    }

    /// Claims a member filed or is the patient on, oldest first
    pub async fn by_member(&self, user_id: &UserId) -> Vec<Claim> {
        self.all()
            .await
            .into_iter()
            .filter(|c| &c.submitted_by == user_id || &c.user_id == user_id)
            .collect()
    }

    /// Delete a claim if the stored version still equals `expected_version`
    pub async fn remove(&self, claim_id: &ClaimId, expected_version: u64) -> Result<Claim> {
        match self.claims.remove_if(claim_id, |_, stored| stored.version == expected_version) {
            Some((_, removed)) => Ok(removed),
            None => {
                let actual = self.get(claim_id).await?.version;
                Err(BenefitError::conflict(format!("claim {}", claim_id), expected_version, actual))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn claim() -> Claim {
        let member = Actor::member("Asha");
        Claim::draft(
            ClaimRequest {
                patient_id: member.id.clone(),
                wallet_id: WalletId::new(),
                category: CategoryId::consultation(),
                bill_amount: Money::from_minor(2_000),
                treatment_date: NaiveDate::from_ymd_opt(2025, 5, 2).unwrap(),
                provider_name: "City Clinic".into(),
                documents: vec![DocumentRef::new("bill.pdf")],
            },
            &member,
        )
    }

    #[tokio::test]
    async fn test_commit_bumps_version() {
        let store = ClaimStore::new();
        let stored = store.insert(claim()).await.unwrap();
        assert_eq!(stored.version, 1);

        let mut edit = stored.clone();
        edit.provider_name = "Metro Clinic".into();
        let committed = store.commit(edit, 1).await.unwrap();
        assert_eq!(committed.version, 2);
        assert_eq!(store.get(&stored.claim_id).await.unwrap().provider_name, "Metro Clinic");
    }

    #[tokio::test]
    async fn test_stale_commit_is_refused() {
        let store = ClaimStore::new();
        let stored = store.insert(claim()).await.unwrap();

        let first = stored.clone();
        let second = stored.clone();
        store.commit(first, stored.version).await.unwrap();

        let err = store.commit(second, stored.version).await.unwrap_err();
        match err {
            BenefitError::ConcurrentModification { expected, actual, .. } => {
                assert_eq!(expected, 1);
                assert_eq!(actual, 2);
            }
            other => panic!("expected ConcurrentModification, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_claim() {
        let store = ClaimStore::new();
        assert!(matches!(
            store.get(&ClaimId::new()).await,
            Err(BenefitError::ClaimNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_remove_checks_version() {
        let store = ClaimStore::new();
        let stored = store.insert(claim()).await.unwrap();
        store.commit(stored.clone(), stored.version).await.unwrap();

        assert!(matches!(
            store.remove(&stored.claim_id, stored.version).await,
            Err(BenefitError::ConcurrentModification { .. })
        ));
        let removed = store.remove(&stored.claim_id, stored.version + 1).await.unwrap();
        assert_eq!(removed.claim_id, stored.claim_id);
        assert!(matches!(
            store.remove(&stored.claim_id, removed.version).await,
            Err(BenefitError::ClaimNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_by_member_includes_patient_and_filer() {
        let store = ClaimStore::new();
        let filed = store.insert(claim()).await.unwrap();
        let mut other = claim();
        other.user_id = filed.submitted_by.clone();
        store.insert(other).await.unwrap();
        store.insert(claim()).await.unwrap();

        assert_eq!(store.by_member(&filed.submitted_by).await.len(), 2);
        assert!(store.by_member(&UserId::new()).await.is_empty());
    }
}
