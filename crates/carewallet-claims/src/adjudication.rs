//! Adjudication: how much of a bill is payable under the plan
//!
//! Pure function of the claim, the resolved rules, and a wallet snapshot.
//! The wallet is not touched; the debit happens at payment.

use carewallet_types::*;

/// Outcome of adjudicating an approval
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Approve for `adjudication.payable_amount`
    Approve {
        status: ClaimStatus,
        adjudication: Adjudication,
    },
    /// The plan forces a rejection
    Reject {
        reason: RejectionReason,
        adjudication: Adjudication,
    },
}

/// Adjudicate `claim` under `config` against `wallet`.
///
/// eligible = min(bill, reviewer amount, per-claim limit, category limit,
/// category remaining, wallet current). If caps reduced the bill and the plan
/// has no partial payment, the claim is rejected. Otherwise the copay comes
/// off and a zero result is rejected too.
pub fn adjudicate(
    claim: &Claim,
    config: &EffectiveWalletConfig,
    wallet: &Wallet,
    reviewer_amount: Option<Money>,
) -> Result<Decision> {
    let bill = claim.bill_amount;
    if let Some(amount) = reviewer_amount {
        if amount.is_negative() {
            return Err(BenefitError::InvalidAmount {
                amount,
                reason: "approved amount must not be negative".into(),
            });
        }
        if amount > bill {
            return Err(BenefitError::invalid_input(
                "amount",
                format!("approved amount {} exceeds bill amount {}", amount, bill),
            ));
        }
    }

    let caps = [
        (reviewer_amount, LimitApplied::ReviewerAmount),
        (config.per_claim_limit, LimitApplied::PerClaimLimit),
        (
            config.category_limits.get(&claim.category).copied(),
            LimitApplied::CategoryLimit,
        ),
        (
            wallet.category(&claim.category).map(CategoryBalance::remaining),
            LimitApplied::CategoryBalance,
        ),
        (Some(wallet.balance.current), LimitApplied::WalletBalance),
    ];

    let mut eligible = bill;
    let mut limit_applied = LimitApplied::None;
    for (cap, limit) in caps {
        if let Some(cap) = cap {
            if cap < eligible {
                eligible = cap;
                limit_applied = limit;
            }
        }
    }
    let eligible = eligible.max(Money::zero());

    let mut adjudication = Adjudication {
        policy_id: config.policy_id.clone(),
        plan_version: config.plan_version,
        as_of: claim.treatment_date,
        eligible_amount: eligible,
        copay_amount: Money::zero(),
        payable_amount: Money::zero(),
        limit_applied,
    };

    if eligible < bill && !config.partial_payment_enabled {
        return Ok(Decision::Reject {
            reason: RejectionReason::ExceedsLimitNoPartial,
            adjudication,
        });
    }

    let copay = match &config.copay {
        Some(rule) => rule.member_share(eligible)?,
        None => Money::zero(),
    };
    adjudication.copay_amount = copay;
    adjudication.payable_amount = eligible.saturating_sub(copay);

    if adjudication.payable_amount.is_zero() {
        return Ok(Decision::Reject {
            reason: RejectionReason::NoEligibleAmount,
            adjudication,
        });
    }

    let status = if adjudication.payable_amount == bill {
        ClaimStatus::Approved
    } else {
        ClaimStatus::PartiallyApproved
    };
    Ok(Decision::Approve {
        status,
        adjudication,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;

    fn config() -> EffectiveWalletConfig {
        EffectiveWalletConfig::new(PolicyId::new(), 1, Money::from_minor(50_000))
    }

    fn wallet(current: i64) -> Wallet {
        Wallet {
            wallet_id: WalletId::new(),
            owner_user_id: UserId::new(),
            members: vec![],
            policy_id: PolicyId::new(),
            period: PolicyPeriod::new(
                NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            )
            .unwrap(),
            balance: Balance {
                allocated: Money::from_minor(current),
                consumed: Money::zero(),
                current: Money::from_minor(current),
            },
            categories: vec![],
            status: WalletStatus::Active,
            version: 1,
            created_at: Utc::now(),
        }
    }

    fn claim(bill: i64) -> Claim {
        let member = Actor::member("Ravi");
        Claim::draft(
            ClaimRequest {
                patient_id: member.id.clone(),
                wallet_id: WalletId::new(),
                category: CategoryId::consultation(),
                bill_amount: Money::from_minor(bill),
                treatment_date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
                provider_name: "Clinic".into(),
                documents: vec![DocumentRef::new("consultation-bill.pdf")],
            },
            &member,
        )
    }

    fn approved(decision: Decision) -> (ClaimStatus, Adjudication) {
        match decision {
            Decision::Approve { status, adjudication } => (status, adjudication),
            other => panic!("expected approval, got {:?}", other),
        }
    }

    #[test]
    fn test_full_approval_within_limits() {
        let cfg = config().with_per_claim_limit(Money::from_minor(5_000));
        let (status, adj) = approved(adjudicate(&claim(2_000), &cfg, &wallet(10_000), None).unwrap());
        assert_eq!(status, ClaimStatus::Approved);
        assert_eq!(adj.payable_amount, Money::from_minor(2_000));
        assert_eq!(adj.limit_applied, LimitApplied::None);
    }

    #[test]
    fn test_category_limit_without_partial_payment_rejects() {
        let cfg = config().with_category_limit(CategoryId::consultation(), Money::from_minor(6_000));
        let decision = adjudicate(&claim(10_000), &cfg, &wallet(20_000), None).unwrap();
        match decision {
            Decision::Reject { reason, adjudication } => {
                assert_eq!(reason, RejectionReason::ExceedsLimitNoPartial);
                assert_eq!(adjudication.eligible_amount, Money::from_minor(6_000));
                assert_eq!(adjudication.limit_applied, LimitApplied::CategoryLimit);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_category_limit_with_partial_payment() {
        let cfg = config()
            .with_category_limit(CategoryId::consultation(), Money::from_minor(6_000))
            .with_partial_payment(true);
        let (status, adj) = approved(adjudicate(&claim(10_000), &cfg, &wallet(20_000), None).unwrap());
        assert_eq!(status, ClaimStatus::PartiallyApproved);
        assert_eq!(adj.payable_amount, Money::from_minor(6_000));
    }

    #[test]
    fn test_copay_percent_and_amount() {
        let percent = config().with_copay(Copay::percent(dec!(10)));
        let (_, adj) = approved(adjudicate(&claim(5_000), &percent, &wallet(20_000), None).unwrap());
        assert_eq!(adj.eligible_amount, Money::from_minor(5_000));
        assert_eq!(adj.copay_amount, Money::from_minor(500));
        assert_eq!(adj.payable_amount, Money::from_minor(4_500));

        let flat = config().with_copay(Copay::amount(Money::from_minor(500)));
        let (_, adj) = approved(adjudicate(&claim(5_000), &flat, &wallet(20_000), None).unwrap());
        assert_eq!(adj.payable_amount, Money::from_minor(4_500));
    }

    #[test]
    fn test_wallet_balance_caps_eligible() {
        let cfg = config().with_partial_payment(true);
        let (status, adj) = approved(adjudicate(&claim(5_000), &cfg, &wallet(3_000), None).unwrap());
        assert_eq!(status, ClaimStatus::PartiallyApproved);
        assert_eq!(adj.limit_applied, LimitApplied::WalletBalance);
        assert_eq!(adj.payable_amount, Money::from_minor(3_000));
    }

    #[test]
    fn test_empty_wallet_has_nothing_eligible() {
        let cfg = config().with_partial_payment(true);
        let decision = adjudicate(&claim(5_000), &cfg, &wallet(0), None).unwrap();
        assert!(matches!(
            decision,
            Decision::Reject { reason: RejectionReason::NoEligibleAmount, .. }
        ));
    }

    #[test]
    fn test_reviewer_amount() {
        let cfg = config().with_partial_payment(true);
        let (_, adj) = approved(
            adjudicate(&claim(5_000), &cfg, &wallet(20_000), Some(Money::from_minor(4_000))).unwrap(),
        );
        assert_eq!(adj.limit_applied, LimitApplied::ReviewerAmount);
        assert_eq!(adj.payable_amount, Money::from_minor(4_000));

        let too_much = adjudicate(&claim(5_000), &cfg, &wallet(20_000), Some(Money::from_minor(5_001)));
        assert!(matches!(too_much, Err(BenefitError::InvalidInput { .. })));
    }
}
