//! Period rollover and carry-forward expiry
//!
//! Rollover runs as a batch, one wallet at a time, and is idempotent per
//! target period: the CarryForward credit tagged with the period is the marker.

use chrono::{Months, NaiveDate};
use tracing::{debug, info};

use crate::WalletLedger;
use carewallet_types::*;

impl WalletLedger {
    /// Roll `prior_id` into `next_period`.
    ///
    /// Opens the next-period wallet (or reuses it), credits
    /// `min(current, allocated) * percent` rounded down, and archives the
    /// prior wallet. Returns `None` when nothing is carried.
    pub async fn rollover(
        &self,
        prior_id: &WalletId,
        next_period: PolicyPeriod,
    ) -> Result<Option<LedgerTransaction>> {
        // The prior lock serializes concurrent rollovers of the same wallet
        let mut prior = self.lock(prior_id).await?;
        if next_period.start < prior.period.end {
            return Err(BenefitError::invalid_input(
                "next_period",
                format!(
                    "starts {} before the prior period ends {}",
                    next_period.start, prior.period.end
                ),
            ));
        }

        let next_id = match self.wallet_for(&prior.owner_user_id, &prior.policy_id, &next_period) {
            Some(id) => id,
            None => {
                self.open_wallet(
                    prior.owner_user_id.clone(),
                    prior.members.clone(),
                    prior.policy_id.clone(),
                    next_period,
                )
                .await?
                .wallet_id
            }
        };

        if let Some(existing) = self
            .find(|t| {
                t.wallet_id == next_id
                    && matches!(
                        &t.reason,
                        TransactionReason::CarryForward { period, source_wallet, .. }
                            if *period == next_period && source_wallet == prior_id
                    )
            })
            .await
        {
            debug!(wallet_id = %prior_id, period_start = %next_period.start, "rollover already applied");
            prior.status = WalletStatus::Archived;
            return Ok(Some(existing));
        }

        let last_day = prior.period.end.pred_opt().unwrap_or(prior.period.start);
        let config = self.resolver.resolve(&prior.policy_id, last_day).await?;

        let carried = match config.active_carry_forward() {
            Some(rule) => {
                let base = prior.balance.current.min(prior.balance.allocated);
                let amount = base.percent(rule.percent, Rounding::Down)?;
                Some((amount, rule.months)).filter(|(amount, _)| amount.is_positive())
            }
            None => None,
        };

        let txn = match carried {
            Some((amount, months)) => {
                let valid_until = next_period
                    .start
                    .checked_add_months(Months::new(months))
                    .unwrap_or(next_period.end);
                let mut next = self.lock(&next_id).await?;
                crate::ensure_active(&next)?;
                let txn = self
                    .append(
                        &mut next,
                        TransactionType::Credit,
                        amount,
                        None,
                        None,
                        TransactionReason::CarryForward {
                            period: next_period,
                            source_wallet: prior_id.clone(),
                            valid_until,
                        },
                    )
                    .await?;
                info!(
                    from = %prior_id,
                    to = %next_id,
                    amount = %amount,
                    %valid_until,
                    "balance carried forward"
                );
                Some(txn)
            }
            None => {
                info!(from = %prior_id, to = %next_id, "nothing to carry forward");
                None
            }
        };

        prior.status = WalletStatus::Archived;
        Ok(txn)
    }

    /// Remove the unused part of a carried balance once its window closes.
    ///
    /// The unused part is `carried - consumed`, floored at zero and capped at
    /// the current balance. Idempotent per period.
    pub async fn expire_carry_forward(
        &self,
        wallet_id: &WalletId,
        today: NaiveDate,
    ) -> Result<Option<LedgerTransaction>> {
        let mut wallet = self.lock(wallet_id).await?;
        let txns = self.transactions(wallet_id).await;

        let Some((carried, period, valid_until)) = txns.iter().find_map(|t| match &t.reason {
            TransactionReason::CarryForward { period, valid_until, .. } => {
                Some((t.amount, *period, *valid_until))
            }
            _ => None,
        }) else {
            return Ok(None);
        };

        if today < valid_until {
            return Ok(None);
        }
        if let Some(existing) = txns.iter().find(|t| {
            matches!(&t.reason, TransactionReason::CarryForwardExpiry { period: p } if *p == period)
        }) {
            return Ok(Some(existing.clone()));
        }

        let unused = carried
            .saturating_sub(wallet.balance.consumed)
            .min(wallet.balance.current.max(Money::zero()));
        if !unused.is_positive() {
            return Ok(None);
        }

        let txn = self
            .append(
                &mut wallet,
                TransactionType::Adjustment,
                unused,
                None,
                None,
                TransactionReason::CarryForwardExpiry { period },
            )
            .await?;
        info!(wallet_id = %wallet_id, expired = %unused, %valid_until, "carried balance expired");
        Ok(Some(txn))
    }
}

#[cfg(test)]
mod tests {
    use crate::tests::{d, fixture};
    use carewallet_types::*;
    use rust_decimal_macros::dec;

    fn next_period() -> PolicyPeriod {
        PolicyPeriod::new(d(2026, 4, 1), d(2027, 4, 1)).unwrap()
    }

    #[tokio::test]
    async fn test_rollover_carries_rounded_down_share() {
        let (ledger, wallet) =
            fixture(|c| c.with_carry_forward(CarryForward::enabled(dec!(33), 3))).await;
        ledger
            .debit(&wallet.wallet_id, &ClaimId::new(), Money::from_minor(3_999), None)
            .await
            .unwrap();

        let txn = ledger
            .rollover(&wallet.wallet_id, next_period())
            .await
            .unwrap()
            .unwrap();

        // 33% of 6001 = 1980.33
        assert_eq!(txn.amount, Money::from_minor(1_980));
        assert_eq!(txn.transaction_type, TransactionType::Credit);
        assert!(txn.is_carry_forward());
        match &txn.reason {
            TransactionReason::CarryForward { valid_until, source_wallet, .. } => {
                assert_eq!(*valid_until, d(2026, 7, 1));
                assert_eq!(source_wallet, &wallet.wallet_id);
            }
            other => panic!("unexpected reason {:?}", other),
        }

        let next = ledger.wallet(&txn.wallet_id).await.unwrap();
        assert_eq!(next.balance.allocated, Money::from_minor(10_000 + 1_980));
        assert_eq!(next.members, wallet.members);

        let prior = ledger.wallet(&wallet.wallet_id).await.unwrap();
        assert_eq!(prior.status, WalletStatus::Archived);
        assert_eq!(prior.balance.current, Money::from_minor(6_001));
    }

    #[tokio::test]
    async fn test_rollover_is_idempotent_per_period() {
        let (ledger, wallet) =
            fixture(|c| c.with_carry_forward(CarryForward::enabled(dec!(100), 3))).await;

        let first = ledger.rollover(&wallet.wallet_id, next_period()).await.unwrap();
        let second = ledger.rollover(&wallet.wallet_id, next_period()).await.unwrap();
        assert_eq!(first, second);

        let next_id = first.unwrap().wallet_id;
        let credits = ledger
            .transactions(&next_id)
            .await
            .into_iter()
            .filter(|t| t.is_carry_forward())
            .count();
        assert_eq!(credits, 1);
    }

    #[tokio::test]
    async fn test_rollover_without_rule_carries_nothing() {
        let (ledger, wallet) = fixture(|c| c).await;

        let result = ledger.rollover(&wallet.wallet_id, next_period()).await.unwrap();
        assert!(result.is_none());
        assert_eq!(
            ledger.wallet(&wallet.wallet_id).await.unwrap().status,
            WalletStatus::Archived
        );
        let next_id = ledger
            .wallet_for(&wallet.owner_user_id, &wallet.policy_id, &next_period())
            .unwrap();
        assert_eq!(
            ledger.wallet(&next_id).await.unwrap().balance.current,
            Money::from_minor(10_000)
        );
    }

    #[tokio::test]
    async fn test_rollover_rejects_overlapping_period() {
        let (ledger, wallet) = fixture(|c| c).await;
        let overlapping = PolicyPeriod::new(d(2026, 1, 1), d(2027, 1, 1)).unwrap();
        let result = ledger.rollover(&wallet.wallet_id, overlapping).await;
        assert!(matches!(result, Err(BenefitError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn test_expire_removes_unused_carried_balance() {
        let (ledger, wallet) =
            fixture(|c| c.with_carry_forward(CarryForward::enabled(dec!(50), 3))).await;
        let carried = ledger
            .rollover(&wallet.wallet_id, next_period())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(carried.amount, Money::from_minor(5_000));
        let next_id = carried.wallet_id.clone();

        ledger
            .debit(&next_id, &ClaimId::new(), Money::from_minor(1_200), None)
            .await
            .unwrap();

        // Window still open
        assert!(ledger.expire_carry_forward(&next_id, d(2026, 6, 30)).await.unwrap().is_none());

        let expiry = ledger
            .expire_carry_forward(&next_id, d(2026, 7, 1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(expiry.transaction_type, TransactionType::Adjustment);
        assert_eq!(expiry.amount, Money::from_minor(3_800));

        let again = ledger.expire_carry_forward(&next_id, d(2026, 8, 1)).await.unwrap();
        assert_eq!(again, Some(expiry));

        let next = ledger.wallet(&next_id).await.unwrap();
        assert_eq!(next.balance.allocated, Money::from_minor(15_000 - 3_800));
        assert_eq!(next.balance.current, Money::from_minor(10_000));
        assert!(ledger.verify(&next_id).await.unwrap());
    }
}
