//! Effective wallet configuration
//!
//! The immutable rule set produced by resolving a policy's plan version for a
//! date. Approvals record the `(policy_id, plan_version)` they were computed
//! under so they stay reproducible after newer versions go live.

use std::collections::BTreeMap;

use crate::{BenefitError, CategoryId, Money, PolicyId, Result, Rounding};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Default carry-forward percent when enabled without one
pub const DEFAULT_CARRY_FORWARD_PERCENT: u32 = 100;

/// Default carry-forward window in months when enabled without one
pub const DEFAULT_CARRY_FORWARD_MONTHS: u32 = 3;

/// How the member's share is computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CopayMode {
    /// `value` percent of the eligible amount
    Percent,
    /// `value` in minor units, flat
    Amount,
}

/// Copay rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Copay {
    pub mode: CopayMode,
    pub value: Decimal,
}

impl Copay {
    pub fn percent(value: Decimal) -> Self {
        Self {
            mode: CopayMode::Percent,
            value,
        }
    }

    pub fn amount(value: Money) -> Self {
        Self {
            mode: CopayMode::Amount,
            value: Decimal::from(value.minor()),
        }
    }

    /// Member's share of `eligible`, never more than `eligible` itself.
    ///
    /// Percent copay rounds half up.
    pub fn member_share(&self, eligible: Money) -> Result<Money> {
        let share = match self.mode {
            CopayMode::Percent => eligible.percent(self.value, Rounding::HalfUp)?,
            CopayMode::Amount => self
                .value
                .trunc()
                .to_i64()
                .map(Money::from_minor)
                .ok_or(BenefitError::AmountOverflow)?,
        };
        Ok(share.min(eligible).max(Money::zero()))
    }
}

/// Carry-forward rule applied at period rollover
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarryForward {
    pub enabled: bool,
    pub percent: Decimal,
    pub months: u32,
}

impl CarryForward {
    pub fn enabled(percent: Decimal, months: u32) -> Self {
        Self {
            enabled: true,
            percent,
            months,
        }
    }

    /// Fill in defaults for an enabled rule missing percent or months
    pub fn with_defaults(mut self) -> Self {
        if self.enabled {
            if self.percent.is_zero() {
                self.percent = Decimal::from(DEFAULT_CARRY_FORWARD_PERCENT);
            }
            if self.months == 0 {
                self.months = DEFAULT_CARRY_FORWARD_MONTHS;
            }
        }
        self
    }
}

/// Immutable wallet rules for one policy plan version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveWalletConfig {
    /// Policy these rules belong to
    pub policy_id: PolicyId,
    /// Plan version that produced them
    pub plan_version: u32,
    /// Annual wallet allocation
    pub total_annual_amount: Money,
    /// Cap on any single claim
    pub per_claim_limit: Option<Money>,
    /// Per-claim cap by category
    pub category_limits: BTreeMap<CategoryId, Money>,
    /// Annual sub-limit by category; seeds `Wallet::categories`
    pub category_allocations: BTreeMap<CategoryId, Money>,
    pub copay: Option<Copay>,
    pub partial_payment_enabled: bool,
    pub carry_forward: Option<CarryForward>,
    pub top_up_allowed: bool,
}

impl EffectiveWalletConfig {
    /// Minimal config with just an annual amount
    pub fn new(policy_id: PolicyId, plan_version: u32, total_annual_amount: Money) -> Self {
        Self {
            policy_id,
            plan_version,
            total_annual_amount,
            per_claim_limit: None,
            category_limits: BTreeMap::new(),
            category_allocations: BTreeMap::new(),
            copay: None,
            partial_payment_enabled: false,
            carry_forward: None,
            top_up_allowed: false,
        }
    }

    pub fn with_per_claim_limit(mut self, limit: Money) -> Self {
        self.per_claim_limit = Some(limit);
        self
    }

    pub fn with_category_limit(mut self, category: CategoryId, limit: Money) -> Self {
        self.category_limits.insert(category, limit);
        self
    }

    pub fn with_category_allocation(mut self, category: CategoryId, total: Money) -> Self {
        self.category_allocations.insert(category, total);
        self
    }

    pub fn with_copay(mut self, copay: Copay) -> Self {
        self.copay = Some(copay);
        self
    }

    pub fn with_partial_payment(mut self, enabled: bool) -> Self {
        self.partial_payment_enabled = enabled;
        self
    }

    pub fn with_carry_forward(mut self, rule: CarryForward) -> Self {
        self.carry_forward = Some(rule);
        self
    }

    pub fn with_top_up(mut self, allowed: bool) -> Self {
        self.top_up_allowed = allowed;
        self
    }

    /// Active carry-forward rule, if any
    pub fn active_carry_forward(&self) -> Option<CarryForward> {
        self.carry_forward
            .filter(|cf| cf.enabled)
            .map(CarryForward::with_defaults)
    }

    /// Check the rule set is internally consistent
    pub fn validate(&self) -> Result<()> {
        if self.total_annual_amount.is_negative() {
            return Err(BenefitError::invalid_input(
                "total_annual_amount",
                "must not be negative",
            ));
        }
        if let Some(limit) = self.per_claim_limit {
            if limit.is_negative() {
                return Err(BenefitError::invalid_input("per_claim_limit", "must not be negative"));
            }
        }
        for (category, amount) in self.category_limits.iter().chain(&self.category_allocations) {
            if amount.is_negative() {
                return Err(BenefitError::invalid_input(
                    format!("category[{}]", category),
                    "must not be negative",
                ));
            }
        }
        if let Some(copay) = self.copay {
            if copay.value.is_sign_negative() {
                return Err(BenefitError::invalid_input("copay.value", "must not be negative"));
            }
            if copay.mode == CopayMode::Percent && copay.value > Decimal::ONE_HUNDRED {
                return Err(BenefitError::invalid_input(
                    "copay.value",
                    "copay percentage cannot exceed 100%",
                ));
            }
        }
        if let Some(cf) = self.carry_forward {
            if cf.percent.is_sign_negative() || cf.percent > Decimal::ONE_HUNDRED {
                return Err(BenefitError::invalid_input(
                    "carry_forward.percent",
                    "must be between 0 and 100",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_copay_percent_over_100_rejected() {
        let cfg = EffectiveWalletConfig::new(PolicyId::new(), 1, Money::from_minor(10_000))
            .with_copay(Copay::percent(dec!(120)));
        assert!(matches!(cfg.validate(), Err(BenefitError::InvalidInput { .. })));
    }

    #[test]
    fn test_copay_share() {
        let eligible = Money::from_minor(5_000);
        assert_eq!(
            Copay::percent(dec!(10)).member_share(eligible).unwrap(),
            Money::from_minor(500)
        );
        assert_eq!(
            Copay::amount(Money::from_minor(500)).member_share(eligible).unwrap(),
            Money::from_minor(500)
        );
        // A flat copay larger than the eligible amount takes all of it
        assert_eq!(
            Copay::amount(Money::from_minor(9_000)).member_share(eligible).unwrap(),
            eligible
        );
    }

    #[test]
    fn test_carry_forward_defaults() {
        let cfg = EffectiveWalletConfig::new(PolicyId::new(), 1, Money::from_minor(10_000))
            .with_carry_forward(CarryForward::enabled(Decimal::ZERO, 0));
        let cf = cfg.active_carry_forward().unwrap();
        assert_eq!(cf.percent, dec!(100));
        assert_eq!(cf.months, 3);

        let disabled = EffectiveWalletConfig::new(PolicyId::new(), 1, Money::zero())
            .with_carry_forward(CarryForward {
                enabled: false,
                percent: dec!(50),
                months: 6,
            });
        assert!(disabled.active_carry_forward().is_none());
    }
}
