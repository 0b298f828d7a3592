//! CLI commands

pub mod demo;
pub mod rollover;

use carewallet_sdk::*;
use chrono::{Datelike, NaiveDate, Utc};

/// Cast of actors used by the demos
pub struct Cast {
    pub member: Actor,
    pub dependent: Actor,
    pub admin: Actor,
    pub reviewer: Actor,
    pub finance: Actor,
    pub ops: Actor,
}

impl Cast {
    pub fn enrol(engine: &BenefitEngine) -> Self {
        let cast = Self {
            member: Actor::member("Asha Rao"),
            dependent: Actor::member("Kiran Rao"),
            admin: Actor::tpa_admin("Tara (TPA admin)"),
            reviewer: Actor::tpa_reviewer("Ravi (TPA reviewer)"),
            finance: Actor::finance("Farah (finance)"),
            ops: Actor::ops_admin("Omar (ops)"),
        };
        engine.register_actor(&cast.admin);
        engine.register_actor(&cast.reviewer);
        cast
    }
}

/// The calendar year before the current one, so treatment dates are never in the future
pub fn last_year() -> anyhow::Result<PolicyPeriod> {
    let year = Utc::now().year() - 1;
    let start = NaiveDate::from_ymd_opt(year, 1, 1)
        .ok_or_else(|| anyhow::anyhow!("invalid year {}", year))?;
    let end = NaiveDate::from_ymd_opt(year + 1, 1, 1)
        .ok_or_else(|| anyhow::anyhow!("invalid year {}", year + 1))?;
    Ok(PolicyPeriod::new(start, end)?)
}

/// Publish version 1 of a plan effective from `from`
pub async fn publish_plan(
    engine: &BenefitEngine,
    policy: &PolicyId,
    from: NaiveDate,
    rules: EffectiveWalletConfig,
) -> anyhow::Result<()> {
    engine
        .plans()
        .insert_draft(PlanVersion::draft(policy.clone(), 1, from, None, rules))
        .await?;
    engine.plans().publish(policy, 1).await?;
    Ok(())
}
