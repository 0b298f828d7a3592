//! Rollover command - carry unused balance into the next policy period

use carewallet_sdk::*;
use chrono::{Days, Utc};
use rust_decimal::Decimal;

use super::{last_year, publish_plan, Cast};
use crate::display;

pub struct RolloverOptions {
    pub annual: i64,
    pub spent: i64,
    pub carry_percent: u32,
    pub carry_months: u32,
}

pub async fn run(engine: &BenefitEngine, options: RolloverOptions) -> anyhow::Result<()> {
    let currency = engine.config().currency.clone();
    let cast = Cast::enrol(engine);
    let period = last_year()?;

    display::stage(1, "Prior period");
    let policy = PolicyId::new();
    let rules = EffectiveWalletConfig::new(policy.clone(), 1, Money::from_major(options.annual)?)
        .with_partial_payment(true)
        .with_carry_forward(CarryForward::enabled(
            Decimal::from(options.carry_percent),
            options.carry_months,
        ));
    publish_plan(engine, &policy, period.start, rules).await?;

    let wallet = engine
        .open_wallet(&cast.ops, &cast.member.id, vec![], &policy, period)
        .await?;

    if options.spent > 0 {
        let treatment_date = period.start.checked_add_days(Days::new(90)).unwrap_or(period.start);
        let claim = engine
            .submit_claim(
                &cast.member,
                ClaimRequest {
                    patient_id: cast.member.id.clone(),
                    wallet_id: wallet.wallet_id.clone(),
                    category: CategoryId::pharmacy(),
                    bill_amount: Money::from_major(options.spent)?,
                    treatment_date,
                    provider_name: "Apollo Pharmacy".into(),
                    documents: vec![DocumentRef::new("doc://pharmacy-bill.pdf")],
                },
            )
            .await?;
        engine.assign_claim(&cast.admin, &claim.claim_id, &cast.admin.id).await?;
        let claim = engine
            .review_claim(&cast.admin, &claim.claim_id, Review::approve("Pharmacy bill verified"))
            .await?;
        if let Some(approved) = claim.approved_amount {
            engine
                .complete_payment(
                    &cast.finance,
                    &claim.claim_id,
                    PaymentDetails {
                        amount_paid: approved,
                        payment_mode: "NEFT".into(),
                        payment_reference: format!("UTR{}", claim.claim_id.compact()),
                        payment_date: treatment_date,
                        notes: None,
                    },
                )
                .await?;
            display::outcome(true, &format!("Paid a claim of {}", display::money(approved, &currency)));
        }
    }
    display::wallet(&engine.wallet(&wallet.wallet_id).await?, &currency);

    display::stage(2, "Rollover");
    let next_period = period.next()?;
    match engine.rollover_wallet(&cast.ops, &wallet.wallet_id, next_period).await? {
        Some(txn) => {
            display::outcome(true, &format!("Carried {} forward", display::money(txn.amount, &currency)));
            if let TransactionReason::CarryForward { valid_until, .. } = &txn.reason {
                display::field("valid until", &valid_until.to_string());
            }

            let usage = engine.analytics().wallet_utilisation(&txn.wallet_id).await?;
            display::field("allocation", &display::money(usage.allocation_credits, &currency));
            display::field("carried forward", &display::money(usage.carry_forward_credits, &currency));
            display::wallet(&engine.wallet(&txn.wallet_id).await?, &currency);

            let today = Utc::now().date_naive();
            if let Some(expiry) = engine.ledger().expire_carry_forward(&txn.wallet_id, today).await? {
                display::note(&format!(
                    "Carry-forward window closed; expired {}",
                    display::money(expiry.amount, &currency)
                ));
            }
        }
        None => display::note("Nothing to carry forward"),
    }

    let prior = engine.wallet(&wallet.wallet_id).await?;
    display::note(&format!("Prior wallet is now {:?}", prior.status));
    Ok(())
}
