//! Demo command - one family claim from submission to payment

use carewallet_sdk::*;
use chrono::Days;
use rust_decimal::Decimal;

use super::{last_year, publish_plan, Cast};
use crate::display;

pub struct DemoOptions {
    pub annual: i64,
    pub per_claim_limit: i64,
    pub bill: i64,
    pub copay_percent: Option<u32>,
    pub partial: bool,
    pub json: bool,
}

pub async fn run(engine: &BenefitEngine, options: DemoOptions) -> anyhow::Result<()> {
    let currency = engine.config().currency.clone();
    let cast = Cast::enrol(engine);
    let mut events = engine.subscribe();
    let period = last_year()?;

    display::stage(1, "Plan and wallet");
    let policy = PolicyId::new();
    let mut rules = EffectiveWalletConfig::new(policy.clone(), 1, Money::from_major(options.annual)?)
        .with_per_claim_limit(Money::from_major(options.per_claim_limit)?)
        .with_partial_payment(options.partial);
    if let Some(percent) = options.copay_percent {
        rules = rules.with_copay(Copay::percent(Decimal::from(percent)));
    }
    publish_plan(engine, &policy, period.start, rules).await?;
    display::outcome(true, &format!("Published plan v1 for {}", policy));

    let wallet = engine
        .open_wallet(
            &cast.ops,
            &cast.member.id,
            vec![cast.dependent.id.clone()],
            &policy,
            period,
        )
        .await?;
    display::outcome(true, &format!("Opened family wallet for {} and {}", cast.member.name, cast.dependent.name));
    display::wallet(&wallet, &currency);

    display::stage(2, "Claim submission and review");
    let treatment_date = period
        .start
        .checked_add_days(Days::new(40))
        .unwrap_or(period.start);
    let claim = engine
        .submit_claim(
            &cast.member,
            ClaimRequest {
                patient_id: cast.dependent.id.clone(),
                wallet_id: wallet.wallet_id.clone(),
                category: CategoryId::consultation(),
                bill_amount: Money::from_major(options.bill)?,
                treatment_date,
                provider_name: "Sunrise Hospital".into(),
                documents: vec![DocumentRef::new("doc://invoice.pdf")],
            },
        )
        .await?;
    display::outcome(true, &format!("{} filed a claim for {}", cast.member.name, cast.dependent.name));

    engine
        .assign_claim(&cast.admin, &claim.claim_id, &cast.reviewer.id)
        .await?;
    display::note(&format!("Assigned to {}", cast.reviewer.name));

    engine
        .request_documents(
            &cast.reviewer,
            &claim.claim_id,
            vec![DocumentRequest {
                document_type: "prescription".into(),
                reason: "consultation bill without prescription".into(),
            }],
        )
        .await?;
    display::note("Reviewer requested a prescription");

    engine
        .resubmit_documents(&cast.member, &claim.claim_id, vec![DocumentRef::new("doc://prescription.pdf")])
        .await?;
    display::note("Member resubmitted documents");

    let claim = engine
        .review_claim(&cast.reviewer, &claim.claim_id, Review::approve("Bills and prescription verified"))
        .await?;
    match claim.approved_amount {
        Some(_) => display::outcome(true, &format!("Review outcome {:?}", claim.status)),
        None => display::outcome(false, &format!("Review outcome {:?}", claim.status)),
    }
    display::claim(&claim, &currency);

    if let Some(approved) = claim.approved_amount {
        display::stage(3, "Payment");
        let details = PaymentDetails {
            amount_paid: approved,
            payment_mode: "NEFT".into(),
            payment_reference: format!("UTR{}", claim.claim_id.compact()),
            payment_date: treatment_date
                .checked_add_days(Days::new(14))
                .unwrap_or(treatment_date),
            notes: None,
        };
        let paid = engine
            .complete_payment(&cast.finance, &claim.claim_id, details.clone())
            .await?;
        display::outcome(true, &format!("Paid {}", display::money(approved, &currency)));

        let repeat = engine
            .complete_payment(&cast.finance, &claim.claim_id, details)
            .await?;
        if repeat == paid {
            display::note("Repeated payment call was a no-op");
        }

        let wallet = engine.wallet(&wallet.wallet_id).await?;
        display::wallet(&wallet, &currency);
        if engine.ledger().verify(&wallet.wallet_id).await? {
            display::outcome(true, "Ledger replay matches the live balance");
        } else {
            display::outcome(false, "Ledger replay does not match the live balance");
        }
    }

    display::stage(4, "Events");
    while let Ok(event) = events.try_recv() {
        display::event(&event);
    }

    display::stage(5, "Analytics");
    let summary = engine.analytics().claim_summary(TimeWindow::all()).await?;
    let finance = engine.analytics().finance_summary(TimeWindow::all()).await?;
    if options.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        println!("{}", serde_json::to_string_pretty(&finance)?);
    } else {
        display::field("claims", &summary.total_claims.to_string());
        display::field("approval rate", &format!("{}%", summary.approval_rate));
        display::field("claimed", &display::money(summary.total_claimed, &currency));
        display::field("approved", &display::money(summary.total_approved, &currency));
        display::field("paid", &display::money(finance.total_paid, &currency));
    }

    Ok(())
}
