//! End-to-end claim lifecycles through the engine

use carewallet_sdk::*;
use chrono::NaiveDate;
use rust_decimal_macros::dec;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

struct World {
    engine: BenefitEngine,
    policy: PolicyId,
    wallet: Wallet,
    member: Actor,
    admin: Actor,
    reviewer: Actor,
    finance: Actor,
    ops: Actor,
}

async fn world(rules: impl FnOnce(PolicyId) -> EffectiveWalletConfig) -> World {
    let engine = BenefitEngine::local();
    let policy = PolicyId::new();
    engine
        .plans()
        .insert_draft(PlanVersion::draft(policy.clone(), 1, d(2025, 1, 1), None, rules(policy.clone())))
        .await
        .unwrap();
    engine.plans().publish(&policy, 1).await.unwrap();

    let member = Actor::member("Asha");
    let admin = Actor::tpa_admin("Tara");
    let reviewer = Actor::tpa_reviewer("Ravi");
    let ops = Actor::ops_admin("Omar");
    engine.register_actor(&admin);
    engine.register_actor(&reviewer);

    let wallet = engine
        .open_wallet(
            &ops,
            &member.id,
            vec![],
            &policy,
            PolicyPeriod::new(d(2025, 1, 1), d(2026, 1, 1)).unwrap(),
        )
        .await
        .unwrap();

    World {
        engine,
        policy,
        wallet,
        member,
        admin,
        reviewer,
        finance: Actor::finance("Fin"),
        ops,
    }
}

impl World {
    fn request(&self, category: CategoryId, bill: i64) -> ClaimRequest {
        ClaimRequest {
            patient_id: self.member.id.clone(),
            wallet_id: self.wallet.wallet_id.clone(),
            category,
            bill_amount: Money::from_minor(bill),
            treatment_date: d(2025, 4, 2),
            provider_name: "Sunrise Hospital".into(),
            documents: vec![DocumentRef::new("doc://invoice-1.pdf")],
        }
    }

    /// Submitted and assigned to the reviewer
    async fn assigned(&self, category: CategoryId, bill: i64) -> Claim {
        let claim = self
            .engine
            .submit_claim(&self.member, self.request(category, bill))
            .await
            .unwrap();
        self.engine
            .assign_claim(&self.admin, &claim.claim_id, &self.reviewer.id)
            .await
            .unwrap()
    }

    fn payment(&self, claim: &Claim, amount: i64) -> PaymentDetails {
        PaymentDetails {
            amount_paid: Money::from_minor(amount),
            payment_mode: "NEFT".into(),
            payment_reference: format!("UTR-{}", claim.claim_id),
            payment_date: d(2025, 4, 20),
            notes: None,
        }
    }

    async fn debits(&self) -> usize {
        self.engine
            .ledger()
            .transactions(&self.wallet.wallet_id)
            .await
            .iter()
            .filter(|t| t.transaction_type == TransactionType::Debit)
            .count()
    }
}

fn plan_with_limit(limit: i64) -> impl FnOnce(PolicyId) -> EffectiveWalletConfig {
    move |policy| {
        EffectiveWalletConfig::new(policy, 1, Money::from_minor(10_000))
            .with_per_claim_limit(Money::from_minor(limit))
    }
}

#[tokio::test]
async fn happy_path_pays_once() {
    let w = world(plan_with_limit(5_000)).await;
    let mut events = w.engine.subscribe();

    let claim = w.assigned(CategoryId::consultation(), 2_000).await;
    let claim = w
        .engine
        .review_claim(&w.reviewer, &claim.claim_id, Review::approve("Bills verified"))
        .await
        .unwrap();
    assert_eq!(claim.status, ClaimStatus::Approved);
    assert_eq!(claim.approved_amount, Some(Money::from_minor(2_000)));

    // Approval alone leaves the wallet untouched
    assert_eq!(w.engine.wallet(&w.wallet.wallet_id).await.unwrap().balance.current, Money::from_minor(10_000));

    let paid = w
        .engine
        .complete_payment(&w.finance, &claim.claim_id, w.payment(&claim, 2_000))
        .await
        .unwrap();
    assert_eq!(paid.status, ClaimStatus::PaymentCompleted);

    let again = w
        .engine
        .complete_payment(&w.finance, &claim.claim_id, w.payment(&claim, 2_000))
        .await
        .unwrap();
    assert_eq!(again, paid);

    let wallet = w.engine.wallet(&w.wallet.wallet_id).await.unwrap();
    assert_eq!(wallet.balance.current, Money::from_minor(8_000));
    assert_eq!(w.debits().await, 1);
    assert!(w.engine.ledger().verify(&w.wallet.wallet_id).await.unwrap());

    let mut saw_payment = false;
    while let Ok(event) = events.try_recv() {
        if let ClaimEvent::PaymentCompleted { amount, .. } = event {
            assert_eq!(amount, Money::from_minor(2_000));
            saw_payment = true;
        }
    }
    assert!(saw_payment);
}

#[tokio::test]
async fn payment_amount_must_match() {
    let w = world(plan_with_limit(5_000)).await;
    let claim = w.assigned(CategoryId::consultation(), 2_000).await;
    let claim = w
        .engine
        .review_claim(&w.reviewer, &claim.claim_id, Review::approve("ok"))
        .await
        .unwrap();

    for amount in [1_999, 2_001, 4_000] {
        let result = w
            .engine
            .complete_payment(&w.finance, &claim.claim_id, w.payment(&claim, amount))
            .await;
        assert!(matches!(result, Err(BenefitError::AmountMismatch { .. })));
    }
    assert_eq!(w.engine.claim(&claim.claim_id).await.unwrap(), claim);
    assert_eq!(w.debits().await, 0);
}

#[tokio::test]
async fn documents_loop() {
    let w = world(plan_with_limit(5_000)).await;
    let claim = w.assigned(CategoryId::diagnostics(), 3_000).await;

    for (cycle, doc) in ["discharge summary", "lab report"].into_iter().enumerate() {
        let requested = w
            .engine
            .request_documents(
                &w.reviewer,
                &claim.claim_id,
                vec![DocumentRequest {
                    document_type: doc.into(),
                    reason: "missing".into(),
                }],
            )
            .await
            .unwrap();
        assert_eq!(requested.status, ClaimStatus::DocumentsRequired);
        assert_eq!(requested.documents_requested.len(), cycle + 1);

        let resubmitted = w
            .engine
            .resubmit_documents(
                &w.member,
                &claim.claim_id,
                vec![DocumentRef::new(format!("doc://{}.pdf", cycle))],
            )
            .await
            .unwrap();
        assert_eq!(resubmitted.status, ClaimStatus::UnderReview);
    }

    let approved = w
        .engine
        .review_claim(&w.reviewer, &claim.claim_id, Review::approve("complete"))
        .await
        .unwrap();
    assert_eq!(approved.status, ClaimStatus::Approved);
    assert_eq!(approved.documents_requested.len(), 2);
    assert_eq!(approved.documents.len(), 3);
}

#[tokio::test]
async fn partial_approval_follows_plan() {
    for (partial, expected) in [(false, ClaimStatus::Rejected), (true, ClaimStatus::PartiallyApproved)] {
        let w = world(move |policy| {
            EffectiveWalletConfig::new(policy, 1, Money::from_minor(20_000))
                .with_category_limit(CategoryId::dental(), Money::from_minor(6_000))
                .with_partial_payment(partial)
        })
        .await;
        let claim = w.assigned(CategoryId::dental(), 10_000).await;
        let claim = w
            .engine
            .review_claim(&w.reviewer, &claim.claim_id, Review::approve("dental work"))
            .await
            .unwrap();
        assert_eq!(claim.status, expected);
        if partial {
            assert_eq!(claim.approved_amount, Some(Money::from_minor(6_000)));
            assert_eq!(claim.rejected_amount(), Money::from_minor(4_000));
        }
    }
}

#[tokio::test]
async fn copay_reduces_payable() {
    for copay in [Copay::percent(dec!(10)), Copay::amount(Money::from_minor(500))] {
        let w = world(move |policy| {
            EffectiveWalletConfig::new(policy, 1, Money::from_minor(20_000)).with_copay(copay)
        })
        .await;
        let claim = w.assigned(CategoryId::pharmacy(), 5_000).await;
        let claim = w
            .engine
            .review_claim(&w.reviewer, &claim.claim_id, Review::approve("ok"))
            .await
            .unwrap();
        assert_eq!(claim.approved_amount, Some(Money::from_minor(4_500)));
        let adjudication = claim.adjudication.unwrap();
        assert_eq!(adjudication.eligible_amount, Money::from_minor(5_000));
        assert_eq!(adjudication.copay_amount, Money::from_minor(500));
        assert_eq!(adjudication.policy_id, w.policy);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_never_overdraw() {
    let w = world(|policy| EffectiveWalletConfig::new(policy, 1, Money::from_minor(10_000))).await;
    let first = w.assigned(CategoryId::consultation(), 6_000).await;
    let second = w.assigned(CategoryId::consultation(), 6_000).await;

    // Approve both at once; each sees the full wallet
    let review = |claim: &Claim| {
        let engine = w.engine.clone();
        let reviewer = w.reviewer.clone();
        let id = claim.claim_id.clone();
        tokio::spawn(async move { engine.review_claim(&reviewer, &id, Review::approve("ok")).await })
    };
    let (a, b) = (review(&first), review(&second));
    let approved = [a.await.unwrap().unwrap(), b.await.unwrap().unwrap()];
    assert!(approved.iter().all(|c| c.status == ClaimStatus::Approved));

    let pay = |claim: &Claim| {
        let engine = w.engine.clone();
        let finance = w.finance.clone();
        let id = claim.claim_id.clone();
        let details = w.payment(claim, 6_000);
        tokio::spawn(async move { engine.complete_payment(&finance, &id, details).await })
    };
    let (a, b) = (pay(&approved[0]), pay(&approved[1]));
    let results = [a.await.unwrap(), b.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(BenefitError::InsufficientBalance { .. }))));

    let wallet = w.engine.wallet(&w.wallet.wallet_id).await.unwrap();
    assert_eq!(wallet.balance.current, Money::from_minor(4_000));
    assert_eq!(w.debits().await, 1);
    assert!(w.engine.ledger().verify(&w.wallet.wallet_id).await.unwrap());
}

#[tokio::test]
async fn carry_forward_into_next_period() {
    let w = world(|policy| {
        EffectiveWalletConfig::new(policy, 1, Money::from_minor(10_000))
            .with_carry_forward(CarryForward::enabled(dec!(100), 3))
    })
    .await;
    let claim = w.assigned(CategoryId::consultation(), 4_000).await;
    let claim = w
        .engine
        .review_claim(&w.reviewer, &claim.claim_id, Review::approve("ok"))
        .await
        .unwrap();
    w.engine
        .complete_payment(&w.finance, &claim.claim_id, w.payment(&claim, 4_000))
        .await
        .unwrap();

    let next_period = PolicyPeriod::new(d(2026, 1, 1), d(2027, 1, 1)).unwrap();
    let carried = w
        .engine
        .rollover_wallet(&w.ops, &w.wallet.wallet_id, next_period)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(carried.amount, Money::from_minor(6_000));

    let rerun = w
        .engine
        .rollover_wallet(&w.ops, &w.wallet.wallet_id, next_period)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rerun.transaction_id, carried.transaction_id);

    let usage = w.engine.analytics().wallet_utilisation(&carried.wallet_id).await.unwrap();
    assert_eq!(usage.allocated, Money::from_minor(16_000));
    assert_eq!(usage.carry_forward_credits, Money::from_minor(6_000));

    let prior = w.engine.wallet(&w.wallet.wallet_id).await.unwrap();
    assert_eq!(prior.status, WalletStatus::Archived);
}

#[tokio::test]
async fn analytics_after_lifecycle() {
    let w = world(plan_with_limit(5_000)).await;
    let paid = w.assigned(CategoryId::consultation(), 2_000).await;
    let paid = w
        .engine
        .review_claim(&w.reviewer, &paid.claim_id, Review::approve("ok"))
        .await
        .unwrap();
    w.engine
        .complete_payment(&w.finance, &paid.claim_id, w.payment(&paid, 2_000))
        .await
        .unwrap();
    let rejected = w.assigned(CategoryId::consultation(), 1_000).await;
    w.engine
        .review_claim(&w.reviewer, &rejected.claim_id, Review::reject("duplicate bill"))
        .await
        .unwrap();

    let summary = w.engine.analytics().claim_summary(TimeWindow::all()).await.unwrap();
    assert_eq!(summary.processed_claims, 2);
    assert_eq!(summary.approval_rate, dec!(50.0));
    assert_eq!(summary.total_rejected, Money::from_minor(1_000));

    let finance = w.engine.analytics().finance_summary(TimeWindow::all()).await.unwrap();
    assert_eq!(finance.total_paid, Money::from_minor(2_000));
    assert_eq!(finance.total_outstanding, Money::zero());

    let json = serde_json::to_string(&finance).unwrap();
    assert!(json.contains("\"total_paid\":2000"));
}

#[tokio::test]
async fn draft_is_edited_before_submission() {
    let w = world(|p| EffectiveWalletConfig::new(p, 1, Money::from_minor(10_000))).await;
    let mut request = w.request(CategoryId::pharmacy(), 1_200);
    request.documents.clear();
    let draft = w.engine.create_draft(&w.member, request.clone()).await.unwrap();
    let id = &draft.claim_id;

    let early = w.engine.submit_draft(&w.member, id).await;
    assert!(matches!(early, Err(BenefitError::InvalidInput { .. })));

    w.engine
        .add_documents(&w.member, id, vec![DocumentRef::new("doc://pharmacy.pdf")])
        .await
        .unwrap();
    w.engine
        .update_draft(
            &w.member,
            id,
            DraftUpdate {
                bill_amount: Some(Money::from_minor(1_450)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let submitted = w.engine.submit_draft(&w.member, id).await.unwrap();
    assert_eq!(submitted.status, ClaimStatus::Unassigned);
    assert_eq!(submitted.bill_amount, Money::from_minor(1_450));

    let abandoned = w.engine.create_draft(&w.member, request).await.unwrap();
    w.engine.delete_draft(&w.member, &abandoned.claim_id).await.unwrap();

    let own = w
        .engine
        .member_claims_summary(&w.member, &w.member.id)
        .await
        .unwrap();
    assert_eq!(own.total, 1);
    assert_eq!(own.submitted, 1);
    assert_eq!(own.draft, 0);
    assert_eq!(own.total_claimed, Money::from_minor(1_450));

    let by_ops = w.engine.member_claims_summary(&w.ops, &w.member.id).await.unwrap();
    assert_eq!(by_ops, own);
    let by_reviewer = w.engine.member_claims_summary(&w.reviewer, &w.member.id).await;
    assert!(matches!(by_reviewer, Err(BenefitError::Forbidden { .. })));
    let by_other = w
        .engine
        .member_claims_summary(&Actor::member("Other"), &w.member.id)
        .await;
    assert!(matches!(by_other, Err(BenefitError::Forbidden { .. })));
}
