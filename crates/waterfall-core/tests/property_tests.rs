use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use waterfall_core::config::variant::{FeeClass, FeeSpec};
use waterfall_core::deal::tranche::CouponTerms;
use waterfall_core::sequence::step::StepDirective;
use waterfall_core::{
    DealState, FeatureFlags, PaymentStep, PeriodInputs, TestType, Tranche, TriggerContext, TriggerResult, VariantConfiguration,
    WaterfallEngine,
};

/// A generated period: amounts in whole currency units, per-tranche test outcomes.
#[derive(Debug, Clone)]
struct Scenario {
    collection: u64,
    carried: u64,
    fee: u64,
    incentive: u64,
    interest: [u64; 3],
    balances: [u64; 3],
    oc_ratio: [u32; 3],
    cures: [u64; 3],
    variant: &'static str,
    extra: FeatureFlags,
    layout: Option<LayoutShape>,
    performance: u32,
}

/// Shape of a generated custom priority of payments. Every debt tranche
/// keeps its interest step; the rest varies.
#[derive(Debug, Clone)]
struct LayoutShape {
    principal: [bool; 3],
    interleave_principal: bool,
    incentive: bool,
    deferred_interest: bool,
    escrow_hold: bool,
}

fn arb_variant() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![
        "traditional",
        "turbo",
        "pik_toggle",
        "claw_back",
        "fee_deferral",
        "performance_tiered",
        "distribution_stopper",
    ])
}

fn arb_flags() -> impl Strategy<Value = FeatureFlags> {
    prop::array::uniform7(any::<bool>()).prop_map(|f| FeatureFlags {
        turbo: f[0],
        pik_toggle: f[1],
        claw_back: f[2],
        call_protection: f[3],
        fee_deferral: f[4],
        fee_sharing: f[5],
        distribution_stopper: f[6],
    })
}

fn arb_layout() -> impl Strategy<Value = Option<LayoutShape>> {
    prop::option::of(
        (prop::array::uniform3(any::<bool>()), any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>()).prop_map(
            |(principal, interleave_principal, incentive, deferred_interest, escrow_hold)| LayoutShape {
                principal,
                interleave_principal,
                incentive,
                deferred_interest,
                escrow_hold,
            },
        ),
    )
}

fn arb_scenario() -> impl Strategy<Value = Scenario> {
    (
        (0u64..5_000, 0u64..200, 0u64..100, 0u64..100),
        prop::array::uniform3(0u64..400),
        prop::array::uniform3(0u64..2_000),
        prop::array::uniform3(90u32..150),
        prop::array::uniform3(0u64..300),
        (arb_variant(), arb_flags(), arb_layout()),
        0u32..20,
    )
        .prop_map(
            |(
                (collection, carried, fee, incentive),
                interest,
                balances,
                oc_ratio,
                cures,
                (variant, extra, layout),
                performance,
            )| {
                Scenario {
                    collection,
                    carried,
                    fee,
                    incentive,
                    interest,
                    balances,
                    oc_ratio,
                    cures,
                    variant,
                    extra,
                    layout,
                    performance,
                }
            },
        )
}

fn custom_layout(shape: &LayoutShape) -> Vec<PaymentStep> {
    let principal = |i: usize| PaymentStep::Principal { tranche: IDS[i].to_string() };
    let mut steps = vec![PaymentStep::Fee { name: "trustee".into(), class: FeeClass::Senior }];
    for (i, id) in IDS.iter().enumerate() {
        steps.push(PaymentStep::Interest { tranche: id.to_string() });
        if shape.interleave_principal && shape.principal[i] {
            steps.push(principal(i));
        }
    }
    if !shape.interleave_principal {
        steps.extend((0..IDS.len()).filter(|i| shape.principal[*i]).map(principal));
    }
    if shape.incentive {
        steps.push(PaymentStep::Fee { name: "incentive".into(), class: FeeClass::Incentive });
    }
    if shape.deferred_interest {
        steps.push(PaymentStep::DeferredInterest { tranche: "C".into() });
    }
    if shape.escrow_hold {
        steps.push(PaymentStep::EscrowHold);
    }
    steps.push(PaymentStep::ResidualEquity);
    steps
}

const IDS: [&str; 3] = ["A", "B", "C"];

fn deal(s: &Scenario) -> DealState {
    let mut tranches: Vec<Tranche> = IDS
        .iter()
        .enumerate()
        .map(|(i, id)| Tranche {
            id: id.to_string(),
            original_balance: Decimal::from(s.balances[i]),
            current_balance: Decimal::from(s.balances[i]),
            deferred_balance: Decimal::ZERO,
            coupon: CouponTerms::None,
            priority: i as u32 + 1,
            is_equity: false,
            pik_eligible: i == 2,
        })
        .collect();
    tranches.push(Tranche {
        id: "Equity".into(),
        original_balance: Decimal::from(100),
        current_balance: Decimal::from(100),
        deferred_balance: Decimal::ZERO,
        coupon: CouponTerms::None,
        priority: 4,
        is_equity: true,
        pik_eligible: false,
    });
    DealState {
        deal_id: "PROP".into(),
        period: 0,
        tranches,
        reserve_balance: Decimal::ZERO,
        escrow_balance: Decimal::from(50),
        carried_cash: Decimal::from(s.carried),
        deferred_fees: BTreeMap::new(),
        last_payment_date: None,
    }
}

fn config(s: &Scenario) -> VariantConfiguration {
    let mut cfg = VariantConfiguration::new("PROP", s.variant, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
    cfg.fees = vec![
        FeeSpec { name: "trustee".into(), class: FeeClass::Senior },
        FeeSpec { name: "incentive".into(), class: FeeClass::Incentive },
    ];
    cfg.reserve_account = true;
    cfg.parameters.turbo_threshold = Some(Decimal::new(125, 2));
    cfg.parameters.hurdle_rate = Some(Decimal::new(8, 2));
    cfg.parameters.holdback_pct = Some(Decimal::new(50, 2));
    cfg.parameters.min_equity_performance = Some(Decimal::new(10, 2));
    cfg.parameters.fee_share_pct = Some(Decimal::new(333, 3));
    cfg.parameters.stopper_threshold = Some(Decimal::new(5, 2));
    cfg.parameters.pik_on_ic_failure = Some(true);
    cfg.parameters.non_call_end = NaiveDate::from_ymd_opt(2025, 7, 1);
    cfg.flags = s.extra;
    cfg.custom_sequence = s.layout.as_ref().map(custom_layout);
    cfg
}

fn inputs(s: &Scenario) -> PeriodInputs {
    let threshold = Decimal::new(110, 2);
    let mut results = Vec::new();
    for (i, id) in IDS.iter().enumerate() {
        let ratio = Decimal::new(s.oc_ratio[i] as i64, 2);
        let passed = ratio >= threshold;
        results.push(TriggerResult {
            tranche: id.to_string(),
            test: TestType::Overcollateralization,
            ratio,
            threshold,
            passed,
            cure_amount: if passed { Decimal::ZERO } else { Decimal::from(s.cures[i]) },
        });
    }
    PeriodInputs {
        period: 1,
        payment_date: NaiveDate::from_ymd_opt(2025, 4, 15).unwrap(),
        collection_amount: Decimal::from(s.collection),
        fee_amounts: BTreeMap::from([
            ("trustee".to_string(), Decimal::from(s.fee)),
            ("incentive".to_string(), Decimal::from(s.incentive)),
        ]),
        interest_due: IDS
            .iter()
            .enumerate()
            .map(|(i, id)| (id.to_string(), Decimal::from(s.interest[i])))
            .collect(),
        principal_targets: BTreeMap::new(),
        reserve_target: Decimal::from(150),
        triggers: TriggerContext::new(results),
        equity_performance: Some(Decimal::new(s.performance as i64, 2)),
        pik_elections: BTreeSet::new(),
        call_override: false,
    }
}

proptest! {
    // ===================================================================
    // Conservation: every unit of the register is accounted for and the
    // terminal step leaves nothing behind.
    // ===================================================================
    #[test]
    fn cash_is_conserved(s in arb_scenario()) {
        let exec = WaterfallEngine::default().run_waterfall(&deal(&s), &config(&s), &inputs(&s)).unwrap();
        prop_assert_eq!(exec.total_paid() + exec.ending_remaining(), exec.beginning_remaining());
        prop_assert_eq!(exec.beginning_remaining(), Decimal::from(s.collection + s.carried));
        prop_assert_eq!(exec.ending_remaining(), Decimal::ZERO);
        for r in exec.records() {
            prop_assert!(r.amount_paid >= Decimal::ZERO);
            prop_assert!(r.amount_paid <= r.amount_due);
        }
    }

    // ===================================================================
    // Completeness: one record per sequenced step, in sequence order.
    // ===================================================================
    #[test]
    fn every_step_has_a_record(s in arb_scenario()) {
        let engine = WaterfallEngine::default();
        let (d, c, i) = (deal(&s), config(&s), inputs(&s));
        let steps = engine.preview_sequence(&d, &c, &i).unwrap();
        let exec = engine.run_waterfall(&d, &c, &i).unwrap();
        prop_assert_eq!(exec.records().len(), steps.len());
        for (record, step) in exec.records().iter().zip(&steps) {
            prop_assert_eq!(&record.step, &step.step);
        }
    }

    // ===================================================================
    // Idempotence: identical inputs give an identical execution.
    // ===================================================================
    #[test]
    fn rerun_is_identical(s in arb_scenario()) {
        let engine = WaterfallEngine::default();
        let first = engine.run_waterfall(&deal(&s), &config(&s), &inputs(&s)).unwrap();
        let second = engine.run_waterfall(&deal(&s), &config(&s), &inputs(&s)).unwrap();
        prop_assert_eq!(first, second);
    }

    // ===================================================================
    // Priority monotonicity (traditional): once a step is underpaid, no
    // later step receives cash.
    // ===================================================================
    #[test]
    fn underpayment_starves_later_steps(mut s in arb_scenario()) {
        s.variant = "traditional";
        s.extra = FeatureFlags::default();
        let exec = WaterfallEngine::default().run_waterfall(&deal(&s), &config(&s), &inputs(&s)).unwrap();
        let records = exec.records();
        for (i, r) in records.iter().enumerate() {
            if r.amount_paid < r.amount_due {
                for later in &records[i + 1..] {
                    prop_assert_eq!(later.amount_paid, Decimal::ZERO, "{} paid after {} underpaid", later.step, r.step);
                }
            }
        }
    }

    // ===================================================================
    // Cure single application: each failing test with a cure amount is
    // carried by exactly one record.
    // ===================================================================
    #[test]
    fn cure_applied_once(s in arb_scenario()) {
        let i = inputs(&s);
        let exec = WaterfallEngine::default().run_waterfall(&deal(&s), &config(&s), &i).unwrap();
        for result in i.triggers.cures_needed() {
            let carrying = exec
                .records()
                .iter()
                .filter(|r| {
                    r.step == PaymentStep::Cure { tranche: result.tranche.clone(), test: result.test }
                        && r.cure_amount == result.cure_amount
                })
                .count();
            prop_assert_eq!(carrying, 1);
        }
    }

    // ===================================================================
    // Gating: a non-turbo principal step pays nothing while its own test
    // or a more senior one fails.
    // ===================================================================
    #[test]
    fn failing_tests_gate_principal(s in arb_scenario()) {
        let i = inputs(&s);
        let exec = WaterfallEngine::default().run_waterfall(&deal(&s), &config(&s), &i).unwrap();
        for r in exec.records() {
            if let PaymentStep::Principal { tranche } = &r.step {
                let rank = IDS.iter().position(|id| *id == tranche.as_str()).unwrap();
                let failing = IDS[..=rank].iter().any(|id| i.triggers.test_failed(id, TestType::Overcollateralization));
                if failing && r.directive != StepDirective::Turbo {
                    prop_assert_eq!(r.amount_paid, Decimal::ZERO);
                    prop_assert!(r.trigger_blocked);
                }
            }
        }
    }
}
