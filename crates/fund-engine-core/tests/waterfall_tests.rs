use chrono::{Duration, NaiveDate};
use fund_engine_core::vesting::{AccelerationTrigger, VestingSchedule};
use fund_engine_core::waterfall::*;
use fund_engine_core::{CashFlow, Money};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn m(s: &str) -> Money {
    s.parse().unwrap()
}

fn d(y: i32, mo: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, mo, day).unwrap()
}

fn terms(vesting: VestingSchedule) -> CarryTerms {
    CarryTerms {
        gp_carry_pct: dec!(0.20),
        hurdle_rate: dec!(0.08),
        preferred_return_pct: Decimal::ONE,
        catchup_pct: Decimal::ONE,
        catchup_cap: None,
        vesting_schedule: vesting,
        carry_grant_date: d(2021, 1, 1),
    }
}

fn record(date: NaiveDate, amount: Money) -> DistributionRequest {
    DistributionRequest {
        date,
        amount,
        action: DistributionAction::Record,
        acceleration: None,
    }
}

fn step(
    state: &CarryAccrualState,
    terms: &CarryTerms,
    request: &DistributionRequest,
) -> (Vec<WaterfallTier>, Allocation) {
    let (tiers, _) = resolve_tiers(state, terms, &default_tier_specs(terms), request.date).unwrap();
    let allocation = allocate(request, state, terms, &tiers).unwrap();
    (tiers, allocation)
}

// ===========================================================================
// Hand-computed scenarios
// ===========================================================================

/// $10M fund, 8% hurdle, 20% carry, full catch-up. $8M of capital has been
/// returned; $2M capital and $1.024M preferred return are owed when $3M is
/// distributed on 2023-01-01.
///
/// | Tier             | Amount    | LP        | GP     |
/// |------------------|-----------|-----------|--------|
/// | Return of capital| 2,000,000 | 2,000,000 | 0      |
/// | Preferred return | 1,000,000 | 1,000,000 | 0      |
/// | Catch-up         | 0         | 0         | 0      |
/// | Residual         | 0         | 0         | 0      |
#[test]
fn test_three_million_distribution_fills_in_order() {
    let t = terms(VestingSchedule::immediate());
    let start = CarryAccrualState::with_contributions(vec![CashFlow::new(d(2021, 1, 1), m("10000000"))]);
    let (_, first) = step(&start, &t, &record(d(2022, 1, 1), m("8000000")));
    let (tiers, alloc) = step(&first.new_state, &t, &record(d(2023, 1, 1), m("3000000")));

    assert_eq!(tiers[1].range_end.unwrap() - tiers[1].range_start, m("1024000"));

    let amounts: Vec<Money> = alloc.tiers.iter().map(|t| t.amount).collect();
    assert_eq!(amounts, vec![m("2000000"), m("1000000"), Money::ZERO, Money::ZERO]);
    assert_eq!(alloc.lp_amount, m("3000000"));
    assert_eq!(alloc.gp_amount, Money::ZERO);

    // The next $1M finishes the preferred return, then catch-up, then residual
    let (_, next) = step(&alloc.new_state, &t, &record(d(2023, 1, 1), m("1000000")));
    let amounts: Vec<Money> = next.tiers.iter().map(|t| t.amount).collect();
    assert_eq!(amounts, vec![Money::ZERO, m("24000"), m("256000"), m("720000")]);
    assert_eq!(next.gp_amount, m("400000"));
}

#[test]
fn test_graded_vesting_holds_back_then_releases() {
    let t = terms(VestingSchedule::graded(12, 48));
    let start = CarryAccrualState::with_contributions(vec![CashFlow::new(d(2021, 1, 1), m("10000000"))]);
    let (_, roc) = step(&start, &t, &record(d(2022, 1, 1), m("8000000")));
    let (_, carry) = step(&roc.new_state, &t, &record(d(2023, 1, 1), m("4000000")));
    assert_eq!(carry.new_state.accrued_carry, m("400000"));
    assert_eq!(carry.new_state.distributed_carry, m("133333.333333"));

    // Fully vested at 48 months: a zero distribution releases the rest
    let (_, later) = step(&carry.new_state, &t, &record(d(2025, 1, 1), Money::ZERO));
    assert_eq!(later.vested_fraction, Decimal::ONE);
    assert_eq!(later.carry_paid, m("266666.666667"));
    assert_eq!(later.new_state.distributed_carry, m("400000"));
    assert_eq!(later.new_state.unvested_carry(), Money::ZERO);
}

#[test]
fn test_undeclared_trigger_does_not_accelerate() {
    let t = terms(VestingSchedule::graded(12, 48).with_acceleration(AccelerationTrigger::Exit));
    let start = CarryAccrualState::with_contributions(vec![CashFlow::new(d(2021, 1, 1), m("10000000"))]);
    let mut request = record(d(2021, 6, 1), m("20000000"));
    request.acceleration = Some(AccelerationTrigger::ChangeOfControl);
    let (_, alloc) = step(&start, &t, &request);
    assert_eq!(alloc.vested_fraction, Decimal::ZERO);
    assert_eq!(alloc.new_state.acceleration, None);
    assert_eq!(alloc.carry_paid, Money::ZERO);
    assert!(alloc.gp_carry.is_positive());
}

#[test]
fn test_state_survives_json_round_trip() {
    let t = terms(VestingSchedule::immediate());
    let start = CarryAccrualState::with_contributions(vec![CashFlow::new(d(2021, 1, 1), m("10000000"))]);
    let (_, alloc) = step(&start, &t, &record(d(2022, 1, 1), m("12500000.5")));
    let json = serde_json::to_string(&alloc.new_state).unwrap();
    let back: CarryAccrualState = serde_json::from_str(&json).unwrap();
    assert_eq!(back, alloc.new_state);
    assert!(json.contains("\"12500000.5\""));
}

#[test]
fn test_distribution_input_from_json() {
    let json = r#"{
        "distribution": { "date": "2022-01-01", "amount": "1000000" },
        "prior_state": {
            "contributions": [{ "date": "2021-01-01", "amount": "5000000" }]
        },
        "terms": {
            "gp_carry_pct": "0.2",
            "hurdle_rate": "0.08",
            "preferred_return_pct": "1",
            "catchup_pct": "1",
            "vesting_schedule": { "kind": { "type": "Immediate" } },
            "carry_grant_date": "2021-01-01"
        }
    }"#;
    let input: DistributionInput = serde_json::from_str(json).unwrap();
    let out = distribute(&input).unwrap();
    assert_eq!(out.result.lp_amount, m("1000000"));
    assert_eq!(out.result.new_state.distributed_carry, Money::ZERO);
}

// ===========================================================================
// Properties
// ===========================================================================

fn arb_money(max_units: i64) -> impl Strategy<Value = Money> {
    (0i64..=max_units * 100).prop_map(|cents| Money::from_minor_units(cents * 10_000))
}

fn arb_terms() -> impl Strategy<Value = CarryTerms> {
    (0u32..=30, 0u32..=12, 50u32..=100, prop::option::of(0i64..5_000_000)).prop_map(
        |(carry, hurdle, catchup, cap)| CarryTerms {
            gp_carry_pct: Decimal::new(carry as i64, 2),
            hurdle_rate: Decimal::new(hurdle as i64, 2),
            preferred_return_pct: Decimal::ONE,
            catchup_pct: Decimal::new(catchup as i64, 2),
            catchup_cap: cap.map(Money::from_minor_units),
            vesting_schedule: VestingSchedule::graded(6, 36),
            carry_grant_date: d(2020, 1, 1),
        },
    )
}

fn arb_history() -> impl Strategy<Value = (Money, Vec<(i64, Money)>)> {
    (
        arb_money(50_000_000),
        prop::collection::vec((1i64..400, arb_money(20_000_000)), 1..8),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every distribution is split exactly, tiers fill strictly in order, and
    /// carry never pays out more than has vested.
    #[test]
    fn prop_allocation_conserves_and_fills_in_order(
        t in arb_terms(),
        (contribution, events) in arb_history(),
    ) {
        let mut state = CarryAccrualState::with_contributions(vec![CashFlow::new(d(2020, 1, 1), contribution)]);
        let mut date = d(2020, 1, 1);

        for (gap, amount) in events {
            date += Duration::days(gap);
            let specs = default_tier_specs(&t);
            let (tiers, _) = resolve_tiers(&state, &t, &specs, date).unwrap();
            let alloc = allocate(&record(date, amount), &state, &t, &tiers).unwrap();

            prop_assert_eq!(alloc.lp_amount + alloc.gp_amount + alloc.third_party_amount, amount);
            let tier_sum: Money = alloc.tiers.iter().map(|t| t.amount).sum();
            prop_assert_eq!(tier_sum, amount);

            let window_start = state.total_distributed;
            for i in 0..alloc.tiers.len() - 1 {
                if alloc.tiers[i + 1].amount.is_positive() {
                    let tier = &tiers[i];
                    let capacity = tier.range_end.unwrap() - tier.range_start.max(window_start);
                    prop_assert_eq!(alloc.tiers[i].amount, capacity.non_negative());
                }
            }

            let s = &alloc.new_state;
            prop_assert!(s.distributed_carry <= s.vested_carry);
            prop_assert!(s.vested_carry <= s.accrued_carry);
            prop_assert!(!(s.vested_carry - s.distributed_carry).is_negative());
            state = alloc.new_state;
        }
    }

    /// Same state and request give the same allocation.
    #[test]
    fn prop_allocate_is_idempotent(
        t in arb_terms(),
        (contribution, events) in arb_history(),
    ) {
        let state = CarryAccrualState::with_contributions(vec![CashFlow::new(d(2020, 1, 1), contribution)]);
        let (gap, amount) = events[0];
        let request = record(d(2020, 1, 1) + Duration::days(gap), amount);
        let (tiers, _) = resolve_tiers(&state, &t, &default_tier_specs(&t), request.date).unwrap();
        let a = allocate(&request, &state, &t, &tiers).unwrap();
        let b = allocate(&request, &state, &t, &tiers).unwrap();
        prop_assert_eq!(a, b);
    }
}
