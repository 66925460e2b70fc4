use chrono::NaiveDate;
use fund_engine_core::cohort::{aggregate_cohorts, CohortInput};
use fund_engine_core::concentration::{analyze_concentration, ConcentrationInput, HhiBand};
use fund_engine_core::positions::{GroupBy, Position, PositionStatus, Stage};
use fund_engine_core::Money;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn d(y: i32, mo: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, mo, day).unwrap()
}

fn holding(id: &str, vintage: i32, sector: &str, stage: Stage, invested: i64, value: i64) -> Position {
    Position {
        id: id.into(),
        name: id.to_uppercase(),
        invested: Money::from(invested),
        current_value: Money::from(value),
        realized_value: Money::ZERO,
        status: PositionStatus::Active,
        investment_date: d(vintage, 6, 30),
        exit_date: None,
        vintage,
        sector: sector.into(),
        stage,
        cash_flows: vec![],
    }
}

fn sample_portfolio() -> Vec<Position> {
    vec![
        holding("acme", 2019, "Fintech", Stage::SeriesA, 2_000_000, 5_000_000),
        holding("bolt", 2020, "Healthcare", Stage::Seed, 500_000, 250_000),
        holding("core", 2019, "SaaS", Stage::SeriesB, 3_000_000, 3_600_000),
        holding("dash", 2021, "Fintech", Stage::Growth, 4_000_000, 4_000_000),
        holding("edge", 2020, "SaaS", Stage::Seed, 1_000_000, 2_150_000),
    ]
}

// ===========================================================================
// Cohorts
// ===========================================================================

#[test]
fn test_cohorts_by_stage_first_occurrence_order() {
    let input = CohortInput {
        positions: sample_portfolio(),
        group_by: GroupBy::Stage,
        as_of_date: d(2024, 6, 30),
    };
    let out = aggregate_cohorts(&input).unwrap().result;
    let keys: Vec<&str> = out.cohorts.iter().map(|c| c.cohort_key.as_str()).collect();
    assert_eq!(keys, vec!["Series A", "Seed", "Series B", "Growth"]);

    let seed = &out.cohorts[1];
    assert_eq!(seed.count, 2);
    assert_eq!(seed.total_invested, Money::from(1_500_000));
    assert_eq!(seed.current_value, Money::from(2_400_000));
    assert_eq!(seed.moic, Some(dec!(1.6)));
    assert_eq!(seed.dpi, Some(Decimal::ZERO));
}

#[test]
fn test_cohort_summary_totals() {
    let input = CohortInput {
        positions: sample_portfolio(),
        group_by: GroupBy::Vintage,
        as_of_date: d(2024, 6, 30),
    };
    let out = aggregate_cohorts(&input).unwrap().result;
    assert_eq!(out.summary.cohort_count, 3);
    assert_eq!(out.summary.total_invested, Money::from(10_500_000));
    assert_eq!(out.summary.total_value, Money::from(15_000_000));
    let weighted = out.summary.weighted_average_moic.unwrap();
    assert!((weighted - dec!(15) / dec!(10.5)).abs() < dec!(0.0000000001));
    assert!(out.summary.average_irr.is_some());
}

#[test]
fn test_recorded_cash_flows_drive_irr() {
    let mut p = holding("flow", 2020, "SaaS", Stage::SeriesA, 100, 121);
    p.cash_flows = vec![
        fund_engine_core::CashFlow::new(d(2021, 1, 1), Money::from(-100)),
    ];
    let input = CohortInput {
        positions: vec![p],
        group_by: GroupBy::Company,
        as_of_date: d(2023, 1, 1),
    };
    let irr = aggregate_cohorts(&input).unwrap().result.cohorts[0].irr.unwrap();
    // 100 -> 121 over two years
    assert!((irr - dec!(0.1)).abs() < dec!(0.000001));
}

// ===========================================================================
// Concentration
// ===========================================================================

#[test]
fn test_sector_concentration() {
    let input = ConcentrationInput {
        positions: sample_portfolio(),
        group_by: GroupBy::Sector,
    };
    let out = analyze_concentration(&input).unwrap();
    let r = &out.result;
    // Fintech 9.0M, SaaS 5.75M, Healthcare 0.25M of 15M
    assert_eq!(r.metrics[0].category, "Fintech");
    assert_eq!(r.metrics[0].percentage, dec!(60));
    assert!((r.metrics[1].percentage - dec!(38.333333333)).abs() < dec!(0.000001));
    assert_eq!(r.hhi_band, HhiBand::High);
    assert!(!out.warnings.is_empty());
}

fn arb_positions() -> impl Strategy<Value = Vec<Position>> {
    prop::collection::vec((0usize..6, 1i64..10_000_000), 1..12).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (sector, value))| {
                holding(
                    &format!("p{i}"),
                    2020,
                    &format!("S{sector}"),
                    Stage::Other,
                    value,
                    value,
                )
            })
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// HHI does not depend on input order and percentages sum to 100.
    #[test]
    fn prop_hhi_order_invariant(positions in arb_positions()) {
        let forward = analyze_concentration(&ConcentrationInput {
            positions: positions.clone(),
            group_by: GroupBy::Sector,
        }).unwrap().result;

        let mut reversed_positions = positions;
        reversed_positions.reverse();
        let reversed = analyze_concentration(&ConcentrationInput {
            positions: reversed_positions,
            group_by: GroupBy::Sector,
        }).unwrap().result;

        prop_assert!((forward.hhi - reversed.hhi).abs() < dec!(0.000001));
        let total: Decimal = forward.metrics.iter().map(|m| m.percentage).sum();
        prop_assert!((total - dec!(100)).abs() < dec!(0.000001));
        for w in forward.metrics.windows(2) {
            prop_assert!(w[0].percentage >= w[1].percentage);
        }
    }
}
