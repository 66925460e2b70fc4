//! Whole-fund computation from an event history and valuation snapshot.
//!
//! Order of evaluation:
//!
//! 1. NAV from the valuation components (period IRR from investor flows)
//! 2. Cohort and concentration analytics over the positions
//! 3. Completed distributions replayed through the waterfall
//! 4. An optional new distribution allocated on top of the replayed state
//! 5. Carry accrual at the as-of date, valuing NAV as unrealized value
//!
//! [`compute_funds`] runs many funds independently; one fund's failure never
//! affects another's result.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::cohort::{aggregate_cohorts, CohortInput, CohortOutput};
use crate::concentration::{analyze_concentration, ConcentrationInput, ConcentrationOutput};
use crate::error::{ErrorClass, FundEngineError};
use crate::events::{
    completed_distributions, contribution_flows, summarize_capital_calls, CapitalCall,
    CapitalCallSummary, DistributionEvent,
};
use crate::nav::{calculate_nav, NavAdjustment, NavCalculation, NavComponent, NavInput};
use crate::positions::{GroupBy, Position};
use crate::types::*;
use crate::waterfall::{
    accrue_carry, allocate, default_tier_specs, replay, resolve_tiers, Allocation, CarryAccrual,
    CarryAccrualInput, CarryAccrualState, CarryTerms, DistributionAction, DistributionRequest,
    TierSpec,
};
use crate::FundEngineResult;

// ---------------------------------------------------------------------------
// Input / Output
// ---------------------------------------------------------------------------

fn default_concentration_group() -> GroupBy {
    GroupBy::Sector
}

/// Everything known about one fund at an as-of date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundSnapshot {
    pub fund_id: String,
    pub as_of_date: NaiveDate,
    #[serde(default)]
    pub capital_calls: Vec<CapitalCall>,
    #[serde(default)]
    pub distributions: Vec<DistributionEvent>,
    pub nav_components: Vec<NavComponent>,
    #[serde(default)]
    pub nav_adjustments: Vec<NavAdjustment>,
    pub outstanding_shares: Decimal,
    #[serde(default)]
    pub previous_nav: Option<NavCalculation>,
    #[serde(default)]
    pub positions: Vec<Position>,
    #[serde(default)]
    pub cohort_group_by: GroupBy,
    #[serde(default = "default_concentration_group")]
    pub concentration_group_by: GroupBy,
    pub terms: CarryTerms,
    #[serde(default)]
    pub tier_specs: Option<Vec<TierSpec>>,
    /// Distribution to allocate on top of the recorded history
    #[serde(default)]
    pub new_distribution: Option<DistributionRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundResult {
    pub fund_id: String,
    pub as_of_date: NaiveDate,
    pub capital_calls: CapitalCallSummary,
    pub nav: NavCalculation,
    pub cohorts: CohortOutput,
    /// None when there are no positions or they carry no value
    pub concentration: Option<ConcentrationOutput>,
    /// Allocations of the recorded distribution history, in date order
    pub history: Vec<Allocation>,
    pub new_allocation: Option<Allocation>,
    pub waterfall_state: CarryAccrualState,
    pub carry: CarryAccrual,
}

// ---------------------------------------------------------------------------
// Single fund
// ---------------------------------------------------------------------------

pub fn compute_fund(snapshot: &FundSnapshot) -> FundEngineResult<ComputationOutput<FundResult>> {
    let start = Instant::now();
    let as_of = snapshot.as_of_date;
    let mut warnings: Vec<String> = Vec::new();

    let capital_calls = summarize_capital_calls(&snapshot.capital_calls)?;
    let contributions: Vec<CashFlow> = contribution_flows(&snapshot.capital_calls)?
        .into_iter()
        .filter(|c| c.date <= as_of)
        .collect();

    let (recorded, future): (Vec<DistributionEvent>, Vec<DistributionEvent>) =
        completed_distributions(&snapshot.distributions)?
            .into_iter()
            .cloned()
            .partition(|e| e.event_date <= as_of);
    if !future.is_empty() {
        warnings.push(format!(
            "{} completed distribution(s) dated after {as_of} ignored",
            future.len()
        ));
    }

    // 1. NAV
    let period_flows = investor_flows(&contributions, &recorded);
    let nav = calculate_nav(&NavInput {
        as_of_date: as_of,
        components: snapshot.nav_components.clone(),
        adjustments: snapshot.nav_adjustments.clone(),
        outstanding_shares: snapshot.outstanding_shares,
        previous: snapshot.previous_nav.clone(),
        period_flows,
    })?;
    warnings.extend(nav.warnings);
    let nav = nav.result;

    // 2. Portfolio analytics
    let cohorts = aggregate_cohorts(&CohortInput {
        positions: snapshot.positions.clone(),
        group_by: snapshot.cohort_group_by,
        as_of_date: as_of,
    })?;
    warnings.extend(cohorts.warnings);
    let cohorts = cohorts.result;

    let has_value = snapshot.positions.iter().any(|p| p.current_value.is_positive());
    let concentration = if has_value {
        let c = analyze_concentration(&ConcentrationInput {
            positions: snapshot.positions.clone(),
            group_by: snapshot.concentration_group_by,
        })?;
        warnings.extend(c.warnings);
        Some(c.result)
    } else {
        None
    };

    // 3. Waterfall history
    let specs = snapshot
        .tier_specs
        .clone()
        .unwrap_or_else(|| default_tier_specs(&snapshot.terms));
    let initial = CarryAccrualState::with_contributions(contributions);
    let (mut state, history, replay_warnings) = replay(&initial, &recorded, &snapshot.terms, &specs)?;
    warnings.extend(replay_warnings);

    // 4. New distribution
    let mut unrealized_value = nav.net_assets.non_negative();
    let new_allocation = match &snapshot.new_distribution {
        Some(request) => {
            if request.date > as_of {
                return Err(FundEngineError::InvalidDistribution {
                    reason: format!(
                        "new distribution on {} is after the as-of date {as_of}",
                        request.date
                    ),
                });
            }
            let (tiers, tier_warnings) = resolve_tiers(&state, &snapshot.terms, &specs, request.date)?;
            warnings.extend(tier_warnings);
            let allocation = allocate(request, &state, &snapshot.terms, &tiers)?;
            if request.action == DistributionAction::Record {
                state = allocation.new_state.clone();
                unrealized_value = (unrealized_value - request.amount).non_negative();
            }
            Some(allocation)
        }
        None => None,
    };

    // 5. Carry accrual
    let carry = accrue_carry(&CarryAccrualInput {
        as_of_date: as_of,
        state: state.clone(),
        terms: snapshot.terms.clone(),
        tier_specs: Some(specs),
        unrealized_value,
        acceleration: None,
    })?;
    warnings.extend(carry.warnings);

    tracing::info!(
        fund_id = %snapshot.fund_id,
        as_of = %as_of,
        nav = %nav.net_assets,
        accrued_carry = %carry.result.accrued_carry,
        "fund computed"
    );

    let output = FundResult {
        fund_id: snapshot.fund_id.clone(),
        as_of_date: as_of,
        capital_calls,
        nav,
        cohorts,
        concentration,
        history,
        new_allocation,
        waterfall_state: state,
        carry: carry.result,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Fund economics: NAV, cohorts, concentration, waterfall replay, carry accrual",
        &serde_json::json!({
            "fund_id": snapshot.fund_id,
            "as_of_date": as_of,
            "capital_calls": snapshot.capital_calls.len(),
            "distributions": snapshot.distributions.len(),
            "positions": snapshot.positions.len(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Investor-perspective flows: contributions negative, distributions positive.
fn investor_flows(contributions: &[CashFlow], distributions: &[DistributionEvent]) -> Vec<CashFlow> {
    let mut flows: Vec<CashFlow> = contributions
        .iter()
        .map(|c| CashFlow::new(c.date, -c.amount))
        .chain(
            distributions
                .iter()
                .map(|d| CashFlow::new(d.event_date, d.net_proceeds())),
        )
        .collect();
    flows.sort_by_key(|f| f.date);
    flows
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundFailure {
    pub class: ErrorClass,
    pub message: String,
}

/// Result for one fund in a batch. Exactly one of `output` and `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundOutcome {
    pub fund_id: String,
    pub output: Option<ComputationOutput<FundResult>>,
    pub error: Option<FundFailure>,
}

impl FundOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

fn outcome(snapshot: &FundSnapshot) -> FundOutcome {
    match compute_fund(snapshot) {
        Ok(output) => FundOutcome {
            fund_id: snapshot.fund_id.clone(),
            output: Some(output),
            error: None,
        },
        Err(e) => {
            // Consistency violations were already logged with their snapshot
            if e.class() != ErrorClass::Consistency {
                tracing::warn!(fund_id = %snapshot.fund_id, error = %e, "fund computation failed");
            }
            FundOutcome {
                fund_id: snapshot.fund_id.clone(),
                output: None,
                error: Some(FundFailure {
                    class: e.class(),
                    message: e.to_string(),
                }),
            }
        }
    }
}

/// Compute every fund independently, in input order.
pub fn compute_funds(snapshots: &[FundSnapshot]) -> Vec<FundOutcome> {
    #[cfg(feature = "parallel")]
    let outcomes: Vec<FundOutcome> = snapshots.par_iter().map(outcome).collect();
    #[cfg(not(feature = "parallel"))]
    let outcomes: Vec<FundOutcome> = snapshots.iter().map(outcome).collect();

    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
    tracing::info!(funds = snapshots.len(), failed, "batch complete");
    outcomes
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CapitalCallStatus, DistributionStatus, DistributionType};
    use crate::nav::{NavCategory, ValuationMethod};
    use crate::positions::fixtures::position;
    use crate::vesting::VestingSchedule;
    use rust_decimal_macros::dec;

    fn m(s: &str) -> Money {
        s.parse().unwrap()
    }

    fn d(y: i32, mo: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, mo, day).unwrap()
    }

    fn snapshot(fund_id: &str) -> FundSnapshot {
        FundSnapshot {
            fund_id: fund_id.into(),
            as_of_date: d(2023, 1, 1),
            capital_calls: vec![CapitalCall {
                fund_id: fund_id.into(),
                call_number: 1,
                total_amount: m("10000000"),
                amount_received: m("10000000"),
                due_date: d(2021, 1, 1),
                status: CapitalCallStatus::Completed,
            }],
            distributions: vec![DistributionEvent {
                fund_id: fund_id.into(),
                event_date: d(2022, 1, 1),
                event_type: DistributionType::Exit,
                gross_proceeds: m("8100000"),
                expenses: m("100000"),
                status: DistributionStatus::Completed,
                acceleration: None,
            }],
            nav_components: vec![NavComponent {
                name: "Portfolio".into(),
                category: NavCategory::Investment,
                value: m("4000000"),
                valuation_method: ValuationMethod::ComparableCompanies,
                last_valuation_date: d(2022, 12, 31),
                confidence: dec!(0.9),
            }],
            nav_adjustments: vec![],
            outstanding_shares: dec!(100000),
            previous_nav: None,
            positions: vec![
                position("a", 2021, "SaaS", "6000000", "3000000"),
                position("b", 2021, "Fintech", "4000000", "1000000"),
            ],
            cohort_group_by: GroupBy::Vintage,
            concentration_group_by: GroupBy::Sector,
            terms: CarryTerms {
                gp_carry_pct: dec!(0.20),
                hurdle_rate: dec!(0.08),
                preferred_return_pct: Decimal::ONE,
                catchup_pct: Decimal::ONE,
                catchup_cap: None,
                vesting_schedule: VestingSchedule::immediate(),
                carry_grant_date: d(2021, 1, 1),
            },
            tier_specs: None,
            new_distribution: None,
        }
    }

    #[test]
    fn test_compute_fund_end_to_end() {
        let out = compute_fund(&snapshot("F1")).unwrap().result;
        assert_eq!(out.nav.net_assets, m("4000000"));
        assert_eq!(out.nav.nav_per_share, m("40"));
        assert_eq!(out.history.len(), 1);
        assert_eq!(out.waterfall_state.capital_returned, m("8000000"));
        // Hypothetical liquidation of 4M matches the hand-computed waterfall
        assert_eq!(out.carry.unrealized_carry, m("400000"));
        assert_eq!(out.carry.accrued_carry, out.carry.vested_carry + out.carry.unvested_carry);
        let conc = out.concentration.unwrap();
        assert_eq!(conc.metrics[0].category, "SaaS");
        assert_eq!(conc.metrics[0].percentage, dec!(75));
        assert_eq!(out.cohorts.cohorts.len(), 1);
    }

    #[test]
    fn test_new_distribution_recorded() {
        let mut s = snapshot("F1");
        s.new_distribution = Some(DistributionRequest {
            date: d(2023, 1, 1),
            amount: m("4000000"),
            action: DistributionAction::Record,
            acceleration: None,
        });
        let out = compute_fund(&s).unwrap().result;
        let alloc = out.new_allocation.unwrap();
        assert_eq!(alloc.gp_amount, m("400000"));
        assert_eq!(out.waterfall_state.distributed_carry, m("400000"));
        assert_eq!(out.carry.unrealized_value, Money::ZERO);
        assert_eq!(out.carry.remaining_carry, Money::ZERO);
    }

    #[test]
    fn test_new_distribution_after_as_of_rejected() {
        let mut s = snapshot("F1");
        s.new_distribution = Some(DistributionRequest {
            date: d(2023, 6, 1),
            amount: m("1"),
            action: DistributionAction::Preview,
            acceleration: None,
        });
        assert!(compute_fund(&s).is_err());
    }

    #[test]
    fn test_batch_isolates_failures() {
        let good = snapshot("GOOD");
        let mut bad = snapshot("BAD");
        bad.outstanding_shares = Decimal::ZERO;
        let outcomes = compute_funds(&[good, bad, snapshot("ALSO_GOOD")]);
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].is_ok());
        assert_eq!(outcomes[1].fund_id, "BAD");
        assert_eq!(
            outcomes[1].error.as_ref().map(|e| e.class),
            Some(ErrorClass::Arithmetic)
        );
        assert!(outcomes[2].is_ok());
    }
}
