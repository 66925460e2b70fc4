//! Cohort performance: positions grouped by vintage, sector, stage or company.
//!
//! Per cohort:
//!
//! - **MOIC** = total value / invested (undefined when nothing was invested)
//! - **TVPI** = (realized + unrealized) / invested
//! - **DPI** = realized / invested
//! - **IRR** over the cohort's combined dated flows
//!
//! Cohorts are reported in order of first appearance in the input.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::positions::{group_positions, GroupBy, Position};
use crate::time_value::irr_or_warn;
use crate::types::*;
use crate::FundEngineResult;

// ---------------------------------------------------------------------------
// Input / Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CohortInput {
    pub positions: Vec<Position>,
    #[serde(default)]
    pub group_by: GroupBy,
    /// Date at which unrealized value is assumed received for IRR
    pub as_of_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortPerformance {
    pub cohort_key: String,
    pub count: usize,
    pub total_invested: Money,
    pub current_value: Money,
    pub realized_value: Money,
    pub unrealized_value: Money,
    pub moic: Option<Multiple>,
    pub irr: Option<Rate>,
    pub tvpi: Option<Multiple>,
    pub dpi: Option<Multiple>,
    /// Share of positions fully exited, in percentage points
    pub percentage_exited: Decimal,
}

/// Cross-cohort averages. Both the simple mean and the invested-weighted MOIC
/// are reported; reporting conventions differ on which to show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortSummary {
    pub cohort_count: usize,
    pub total_invested: Money,
    pub total_value: Money,
    /// Simple mean of the defined cohort MOICs
    pub average_moic: Option<Multiple>,
    /// Total value / total invested across all cohorts
    pub weighted_average_moic: Option<Multiple>,
    /// Simple mean of the defined cohort IRRs
    pub average_irr: Option<Rate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortOutput {
    pub group_by: GroupBy,
    pub cohorts: Vec<CohortPerformance>,
    pub summary: CohortSummary,
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

pub fn aggregate_cohorts(input: &CohortInput) -> FundEngineResult<ComputationOutput<CohortOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    for p in &input.positions {
        p.validate()?;
    }
    if input.positions.is_empty() {
        warnings.push("No positions supplied; no cohorts produced".into());
    }

    let cohorts = group_positions(&input.positions, input.group_by)
        .into_iter()
        .map(|(key, members)| cohort_performance(key, &members, input.as_of_date, &mut warnings))
        .collect::<FundEngineResult<Vec<_>>>()?;

    for c in cohorts.iter().filter(|c| c.moic.is_none()) {
        warnings.push(format!(
            "Cohort {}: nothing invested, multiples undefined",
            c.cohort_key
        ));
    }

    let summary = summarize(&cohorts)?;

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Cohort aggregation (first-occurrence grouping, XIRR over combined flows)",
        &serde_json::json!({
            "group_by": input.group_by,
            "as_of_date": input.as_of_date,
            "positions": input.positions.len(),
        }),
        warnings,
        elapsed,
        CohortOutput {
            group_by: input.group_by,
            cohorts,
            summary,
        },
    ))
}

fn cohort_performance(
    cohort_key: String,
    members: &[&Position],
    as_of: NaiveDate,
    warnings: &mut Vec<String>,
) -> FundEngineResult<CohortPerformance> {
    let total_invested: Money = members.iter().map(|p| p.invested).sum();
    let current_value: Money = members.iter().map(|p| p.current_value).sum();
    let realized_value: Money = members.iter().map(|p| p.realized_value).sum();
    let unrealized_value: Money = members.iter().map(|p| p.unrealized_value()).sum();

    let multiple = |numerator: Money| -> FundEngineResult<Option<Multiple>> {
        if total_invested.is_zero() {
            Ok(None)
        } else {
            numerator.ratio(total_invested).map(Some)
        }
    };
    let moic = multiple(current_value)?;
    let tvpi = multiple(realized_value + unrealized_value)?;
    let dpi = multiple(realized_value)?;

    let mut flows: Vec<CashFlow> = members.iter().flat_map(|p| p.flows(as_of)).collect();
    flows.sort_by_key(|f| f.date);
    let irr = irr_or_warn(&flows, &format!("Cohort {cohort_key}"), warnings);

    let exited = members.iter().filter(|p| p.status.is_exited()).count();
    let percentage_exited = if members.is_empty() {
        Decimal::ZERO
    } else {
        Decimal::from(exited as u64) * dec!(100) / Decimal::from(members.len() as u64)
    };

    Ok(CohortPerformance {
        cohort_key,
        count: members.len(),
        total_invested,
        current_value,
        realized_value,
        unrealized_value,
        moic,
        irr,
        tvpi,
        dpi,
        percentage_exited,
    })
}

fn mean(values: impl Iterator<Item = Decimal>) -> Option<Decimal> {
    let (sum, n) = values.fold((Decimal::ZERO, 0u64), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        None
    } else {
        Some(sum / Decimal::from(n))
    }
}

fn summarize(cohorts: &[CohortPerformance]) -> FundEngineResult<CohortSummary> {
    let total_invested: Money = cohorts.iter().map(|c| c.total_invested).sum();
    let total_value: Money = cohorts.iter().map(|c| c.current_value).sum();

    let weighted_average_moic = if total_invested.is_zero() {
        None
    } else {
        Some(total_value.ratio(total_invested)?)
    };

    Ok(CohortSummary {
        cohort_count: cohorts.len(),
        total_invested,
        total_value,
        average_moic: mean(cohorts.iter().filter_map(|c| c.moic)),
        weighted_average_moic,
        average_irr: mean(cohorts.iter().filter_map(|c| c.irr)),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
