//! Concentration risk over a grouping dimension.
//!
//! Each group's share of total current value is expressed in percentage
//! points and metrics are sorted largest first. The Herfindahl-Hirschman
//! Index is the sum of squared percentages over every group (0-10,000).

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::FundEngineError;
use crate::positions::{group_positions, GroupBy, Position};
use crate::types::*;
use crate::FundEngineResult;

const BAND_MEDIUM_PCT: Decimal = dec!(15);
const BAND_HIGH_PCT: Decimal = dec!(25);
const HHI_MODERATE: Decimal = dec!(1500);
const HHI_HIGH: Decimal = dec!(2500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskBand {
    Low,
    Medium,
    High,
}

impl RiskBand {
    /// `<15` low, `15-25` medium, `>=25` high.
    pub fn from_percentage(pct: Decimal) -> Self {
        if pct >= BAND_HIGH_PCT {
            RiskBand::High
        } else if pct >= BAND_MEDIUM_PCT {
            RiskBand::Medium
        } else {
            RiskBand::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HhiBand {
    Low,
    Moderate,
    High,
}

impl HhiBand {
    /// `<1500` low, `1500-2500` moderate, `>2500` high.
    pub fn from_hhi(hhi: Decimal) -> Self {
        if hhi > HHI_HIGH {
            HhiBand::High
        } else if hhi >= HHI_MODERATE {
            HhiBand::Moderate
        } else {
            HhiBand::Low
        }
    }
}

// ---------------------------------------------------------------------------
// Input / Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcentrationInput {
    pub positions: Vec<Position>,
    #[serde(default)]
    pub group_by: GroupBy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcentrationMetric {
    pub category: String,
    pub value: Money,
    /// Share of total value, percentage points
    pub percentage: Decimal,
    pub count: usize,
    pub risk_band: RiskBand,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcentrationOutput {
    pub group_by: GroupBy,
    pub total_value: Money,
    /// Sorted by percentage, largest first
    pub metrics: Vec<ConcentrationMetric>,
    pub hhi: Decimal,
    pub hhi_band: HhiBand,
    pub top_3_pct: Decimal,
    pub top_5_pct: Decimal,
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

pub fn analyze_concentration(
    input: &ConcentrationInput,
) -> FundEngineResult<ComputationOutput<ConcentrationOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.positions.is_empty() {
        return Err(FundEngineError::InsufficientData(
            "At least one position is required for concentration analysis".into(),
        ));
    }
    for p in &input.positions {
        p.validate()?;
    }

    let total_value: Money = input.positions.iter().map(|p| p.current_value).sum();
    if total_value.is_zero() {
        return Err(FundEngineError::DivisionByZero {
            context: "concentration: total portfolio value is zero".into(),
        });
    }

    let mut metrics = group_positions(&input.positions, input.group_by)
        .into_iter()
        .map(|(category, members)| {
            let value: Money = members.iter().map(|p| p.current_value).sum();
            let percentage = value.ratio(total_value)? * dec!(100);
            Ok(ConcentrationMetric {
                category,
                value,
                percentage,
                count: members.len(),
                risk_band: RiskBand::from_percentage(percentage),
            })
        })
        .collect::<FundEngineResult<Vec<_>>>()?;

    // Stable: equal shares keep first-occurrence order
    metrics.sort_by(|a, b| b.percentage.cmp(&a.percentage));

    let hhi: Decimal = metrics.iter().map(|m| m.percentage * m.percentage).sum();
    let top_n = |n: usize| -> Decimal { metrics.iter().take(n).map(|m| m.percentage).sum() };
    let top_3_pct = top_n(3);
    let top_5_pct = top_n(5);

    let pct_total: Decimal = metrics.iter().map(|m| m.percentage).sum();
    if (pct_total - dec!(100)).abs() > dec!(0.000001) {
        return Err(FundEngineError::consistency(
            "sum of concentration percentages == 100",
            format!("percentages sum to {pct_total}"),
            input,
        ));
    }

    for m in metrics.iter().filter(|m| m.risk_band == RiskBand::High) {
        warnings.push(format!(
            "{} is {:.2}% of portfolio value",
            m.category,
            m.percentage.round_dp(2)
        ));
    }

    let output = ConcentrationOutput {
        group_by: input.group_by,
        total_value,
        hhi_band: HhiBand::from_hhi(hhi),
        metrics,
        hhi,
        top_3_pct,
        top_5_pct,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Concentration (share of current value, HHI on percentage points)",
        &serde_json::json!({
            "group_by": input.group_by,
            "positions": input.positions.len(),
            "bands": { "medium_pct": "15", "high_pct": "25", "hhi_moderate": "1500", "hhi_high": "2500" },
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
