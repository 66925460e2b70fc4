//! Net asset value roll-forward.
//!
//! NAV is built from valued components and explicit adjustments:
//!
//! - **Assets**: investments, cash, receivables and other assets add to gross assets
//! - **Liabilities**: subtract from gross assets
//! - **Adjustments**: write-ups, write-downs and unrealized gains/losses are
//!   signed amounts applied to gross assets
//!
//! NAV per share divides net assets by outstanding shares. When a previous
//! calculation is supplied the period change and, given the period's investor
//! flows, a period IRR are reported.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::FundEngineError;
use crate::time_value::irr_or_warn;
use crate::types::*;
use crate::FundEngineResult;

/// Valuations older than this at the as-of date are flagged.
const STALE_VALUATION_DAYS: i64 = 180;

// ---------------------------------------------------------------------------
// Input types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NavCategory {
    Investment,
    Cash,
    Receivable,
    Liability,
    Other,
}

impl NavCategory {
    pub const ALL: [NavCategory; 5] = [
        NavCategory::Investment,
        NavCategory::Cash,
        NavCategory::Receivable,
        NavCategory::Liability,
        NavCategory::Other,
    ];

    pub fn is_liability(self) -> bool {
        self == NavCategory::Liability
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValuationMethod {
    MarketPrice,
    RecentTransaction,
    ComparableCompanies,
    DiscountedCashFlow,
    Cost,
    BookValue,
    Other,
}

/// A valued line of the fund balance sheet. `value` is a magnitude; the
/// category decides whether it adds to or subtracts from net assets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavComponent {
    #[serde(default)]
    pub name: String,
    pub category: NavCategory,
    pub value: Money,
    pub valuation_method: ValuationMethod,
    pub last_valuation_date: NaiveDate,
    /// Valuation confidence, 0 to 1
    pub confidence: Rate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdjustmentType {
    UnrealizedGain,
    UnrealizedLoss,
    WriteUp,
    WriteDown,
    Other,
}

/// Signed change to gross assets. Gains and write-ups must be non-negative,
/// losses and write-downs non-positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavAdjustment {
    pub adjustment_type: AdjustmentType,
    pub amount: Money,
    #[serde(default)]
    pub justification: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavInput {
    pub as_of_date: NaiveDate,
    pub components: Vec<NavComponent>,
    #[serde(default)]
    pub adjustments: Vec<NavAdjustment>,
    pub outstanding_shares: Decimal,
    #[serde(default)]
    pub previous: Option<NavCalculation>,
    /// Investor flows between the previous calculation and this one
    /// (negative = contributed, positive = distributed)
    #[serde(default)]
    pub period_flows: Vec<CashFlow>,
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTotal {
    pub category: NavCategory,
    pub value: Money,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavCalculation {
    pub as_of_date: NaiveDate,
    pub total_assets: Money,
    pub total_liabilities: Money,
    pub total_adjustments: Money,
    pub net_assets: Money,
    pub outstanding_shares: Decimal,
    pub nav_per_share: Money,
    pub previous_nav_per_share: Option<Money>,
    /// Fractional change in NAV per share since the previous calculation
    pub change_pct: Option<Rate>,
    /// Annualised investor return over the period
    pub period_irr: Option<Rate>,
    pub breakdown: Vec<CategoryTotal>,
    /// Asset-value-weighted valuation confidence
    pub weighted_confidence: Option<Rate>,
}

// ---------------------------------------------------------------------------
// Calculation
// ---------------------------------------------------------------------------

pub fn calculate_nav(input: &NavInput) -> FundEngineResult<ComputationOutput<NavCalculation>> {
    let start = Instant::now();
    validate_nav_input(input)?;

    let mut warnings: Vec<String> = Vec::new();

    let mut total_assets = Money::ZERO;
    let mut total_liabilities = Money::ZERO;
    let mut confidence_weighted = Decimal::ZERO;
    let mut confidence_base = Money::ZERO;

    for c in &input.components {
        if c.category.is_liability() {
            total_liabilities += c.value;
        } else {
            total_assets += c.value;
            confidence_weighted += c.value.as_decimal() * c.confidence;
            confidence_base += c.value;
        }

        let age = (input.as_of_date - c.last_valuation_date).num_days();
        if age > STALE_VALUATION_DAYS {
            warnings.push(format!(
                "{} ({:?}) last valued {} days before the as-of date",
                display_name(c),
                c.category,
                age
            ));
        }
    }

    let total_adjustments: Money = input.adjustments.iter().map(|a| a.amount).sum();
    total_assets += total_adjustments;
    let net_assets = total_assets - total_liabilities;

    if net_assets.is_negative() {
        warnings.push(format!("Net assets are negative ({net_assets})"));
    }

    let nav_per_share = net_assets.div(input.outstanding_shares, RoundingMode::HalfEven)?;

    let breakdown: Vec<CategoryTotal> = NavCategory::ALL
        .iter()
        .filter_map(|&category| {
            let members: Vec<&NavComponent> = input
                .components
                .iter()
                .filter(|c| c.category == category)
                .collect();
            if members.is_empty() {
                return None;
            }
            Some(CategoryTotal {
                category,
                value: members.iter().map(|c| c.value).sum(),
                count: members.len(),
            })
        })
        .collect();

    let weighted_confidence = if confidence_base.is_positive() {
        Some(confidence_weighted / confidence_base.as_decimal())
    } else {
        None
    };

    let (previous_nav_per_share, change_pct, period_irr) = match &input.previous {
        Some(prev) => {
            let change = if prev.nav_per_share.is_zero() {
                warnings.push("Previous NAV per share is zero; change undefined".into());
                None
            } else {
                Some((nav_per_share - prev.nav_per_share).ratio(prev.nav_per_share)?)
            };
            let irr = period_return(prev, input, net_assets, &mut warnings);
            (Some(prev.nav_per_share), change, irr)
        }
        None => (None, None, None),
    };

    tracing::debug!(
        as_of = %input.as_of_date,
        net_assets = %net_assets,
        nav_per_share = %nav_per_share,
        "nav calculated"
    );

    let output = NavCalculation {
        as_of_date: input.as_of_date,
        total_assets,
        total_liabilities,
        total_adjustments,
        net_assets,
        outstanding_shares: input.outstanding_shares,
        nav_per_share,
        previous_nav_per_share,
        change_pct,
        period_irr,
        breakdown,
        weighted_confidence,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "NAV roll-forward (components + adjustments, per-share at half-even)",
        &serde_json::json!({
            "as_of_date": input.as_of_date,
            "outstanding_shares": input.outstanding_shares.to_string(),
            "components": input.components.len(),
            "adjustments": input.adjustments.len(),
            "stale_valuation_days": STALE_VALUATION_DAYS,
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Investor IRR from the previous NAV to this one: buy in at the previous net
/// assets, apply the period flows, sell out at current net assets.
fn period_return(
    prev: &NavCalculation,
    input: &NavInput,
    net_assets: Money,
    warnings: &mut Vec<String>,
) -> Option<Rate> {
    if prev.as_of_date >= input.as_of_date {
        warnings.push(format!(
            "Previous NAV date {} is not before {}; period return skipped",
            prev.as_of_date, input.as_of_date
        ));
        return None;
    }
    let mut flows = vec![CashFlow::new(prev.as_of_date, -prev.net_assets)];
    flows.extend(
        input
            .period_flows
            .iter()
            .filter(|f| f.date > prev.as_of_date && f.date <= input.as_of_date)
            .cloned(),
    );
    flows.push(CashFlow::new(input.as_of_date, net_assets));
    irr_or_warn(&flows, "NAV period return", warnings)
}

fn display_name(c: &NavComponent) -> &str {
    if c.name.is_empty() {
        "Component"
    } else {
        &c.name
    }
}

fn validate_nav_input(input: &NavInput) -> FundEngineResult<()> {
    if input.outstanding_shares <= Decimal::ZERO {
        return Err(FundEngineError::ZeroOutstandingShares {
            shares: input.outstanding_shares,
        });
    }
    for (i, c) in input.components.iter().enumerate() {
        if c.value.is_negative() {
            return Err(FundEngineError::invalid(
                &format!("components[{i}].value"),
                "Component values are magnitudes; liabilities use the Liability category",
            ));
        }
        if c.confidence < Decimal::ZERO || c.confidence > Decimal::ONE {
            return Err(FundEngineError::invalid(
                &format!("components[{i}].confidence"),
                "Confidence must be between 0 and 1",
            ));
        }
    }
    for (i, a) in input.adjustments.iter().enumerate() {
        let ok = match a.adjustment_type {
            AdjustmentType::UnrealizedGain | AdjustmentType::WriteUp => !a.amount.is_negative(),
            AdjustmentType::UnrealizedLoss | AdjustmentType::WriteDown => !a.amount.is_positive(),
            AdjustmentType::Other => true,
        };
        if !ok {
            return Err(FundEngineError::invalid(
                &format!("adjustments[{i}].amount"),
                format!(
                    "{:?} adjustment has the wrong sign ({})",
                    a.adjustment_type, a.amount
                ),
            ));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
