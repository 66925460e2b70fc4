//! Portfolio position records shared by the cohort and concentration analytics.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::FundEngineError;
use crate::types::*;
use crate::FundEngineResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Seed,
    SeriesA,
    SeriesB,
    SeriesC,
    Growth,
    Buyout,
    Other,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Seed => "Seed",
            Stage::SeriesA => "Series A",
            Stage::SeriesB => "Series B",
            Stage::SeriesC => "Series C",
            Stage::Growth => "Growth",
            Stage::Buyout => "Buyout",
            Stage::Other => "Other",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionStatus {
    Active,
    PartiallyExited,
    Exited,
    WrittenOff,
}

impl PositionStatus {
    /// Fully realized: nothing left to value.
    pub fn is_exited(self) -> bool {
        matches!(self, PositionStatus::Exited | PositionStatus::WrittenOff)
    }
}

/// A single portfolio company holding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub name: String,
    /// Total cost basis
    pub invested: Money,
    /// Total value: realized proceeds plus remaining fair value
    pub current_value: Money,
    /// Proceeds already received
    #[serde(default)]
    pub realized_value: Money,
    pub status: PositionStatus,
    pub investment_date: NaiveDate,
    #[serde(default)]
    pub exit_date: Option<NaiveDate>,
    pub vintage: i32,
    pub sector: String,
    pub stage: Stage,
    /// Dated flows (negative = invested). Synthesized from the summary
    /// fields when empty.
    #[serde(default)]
    pub cash_flows: Vec<CashFlow>,
}

impl Position {
    /// Remaining fair value not yet realized.
    pub fn unrealized_value(&self) -> Money {
        (self.current_value - self.realized_value).non_negative()
    }

    pub fn validate(&self) -> FundEngineResult<()> {
        let field = |name: &str| format!("positions[{}].{name}", self.id);
        if self.invested.is_negative() {
            return Err(FundEngineError::invalid(
                &field("invested"),
                "Invested amount cannot be negative",
            ));
        }
        if self.current_value.is_negative() {
            return Err(FundEngineError::invalid(
                &field("current_value"),
                "Current value cannot be negative",
            ));
        }
        if self.realized_value.is_negative() || self.realized_value > self.current_value {
            return Err(FundEngineError::invalid(
                &field("realized_value"),
                format!(
                    "Realized value {} must be between 0 and current value {}",
                    self.realized_value, self.current_value
                ),
            ));
        }
        if let Some(exit) = self.exit_date {
            if exit < self.investment_date {
                return Err(FundEngineError::invalid(
                    &field("exit_date"),
                    "Exit date precedes investment date",
                ));
            }
        }
        Ok(())
    }

    /// Dated flows for IRR: the recorded flows, or cost out on the investment
    /// date, proceeds in on the exit date (as-of if none) and remaining value
    /// in on the as-of date.
    pub fn flows(&self, as_of: NaiveDate) -> Vec<CashFlow> {
        if !self.cash_flows.is_empty() {
            let mut flows = self.cash_flows.clone();
            let unrealized = self.unrealized_value();
            if !unrealized.is_zero() {
                flows.push(CashFlow::new(as_of, unrealized));
            }
            return flows;
        }

        let mut flows = vec![CashFlow::new(self.investment_date, -self.invested)];
        if !self.realized_value.is_zero() {
            flows.push(CashFlow::new(
                self.exit_date.unwrap_or(as_of),
                self.realized_value,
            ));
        }
        let unrealized = self.unrealized_value();
        if !unrealized.is_zero() {
            flows.push(CashFlow::new(as_of, unrealized));
        }
        flows
    }
}

/// Dimension positions are grouped by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupBy {
    Company,
    #[default]
    Vintage,
    Sector,
    Stage,
}

impl GroupBy {
    pub fn key(self, position: &Position) -> String {
        match self {
            GroupBy::Company => position.name.clone(),
            GroupBy::Vintage => position.vintage.to_string(),
            GroupBy::Sector => position.sector.clone(),
            GroupBy::Stage => position.stage.to_string(),
        }
    }
}

/// Group positions by key, keeping groups in order of first appearance.
pub fn group_positions(positions: &[Position], group_by: GroupBy) -> Vec<(String, Vec<&Position>)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<&Position>)> = Vec::new();

    for p in positions {
        let key = group_by.key(p);
        match index.get(&key) {
            Some(&i) => groups[i].1.push(p),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![p]));
            }
        }
    }
    groups
}
