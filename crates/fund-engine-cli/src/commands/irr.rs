use chrono::NaiveDate;
use clap::Args;
use serde_json::Value;

use fund_engine_core::time_value::{self, IrrInput};
use fund_engine_core::{CashFlow, Money};

use crate::input;

/// Arguments for a standalone XIRR
#[derive(Args)]
pub struct IrrArgs {
    /// Path to JSON input file (overrides --flows)
    #[arg(long)]
    pub input: Option<String>,

    /// Dated flows, e.g. "2021-01-01:-1000000,2024-06-30:1800000"
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub flows: Option<Vec<String>>,
}

pub fn run_irr(args: IrrArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let irr_input: IrrInput = match args.flows {
        Some(ref flows) if args.input.is_none() => IrrInput {
            cash_flows: flows
                .iter()
                .map(|f| parse_flow(f))
                .collect::<Result<Vec<_>, _>>()?,
        },
        _ => input::read_input(args.input.as_deref())?,
    };

    let result = time_value::calculate_irr(&irr_input)?;
    Ok(serde_json::to_value(result)?)
}

fn parse_flow(raw: &str) -> Result<CashFlow, Box<dyn std::error::Error>> {
    let (date, amount) = raw
        .trim()
        .split_once(':')
        .ok_or_else(|| format!("expected DATE:AMOUNT, got '{raw}'"))?;
    let date: NaiveDate = date.parse()?;
    let amount: Money = amount.parse()?;
    Ok(CashFlow::new(date, amount))
}
