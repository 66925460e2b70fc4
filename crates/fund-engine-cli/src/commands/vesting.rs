use chrono::NaiveDate;
use clap::{Args, ValueEnum};
use serde_json::Value;

use fund_engine_core::vesting::{self, AccelerationTrigger, VestingInput, VestingSchedule};
use fund_engine_core::Money;

use crate::input;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum TriggerArg {
    Exit,
    Ipo,
    ChangeOfControl,
}

impl From<TriggerArg> for AccelerationTrigger {
    fn from(t: TriggerArg) -> Self {
        match t {
            TriggerArg::Exit => AccelerationTrigger::Exit,
            TriggerArg::Ipo => AccelerationTrigger::Ipo,
            TriggerArg::ChangeOfControl => AccelerationTrigger::ChangeOfControl,
        }
    }
}

/// Arguments for a carry vesting report
#[derive(Args)]
pub struct VestingArgs {
    /// Path to JSON input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Cliff in months (0 with no --total-months means immediate vesting)
    #[arg(long)]
    pub cliff_months: Option<i32>,

    /// Total vesting period in months; omit for a pure cliff
    #[arg(long)]
    pub total_months: Option<i32>,

    /// Grant date (YYYY-MM-DD)
    #[arg(long)]
    pub grant_date: Option<NaiveDate>,

    /// As-of date (YYYY-MM-DD)
    #[arg(long)]
    pub as_of: Option<NaiveDate>,

    /// Carry amount to split into vested and unvested parts
    #[arg(long)]
    pub carry: Option<Money>,

    /// Acceleration event that has occurred
    #[arg(long, value_enum)]
    pub triggered: Option<TriggerArg>,
}

pub fn run_vesting(args: VestingArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let vesting_input: VestingInput = if args.input.is_some() || args.grant_date.is_none() {
        input::read_input(args.input.as_deref())?
    } else {
        let grant_date = args
            .grant_date
            .ok_or("--grant-date is required (or provide --input)")?;
        let as_of_date = args.as_of.ok_or("--as-of is required (or provide --input)")?;

        let schedule = match (args.cliff_months, args.total_months) {
            (None, None) | (Some(0), None) => VestingSchedule::immediate(),
            (Some(cliff), None) => VestingSchedule::cliff(cliff),
            (cliff, Some(total)) => VestingSchedule::graded(cliff.unwrap_or(0), total),
        };

        VestingInput {
            schedule,
            grant_date,
            as_of_date,
            triggered: args.triggered.map(Into::into),
            carry_amount: args.carry,
            timeline_months: None,
        }
    };

    let result = vesting::calculate_vesting(&vesting_input)?;
    Ok(serde_json::to_value(result)?)
}
