use clap::Args;
use serde_json::Value;

use fund_engine_core::waterfall::{
    self, CarryAccrualInput, DistributionAction, DistributionInput, ReplayInput,
};

use crate::input;

#[derive(Args)]
pub struct DistributeArgs {
    #[arg(long)]
    pub input: Option<String>,

    /// Record the distribution (advance distributed carry) instead of previewing it
    #[arg(long)]
    pub record: bool,
}

#[derive(Args)]
pub struct ReplayArgs {
    #[arg(long)]
    pub input: Option<String>,
}

#[derive(Args)]
pub struct CarryArgs {
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_distribute(args: DistributeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut distribution_input: DistributionInput = input::read_input(args.input.as_deref())?;
    if args.record {
        distribution_input.distribution.action = DistributionAction::Record;
    }
    let result = waterfall::distribute(&distribution_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_replay(args: ReplayArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let replay_input: ReplayInput = input::read_input(args.input.as_deref())?;
    let result = waterfall::replay_history(&replay_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_carry(args: CarryArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let carry_input: CarryAccrualInput = input::read_input(args.input.as_deref())?;
    let result = waterfall::accrue_carry(&carry_input)?;
    Ok(serde_json::to_value(result)?)
}
