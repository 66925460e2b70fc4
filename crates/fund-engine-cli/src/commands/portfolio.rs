use clap::{Args, ValueEnum};
use serde_json::Value;

use fund_engine_core::cohort::{self, CohortInput};
use fund_engine_core::concentration::{self, ConcentrationInput};
use fund_engine_core::positions::GroupBy;

use crate::input;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum GroupByArg {
    Company,
    Vintage,
    Sector,
    Stage,
}

impl From<GroupByArg> for GroupBy {
    fn from(g: GroupByArg) -> Self {
        match g {
            GroupByArg::Company => GroupBy::Company,
            GroupByArg::Vintage => GroupBy::Vintage,
            GroupByArg::Sector => GroupBy::Sector,
            GroupByArg::Stage => GroupBy::Stage,
        }
    }
}

#[derive(Args)]
pub struct CohortArgs {
    #[arg(long)]
    pub input: Option<String>,

    /// Override the grouping dimension from the input file
    #[arg(long, value_enum)]
    pub group_by: Option<GroupByArg>,
}

#[derive(Args)]
pub struct ConcentrationArgs {
    #[arg(long)]
    pub input: Option<String>,

    /// Override the grouping dimension from the input file
    #[arg(long, value_enum)]
    pub group_by: Option<GroupByArg>,
}

pub fn run_cohorts(args: CohortArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut cohort_input: CohortInput = input::read_input(args.input.as_deref())?;
    if let Some(group_by) = args.group_by {
        cohort_input.group_by = group_by.into();
    }
    let result = cohort::aggregate_cohorts(&cohort_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_concentration(args: ConcentrationArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut concentration_input: ConcentrationInput = input::read_input(args.input.as_deref())?;
    if let Some(group_by) = args.group_by {
        concentration_input.group_by = group_by.into();
    }
    let result = concentration::analyze_concentration(&concentration_input)?;
    Ok(serde_json::to_value(result)?)
}
