use clap::Args;
use serde_json::Value;

use fund_engine_core::nav::{self, NavInput};

use crate::input;

#[derive(Args)]
pub struct NavArgs {
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_nav(args: NavArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let nav_input: NavInput = input::read_input(args.input.as_deref())?;
    let result = nav::calculate_nav(&nav_input)?;
    Ok(serde_json::to_value(result)?)
}
