use clap::Args;
use colored::Colorize;
use serde_json::{json, Value};

use fund_engine_core::fund::{self, FundSnapshot};

use crate::input;

#[derive(Args)]
pub struct FundArgs {
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for a batch recomputation over many funds
#[derive(Args)]
pub struct BatchArgs {
    /// JSON file holding an array of fund snapshots
    #[arg(long)]
    pub input: Option<String>,

    /// Exit non-zero when any fund fails
    #[arg(long)]
    pub strict: bool,
}

pub fn run_fund(args: FundArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let snapshot: FundSnapshot = input::read_input(args.input.as_deref())?;
    let result = fund::compute_fund(&snapshot)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_batch(args: BatchArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let snapshots: Vec<FundSnapshot> = input::read_input(args.input.as_deref())?;
    let outcomes = fund::compute_funds(&snapshots);

    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
    let rows: Vec<Value> = outcomes
        .iter()
        .map(|o| match (&o.output, &o.error) {
            (Some(out), _) => json!({
                "fund_id": o.fund_id,
                "status": "ok",
                "nav_per_share": out.result.nav.nav_per_share,
                "net_assets": out.result.nav.net_assets,
                "accrued_carry": out.result.carry.accrued_carry,
                "irr": out.result.carry.irr,
                "warnings": out.warnings.len(),
                "error": Value::Null,
            }),
            (None, err) => json!({
                "fund_id": o.fund_id,
                "status": "failed",
                "nav_per_share": Value::Null,
                "net_assets": Value::Null,
                "accrued_carry": Value::Null,
                "irr": Value::Null,
                "warnings": 0,
                "error": err.as_ref().map(|e| format!("{:?}: {}", e.class, e.message)),
            }),
        })
        .collect();

    for o in outcomes.iter().filter(|o| !o.is_ok()) {
        if let Some(ref e) = o.error {
            eprintln!("{} {}: {}", "failed".yellow().bold(), o.fund_id, e.message);
        }
    }

    if args.strict && failed > 0 {
        return Err(format!("{failed} of {} funds failed", outcomes.len()).into());
    }

    Ok(json!({
        "result": {
            "funds": outcomes.len(),
            "succeeded": outcomes.len() - failed,
            "failed": failed,
        },
        "results": rows,
        "outcomes": outcomes,
    }))
}
