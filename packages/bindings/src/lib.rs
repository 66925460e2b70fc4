use napi::Result as NapiResult;
use napi_derive::napi;
use serde::de::DeserializeOwned;

use fund_engine_core::FundEngineError;

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

/// Engine errors carry their class so the dashboard can tell a bad input
/// from an undefined IRR or an internal invariant failure.
fn engine_error(e: FundEngineError) -> napi::Error {
    napi::Error::from_reason(format!("{:?}: {}", e.class(), e))
}

fn parse<T: DeserializeOwned>(input_json: &str) -> NapiResult<T> {
    serde_json::from_str(input_json).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Vesting and IRR
// ---------------------------------------------------------------------------

#[napi]
pub fn calculate_vesting(input_json: String) -> NapiResult<String> {
    let input: fund_engine_core::vesting::VestingInput = parse(&input_json)?;
    let output = fund_engine_core::vesting::calculate_vesting(&input).map_err(engine_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn calculate_irr(input_json: String) -> NapiResult<String> {
    let input: fund_engine_core::time_value::IrrInput = parse(&input_json)?;
    let output = fund_engine_core::time_value::calculate_irr(&input).map_err(engine_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Waterfall
// ---------------------------------------------------------------------------

#[napi]
pub fn distribute(input_json: String) -> NapiResult<String> {
    let input: fund_engine_core::waterfall::DistributionInput = parse(&input_json)?;
    let output = fund_engine_core::waterfall::distribute(&input).map_err(engine_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn replay_distributions(input_json: String) -> NapiResult<String> {
    let input: fund_engine_core::waterfall::ReplayInput = parse(&input_json)?;
    let output = fund_engine_core::waterfall::replay_history(&input).map_err(engine_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn accrue_carry(input_json: String) -> NapiResult<String> {
    let input: fund_engine_core::waterfall::CarryAccrualInput = parse(&input_json)?;
    let output = fund_engine_core::waterfall::accrue_carry(&input).map_err(engine_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// NAV and portfolio
// ---------------------------------------------------------------------------

#[napi]
pub fn calculate_nav(input_json: String) -> NapiResult<String> {
    let input: fund_engine_core::nav::NavInput = parse(&input_json)?;
    let output = fund_engine_core::nav::calculate_nav(&input).map_err(engine_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn aggregate_cohorts(input_json: String) -> NapiResult<String> {
    let input: fund_engine_core::cohort::CohortInput = parse(&input_json)?;
    let output = fund_engine_core::cohort::aggregate_cohorts(&input).map_err(engine_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn analyze_concentration(input_json: String) -> NapiResult<String> {
    let input: fund_engine_core::concentration::ConcentrationInput = parse(&input_json)?;
    let output =
        fund_engine_core::concentration::analyze_concentration(&input).map_err(engine_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Fund
// ---------------------------------------------------------------------------

#[napi]
pub fn compute_fund(input_json: String) -> NapiResult<String> {
    let input: fund_engine_core::fund::FundSnapshot = parse(&input_json)?;
    let output = fund_engine_core::fund::compute_fund(&input).map_err(engine_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

/// Takes a JSON array of snapshots; per-fund failures are reported in the
/// returned outcomes rather than rejecting the whole call.
#[napi]
pub fn compute_funds(input_json: String) -> NapiResult<String> {
    let input: Vec<fund_engine_core::fund::FundSnapshot> = parse(&input_json)?;
    let outcomes = fund_engine_core::fund::compute_funds(&input);
    serde_json::to_string(&outcomes).map_err(to_napi_error)
}
