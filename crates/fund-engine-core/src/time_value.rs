use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::FundEngineError;
use crate::types::{with_metadata, CashFlow, ComputationOutput, Money, Multiple, Rate, RoundingMode};
use crate::FundEngineResult;

const CONVERGENCE_THRESHOLD: Decimal = dec!(0.0000001);
const MAX_IRR_ITERATIONS: u32 = 100;
const INITIAL_GUESS: Rate = dec!(0.10);
const RATE_FLOOR: Rate = dec!(-0.99);
const RATE_CEILING: Rate = dec!(100);
const DAYS_PER_YEAR: Decimal = dec!(365);
/// exp() beyond this magnitude leaves the Decimal range.
const EXP_LIMIT: Decimal = dec!(60);

/// Rates probed, in order, when looking for a sign change to bisect.
const BRACKET_GRID: [Rate; 16] = [
    dec!(-0.99),
    dec!(-0.9),
    dec!(-0.75),
    dec!(-0.5),
    dec!(-0.25),
    dec!(0),
    dec!(0.1),
    dec!(0.25),
    dec!(0.5),
    dec!(1),
    dec!(2),
    dec!(5),
    dec!(10),
    dec!(25),
    dec!(50),
    dec!(100),
];

/// ACT/365 year fraction between two dates (negative if `to` precedes `from`).
pub fn year_fraction(from: NaiveDate, to: NaiveDate) -> Decimal {
    Decimal::from((to - from).num_days()) / DAYS_PER_YEAR
}

/// (1 + rate)^years, or None when it leaves the representable range.
fn growth_factor(rate: Rate, years: Decimal) -> Option<Decimal> {
    let base = Decimal::ONE + rate;
    if base <= Decimal::ZERO {
        return None;
    }
    if years.is_zero() || rate.is_zero() {
        return Some(Decimal::ONE);
    }
    // Whole years compound exactly
    if years.fract().is_zero() {
        if let Some(n) = years.abs().to_u64().filter(|n| *n <= 200) {
            let factor = base.checked_powu(n)?;
            return if years.is_sign_negative() {
                Decimal::ONE.checked_div(factor)
            } else {
                Some(factor)
            };
        }
    }
    let exponent = years.checked_mul(base.checked_ln()?)?;
    if exponent < -EXP_LIMIT {
        return Some(Decimal::ZERO);
    }
    if exponent > EXP_LIMIT {
        return None;
    }
    exponent.checked_exp()
}

/// Compound `amount` at `rate` from `from` to `to`.
pub fn accrete(amount: Money, rate: Rate, from: NaiveDate, to: NaiveDate) -> FundEngineResult<Money> {
    let factor = growth_factor(rate, year_fraction(from, to)).ok_or_else(|| {
        FundEngineError::invalid(
            "rate",
            format!("growth factor at {rate} from {from} to {to} is out of range"),
        )
    })?;
    Ok(amount.mul_rate(factor, RoundingMode::HalfEven))
}

fn base_date(flows: &[CashFlow]) -> Option<NaiveDate> {
    flows.iter().map(|cf| cf.date).min()
}

/// NPV and its derivative with respect to the rate, discounting each flow to
/// the earliest date in the set. None when any term leaves the Decimal range
/// (deep-loss rates over long horizons).
fn xnpv_with_derivative(rate: Rate, flows: &[CashFlow]) -> Option<(Decimal, Decimal)> {
    let base = base_date(flows)?;
    let one_plus_r = Decimal::ONE + rate;
    let mut npv_val = Decimal::ZERO;
    let mut dnpv = Decimal::ZERO;

    for cf in flows {
        let years = year_fraction(base, cf.date);
        let discount = growth_factor(rate, -years)?;
        let pv = cf.amount.as_decimal().checked_mul(discount)?;
        npv_val = npv_val.checked_add(pv)?;
        let slope = years.checked_mul(pv)?.checked_div(one_plus_r)?;
        dnpv = dnpv.checked_sub(slope)?;
    }

    Some((npv_val, dnpv))
}

/// Net present value of dated flows at `rate`.
pub fn xnpv(rate: Rate, flows: &[CashFlow]) -> FundEngineResult<Decimal> {
    if rate <= dec!(-1) {
        return Err(FundEngineError::invalid(
            "rate",
            "Discount rate must be greater than -100%",
        ));
    }
    if flows.is_empty() {
        return Ok(Decimal::ZERO);
    }
    xnpv_with_derivative(rate, flows)
        .map(|(v, _)| v)
        .ok_or_else(|| FundEngineError::invalid("rate", format!("NPV at {rate} is out of range")))
}

/// d(XNPV)/d(rate) at `rate`.
pub fn xnpv_derivative(rate: Rate, flows: &[CashFlow]) -> FundEngineResult<Decimal> {
    if rate <= dec!(-1) {
        return Err(FundEngineError::invalid(
            "rate",
            "Discount rate must be greater than -100%",
        ));
    }
    if flows.is_empty() {
        return Ok(Decimal::ZERO);
    }
    xnpv_with_derivative(rate, flows)
        .map(|(_, d)| d)
        .ok_or_else(|| FundEngineError::invalid("rate", format!("NPV at {rate} is out of range")))
}

/// Annualised internal rate of return for irregular dated cash flows.
///
/// Newton-Raphson from 10%; if an iterate leaves (-99%, 10000%] or the
/// derivative vanishes, falls back to bisection over the first sign change in
/// a fixed rate grid. Flows that never change sign have no root and fail with
/// `NoConvergence`, which callers report as an undefined IRR.
pub fn solve_irr(flows: &[CashFlow]) -> FundEngineResult<Rate> {
    if flows.len() < 2 {
        return Err(FundEngineError::InsufficientData(
            "IRR requires at least 2 cash flows".into(),
        ));
    }

    let has_inflow = flows.iter().any(|cf| cf.amount.is_positive());
    let has_outflow = flows.iter().any(|cf| cf.amount.is_negative());
    if !(has_inflow && has_outflow) {
        return Err(FundEngineError::NoConvergence {
            function: "XIRR".into(),
            iterations: 0,
            last_delta: Decimal::ZERO,
        });
    }

    match newton(flows) {
        Some(rate) => Ok(rate),
        None => {
            tracing::debug!("XIRR Newton-Raphson failed, falling back to bisection");
            bisection(flows)
        }
    }
}

fn newton(flows: &[CashFlow]) -> Option<Rate> {
    let mut rate = INITIAL_GUESS;

    for _ in 0..MAX_IRR_ITERATIONS {
        let (npv_val, dnpv) = xnpv_with_derivative(rate, flows)?;

        if npv_val.abs() < CONVERGENCE_THRESHOLD {
            return Some(rate);
        }
        if dnpv.is_zero() {
            return None;
        }

        let next = rate.checked_sub(npv_val.checked_div(dnpv)?)?;
        if next <= RATE_FLOOR || next > RATE_CEILING {
            return None;
        }
        rate = next;
    }

    None
}

fn bisection(flows: &[CashFlow]) -> FundEngineResult<Rate> {
    let samples: Vec<(Rate, Decimal)> = BRACKET_GRID
        .iter()
        .filter_map(|r| xnpv_with_derivative(*r, flows).map(|(v, _)| (*r, v)))
        .collect();

    if let Some((r, _)) = samples
        .iter()
        .find(|(_, v)| v.abs() < CONVERGENCE_THRESHOLD)
    {
        return Ok(*r);
    }

    let bracket = samples
        .windows(2)
        .find(|w| w[0].1.is_sign_negative() != w[1].1.is_sign_negative());

    let Some(pair) = bracket else {
        return Err(FundEngineError::NoConvergence {
            function: "XIRR".into(),
            iterations: MAX_IRR_ITERATIONS,
            last_delta: samples.last().map(|s| s.1).unwrap_or(Decimal::ZERO),
        });
    };

    let (mut lo, mut npv_lo) = pair[0];
    let (mut hi, _) = pair[1];
    let mut last = npv_lo;

    for _ in 0..MAX_IRR_ITERATIONS {
        let mid = (lo + hi) / dec!(2);
        let Some((npv_mid, _)) = xnpv_with_derivative(mid, flows) else {
            break;
        };
        last = npv_mid;
        if npv_mid.abs() < CONVERGENCE_THRESHOLD || (hi - lo).abs() < dec!(0.000000000000000001) {
            return Ok(mid);
        }
        if npv_mid.is_sign_negative() == npv_lo.is_sign_negative() {
            lo = mid;
            npv_lo = npv_mid;
        } else {
            hi = mid;
        }
    }

    Err(FundEngineError::NoConvergence {
        function: "XIRR".into(),
        iterations: MAX_IRR_ITERATIONS,
        last_delta: last,
    })
}

/// IRR as an optional value: non-convergence becomes `None` plus a warning.
pub fn irr_or_warn(flows: &[CashFlow], context: &str, warnings: &mut Vec<String>) -> Option<Rate> {
    match solve_irr(flows) {
        Ok(r) => Some(r),
        Err(e) => {
            tracing::warn!(context, error = %e, "IRR undefined");
            warnings.push(format!("{context}: IRR undefined ({e})"));
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Standalone IRR report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrrInput {
    pub cash_flows: Vec<CashFlow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrrOutput {
    pub irr: Rate,
    pub npv_at_irr: Decimal,
    pub total_paid_in: Money,
    pub total_paid_out: Money,
    /// Paid out over paid in; None when nothing was paid in.
    pub moic: Option<Multiple>,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
}

/// XIRR of a dated cash-flow series. Non-convergence is returned as an error.
pub fn calculate_irr(input: &IrrInput) -> FundEngineResult<ComputationOutput<IrrOutput>> {
    let start = Instant::now();
    let flows = &input.cash_flows;

    let irr = solve_irr(flows)?;
    let npv_at_irr = xnpv(irr, flows)?;

    let total_paid_in: Money = flows
        .iter()
        .filter(|f| f.amount.is_negative())
        .map(|f| f.amount.abs())
        .sum();
    let total_paid_out: Money = flows
        .iter()
        .filter(|f| f.amount.is_positive())
        .map(|f| f.amount)
        .sum();
    let moic = if total_paid_in.is_zero() {
        None
    } else {
        Some(total_paid_out.ratio(total_paid_in)?)
    };

    let (first_date, last_date) = match (
        flows.iter().map(|f| f.date).min(),
        flows.iter().map(|f| f.date).max(),
    ) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(FundEngineError::InsufficientData("no cash flows".into())),
    };

    let output = IrrOutput {
        irr,
        npv_at_irr,
        total_paid_in,
        total_paid_out,
        moic,
        first_date,
        last_date,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "XIRR (Newton-Raphson with bisection fallback, ACT/365)",
        &serde_json::json!({ "flow_count": flows.len() }),
        Vec::new(),
        elapsed,
        output,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn cf(date: NaiveDate, amount: &str) -> CashFlow {
        CashFlow::new(date, amount.parse().unwrap())
    }

    #[test]
    fn test_xnpv_zero_rate_is_plain_sum() {
        let flows = vec![
            cf(d(2020, 1, 1), "-100"),
            cf(d(2021, 1, 1), "50"),
            cf(d(2022, 1, 1), "75"),
        ];
        assert_eq!(xnpv(Decimal::ZERO, &flows).unwrap(), dec!(25));
    }

    #[test]
    fn test_irr_one_year_doubling() {
        let flows = vec![cf(d(2021, 1, 1), "-1000"), cf(d(2022, 1, 1), "2000")];
        let r = solve_irr(&flows).unwrap();
        assert!((r - dec!(1.0)).abs() < dec!(0.000001), "got {r}");
    }

    #[test]
    fn test_irr_ten_percent() {
        // 365-day years: -100 then +110 one year later => 10%
        let flows = vec![cf(d(2021, 1, 1), "-100"), cf(d(2022, 1, 1), "110")];
        let r = solve_irr(&flows).unwrap();
        assert!((r - dec!(0.10)).abs() < dec!(0.000001), "got {r}");
    }

    #[test]
    fn test_irr_negative_return() {
        let flows = vec![cf(d(2021, 1, 1), "-100"), cf(d(2022, 1, 1), "60")];
        let r = solve_irr(&flows).unwrap();
        assert!((r - dec!(-0.40)).abs() < dec!(0.000001), "got {r}");
    }

    #[test]
    fn test_irr_root_zeroes_npv() {
        let flows = vec![
            cf(d(2019, 3, 15), "-5000000"),
            cf(d(2020, 6, 30), "-2500000"),
            cf(d(2022, 1, 10), "1500000"),
            cf(d(2024, 9, 1), "9000000"),
        ];
        let r = solve_irr(&flows).unwrap();
        let npv = xnpv(r, &flows).unwrap();
        assert!(npv.abs() < dec!(0.0001), "npv {npv} at {r}");
    }

    #[test]
    fn test_irr_same_sign_fails() {
        let flows = vec![cf(d(2021, 1, 1), "100"), cf(d(2022, 1, 1), "100")];
        let err = solve_irr(&flows).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_irr_needs_two_flows() {
        let flows = vec![cf(d(2021, 1, 1), "-100")];
        assert!(matches!(
            solve_irr(&flows).unwrap_err(),
            FundEngineError::InsufficientData(_)
        ));
    }

    #[test]
    fn test_irr_total_loss_bisection() {
        // Tiny recovery far in the future pushes Newton out of range
        let flows = vec![cf(d(2010, 1, 1), "-1000000"), cf(d(2020, 1, 1), "1")];
        let r = solve_irr(&flows).unwrap();
        assert!(r < dec!(-0.7) && r > dec!(-0.99), "got {r}");
    }

    #[test]
    fn test_accrete_one_year() {
        let grown = accrete("1000".parse().unwrap(), dec!(0.08), d(2021, 1, 1), d(2022, 1, 1)).unwrap();
        assert_eq!(grown, "1080".parse::<Money>().unwrap());
    }

    #[test]
    fn test_accrete_two_years_compounds() {
        // 2022 and 2023 are both 365-day years
        let grown = accrete("1000".parse().unwrap(), dec!(0.08), d(2022, 1, 1), d(2024, 1, 1)).unwrap();
        let expected: Money = "1166.4".parse().unwrap();
        assert!((grown - expected).abs() < "0.000010".parse().unwrap(), "got {grown}");
    }

    #[test]
    fn test_irr_or_warn_collects_warning() {
        let flows = vec![cf(d(2021, 1, 1), "100"), cf(d(2022, 1, 1), "100")];
        let mut warnings = Vec::new();
        assert!(irr_or_warn(&flows, "cohort 2021", &mut warnings).is_none());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("cohort 2021"));
    }

    #[test]
    fn test_irr_long_horizon_total_loss_does_not_overflow() {
        // At the -99% grid point the discount factor is ~1e26 over 13 years
        let flows = vec![cf(d(2000, 1, 1), "-1000000000"), cf(d(2013, 1, 1), "1")];
        match solve_irr(&flows) {
            Ok(r) => assert!(r > dec!(-1) && r < dec!(-0.5), "got {r}"),
            Err(e) => assert!(e.is_recoverable(), "unexpected {e}"),
        }
    }

    #[test]
    fn test_irr_small_late_recoveries_do_not_overflow() {
        let flows = vec![
            cf(d(2000, 1, 1), "-50000000"),
            cf(d(2012, 6, 1), "10000"),
            cf(d(2012, 7, 1), "10000"),
        ];
        match solve_irr(&flows) {
            Ok(r) => assert!(r > dec!(-1) && r < dec!(-0.4), "got {r}"),
            Err(e) => assert!(e.is_recoverable(), "unexpected {e}"),
        }
    }

    #[test]
    fn test_xnpv_out_of_range_is_an_error() {
        let flows = vec![cf(d(2000, 1, 1), "-1000000000"), cf(d(2013, 1, 1), "1")];
        assert!(xnpv(dec!(-0.99), &flows).is_err());
    }

    #[test]
    fn test_xnpv_derivative_negative_for_investment() {
        // Outflow first, inflow later: NPV falls as the rate rises
        let flows = vec![cf(d(2021, 1, 1), "-100"), cf(d(2022, 1, 1), "110")];
        assert!(xnpv_derivative(dec!(0.05), &flows).unwrap() < Decimal::ZERO);
    }

    #[test]
    fn test_calculate_irr_report() {
        let input = IrrInput {
            cash_flows: vec![
                cf(d(2021, 1, 1), "-100"),
                cf(d(2022, 1, 1), "60"),
                cf(d(2022, 1, 1), "50"),
            ],
        };
        let out = calculate_irr(&input).unwrap().result;
        assert!((out.irr - dec!(0.10)).abs() < dec!(0.000001));
        assert_eq!(out.total_paid_in, "100".parse::<Money>().unwrap());
        assert_eq!(out.moic, Some(dec!(1.1)));
        assert_eq!(out.last_date, d(2022, 1, 1));
    }
}
