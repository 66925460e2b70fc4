//! Carried-interest vesting.
//!
//! A schedule is one of three shapes (immediate, cliff, graded) plus the set of
//! liquidity events that accelerate it to fully vested. Elapsed time is counted
//! in whole calendar months from the grant date; a month is complete on the
//! same day-of-month (clamped to month end, so Jan 31 + 1 month = Feb 28/29).

use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::FundEngineError;
use crate::types::*;
use crate::FundEngineResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Liquidity events that can accelerate vesting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccelerationTrigger {
    Exit,
    Ipo,
    ChangeOfControl,
}

/// Shape of the vesting curve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum VestingKind {
    /// Fully vested at grant.
    Immediate,
    /// Nothing until `months`, everything after.
    Cliff { months: i32 },
    /// Nothing before `cliff_months`, then linear to 1.0 at `total_months`.
    Graded { cliff_months: i32, total_months: i32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VestingSchedule {
    pub kind: VestingKind,
    /// Events that vest everything immediately when they occur.
    #[serde(default)]
    pub acceleration: Vec<AccelerationTrigger>,
}

impl VestingSchedule {
    pub fn immediate() -> Self {
        Self {
            kind: VestingKind::Immediate,
            acceleration: Vec::new(),
        }
    }

    pub fn cliff(months: i32) -> Self {
        Self {
            kind: VestingKind::Cliff { months },
            acceleration: Vec::new(),
        }
    }

    pub fn graded(cliff_months: i32, total_months: i32) -> Self {
        Self {
            kind: VestingKind::Graded {
                cliff_months,
                total_months,
            },
            acceleration: Vec::new(),
        }
    }

    pub fn with_acceleration(mut self, trigger: AccelerationTrigger) -> Self {
        if !self.acceleration.contains(&trigger) {
            self.acceleration.push(trigger);
        }
        self
    }

    pub fn validate(&self) -> FundEngineResult<()> {
        match self.kind {
            VestingKind::Immediate => Ok(()),
            VestingKind::Cliff { months } if months < 0 => Err(FundEngineError::InvalidSchedule {
                reason: format!("cliff months must be non-negative, got {months}"),
            }),
            VestingKind::Cliff { .. } => Ok(()),
            VestingKind::Graded {
                cliff_months,
                total_months,
            } => {
                if cliff_months < 0 || total_months < 0 {
                    return Err(FundEngineError::InvalidSchedule {
                        reason: format!(
                            "months must be non-negative, got cliff {cliff_months} / total {total_months}"
                        ),
                    });
                }
                if cliff_months > total_months {
                    return Err(FundEngineError::InvalidSchedule {
                        reason: format!(
                            "cliff ({cliff_months}) exceeds total vesting period ({total_months})"
                        ),
                    });
                }
                Ok(())
            }
        }
    }

    /// Month at which the schedule reaches 1.0 without acceleration.
    pub fn full_vesting_month(&self) -> i32 {
        match self.kind {
            VestingKind::Immediate => 0,
            VestingKind::Cliff { months } => months,
            VestingKind::Graded { total_months, .. } => total_months,
        }
    }
}

/// Whole calendar months from `grant` to `as_of`; zero if `as_of` precedes it.
pub fn elapsed_months(grant: NaiveDate, as_of: NaiveDate) -> i32 {
    use chrono::Datelike;

    if as_of <= grant {
        return 0;
    }
    let raw = (as_of.year() - grant.year()) * 12 + as_of.month() as i32 - grant.month() as i32;
    let mut months = raw.max(0);
    while months > 0 {
        match grant.checked_add_months(Months::new(months as u32)) {
            Some(d) if d <= as_of => break,
            _ => months -= 1,
        }
    }
    months
}

/// Vested fraction in [0, 1].
///
/// `triggered` names a liquidity event that has occurred; it vests everything
/// only when the schedule lists that trigger.
pub fn vested_fraction(
    schedule: &VestingSchedule,
    grant: NaiveDate,
    as_of: NaiveDate,
    triggered: Option<AccelerationTrigger>,
) -> FundEngineResult<Rate> {
    schedule.validate()?;

    if let Some(t) = triggered {
        if schedule.acceleration.contains(&t) {
            return Ok(Decimal::ONE);
        }
    }

    let elapsed = elapsed_months(grant, as_of);

    let fraction = match schedule.kind {
        VestingKind::Immediate => Decimal::ONE,
        VestingKind::Cliff { months } => {
            if elapsed >= months {
                Decimal::ONE
            } else {
                Decimal::ZERO
            }
        }
        VestingKind::Graded {
            cliff_months,
            total_months,
        } => {
            if elapsed < cliff_months {
                Decimal::ZERO
            } else if elapsed >= total_months {
                Decimal::ONE
            } else {
                // cliff < elapsed < total here, so the span is positive
                let ramp = Decimal::from(elapsed - cliff_months)
                    / Decimal::from(total_months - cliff_months);
                ramp.clamp(Decimal::ZERO, Decimal::ONE)
            }
        }
    };

    Ok(fraction)
}

// ---------------------------------------------------------------------------
// Vesting report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VestingInput {
    pub schedule: VestingSchedule,
    pub grant_date: NaiveDate,
    pub as_of_date: NaiveDate,
    #[serde(default)]
    pub triggered: Option<AccelerationTrigger>,
    /// Carry amount to split into vested / unvested.
    #[serde(default)]
    pub carry_amount: Option<Money>,
    /// Months of timeline to emit (defaults to the full vesting period).
    #[serde(default)]
    pub timeline_months: Option<u32>,
}

/// One month on the vesting curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VestingPoint {
    pub month: u32,
    pub date: NaiveDate,
    pub vested_fraction: Rate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VestingOutput {
    pub elapsed_months: i32,
    pub vested_fraction: Rate,
    pub accelerated: bool,
    pub vested_amount: Option<Money>,
    pub unvested_amount: Option<Money>,
    pub fully_vested_date: NaiveDate,
    pub timeline: Vec<VestingPoint>,
}

/// Month-by-month vested fraction from the grant date, without acceleration.
pub fn vesting_timeline(
    schedule: &VestingSchedule,
    grant: NaiveDate,
    months: u32,
) -> FundEngineResult<Vec<VestingPoint>> {
    schedule.validate()?;
    (0..=months)
        .map(|month| {
            let date = grant
                .checked_add_months(Months::new(month))
                .ok_or_else(|| FundEngineError::invalid("timeline_months", "date out of range"))?;
            Ok(VestingPoint {
                month,
                date,
                vested_fraction: vested_fraction(schedule, grant, date, None)?,
            })
        })
        .collect()
}

/// Vested state of a carry grant at a date, with its vesting curve.
pub fn calculate_vesting(input: &VestingInput) -> FundEngineResult<ComputationOutput<VestingOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let fraction = vested_fraction(
        &input.schedule,
        input.grant_date,
        input.as_of_date,
        input.triggered,
    )?;
    let unaccelerated = vested_fraction(&input.schedule, input.grant_date, input.as_of_date, None)?;
    let accelerated = fraction > unaccelerated;

    if let Some(t) = input.triggered {
        if !input.schedule.acceleration.contains(&t) {
            warnings.push(format!(
                "{t:?} occurred but the schedule does not accelerate on it"
            ));
        }
    }

    let (vested_amount, unvested_amount) = match input.carry_amount {
        Some(amount) => {
            if amount.is_negative() {
                return Err(FundEngineError::invalid(
                    "carry_amount",
                    "Carry amount cannot be negative",
                ));
            }
            let (vested, unvested) = amount.split(fraction, RoundingMode::HalfEven);
            (Some(vested), Some(unvested))
        }
        None => (None, None),
    };

    let full_month = input.schedule.full_vesting_month().max(0) as u32;
    let fully_vested_date = input
        .grant_date
        .checked_add_months(Months::new(full_month))
        .ok_or_else(|| FundEngineError::invalid("schedule", "vesting end date out of range"))?;
    let timeline = vesting_timeline(
        &input.schedule,
        input.grant_date,
        input.timeline_months.unwrap_or(full_month),
    )?;

    let output = VestingOutput {
        elapsed_months: elapsed_months(input.grant_date, input.as_of_date),
        vested_fraction: fraction,
        accelerated,
        vested_amount,
        unvested_amount,
        fully_vested_date,
        timeline,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Carry vesting (whole calendar months)",
        &serde_json::json!({
            "schedule": input.schedule,
            "grant_date": input.grant_date,
            "as_of_date": input.as_of_date,
        }),
        warnings,
        elapsed,
        output,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_elapsed_months() {
        assert_eq!(elapsed_months(d(2020, 1, 15), d(2020, 1, 14)), 0);
        assert_eq!(elapsed_months(d(2020, 1, 15), d(2020, 2, 14)), 0);
        assert_eq!(elapsed_months(d(2020, 1, 15), d(2020, 2, 15)), 1);
        assert_eq!(elapsed_months(d(2020, 1, 15), d(2022, 1, 15)), 24);
        // End-of-month clamp
        assert_eq!(elapsed_months(d(2021, 1, 31), d(2021, 2, 28)), 1);
        assert_eq!(elapsed_months(d(2021, 1, 31), d(2021, 2, 27)), 0);
    }

    #[test]
    fn test_immediate() {
        let s = VestingSchedule::immediate();
        assert_eq!(vested_fraction(&s, d(2020, 1, 1), d(2019, 1, 1), None).unwrap(), Decimal::ONE);
    }

    #[test]
    fn test_cliff() {
        let s = VestingSchedule::cliff(12);
        let grant = d(2020, 1, 1);
        assert_eq!(vested_fraction(&s, grant, d(2020, 12, 31), None).unwrap(), Decimal::ZERO);
        assert_eq!(vested_fraction(&s, grant, d(2021, 1, 1), None).unwrap(), Decimal::ONE);
    }

    #[test]
    fn test_graded_scenario_24_of_48_with_12_cliff() {
        let s = VestingSchedule::graded(12, 48);
        let f = vested_fraction(&s, d(2020, 1, 1), d(2022, 1, 1), None).unwrap();
        assert_eq!(f, dec!(12) / dec!(36));
        assert!((f - dec!(0.333333)).abs() < dec!(0.000001));
    }

    #[test]
    fn test_graded_boundaries() {
        let s = VestingSchedule::graded(12, 48);
        let grant = d(2020, 1, 1);
        assert_eq!(vested_fraction(&s, grant, d(2020, 12, 1), None).unwrap(), Decimal::ZERO);
        assert_eq!(vested_fraction(&s, grant, d(2021, 1, 1), None).unwrap(), Decimal::ZERO);
        assert_eq!(vested_fraction(&s, grant, d(2024, 1, 1), None).unwrap(), Decimal::ONE);
        assert_eq!(vested_fraction(&s, grant, d(2030, 1, 1), None).unwrap(), Decimal::ONE);
    }

    #[test]
    fn test_graded_cliff_equals_total() {
        let s = VestingSchedule::graded(24, 24);
        let grant = d(2020, 1, 1);
        assert_eq!(vested_fraction(&s, grant, d(2021, 12, 31), None).unwrap(), Decimal::ZERO);
        assert_eq!(vested_fraction(&s, grant, d(2022, 1, 1), None).unwrap(), Decimal::ONE);
    }

    #[test]
    fn test_acceleration_only_for_declared_trigger() {
        let s = VestingSchedule::graded(12, 48).with_acceleration(AccelerationTrigger::Ipo);
        let grant = d(2020, 1, 1);
        let as_of = d(2020, 6, 1);
        assert_eq!(
            vested_fraction(&s, grant, as_of, Some(AccelerationTrigger::Ipo)).unwrap(),
            Decimal::ONE
        );
        assert_eq!(
            vested_fraction(&s, grant, as_of, Some(AccelerationTrigger::Exit)).unwrap(),
            Decimal::ZERO
        );
    }

    #[test]
    fn test_invalid_schedules() {
        let grant = d(2020, 1, 1);
        for s in [
            VestingSchedule::graded(48, 12),
            VestingSchedule::graded(-1, 12),
            VestingSchedule::graded(0, -12),
            VestingSchedule::cliff(-3),
        ] {
            let err = vested_fraction(&s, grant, grant, None).unwrap_err();
            assert!(matches!(err, FundEngineError::InvalidSchedule { .. }), "{s:?}");
        }
    }

    #[test]
    fn test_timeline_monotonic() {
        let s = VestingSchedule::graded(6, 36);
        let points = vesting_timeline(&s, d(2021, 3, 31), 40).unwrap();
        assert_eq!(points.len(), 41);
        assert!(points
            .windows(2)
            .all(|w| w[0].vested_fraction <= w[1].vested_fraction));
        assert_eq!(points[36].vested_fraction, Decimal::ONE);
    }

    #[test]
    fn test_calculate_vesting_splits_amount() {
        let input = VestingInput {
            schedule: VestingSchedule::graded(12, 48),
            grant_date: d(2020, 1, 1),
            as_of_date: d(2022, 1, 1),
            triggered: None,
            carry_amount: Some("3000000".parse().unwrap()),
            timeline_months: None,
        };
        let out = calculate_vesting(&input).unwrap().result;
        assert_eq!(out.elapsed_months, 24);
        assert_eq!(out.vested_amount.unwrap(), "1000000".parse().unwrap());
        assert_eq!(out.unvested_amount.unwrap(), "2000000".parse().unwrap());
        assert_eq!(out.fully_vested_date, d(2024, 1, 1));
        assert_eq!(out.timeline.len(), 49);
        assert!(!out.accelerated);
    }

    #[test]
    fn test_calculate_vesting_undeclared_trigger_warns() {
        let input = VestingInput {
            schedule: VestingSchedule::cliff(12),
            grant_date: d(2020, 1, 1),
            as_of_date: d(2020, 3, 1),
            triggered: Some(AccelerationTrigger::ChangeOfControl),
            carry_amount: None,
            timeline_months: Some(0),
        };
        let out = calculate_vesting(&input).unwrap();
        assert_eq!(out.result.vested_fraction, Decimal::ZERO);
        assert_eq!(out.warnings.len(), 1);
    }
}
