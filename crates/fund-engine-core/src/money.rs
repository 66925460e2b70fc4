//! Fixed-point money.
//!
//! `Money` wraps a `Decimal` that never carries more than [`Money::SCALE`]
//! fractional digits. Addition and subtraction are exact. Every operation that
//! could produce extra digits (multiplying by a rate, dividing) takes an
//! explicit [`RoundingMode`]. There is no conversion from `f64`; the only
//! conversion to `f64` is [`Money::to_f64_lossy`] for display.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

use crate::error::FundEngineError;
use crate::FundEngineResult;

/// Rounding applied when a result has more digits than `Money::SCALE`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundingMode {
    /// Banker's rounding. Default for allocations.
    #[default]
    HalfEven,
    HalfUp,
    /// Toward zero.
    Down,
    /// Away from zero.
    Up,
    Floor,
    Ceiling,
}

impl RoundingMode {
    fn strategy(self) -> RoundingStrategy {
        match self {
            RoundingMode::HalfEven => RoundingStrategy::MidpointNearestEven,
            RoundingMode::HalfUp => RoundingStrategy::MidpointAwayFromZero,
            RoundingMode::Down => RoundingStrategy::ToZero,
            RoundingMode::Up => RoundingStrategy::AwayFromZero,
            RoundingMode::Floor => RoundingStrategy::ToNegativeInfinity,
            RoundingMode::Ceiling => RoundingStrategy::ToPositiveInfinity,
        }
    }
}

/// Signed fixed-point monetary amount, 6 decimal places.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    /// Number of fractional digits carried.
    pub const SCALE: u32 = 6;

    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Exact construction. Fails if `value` has more than `SCALE` fractional
    /// digits once trailing zeros are dropped.
    pub fn from_decimal(value: Decimal) -> FundEngineResult<Self> {
        let normalized = value.normalize();
        if normalized.scale() > Self::SCALE {
            return Err(FundEngineError::invalid(
                "money",
                format!(
                    "{value} has more than {} decimal places; round explicitly",
                    Self::SCALE
                ),
            ));
        }
        Ok(Money(normalized))
    }

    /// Construction with an explicit rounding step.
    pub fn from_decimal_rounded(value: Decimal, mode: RoundingMode) -> Self {
        Money(
            value
                .round_dp_with_strategy(Self::SCALE, mode.strategy())
                .normalize(),
        )
    }

    /// One minor unit is 10^-6.
    pub fn from_minor_units(units: i64) -> Self {
        Money(Decimal::new(units, Self::SCALE).normalize())
    }

    pub fn minor_units(&self) -> i128 {
        let mut d = self.0;
        d.rescale(Self::SCALE);
        d.mantissa()
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Clamp at zero from below.
    pub fn non_negative(self) -> Self {
        self.max(Money::ZERO)
    }

    /// Multiply by a dimensionless rate (or share count), rounding the product.
    pub fn mul_rate(&self, rate: Decimal, mode: RoundingMode) -> Self {
        Self::from_decimal_rounded(self.0 * rate, mode)
    }

    /// Divide by a dimensionless divisor, rounding the quotient.
    pub fn div(&self, divisor: Decimal, mode: RoundingMode) -> FundEngineResult<Self> {
        if divisor.is_zero() {
            return Err(FundEngineError::DivisionByZero {
                context: format!("Money::div({})", self.0),
            });
        }
        Ok(Self::from_decimal_rounded(self.0 / divisor, mode))
    }

    /// Unrounded ratio of two amounts (MOIC, shares of total, ...).
    pub fn ratio(&self, denominator: Money) -> FundEngineResult<Decimal> {
        if denominator.is_zero() {
            return Err(FundEngineError::DivisionByZero {
                context: format!("Money::ratio({} / 0)", self.0),
            });
        }
        Ok(self.0 / denominator.0)
    }

    /// Partition into `(self * fraction, remainder)`. The two parts always sum
    /// back to `self` exactly; the rounding residue lands in the remainder.
    pub fn split(&self, fraction: Decimal, mode: RoundingMode) -> (Money, Money) {
        let part = self.mul_rate(fraction, mode);
        (part, *self - part)
    }

    /// Display-boundary conversion only.
    pub fn to_f64_lossy(&self) -> f64 {
        self.0.to_f64().unwrap_or(0.0)
    }
}

impl TryFrom<Decimal> for Money {
    type Error = FundEngineError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Money::from_decimal(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl From<i64> for Money {
    fn from(units: i64) -> Self {
        Money(Decimal::from(units))
    }
}

impl FromStr for Money {
    type Err = FundEngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let d = Decimal::from_str(s.trim())
            .map_err(|e| FundEngineError::invalid("money", format!("'{s}': {e}")))?;
        Money::from_decimal(d)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Money;
    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + *m)
    }
}
