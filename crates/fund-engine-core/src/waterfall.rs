//! Distribution waterfall and carried-interest accrual.
//!
//! Tiers are laid out as contiguous ranges over the fund's cumulative
//! distributed amount. A distribution occupies the window
//! `[total_distributed, total_distributed + amount)` and each tier receives its
//! overlap with that window, in order:
//!
//! 1. **Return of capital** until paid-in capital is returned.
//! 2. **Preferred return** until paid-in capital, compounded at the hurdle rate
//!    from each contribution date, is covered (tier 1/2 receipts compound the
//!    same way and are netted off).
//! 3. **GP catch-up** until the GP holds `gp_carry_pct` of all profit
//!    distributed through tiers 2-3. With preferred return `P`, carry `g` and
//!    catch-up GP share `c`, the tier size is `P * g / (c - g)` (for full
//!    catch-up, `P * g / (1 - g)`), not `g * P`. `catchup_cap` bounds the GP
//!    part.
//! 4. **Residual** split for everything after.
//!
//! Tier ranges depend on the distribution date (the hurdle keeps compounding),
//! so they are resolved per event with [`resolve_tiers`] and then filled by
//! [`allocate`], which is a pure function of its inputs.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::FundEngineError;
use crate::events::{completed_distributions, DistributionEvent};
use crate::time_value::{accrete, irr_or_warn};
use crate::types::*;
use crate::vesting::{vested_fraction, AccelerationTrigger, VestingSchedule};
use crate::FundEngineResult;

// ---------------------------------------------------------------------------
// Terms and tiers
// ---------------------------------------------------------------------------

/// Carried-interest terms from the LPA.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarryTerms {
    /// GP share of profits (0.20 = 20%)
    pub gp_carry_pct: Rate,
    /// Annual rate at which the preferred return compounds
    pub hurdle_rate: Rate,
    /// LP share of the preferred-return tier (1.0 unless a GP commitment
    /// participates pro rata)
    pub preferred_return_pct: Rate,
    /// GP share of the catch-up tier (1.0 = full catch-up)
    pub catchup_pct: Rate,
    /// Ceiling on total GP catch-up receipts
    #[serde(default)]
    pub catchup_cap: Option<Money>,
    pub vesting_schedule: VestingSchedule,
    /// Date from which carry vesting is measured
    pub carry_grant_date: NaiveDate,
}

impl CarryTerms {
    pub fn validate(&self) -> FundEngineResult<()> {
        for (field, v) in [
            ("gp_carry_pct", self.gp_carry_pct),
            ("hurdle_rate", self.hurdle_rate),
            ("preferred_return_pct", self.preferred_return_pct),
            ("catchup_pct", self.catchup_pct),
        ] {
            if v < Decimal::ZERO || v > Decimal::ONE {
                return Err(FundEngineError::invalid(
                    field,
                    format!("must be between 0 and 1, got {v}"),
                ));
            }
        }
        if let Some(cap) = self.catchup_cap {
            if cap.is_negative() {
                return Err(FundEngineError::invalid(
                    "catchup_cap",
                    "Catch-up cap cannot be negative",
                ));
            }
        }
        self.vesting_schedule.validate()
    }
}

/// Waterfall stage. Declaration order is the required tier order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TierKind {
    ReturnOfCapital,
    PreferredReturn,
    CatchUp,
    Residual,
}

/// Configured tier: what it is and how it splits, before ranges are known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSpec {
    pub name: String,
    pub kind: TierKind,
    pub lp_allocation_pct: Rate,
    pub gp_allocation_pct: Rate,
}

/// A tier with its resolved range over cumulative distributions.
///
/// `lp_allocation_pct + gp_allocation_pct` is normally 1; anything less is
/// allocated to a third party (e.g. a placement agent sharing the tier).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaterfallTier {
    pub tier_index: u32,
    pub name: String,
    pub kind: TierKind,
    pub lp_allocation_pct: Rate,
    pub gp_allocation_pct: Rate,
    pub range_start: Money,
    /// None = unbounded (final tier)
    pub range_end: Option<Money>,
}

/// Standard European tiers derived from the carry terms.
pub fn default_tier_specs(terms: &CarryTerms) -> Vec<TierSpec> {
    vec![
        TierSpec {
            name: "Return of Capital".into(),
            kind: TierKind::ReturnOfCapital,
            lp_allocation_pct: Decimal::ONE,
            gp_allocation_pct: Decimal::ZERO,
        },
        TierSpec {
            name: "Preferred Return".into(),
            kind: TierKind::PreferredReturn,
            lp_allocation_pct: terms.preferred_return_pct,
            gp_allocation_pct: Decimal::ONE - terms.preferred_return_pct,
        },
        TierSpec {
            name: "GP Catch-Up".into(),
            kind: TierKind::CatchUp,
            lp_allocation_pct: Decimal::ONE - terms.catchup_pct,
            gp_allocation_pct: terms.catchup_pct,
        },
        TierSpec {
            name: "Carried Interest".into(),
            kind: TierKind::Residual,
            lp_allocation_pct: Decimal::ONE - terms.gp_carry_pct,
            gp_allocation_pct: terms.gp_carry_pct,
        },
    ]
}

fn validate_split(index: usize, lp: Rate, gp: Rate) -> FundEngineResult<()> {
    if lp < Decimal::ZERO || gp < Decimal::ZERO || lp > Decimal::ONE || gp > Decimal::ONE {
        return Err(FundEngineError::invalid(
            "tiers",
            format!("tier {index}: allocation percentages must be between 0 and 1"),
        ));
    }
    if lp + gp > Decimal::ONE {
        return Err(FundEngineError::invalid(
            "tiers",
            format!("tier {index}: LP + GP allocation {} exceeds 1", lp + gp),
        ));
    }
    Ok(())
}

fn validate_specs(specs: &[TierSpec]) -> FundEngineResult<()> {
    if specs.is_empty() {
        return Err(FundEngineError::invalid(
            "tiers",
            "At least one waterfall tier is required",
        ));
    }
    for (i, spec) in specs.iter().enumerate() {
        validate_split(i, spec.lp_allocation_pct, spec.gp_allocation_pct)?;
        if i > 0 && spec.kind <= specs[i - 1].kind {
            return Err(FundEngineError::invalid(
                "tiers",
                format!(
                    "tier {i} ({:?}) is out of order after {:?}",
                    spec.kind,
                    specs[i - 1].kind
                ),
            ));
        }
    }
    if specs.last().map(|s| s.kind) != Some(TierKind::Residual) {
        return Err(FundEngineError::invalid(
            "tiers",
            "The final tier must be a Residual split",
        ));
    }
    Ok(())
}

/// Check resolved tiers are ordered, contiguous, non-overlapping, start at or
/// before `origin`, and end with an unbounded tier.
pub fn validate_tier_ranges(tiers: &[WaterfallTier], origin: Money) -> FundEngineResult<()> {
    let Some(first) = tiers.first() else {
        return Err(FundEngineError::invalid(
            "tiers",
            "At least one waterfall tier is required",
        ));
    };
    if first.range_start > origin {
        return Err(FundEngineError::TierRangeOverlap {
            tier_index: first.tier_index,
            reason: format!(
                "first tier starts at {} but {} has already been distributed",
                first.range_start, origin
            ),
        });
    }

    for (i, tier) in tiers.iter().enumerate() {
        validate_split(i, tier.lp_allocation_pct, tier.gp_allocation_pct)?;
        if let Some(end) = tier.range_end {
            if end < tier.range_start {
                return Err(FundEngineError::TierRangeOverlap {
                    tier_index: tier.tier_index,
                    reason: format!("range end {end} precedes start {}", tier.range_start),
                });
            }
        }
        if i == 0 {
            continue;
        }
        let prev = &tiers[i - 1];
        if tier.tier_index <= prev.tier_index {
            return Err(FundEngineError::TierRangeOverlap {
                tier_index: tier.tier_index,
                reason: format!("tier index does not follow {}", prev.tier_index),
            });
        }
        match prev.range_end {
            None => {
                return Err(FundEngineError::TierRangeOverlap {
                    tier_index: tier.tier_index,
                    reason: format!("follows unbounded tier {}", prev.tier_index),
                })
            }
            Some(prev_end) if prev_end > tier.range_start => {
                return Err(FundEngineError::TierRangeOverlap {
                    tier_index: tier.tier_index,
                    reason: format!(
                        "starts at {} inside tier {} ending at {prev_end}",
                        tier.range_start, prev.tier_index
                    ),
                })
            }
            Some(prev_end) if prev_end < tier.range_start => {
                return Err(FundEngineError::TierRangeOverlap {
                    tier_index: tier.tier_index,
                    reason: format!(
                        "gap between {prev_end} and {}; tiers must be contiguous",
                        tier.range_start
                    ),
                })
            }
            Some(_) => {}
        }
    }

    if let Some(last) = tiers.last() {
        if last.range_end.is_some() {
            return Err(FundEngineError::TierRangeOverlap {
                tier_index: last.tier_index,
                reason: "final tier must be unbounded".into(),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Cumulative waterfall position of a fund after some number of distributions.
///
/// Everything needed to allocate the next distribution lives here, so replaying
/// the same event against the same state reproduces the same allocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarryAccrualState {
    /// Paid-in capital, positive amounts, dated
    pub contributions: Vec<CashFlow>,
    /// Every distribution (all tiers), dated
    pub distributions: Vec<CashFlow>,
    /// Return-of-capital and preferred-return receipts, dated (hurdle netting)
    pub hurdle_flows: Vec<CashFlow>,
    pub total_distributed: Money,
    pub lp_distributed: Money,
    pub gp_distributed: Money,
    pub third_party_distributed: Money,
    pub capital_returned: Money,
    pub preferred_return_paid: Money,
    /// Total amount that went through the catch-up tier
    pub catchup_distributed: Money,
    /// GP share of the catch-up tier
    pub catchup_paid: Money,
    pub residual_distributed: Money,
    /// Realized carry entitlement: GP catch-up plus GP residual share
    pub accrued_carry: Money,
    pub vested_carry: Money,
    pub distributed_carry: Money,
    /// Acceleration event already applied to vesting, if any
    pub acceleration: Option<AccelerationTrigger>,
    pub last_distribution_date: Option<NaiveDate>,
}

impl CarryAccrualState {
    pub fn with_contributions(contributions: Vec<CashFlow>) -> Self {
        Self {
            contributions,
            ..Self::default()
        }
    }

    pub fn paid_in_at(&self, date: NaiveDate) -> Money {
        self.contributions
            .iter()
            .filter(|c| c.date <= date)
            .map(|c| c.amount)
            .sum()
    }

    pub fn unvested_carry(&self) -> Money {
        self.accrued_carry - self.vested_carry
    }

    fn validate(&self) -> FundEngineResult<()> {
        for (index, c) in self.contributions.iter().enumerate() {
            if c.amount.is_negative() {
                return Err(FundEngineError::NegativeContribution {
                    index,
                    amount: c.amount.as_decimal(),
                });
            }
        }
        if self.vested_carry > self.accrued_carry {
            return Err(FundEngineError::consistency(
                "vested_carry <= accrued_carry",
                format!("vested {} > accrued {}", self.vested_carry, self.accrued_carry),
                self,
            ));
        }
        if self.distributed_carry > self.vested_carry {
            return Err(FundEngineError::consistency(
                "distributed_carry <= vested_carry",
                format!(
                    "distributed {} > vested {}",
                    self.distributed_carry, self.vested_carry
                ),
                self,
            ));
        }
        let split = self.lp_distributed + self.gp_distributed + self.third_party_distributed;
        if split != self.total_distributed {
            return Err(FundEngineError::consistency(
                "lp + gp + third_party == total_distributed",
                format!("{split} != {}", self.total_distributed),
                self,
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tier resolution
// ---------------------------------------------------------------------------

/// Tier layout for a distribution on `date`, plus any warnings (catch-up
/// capped or unreachable).
pub fn resolve_tiers(
    state: &CarryAccrualState,
    terms: &CarryTerms,
    specs: &[TierSpec],
    date: NaiveDate,
) -> FundEngineResult<(Vec<WaterfallTier>, Vec<String>)> {
    validate_specs(specs)?;
    terms.validate()?;
    state.validate()?;

    let mut warnings = Vec::new();

    let paid_in = state.paid_in_at(date);
    let capital_outstanding = (paid_in - state.capital_returned).non_negative();

    let mut hurdle_balance = Money::ZERO;
    for c in state.contributions.iter().filter(|c| c.date <= date) {
        hurdle_balance += accrete(c.amount, terms.hurdle_rate, c.date, date)?;
    }
    for h in state.hurdle_flows.iter().filter(|h| h.date <= date) {
        hurdle_balance -= accrete(h.amount, terms.hurdle_rate, h.date, date)?;
    }
    let preferred_outstanding = (hurdle_balance - capital_outstanding).non_negative();

    let has_pref_tier = specs.iter().any(|s| s.kind == TierKind::PreferredReturn);
    let preferred_total = state.preferred_return_paid
        + if has_pref_tier {
            preferred_outstanding
        } else {
            Money::ZERO
        };

    let mut cursor = state.total_distributed;
    let mut tiers = Vec::with_capacity(specs.len());

    for (i, spec) in specs.iter().enumerate() {
        let size = match spec.kind {
            TierKind::ReturnOfCapital => Some(capital_outstanding),
            TierKind::PreferredReturn => Some(preferred_outstanding),
            TierKind::CatchUp => Some(catchup_remaining(
                state,
                terms,
                spec,
                preferred_total,
                &mut warnings,
            )?),
            TierKind::Residual => None,
        };

        let range_start = cursor;
        let range_end = size.map(|s| range_start + s);
        if let Some(end) = range_end {
            cursor = end;
        }

        tiers.push(WaterfallTier {
            tier_index: i as u32,
            name: spec.name.clone(),
            kind: spec.kind,
            lp_allocation_pct: spec.lp_allocation_pct,
            gp_allocation_pct: spec.gp_allocation_pct,
            range_start,
            range_end,
        });
    }

    Ok((tiers, warnings))
}

/// Catch-up tier amount still to be distributed.
///
/// With GP share `c` of the tier and carry `g`, a tier of size X gives the GP
/// `c * X`, which equals `g` of the profit `P + X` when `X = g * P / (c - g)`.
fn catchup_remaining(
    state: &CarryAccrualState,
    terms: &CarryTerms,
    spec: &TierSpec,
    preferred_total: Money,
    warnings: &mut Vec<String>,
) -> FundEngineResult<Money> {
    let c = spec.gp_allocation_pct;
    let g = terms.gp_carry_pct;

    if c <= g {
        if !g.is_zero() {
            warnings.push(format!(
                "Catch-up GP share {c} does not exceed carry {g}; catch-up tier skipped"
            ));
        }
        return Ok(Money::ZERO);
    }

    let mut target = preferred_total.mul_rate(g / (c - g), RoundingMode::HalfEven);

    if let Some(cap) = terms.catchup_cap {
        let gp_target = target.mul_rate(c, RoundingMode::HalfEven);
        if gp_target > cap {
            target = cap.div(c, RoundingMode::Down)?;
            warnings.push(format!(
                "Catch-up capped at {cap} (uncapped GP catch-up {gp_target}); excess flows to the residual tier"
            ));
        }
    }

    Ok((target - state.catchup_distributed).non_negative())
}

// ---------------------------------------------------------------------------
// Allocation
// ---------------------------------------------------------------------------

/// Whether an allocation pays carry out (`Record`) or only computes it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistributionAction {
    #[default]
    Preview,
    Record,
}

/// A distribution to run through the waterfall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionRequest {
    pub date: NaiveDate,
    pub amount: Money,
    #[serde(default)]
    pub action: DistributionAction,
    #[serde(default)]
    pub acceleration: Option<AccelerationTrigger>,
}

/// Allocation within a single tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierAllocation {
    pub tier_index: u32,
    pub tier_name: String,
    pub kind: TierKind,
    pub amount: Money,
    pub to_lp: Money,
    pub to_gp: Money,
    pub to_third_party: Money,
    /// Distribution left after this tier
    pub remaining: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub date: NaiveDate,
    pub amount: Money,
    pub tiers: Vec<TierAllocation>,
    pub lp_amount: Money,
    pub gp_amount: Money,
    pub third_party_amount: Money,
    /// GP catch-up and residual share
    pub gp_carry: Money,
    /// GP share of return-of-capital and preferred-return tiers
    pub gp_co_invest_return: Money,
    pub vested_fraction: Rate,
    /// Carry paid to the GP by this event (Record only)
    pub carry_paid: Money,
    /// Accrued carry retained because it has not vested or was not paid
    pub carry_held_back: Money,
    pub new_state: CarryAccrualState,
}

/// Allocate one distribution across resolved tiers.
///
/// Pure: the same request, state, terms and tiers always give the same
/// allocation and new state.
pub fn allocate(
    request: &DistributionRequest,
    prior: &CarryAccrualState,
    terms: &CarryTerms,
    tiers: &[WaterfallTier],
) -> FundEngineResult<Allocation> {
    if request.amount.is_negative() {
        return Err(FundEngineError::InvalidDistribution {
            reason: format!("distribution amount {} is negative", request.amount),
        });
    }
    if let Some(last) = prior.last_distribution_date {
        if request.date < last {
            return Err(FundEngineError::InvalidDistribution {
                reason: format!(
                    "distribution on {} precedes the last recorded distribution on {last}",
                    request.date
                ),
            });
        }
    }
    terms.validate()?;
    prior.validate()?;
    validate_tier_ranges(tiers, prior.total_distributed)?;

    let window_start = prior.total_distributed;
    let window_end = window_start + request.amount;

    let mut state = prior.clone();
    let mut results = Vec::with_capacity(tiers.len());
    let mut remaining = request.amount;
    let mut gp_carry = Money::ZERO;
    let mut gp_co_invest_return = Money::ZERO;
    let mut hurdle_amount = Money::ZERO;

    for tier in tiers {
        let start = tier.range_start.max(window_start);
        let end = tier.range_end.map_or(window_end, |e| e.min(window_end));
        let amount = (end - start).non_negative();

        let (to_lp, to_gp, to_third_party) = split_tier(amount, tier);
        remaining -= amount;

        match tier.kind {
            TierKind::ReturnOfCapital => {
                state.capital_returned += amount;
                hurdle_amount += amount;
                gp_co_invest_return += to_gp;
            }
            TierKind::PreferredReturn => {
                state.preferred_return_paid += amount;
                hurdle_amount += amount;
                gp_co_invest_return += to_gp;
            }
            TierKind::CatchUp => {
                state.catchup_distributed += amount;
                state.catchup_paid += to_gp;
                gp_carry += to_gp;
            }
            TierKind::Residual => {
                state.residual_distributed += amount;
                gp_carry += to_gp;
            }
        }

        results.push(TierAllocation {
            tier_index: tier.tier_index,
            tier_name: tier.name.clone(),
            kind: tier.kind,
            amount,
            to_lp,
            to_gp,
            to_third_party,
            remaining,
        });
    }

    let lp_amount: Money = results.iter().map(|t| t.to_lp).sum();
    let gp_amount: Money = results.iter().map(|t| t.to_gp).sum();
    let third_party_amount: Money = results.iter().map(|t| t.to_third_party).sum();

    if lp_amount + gp_amount + third_party_amount != request.amount {
        return Err(FundEngineError::consistency(
            "lp + gp + third_party == distribution",
            format!(
                "{lp_amount} + {gp_amount} + {third_party_amount} != {}",
                request.amount
            ),
            &(request, prior, tiers),
        ));
    }

    state.total_distributed += request.amount;
    state.lp_distributed += lp_amount;
    state.gp_distributed += gp_amount;
    state.third_party_distributed += third_party_amount;
    if !request.amount.is_zero() {
        state
            .distributions
            .push(CashFlow::new(request.date, request.amount));
    }
    if !hurdle_amount.is_zero() {
        state
            .hurdle_flows
            .push(CashFlow::new(request.date, hurdle_amount));
    }
    state.last_distribution_date = Some(request.date);

    // Vesting
    if let Some(t) = request.acceleration {
        if terms.vesting_schedule.acceleration.contains(&t) {
            state.acceleration = Some(t);
        }
    }
    let fraction = vested_fraction(
        &terms.vesting_schedule,
        terms.carry_grant_date,
        request.date,
        state.acceleration,
    )?;
    state.accrued_carry += gp_carry;
    state.vested_carry = state
        .accrued_carry
        .mul_rate(fraction, RoundingMode::Down)
        .max(prior.vested_carry);

    let carry_paid = match request.action {
        DistributionAction::Record => (state.vested_carry - prior.distributed_carry).non_negative(),
        DistributionAction::Preview => Money::ZERO,
    };
    state.distributed_carry = prior.distributed_carry + carry_paid;

    if state.distributed_carry > state.vested_carry {
        return Err(FundEngineError::consistency(
            "distributed_carry <= vested_carry",
            format!(
                "distributed {} > vested {}",
                state.distributed_carry, state.vested_carry
            ),
            &(request, prior),
        ));
    }

    tracing::debug!(
        date = %request.date,
        amount = %request.amount,
        lp = %lp_amount,
        gp = %gp_amount,
        carry = %gp_carry,
        "waterfall allocation"
    );

    Ok(Allocation {
        date: request.date,
        amount: request.amount,
        tiers: results,
        lp_amount,
        gp_amount,
        third_party_amount,
        gp_carry,
        gp_co_invest_return,
        vested_fraction: fraction,
        carry_paid,
        carry_held_back: state.accrued_carry - state.distributed_carry,
        new_state: state,
    })
}

/// LP / GP / third-party parts of a tier amount. The GP share is rounded; the
/// LP share is rounded and clamped to what is left, and the third party takes
/// the remainder, so every part is non-negative and the three sum to `amount`.
fn split_tier(amount: Money, tier: &WaterfallTier) -> (Money, Money, Money) {
    let to_gp = amount.mul_rate(tier.gp_allocation_pct, RoundingMode::HalfEven);
    let after_gp = (amount - to_gp).non_negative();
    let third_party_pct = Decimal::ONE - tier.lp_allocation_pct - tier.gp_allocation_pct;
    let to_lp = if third_party_pct.is_zero() {
        after_gp
    } else {
        amount
            .mul_rate(tier.lp_allocation_pct, RoundingMode::HalfEven)
            .min(after_gp)
    };
    (to_lp, to_gp, after_gp - to_lp)
}

// ---------------------------------------------------------------------------
// Distribute: resolve + allocate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionInput {
    pub distribution: DistributionRequest,
    #[serde(default)]
    pub prior_state: CarryAccrualState,
    pub terms: CarryTerms,
    /// Defaults to the standard four tiers built from `terms`
    #[serde(default)]
    pub tier_specs: Option<Vec<TierSpec>>,
}

/// Resolve the tiers at the distribution date and allocate across them.
pub fn distribute(input: &DistributionInput) -> FundEngineResult<ComputationOutput<Allocation>> {
    let start = Instant::now();

    let specs = input
        .tier_specs
        .clone()
        .unwrap_or_else(|| default_tier_specs(&input.terms));
    let (tiers, warnings) = resolve_tiers(
        &input.prior_state,
        &input.terms,
        &specs,
        input.distribution.date,
    )?;
    let allocation = allocate(&input.distribution, &input.prior_state, &input.terms, &tiers)?;

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Distribution waterfall (European, compounded hurdle, sequential fill)",
        &serde_json::json!({
            "amount": input.distribution.amount,
            "date": input.distribution.date,
            "action": input.distribution.action,
            "gp_carry_pct": input.terms.gp_carry_pct.to_string(),
            "hurdle_rate": input.terms.hurdle_rate.to_string(),
            "tiers": tiers,
        }),
        warnings,
        elapsed,
        allocation,
    ))
}

/// Fold completed distribution events, in date order, through the waterfall
/// as recorded distributions.
pub fn replay(
    initial: &CarryAccrualState,
    events: &[DistributionEvent],
    terms: &CarryTerms,
    specs: &[TierSpec],
) -> FundEngineResult<(CarryAccrualState, Vec<Allocation>, Vec<String>)> {
    let mut state = initial.clone();
    let mut allocations = Vec::new();
    let mut warnings = Vec::new();

    for event in completed_distributions(events)? {
        let request = DistributionRequest {
            date: event.event_date,
            amount: event.net_proceeds(),
            action: DistributionAction::Record,
            acceleration: event.acceleration,
        };
        let (tiers, mut w) = resolve_tiers(&state, terms, specs, request.date)?;
        warnings.append(&mut w);
        let allocation = allocate(&request, &state, terms, &tiers)?;
        state = allocation.new_state.clone();
        allocations.push(allocation);
    }

    Ok((state, allocations, warnings))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayInput {
    #[serde(default)]
    pub initial_state: CarryAccrualState,
    pub distributions: Vec<DistributionEvent>,
    pub terms: CarryTerms,
    #[serde(default)]
    pub tier_specs: Option<Vec<TierSpec>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayOutput {
    pub final_state: CarryAccrualState,
    pub allocations: Vec<Allocation>,
}

/// Recompute the waterfall state from an event history.
pub fn replay_history(input: &ReplayInput) -> FundEngineResult<ComputationOutput<ReplayOutput>> {
    let start = Instant::now();

    let specs = input
        .tier_specs
        .clone()
        .unwrap_or_else(|| default_tier_specs(&input.terms));
    let (final_state, allocations, warnings) =
        replay(&input.initial_state, &input.distributions, &input.terms, &specs)?;

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Waterfall replay of completed distributions in date order",
        &serde_json::json!({
            "events": input.distributions.len(),
            "replayed": allocations.len(),
        }),
        warnings,
        elapsed,
        ReplayOutput {
            final_state,
            allocations,
        },
    ))
}

// ---------------------------------------------------------------------------
// Carry accrual snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarryAccrualInput {
    pub as_of_date: NaiveDate,
    pub state: CarryAccrualState,
    pub terms: CarryTerms,
    #[serde(default)]
    pub tier_specs: Option<Vec<TierSpec>>,
    /// Current value of unrealized holdings (typically NAV)
    pub unrealized_value: Money,
    #[serde(default)]
    pub acceleration: Option<AccelerationTrigger>,
}

/// Carry position at a date, valuing unrealized holdings as if liquidated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarryAccrual {
    pub as_of_date: NaiveDate,
    pub total_contributions: Money,
    pub total_distributions: Money,
    pub unrealized_value: Money,
    /// Preferred return owed to date: paid plus outstanding
    pub lp_preferred_return: Money,
    pub lp_preferred_return_paid: Money,
    /// GP catch-up target to date: paid plus outstanding GP share
    pub catchup_amount: Money,
    pub catchup_paid: Money,
    pub realized_carry: Money,
    pub unrealized_carry: Money,
    pub accrued_carry: Money,
    pub vested_carry: Money,
    pub unvested_carry: Money,
    pub distributed_carry: Money,
    pub remaining_carry: Money,
    pub vested_fraction: Rate,
    pub irr: Option<Rate>,
    pub moic: Option<Multiple>,
}

pub fn accrue_carry(input: &CarryAccrualInput) -> FundEngineResult<ComputationOutput<CarryAccrual>> {
    let start = Instant::now();

    if input.unrealized_value.is_negative() {
        return Err(FundEngineError::invalid(
            "unrealized_value",
            "Unrealized value cannot be negative",
        ));
    }
    if let Some(last) = input.state.last_distribution_date {
        if input.as_of_date < last {
            return Err(FundEngineError::invalid(
                "as_of_date",
                format!("as-of date precedes the last distribution on {last}"),
            ));
        }
    }

    let specs = input
        .tier_specs
        .clone()
        .unwrap_or_else(|| default_tier_specs(&input.terms));
    let (tiers, mut warnings) = resolve_tiers(&input.state, &input.terms, &specs, input.as_of_date)?;

    let tier_size = |kind: TierKind| -> Money {
        tiers
            .iter()
            .find(|t| t.kind == kind)
            .and_then(|t| t.range_end.map(|e| e - t.range_start))
            .unwrap_or(Money::ZERO)
    };
    let catchup_gp_share = tiers
        .iter()
        .find(|t| t.kind == TierKind::CatchUp)
        .map(|t| t.gp_allocation_pct)
        .unwrap_or(Decimal::ZERO);

    let hypothetical = allocate(
        &DistributionRequest {
            date: input.as_of_date,
            amount: input.unrealized_value,
            action: DistributionAction::Preview,
            acceleration: input.acceleration,
        },
        &input.state,
        &input.terms,
        &tiers,
    )?;

    let realized_carry = input.state.accrued_carry;
    let unrealized_carry = hypothetical.gp_carry;
    let accrued_carry = realized_carry + unrealized_carry;
    let fraction = hypothetical.vested_fraction;
    let vested_carry = accrued_carry
        .mul_rate(fraction, RoundingMode::Down)
        .max(input.state.vested_carry);
    let distributed_carry = input.state.distributed_carry;

    if distributed_carry > vested_carry {
        return Err(FundEngineError::consistency(
            "distributed_carry <= vested_carry",
            format!("distributed {distributed_carry} > vested {vested_carry}"),
            input,
        ));
    }

    let total_contributions = input.state.paid_in_at(input.as_of_date);
    let total_distributions = input.state.total_distributed;

    let moic = if total_contributions.is_zero() {
        None
    } else {
        Some((total_distributions + input.unrealized_value).ratio(total_contributions)?)
    };

    let mut flows: Vec<CashFlow> = input
        .state
        .contributions
        .iter()
        .filter(|c| c.date <= input.as_of_date)
        .map(|c| CashFlow::new(c.date, -c.amount))
        .collect();
    flows.extend(input.state.distributions.iter().cloned());
    if !input.unrealized_value.is_zero() {
        flows.push(CashFlow::new(input.as_of_date, input.unrealized_value));
    }
    let irr = irr_or_warn(&flows, "Fund IRR", &mut warnings);

    let output = CarryAccrual {
        as_of_date: input.as_of_date,
        total_contributions,
        total_distributions,
        unrealized_value: input.unrealized_value,
        lp_preferred_return: input.state.preferred_return_paid + tier_size(TierKind::PreferredReturn),
        lp_preferred_return_paid: input.state.preferred_return_paid,
        catchup_amount: input.state.catchup_paid
            + tier_size(TierKind::CatchUp).mul_rate(catchup_gp_share, RoundingMode::HalfEven),
        catchup_paid: input.state.catchup_paid,
        realized_carry,
        unrealized_carry,
        accrued_carry,
        vested_carry,
        unvested_carry: accrued_carry - vested_carry,
        distributed_carry,
        remaining_carry: vested_carry - distributed_carry,
        vested_fraction: fraction,
        irr,
        moic,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Carry accrual (hypothetical liquidation at as-of date)",
        &serde_json::json!({
            "as_of_date": input.as_of_date,
            "unrealized_value": input.unrealized_value,
            "gp_carry_pct": input.terms.gp_carry_pct.to_string(),
            "hurdle_rate": input.terms.hurdle_rate.to_string(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
