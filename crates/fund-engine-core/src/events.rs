//! Fund cash-flow events: capital calls and distribution events.
//!
//! These are the immutable inputs the waterfall and NAV computations replay.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::FundEngineError;
use crate::types::*;
use crate::vesting::AccelerationTrigger;
use crate::FundEngineResult;

// ---------------------------------------------------------------------------
// Capital calls
// ---------------------------------------------------------------------------

/// Lifecycle of a capital call. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CapitalCallStatus {
    Draft,
    Sent,
    InProgress,
    Completed,
}

impl CapitalCallStatus {
    pub fn can_transition_to(self, to: CapitalCallStatus) -> bool {
        to >= self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapitalCall {
    pub fund_id: String,
    pub call_number: u32,
    pub total_amount: Money,
    pub amount_received: Money,
    pub due_date: NaiveDate,
    pub status: CapitalCallStatus,
}

impl CapitalCall {
    pub fn validate(&self) -> FundEngineResult<()> {
        if self.total_amount.is_negative() {
            return Err(FundEngineError::invalid(
                "total_amount",
                format!("call {} has a negative total", self.call_number),
            ));
        }
        if self.amount_received.is_negative() {
            return Err(FundEngineError::invalid(
                "amount_received",
                format!("call {} has negative receipts", self.call_number),
            ));
        }
        if self.amount_received > self.total_amount {
            return Err(FundEngineError::invalid(
                "amount_received",
                format!(
                    "call {} received {} against a total of {}",
                    self.call_number, self.amount_received, self.total_amount
                ),
            ));
        }
        Ok(())
    }

    /// Copy of this call moved to `to`. Backward moves are rejected.
    pub fn transition(&self, to: CapitalCallStatus) -> FundEngineResult<CapitalCall> {
        if !self.status.can_transition_to(to) {
            return Err(FundEngineError::InvalidStatusTransition {
                from: format!("{:?}", self.status),
                to: format!("{to:?}"),
            });
        }
        Ok(CapitalCall {
            status: to,
            ..self.clone()
        })
    }

    pub fn outstanding(&self) -> Money {
        self.total_amount - self.amount_received
    }
}

/// Totals across a set of capital calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapitalCallSummary {
    pub total_called: Money,
    pub total_received: Money,
    pub outstanding: Money,
    pub draft: usize,
    pub sent: usize,
    pub in_progress: usize,
    pub completed: usize,
}

pub fn summarize_capital_calls(calls: &[CapitalCall]) -> FundEngineResult<CapitalCallSummary> {
    let mut summary = CapitalCallSummary {
        total_called: Money::ZERO,
        total_received: Money::ZERO,
        outstanding: Money::ZERO,
        draft: 0,
        sent: 0,
        in_progress: 0,
        completed: 0,
    };
    for call in calls {
        call.validate()?;
        match call.status {
            CapitalCallStatus::Draft => {
                summary.draft += 1;
                continue;
            }
            CapitalCallStatus::Sent => summary.sent += 1,
            CapitalCallStatus::InProgress => summary.in_progress += 1,
            CapitalCallStatus::Completed => summary.completed += 1,
        }
        summary.total_called += call.total_amount;
        summary.total_received += call.amount_received;
    }
    summary.outstanding = summary.total_called - summary.total_received;
    Ok(summary)
}

/// Dated LP contributions: amounts received on in-progress and completed
/// calls, in date order. Draft and sent calls contribute nothing, even if a
/// receipt has been booked against a sent call.
pub fn contribution_flows(calls: &[CapitalCall]) -> FundEngineResult<Vec<CashFlow>> {
    let mut flows = Vec::with_capacity(calls.len());
    for (index, call) in calls.iter().enumerate() {
        if call.amount_received.is_negative() {
            return Err(FundEngineError::NegativeContribution {
                index,
                amount: call.amount_received.as_decimal(),
            });
        }
        call.validate()?;
        let funding = matches!(
            call.status,
            CapitalCallStatus::InProgress | CapitalCallStatus::Completed
        );
        if !funding || call.amount_received.is_zero() {
            continue;
        }
        flows.push(CashFlow {
            date: call.due_date,
            amount: call.amount_received,
            label: Some(format!("Capital call #{}", call.call_number)),
        });
    }
    flows.sort_by_key(|cf| cf.date);
    Ok(flows)
}

// ---------------------------------------------------------------------------
// Distribution events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistributionType {
    Exit,
    Dividend,
    Interest,
    Recapitalization,
    ReturnOfCapital,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistributionStatus {
    Pending,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionEvent {
    pub fund_id: String,
    pub event_date: NaiveDate,
    pub event_type: DistributionType,
    pub gross_proceeds: Money,
    pub expenses: Money,
    pub status: DistributionStatus,
    /// Liquidity event attached to this distribution (IPO, sale of the
    /// management company, ...), used for carry vesting acceleration.
    #[serde(default)]
    pub acceleration: Option<AccelerationTrigger>,
}

impl DistributionEvent {
    pub fn net_proceeds(&self) -> Money {
        self.gross_proceeds - self.expenses
    }

    pub fn validate(&self) -> FundEngineResult<()> {
        if self.gross_proceeds.is_negative() {
            return Err(FundEngineError::InvalidDistribution {
                reason: format!("gross proceeds {} are negative", self.gross_proceeds),
            });
        }
        if self.expenses.is_negative() {
            return Err(FundEngineError::InvalidDistribution {
                reason: format!("expenses {} are negative", self.expenses),
            });
        }
        if self.expenses > self.gross_proceeds {
            return Err(FundEngineError::InvalidDistribution {
                reason: format!(
                    "expenses {} exceed gross proceeds {}",
                    self.expenses, self.gross_proceeds
                ),
            });
        }
        Ok(())
    }

    /// Copy with new amounts. Completed events are immutable.
    pub fn amend(&self, gross_proceeds: Money, expenses: Money) -> FundEngineResult<DistributionEvent> {
        if self.status == DistributionStatus::Completed {
            return Err(FundEngineError::InvalidDistribution {
                reason: format!(
                    "distribution of {} on {} is completed and cannot be amended",
                    self.gross_proceeds, self.event_date
                ),
            });
        }
        let amended = DistributionEvent {
            gross_proceeds,
            expenses,
            ..self.clone()
        };
        amended.validate()?;
        Ok(amended)
    }

    pub fn complete(&self) -> DistributionEvent {
        DistributionEvent {
            status: DistributionStatus::Completed,
            ..self.clone()
        }
    }
}

/// Completed distributions in date order (stable for same-day events).
pub fn completed_distributions(events: &[DistributionEvent]) -> FundEngineResult<Vec<&DistributionEvent>> {
    let mut done = Vec::new();
    for e in events {
        e.validate()?;
        if e.status == DistributionStatus::Completed {
            done.push(e);
        }
    }
    done.sort_by_key(|e| e.event_date);
    Ok(done)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(s: &str) -> Money {
        s.parse().unwrap()
    }

    fn d(y: i32, mo: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, mo, day).unwrap()
    }

    fn call(n: u32, total: &str, received: &str, date: NaiveDate, status: CapitalCallStatus) -> CapitalCall {
        CapitalCall {
            fund_id: "F1".into(),
            call_number: n,
            total_amount: m(total),
            amount_received: m(received),
            due_date: date,
            status,
        }
    }

    fn dist(date: NaiveDate, gross: &str, expenses: &str, status: DistributionStatus) -> DistributionEvent {
        DistributionEvent {
            fund_id: "F1".into(),
            event_date: date,
            event_type: DistributionType::Exit,
            gross_proceeds: m(gross),
            expenses: m(expenses),
            status,
            acceleration: None,
        }
    }

    #[test]
    fn test_received_cannot_exceed_total() {
        let c = call(1, "100", "101", d(2020, 1, 1), CapitalCallStatus::Completed);
        assert!(c.validate().is_err());
        let c = call(1, "100", "100", d(2020, 1, 1), CapitalCallStatus::Completed);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_status_transitions_forward_only() {
        let c = call(1, "100", "0", d(2020, 1, 1), CapitalCallStatus::Draft);
        let sent = c.transition(CapitalCallStatus::Sent).unwrap();
        let in_progress = sent.transition(CapitalCallStatus::InProgress).unwrap();
        let done = in_progress.transition(CapitalCallStatus::Completed).unwrap();
        assert_eq!(done.status, CapitalCallStatus::Completed);
        let err = done.transition(CapitalCallStatus::Sent).unwrap_err();
        assert!(matches!(err, FundEngineError::InvalidStatusTransition { .. }));
        // Original value is untouched
        assert_eq!(c.status, CapitalCallStatus::Draft);
    }

    #[test]
    fn test_contribution_flows_skip_drafts_and_sort() {
        let calls = vec![
            call(2, "500", "500", d(2021, 6, 1), CapitalCallStatus::Completed),
            call(3, "500", "0", d(2022, 1, 1), CapitalCallStatus::Draft),
            call(1, "1000", "800", d(2020, 1, 1), CapitalCallStatus::InProgress),
        ];
        let flows = contribution_flows(&calls).unwrap();
        assert_eq!(flows.len(), 2);
        assert_eq!(flows[0].date, d(2020, 1, 1));
        assert_eq!(flows[0].amount, m("800"));
        assert_eq!(flows[1].amount, m("500"));
    }

    #[test]
    fn test_sent_call_receipts_are_not_contributions() {
        let calls = vec![
            call(1, "1000", "1000", d(2020, 1, 1), CapitalCallStatus::Completed),
            call(2, "1000", "250", d(2020, 6, 1), CapitalCallStatus::Sent),
        ];
        let flows = contribution_flows(&calls).unwrap();
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].amount, m("1000"));

        let moved = calls[1].transition(CapitalCallStatus::InProgress).unwrap();
        let flows = contribution_flows(&[calls[0].clone(), moved]).unwrap();
        assert_eq!(flows.len(), 2);
        assert_eq!(flows[1].amount, m("250"));
    }

    #[test]
    fn test_negative_contribution_rejected() {
        let calls = vec![call(1, "100", "-5", d(2020, 1, 1), CapitalCallStatus::Completed)];
        let err = contribution_flows(&calls).unwrap_err();
        assert!(matches!(err, FundEngineError::NegativeContribution { index: 0, .. }));
    }

    #[test]
    fn test_summary() {
        let calls = vec![
            call(1, "1000", "1000", d(2020, 1, 1), CapitalCallStatus::Completed),
            call(2, "500", "200", d(2021, 1, 1), CapitalCallStatus::InProgress),
            call(3, "700", "0", d(2022, 1, 1), CapitalCallStatus::Draft),
        ];
        let s = summarize_capital_calls(&calls).unwrap();
        assert_eq!(s.total_called, m("1500"));
        assert_eq!(s.total_received, m("1200"));
        assert_eq!(s.outstanding, m("300"));
        assert_eq!((s.draft, s.sent, s.in_progress, s.completed), (1, 0, 1, 1));
    }

    #[test]
    fn test_net_proceeds_and_validation() {
        let e = dist(d(2023, 1, 1), "1000", "25.5", DistributionStatus::Pending);
        assert_eq!(e.net_proceeds(), m("974.5"));
        assert!(dist(d(2023, 1, 1), "10", "11", DistributionStatus::Pending)
            .validate()
            .is_err());
    }

    #[test]
    fn test_completed_distribution_is_immutable() {
        let e = dist(d(2023, 1, 1), "1000", "0", DistributionStatus::Pending);
        let amended = e.amend(m("1200"), m("10")).unwrap();
        assert_eq!(amended.net_proceeds(), m("1190"));
        let done = amended.complete();
        assert!(matches!(
            done.amend(m("1"), m("0")).unwrap_err(),
            FundEngineError::InvalidDistribution { .. }
        ));
    }

    #[test]
    fn test_completed_distributions_filters_and_orders() {
        let events = vec![
            dist(d(2024, 1, 1), "10", "0", DistributionStatus::Completed),
            dist(d(2023, 1, 1), "20", "0", DistributionStatus::Pending),
            dist(d(2022, 1, 1), "30", "0", DistributionStatus::Completed),
        ];
        let done = completed_distributions(&events).unwrap();
        assert_eq!(done.len(), 2);
        assert_eq!(done[0].gross_proceeds, m("30"));
    }
}
