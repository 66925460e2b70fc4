use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broad error classes. Batch callers use these to decide whether to keep
/// going, display "N/A", or raise an alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Malformed or out-of-range input.
    Validation,
    /// Division by zero, non-convergence.
    Arithmetic,
    /// An invariant failed at computation time. Treated as a bug signal.
    Consistency,
    /// JSON plumbing at the crate boundary.
    Serialization,
}

#[derive(Debug, Error)]
pub enum FundEngineError {
    #[error("Invalid input: {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Invalid vesting schedule: {reason}")]
    InvalidSchedule { reason: String },

    #[error("Invalid distribution: {reason}")]
    InvalidDistribution { reason: String },

    #[error("Negative contribution at index {index}: {amount}")]
    NegativeContribution { index: usize, amount: Decimal },

    #[error("Waterfall tier {tier_index} misconfigured: {reason}")]
    TierRangeOverlap { tier_index: u32, reason: String },

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Division by zero in {context}")]
    DivisionByZero { context: String },

    #[error("Outstanding shares must be positive, got {shares}")]
    ZeroOutstandingShares { shares: Decimal },

    #[error("No convergence: {function} did not converge after {iterations} iterations (last NPV: {last_delta})")]
    NoConvergence {
        function: String,
        iterations: u32,
        last_delta: Decimal,
    },

    #[error("Consistency violation: {invariant}: {detail}")]
    ConsistencyViolation { invariant: String, detail: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl FundEngineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            FundEngineError::InvalidInput { .. }
            | FundEngineError::InvalidSchedule { .. }
            | FundEngineError::InvalidDistribution { .. }
            | FundEngineError::NegativeContribution { .. }
            | FundEngineError::TierRangeOverlap { .. }
            | FundEngineError::InvalidStatusTransition { .. }
            | FundEngineError::InsufficientData(_) => ErrorClass::Validation,
            FundEngineError::DivisionByZero { .. }
            | FundEngineError::ZeroOutstandingShares { .. }
            | FundEngineError::NoConvergence { .. } => ErrorClass::Arithmetic,
            FundEngineError::ConsistencyViolation { .. } => ErrorClass::Consistency,
            FundEngineError::SerializationError(_) => ErrorClass::Serialization,
        }
    }

    /// Errors a caller should degrade to "N/A" instead of failing the
    /// surrounding computation.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FundEngineError::NoConvergence { .. })
    }

    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        FundEngineError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Build a consistency violation and log it with the offending input.
    pub(crate) fn consistency(
        invariant: &str,
        detail: impl Into<String>,
        snapshot: &impl Serialize,
    ) -> Self {
        let detail = detail.into();
        let snapshot = serde_json::to_string(snapshot).unwrap_or_else(|e| format!("<unserializable: {e}>"));
        tracing::error!(invariant, detail = %detail, snapshot = %snapshot, "consistency violation");
        FundEngineError::ConsistencyViolation {
            invariant: invariant.into(),
            detail,
        }
    }
}

impl From<serde_json::Error> for FundEngineError {
    fn from(e: serde_json::Error) -> Self {
        FundEngineError::SerializationError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_error_classes() {
        let e = FundEngineError::ZeroOutstandingShares { shares: dec!(0) };
        assert_eq!(e.class(), ErrorClass::Arithmetic);
        assert!(!e.is_recoverable());

        let e = FundEngineError::NoConvergence {
            function: "XIRR".into(),
            iterations: 100,
            last_delta: dec!(1),
        };
        assert_eq!(e.class(), ErrorClass::Arithmetic);
        assert!(e.is_recoverable());

        let e = FundEngineError::ConsistencyViolation {
            invariant: "distributed_carry <= vested_carry".into(),
            detail: "x".into(),
        };
        assert_eq!(e.class(), ErrorClass::Consistency);

        let e = FundEngineError::TierRangeOverlap {
            tier_index: 2,
            reason: "overlap".into(),
        };
        assert_eq!(e.class(), ErrorClass::Validation);
    }

    #[test]
    fn test_display_messages() {
        let e = FundEngineError::invalid("tiers", "empty");
        assert_eq!(e.to_string(), "Invalid input: tiers: empty");
    }
}
