pub mod error;
pub mod events;
pub mod money;
pub mod time_value;
pub mod types;
pub mod vesting;

#[cfg(feature = "waterfall")]
pub mod waterfall;

#[cfg(feature = "nav")]
pub mod nav;

#[cfg(any(feature = "cohort", feature = "concentration"))]
pub mod positions;

#[cfg(feature = "cohort")]
pub mod cohort;

#[cfg(feature = "concentration")]
pub mod concentration;

#[cfg(feature = "fund")]
pub mod fund;

pub use error::{ErrorClass, FundEngineError};
pub use types::*;

/// Standard result type for all fund-engine operations
pub type FundEngineResult<T> = Result<T, FundEngineError>;
