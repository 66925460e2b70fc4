pub mod fund;
pub mod irr;
pub mod nav;
pub mod portfolio;
pub mod vesting;
pub mod waterfall;
