//! Core simulation types and logic. Nothing in here performs I/O except
//! through the traits in [`crate::ports`].

pub mod backtest;
pub mod bar;
pub mod config_validation;
pub mod env;
pub mod error;
pub mod feature;
pub mod metrics;
pub mod policy;
pub mod range;
pub mod walkforward;
