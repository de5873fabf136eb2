//! Market environment: a finite-state trading account stepped one bar at a
//! time by a policy.

pub mod account;
pub mod action;
pub mod config;
pub mod execution;
pub mod market;
pub mod position;
pub mod reward;

pub use account::AccountState;
pub use action::{Action, EnvState};
pub use config::{EnvConfig, RewardWeights};
pub use market::{ACCOUNT_FEATURES, EquityPoint, Fill, MarketEnv, Observation, StepInfo, StepOutcome};
pub use position::{ExitReason, Position, Side, Trade};
