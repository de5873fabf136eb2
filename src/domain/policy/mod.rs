//! Policies that drive the market environment.
//!
//! A [`StrategyFactory`] is shared by every split of a walk-forward run and
//! builds a fresh [`Strategy`] per split, so no learned state crosses from
//! one evaluation window into the next.

pub mod linear_q;
pub mod rules;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::env::{Action, MarketEnv, Observation};
use crate::domain::error::WfsimError;
use crate::domain::feature::{FeatureFrame, PipelineContract};

pub use linear_q::{LinearQParams, LinearQPolicy};
pub use rules::{BuyAndHold, HoldPolicy, Momentum};

pub trait Strategy: Send {
    fn name(&self) -> &str;

    /// Choose an action from the current observation only.
    fn act(&self, observation: &Observation) -> Action;

    /// Learn against `env` over `frame`. Rule policies have nothing to learn.
    fn train(&mut self, _env: &mut MarketEnv, _frame: Arc<FeatureFrame>) -> Result<(), WfsimError> {
        Ok(())
    }

    /// Opaque weights blob for persistence; `None` for stateless policies.
    fn weights(&self) -> Result<Option<Vec<u8>>, WfsimError> {
        Ok(None)
    }
}

pub trait StrategyFactory: Send + Sync {
    fn name(&self) -> &str;

    fn build(&self, contract: &PipelineContract) -> Result<Box<dyn Strategy>, WfsimError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Hold,
    BuyAndHold,
    Momentum,
    LinearQ,
}

impl std::str::FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hold" => Ok(StrategyKind::Hold),
            "buy_and_hold" => Ok(StrategyKind::BuyAndHold),
            "momentum" => Ok(StrategyKind::Momentum),
            "linear_q" => Ok(StrategyKind::LinearQ),
            other => Err(format!(
                "unknown strategy kind '{}', expected hold, buy_and_hold, momentum or linear_q",
                other
            )),
        }
    }
}

/// Declarative strategy selection; doubles as the factory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub kind: StrategyKind,
    /// Feature column read by `Momentum`.
    pub feature: Option<String>,
    pub threshold: f64,
    pub learning: LinearQParams,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig {
            kind: StrategyKind::Hold,
            feature: None,
            threshold: 0.0,
            learning: LinearQParams::default(),
        }
    }
}

impl StrategyFactory for StrategyConfig {
    fn name(&self) -> &str {
        match self.kind {
            StrategyKind::Hold => "hold",
            StrategyKind::BuyAndHold => "buy_and_hold",
            StrategyKind::Momentum => "momentum",
            StrategyKind::LinearQ => "linear_q",
        }
    }

    fn build(&self, contract: &PipelineContract) -> Result<Box<dyn Strategy>, WfsimError> {
        match self.kind {
            StrategyKind::Hold => Ok(Box::new(HoldPolicy)),
            StrategyKind::BuyAndHold => Ok(Box::new(BuyAndHold)),
            StrategyKind::Momentum => {
                let feature = self
                    .feature
                    .as_deref()
                    .ok_or_else(|| WfsimError::ConfigMissing {
                        section: "strategy".to_string(),
                        key: "feature".to_string(),
                    })?;
                let index = contract
                    .features
                    .iter()
                    .position(|f| f.name == feature)
                    .ok_or_else(|| {
                        WfsimError::invalid(
                            "strategy",
                            "feature",
                            format!("feature '{}' is not in the pipeline contract", feature),
                        )
                    })?;
                Ok(Box::new(Momentum::new(index, self.threshold)))
            }
            StrategyKind::LinearQ => Ok(Box::new(LinearQPolicy::new(
                contract.features.len(),
                self.learning.clone(),
            )?)),
        }
    }
}
