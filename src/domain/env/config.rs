//! Immutable environment configuration.

use serde::{Deserialize, Serialize};

use crate::domain::error::WfsimError;

/// Reward shaping weights.
///
/// `reward = equity_change * Δequity/starting_cash
///         - drawdown_penalty * drawdown_from_peak
///         + sharpe_bonus * Δ(trailing Sharpe)
///         - shield_penalty * [shield override this step]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardWeights {
    pub equity_change: f64,
    pub drawdown_penalty: f64,
    pub sharpe_bonus: f64,
    pub sharpe_window: usize,
    /// 0.0 keeps shield overrides reward-neutral.
    pub shield_penalty: f64,
}

impl Default for RewardWeights {
    fn default() -> Self {
        RewardWeights {
            equity_change: 1.0,
            drawdown_penalty: 0.5,
            sharpe_bonus: 0.1,
            sharpe_window: 20,
            shield_penalty: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvConfig {
    pub starting_cash: f64,
    pub commission_bps: f64,
    pub slippage_bps: f64,
    /// Fraction of current cash committed when opening a position.
    pub position_fraction: f64,
    pub allow_shorting: bool,
    /// Percent distance from entry; 0 disables.
    pub stop_loss_pct: f64,
    /// Percent distance from entry; 0 disables.
    pub take_profit_pct: f64,
    /// Unrealized loss, as a fraction of entry notional, beyond which the
    /// shield forces a close.
    pub max_trade_drawdown: f64,
    /// Equity below `liquidation_floor * starting_cash` ends the episode.
    pub liquidation_floor: f64,
    pub price_decimals: u32,
    pub reward: RewardWeights,
}

impl Default for EnvConfig {
    fn default() -> Self {
        EnvConfig {
            starting_cash: 10_000.0,
            commission_bps: 10.0,
            slippage_bps: 15.0,
            position_fraction: 1.0,
            allow_shorting: true,
            stop_loss_pct: 0.0,
            take_profit_pct: 0.0,
            max_trade_drawdown: 0.10,
            liquidation_floor: 0.5,
            price_decimals: 2,
            reward: RewardWeights::default(),
        }
    }
}

impl EnvConfig {
    pub fn validate(&self) -> Result<(), WfsimError> {
        let section = "environment";
        if !(self.starting_cash > 0.0) {
            return Err(WfsimError::invalid(
                section,
                "starting_cash",
                "starting_cash must be positive",
            ));
        }
        if self.commission_bps < 0.0 {
            return Err(WfsimError::invalid(
                section,
                "commission_bps",
                "commission_bps must be non-negative",
            ));
        }
        if self.slippage_bps < 0.0 {
            return Err(WfsimError::invalid(
                section,
                "slippage_bps",
                "slippage_bps must be non-negative",
            ));
        }
        if !(self.position_fraction > 0.0 && self.position_fraction <= 1.0) {
            return Err(WfsimError::invalid(
                section,
                "position_fraction",
                "position_fraction must be in (0, 1]",
            ));
        }
        if self.stop_loss_pct < 0.0 {
            return Err(WfsimError::invalid(
                section,
                "stop_loss_pct",
                "stop_loss_pct must be non-negative",
            ));
        }
        if self.take_profit_pct < 0.0 {
            return Err(WfsimError::invalid(
                section,
                "take_profit_pct",
                "take_profit_pct must be non-negative",
            ));
        }
        if !(self.max_trade_drawdown > 0.0 && self.max_trade_drawdown <= 1.0) {
            return Err(WfsimError::invalid(
                section,
                "max_trade_drawdown",
                "max_trade_drawdown must be in (0, 1]",
            ));
        }
        if !(0.0..1.0).contains(&self.liquidation_floor) {
            return Err(WfsimError::invalid(
                section,
                "liquidation_floor",
                "liquidation_floor must be in [0, 1)",
            ));
        }
        if self.price_decimals > 8 {
            return Err(WfsimError::invalid(
                section,
                "price_decimals",
                "price_decimals must be at most 8",
            ));
        }
        let w = &self.reward;
        for (key, value) in [
            ("equity_change", w.equity_change),
            ("drawdown_penalty", w.drawdown_penalty),
            ("sharpe_bonus", w.sharpe_bonus),
            ("shield_penalty", w.shield_penalty),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(WfsimError::invalid(
                    "reward",
                    key,
                    format!("{} must be a non-negative number", key),
                ));
            }
        }
        if w.sharpe_window < 2 {
            return Err(WfsimError::invalid(
                "reward",
                "sharpe_window",
                "sharpe_window must be at least 2",
            ));
        }
        Ok(())
    }
}
