//! Configurable reward shaping.

use std::collections::VecDeque;

use super::config::RewardWeights;

/// Stateful per-episode reward calculator. Keeps a trailing window of
/// step returns so the Sharpe-like bonus rewards improvement rather than
/// level.
#[derive(Debug, Clone)]
pub struct RewardShaper {
    weights: RewardWeights,
    starting_cash: f64,
    returns: VecDeque<f64>,
    last_sharpe: f64,
}

impl RewardShaper {
    pub fn new(weights: RewardWeights, starting_cash: f64) -> Self {
        let capacity = weights.sharpe_window;
        RewardShaper {
            weights,
            starting_cash,
            returns: VecDeque::with_capacity(capacity),
            last_sharpe: 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.returns.clear();
        self.last_sharpe = 0.0;
    }

    pub fn weights(&self) -> &RewardWeights {
        &self.weights
    }

    pub fn trailing_sharpe(&self) -> f64 {
        self.last_sharpe
    }

    pub fn reward(
        &mut self,
        previous_equity: f64,
        equity: f64,
        drawdown: f64,
        shield_override: bool,
    ) -> f64 {
        let w = &self.weights;
        let equity_term = (equity - previous_equity) / self.starting_cash;

        let step_return = if previous_equity > 0.0 {
            equity / previous_equity - 1.0
        } else {
            0.0
        };
        if self.returns.len() == w.sharpe_window {
            self.returns.pop_front();
        }
        self.returns.push_back(step_return);
        let sharpe = window_sharpe(&self.returns);
        let improvement = sharpe - self.last_sharpe;
        self.last_sharpe = sharpe;

        let shield = if shield_override { 1.0 } else { 0.0 };

        w.equity_change * equity_term - w.drawdown_penalty * drawdown
            + w.sharpe_bonus * improvement
            - w.shield_penalty * shield
    }
}

/// Mean over sample standard deviation; 0 when undefined.
fn window_sharpe(returns: &VecDeque<f64>) -> f64 {
    let n = returns.len();
    if n < 2 {
        return 0.0;
    }
    let mean = returns.iter().sum::<f64>() / n as f64;
    let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    let std = var.sqrt();
    if std > 0.0 { mean / std } else { 0.0 }
}
