//! Cash, equity and open-position bookkeeping for a single episode.

use serde::{Deserialize, Serialize};

use super::position::{Position, Side};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    pub cash: f64,
    pub equity: f64,
    pub position: Option<Position>,
    pub step_index: usize,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub peak_equity: f64,
    pub starting_cash: f64,
}

impl AccountState {
    pub fn new(starting_cash: f64) -> Self {
        AccountState {
            cash: starting_cash,
            equity: starting_cash,
            position: None,
            step_index: 0,
            realized_pnl: 0.0,
            unrealized_pnl: 0.0,
            peak_equity: starting_cash,
            starting_cash,
        }
    }

    pub fn side(&self) -> Option<Side> {
        self.position.as_ref().map(|p| p.side)
    }

    pub fn is_flat(&self) -> bool {
        self.position.is_none()
    }

    /// Revalue the account at `price` and update the equity peak.
    pub fn mark(&mut self, price: f64) {
        let (value, unrealized) = match &self.position {
            Some(pos) => (pos.market_value(price), pos.unrealized_pnl(price)),
            None => (0.0, 0.0),
        };
        self.unrealized_pnl = unrealized;
        self.equity = self.cash + value;
        if self.equity > self.peak_equity {
            self.peak_equity = self.equity;
        }
    }

    /// Fractional distance of current equity below its running peak.
    pub fn drawdown(&self) -> f64 {
        if self.peak_equity > 0.0 {
            ((self.peak_equity - self.equity) / self.peak_equity).max(0.0)
        } else {
            0.0
        }
    }

    /// Equity must equal cash plus the open position's value at `price`.
    pub fn is_consistent(&self, price: f64) -> bool {
        let value = self
            .position
            .as_ref()
            .map_or(0.0, |pos| pos.market_value(price));
        let expected = self.cash + value;
        (self.equity - expected).abs() <= 1e-6 * expected.abs().max(1.0)
            && self.equity.is_finite()
            && self.cash.is_finite()
    }
}
