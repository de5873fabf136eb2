//! Open position and closed-trade records.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub side: Side,
    pub size: u64,
    pub entry_price: f64,
    /// Market open the fill was taken against, before slippage.
    pub entry_reference: f64,
    pub entry_time: NaiveDate,
    pub entry_step: usize,
    pub entry_commission: f64,
    /// 0.0 when disabled.
    pub stop_price: f64,
    /// 0.0 when disabled.
    pub target_price: f64,
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.side == Side::Long
    }

    pub fn is_short(&self) -> bool {
        self.side == Side::Short
    }

    pub fn entry_notional(&self) -> f64 {
        self.size as f64 * self.entry_price
    }

    /// Value the position contributes to equity at `price`. Shorts escrow
    /// their entry notional and settle the price difference on top.
    pub fn market_value(&self, price: f64) -> f64 {
        match self.side {
            Side::Long => self.size as f64 * price,
            Side::Short => self.entry_notional() + self.unrealized_pnl(price),
        }
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.side.sign() * self.size as f64 * (price - self.entry_price)
    }

    /// Unrealized loss as a positive fraction of entry notional; 0 when in profit.
    pub fn loss_fraction(&self, price: f64) -> f64 {
        let notional = self.entry_notional();
        if notional <= 0.0 {
            return 0.0;
        }
        (-self.unrealized_pnl(price) / notional).max(0.0)
    }

    pub fn should_stop_loss(&self, price: f64) -> bool {
        if self.stop_price == 0.0 {
            return false;
        }
        match self.side {
            Side::Long => price <= self.stop_price,
            Side::Short => price >= self.stop_price,
        }
    }

    pub fn should_take_profit(&self, price: f64) -> bool {
        if self.target_price == 0.0 {
            return false;
        }
        match self.side {
            Side::Long => price >= self.target_price,
            Side::Short => price <= self.target_price,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    Signal,
    Stop,
    Target,
    Shield,
    /// End-of-episode liquidation.
    Forced,
    /// Equity fell below the liquidation floor.
    Liquidation,
}

/// Immutable ledger entry written when a position closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub side: Side,
    pub size: u64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_time: NaiveDate,
    pub exit_time: NaiveDate,
    pub holding_bars: usize,
    /// Price move on the reference prices, before any cost.
    pub gross_pnl: f64,
    pub commission: f64,
    pub slippage: f64,
    pub net_pnl: f64,
    pub exit_reason: ExitReason,
}

impl Trade {
    pub fn holding_days(&self) -> i64 {
        (self.exit_time - self.entry_time).num_days()
    }

    /// Net P&L relative to entry notional.
    pub fn return_pct(&self) -> f64 {
        let notional = self.size as f64 * self.entry_price;
        if notional > 0.0 {
            self.net_pnl / notional
        } else {
            0.0
        }
    }
}
