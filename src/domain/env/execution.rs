//! Fill simulation: slippage, commissions, sizing and cash settlement.
//!
//! Slippage is always adverse: buys (long entry, short cover) fill above the
//! reference price and sells fill below it. Fill prices, commissions and
//! every cash movement are rounded to the configured decimals with decimal
//! arithmetic, so the ledger never accumulates sub-tick drift.

use chrono::NaiveDate;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

use super::account::AccountState;
use super::config::EnvConfig;
use super::position::{ExitReason, Position, Side, Trade};

const BPS: f64 = 10_000.0;

/// Round half away from zero to `decimals` places. Values that cannot be
/// represented as a decimal are returned unchanged.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    Decimal::from_f64(value)
        .map(|d| d.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|d| d.to_f64())
        .unwrap_or(value)
}

pub fn calculate_commission(notional: f64, commission_bps: f64) -> f64 {
    notional * commission_bps / BPS
}

/// Price paid when buying at `reference`.
pub fn buy_fill(reference: f64, config: &EnvConfig) -> f64 {
    round_to(
        reference * (1.0 + config.slippage_bps / BPS),
        config.price_decimals,
    )
}

/// Price received when selling at `reference`.
pub fn sell_fill(reference: f64, config: &EnvConfig) -> f64 {
    round_to(
        reference * (1.0 - config.slippage_bps / BPS),
        config.price_decimals,
    )
}

/// Whole units affordable with `fraction` of `cash`, commission included.
pub fn position_size(cash: f64, fraction: f64, fill_price: f64, commission_bps: f64) -> u64 {
    if !(fill_price > 0.0) || !(cash > 0.0) {
        return 0;
    }
    let budget = cash * fraction;
    let per_unit = fill_price * (1.0 + commission_bps / BPS);
    (budget / per_unit).floor().max(0.0) as u64
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntryResult {
    Entered {
        size: u64,
        fill_price: f64,
        commission: f64,
    },
    InsufficientCapital,
}

/// Open a position at `reference` (the bar open). Cash is debited for the
/// notional plus commission; shorts escrow their notional the same way.
pub fn enter(
    account: &mut AccountState,
    side: Side,
    reference: f64,
    date: NaiveDate,
    step: usize,
    config: &EnvConfig,
) -> EntryResult {
    let fill_price = match side {
        Side::Long => buy_fill(reference, config),
        Side::Short => sell_fill(reference, config),
    };
    let size = position_size(
        account.cash,
        config.position_fraction,
        fill_price,
        config.commission_bps,
    );
    if size == 0 {
        return EntryResult::InsufficientCapital;
    }

    let decimals = config.price_decimals;
    let notional = round_to(size as f64 * fill_price, decimals);
    let commission = round_to(
        calculate_commission(notional, config.commission_bps),
        decimals,
    );
    let debit = round_to(notional + commission, decimals);
    if debit > account.cash {
        return EntryResult::InsufficientCapital;
    }
    account.cash = round_to(account.cash - debit, decimals);

    let (stop_price, target_price) = levels(side, fill_price, config);
    account.position = Some(Position {
        side,
        size,
        entry_price: fill_price,
        entry_reference: reference,
        entry_time: date,
        entry_step: step,
        entry_commission: commission,
        stop_price,
        target_price,
    });

    EntryResult::Entered {
        size,
        fill_price,
        commission,
    }
}

fn levels(side: Side, fill_price: f64, config: &EnvConfig) -> (f64, f64) {
    let stop = if config.stop_loss_pct > 0.0 {
        fill_price * (1.0 - side.sign() * config.stop_loss_pct / 100.0)
    } else {
        0.0
    };
    let target = if config.take_profit_pct > 0.0 {
        fill_price * (1.0 + side.sign() * config.take_profit_pct / 100.0)
    } else {
        0.0
    };
    (stop, target)
}

/// Close the open position at `reference` and return the ledger entry.
/// Returns `None` when the account is flat.
pub fn exit(
    account: &mut AccountState,
    reference: f64,
    date: NaiveDate,
    step: usize,
    reason: ExitReason,
    config: &EnvConfig,
) -> Option<Trade> {
    let position = account.position.take()?;
    let exit_price = match position.side {
        Side::Long => sell_fill(reference, config),
        Side::Short => buy_fill(reference, config),
    };

    let decimals = config.price_decimals;
    let size = position.size as f64;
    let exit_value = round_to(size * exit_price, decimals);
    let exit_commission = round_to(
        calculate_commission(exit_value, config.commission_bps),
        decimals,
    );
    let sign = position.side.sign();

    let credit = match position.side {
        Side::Long => exit_value - exit_commission,
        Side::Short => {
            let escrow = round_to(position.entry_notional(), decimals);
            escrow + (escrow - exit_value) - exit_commission
        }
    };
    account.cash = round_to(account.cash + credit, decimals);

    let price_pnl = round_to(sign * size * (exit_price - position.entry_price), decimals);
    let commission = round_to(position.entry_commission + exit_commission, decimals);
    let net_pnl = round_to(price_pnl - commission, decimals);
    account.realized_pnl = round_to(account.realized_pnl + net_pnl, decimals);

    let gross_pnl = round_to(sign * size * (reference - position.entry_reference), decimals);
    let slippage = round_to(
        size * ((position.entry_price - position.entry_reference).abs()
            + (exit_price - reference).abs()),
        decimals,
    );

    Some(Trade {
        side: position.side,
        size: position.size,
        entry_price: position.entry_price,
        exit_price,
        entry_time: position.entry_time,
        exit_time: date,
        holding_bars: step.saturating_sub(position.entry_step),
        gross_pnl,
        commission,
        slippage,
        net_pnl,
        exit_reason: reason,
    })
}
