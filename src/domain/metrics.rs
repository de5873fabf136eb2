//! Performance metrics over an equity curve and trade ledger.
//!
//! Every function is total: empty ledgers, single-point or flat curves
//! return `0.0` instead of failing, so reports render for empty backtests.
//! The one exception is `profit_factor`, which is `+inf` when there are
//! winners and no losers.
//!
//! Value at risk and its conditional counterpart are historical, read off
//! the period-return distribution, and reported as returns (negative for a
//! loss). Fewer than [`MIN_VAR_SAMPLES`] returns gives `0.0`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::env::{EquityPoint, Trade};
use super::error::WfsimError;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;
pub const VAR_CONFIDENCE: f64 = 0.95;
pub const MIN_VAR_SAMPLES: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Annual risk-free rate.
    pub risk_free_rate: f64,
    pub periods_per_year: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        MetricsConfig {
            risk_free_rate: 0.0,
            periods_per_year: TRADING_DAYS_PER_YEAR,
        }
    }
}

impl MetricsConfig {
    pub fn validate(&self) -> Result<(), WfsimError> {
        if !(self.periods_per_year > 0.0) {
            return Err(WfsimError::invalid(
                "metrics",
                "periods_per_year",
                "periods_per_year must be positive",
            ));
        }
        if !self.risk_free_rate.is_finite() {
            return Err(WfsimError::invalid(
                "metrics",
                "risk_free_rate",
                "risk_free_rate must be a finite number",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub total_return: f64,
    pub cagr: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    /// Longest run of consecutive periods below a prior peak.
    pub max_drawdown_duration: usize,
    /// CAGR over max drawdown; `0.0` without a drawdown.
    pub calmar_ratio: f64,
    pub var_95: f64,
    pub cvar_95: f64,
    pub total_trades: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub avg_holding_bars: f64,
    pub final_equity: f64,
}

impl Metrics {
    pub fn compute(curve: &[EquityPoint], trades: &[Trade], config: &MetricsConfig) -> Self {
        let returns = period_returns(curve);
        let (max_drawdown, max_drawdown_duration) = max_drawdown(curve);
        let cagr = cagr(curve, config.periods_per_year);
        let (var_95, cvar_95) = value_at_risk(&returns, VAR_CONFIDENCE);
        let pnls: Vec<f64> = trades.iter().map(|t| t.net_pnl).collect();

        let trades_won = pnls.iter().filter(|p| **p > 0.0).count();
        let trades_lost = pnls.iter().filter(|p| **p < 0.0).count();
        let largest_win = pnls.iter().copied().filter(|p| *p > 0.0).fold(0.0, f64::max);
        let largest_loss = pnls
            .iter()
            .copied()
            .filter(|p| *p < 0.0)
            .map(f64::abs)
            .fold(0.0, f64::max);
        let avg_holding_bars = if trades.is_empty() {
            0.0
        } else {
            trades.iter().map(|t| t.holding_bars as f64).sum::<f64>() / trades.len() as f64
        };

        Metrics {
            total_return: total_return(curve),
            cagr,
            volatility: volatility(&returns, config.periods_per_year),
            sharpe_ratio: sharpe_ratio(&returns, config.risk_free_rate, config.periods_per_year),
            sortino_ratio: sortino_ratio(&returns, config.risk_free_rate, config.periods_per_year),
            max_drawdown,
            max_drawdown_duration,
            calmar_ratio: calmar_ratio(cagr, max_drawdown),
            var_95,
            cvar_95,
            total_trades: trades.len(),
            trades_won,
            trades_lost,
            win_rate: win_rate(&pnls),
            profit_factor: profit_factor(&pnls),
            avg_win: avg_win(&pnls),
            avg_loss: avg_loss(&pnls),
            largest_win,
            largest_loss,
            avg_holding_bars,
            final_equity: curve.last().map_or(0.0, |p| p.equity),
        }
    }

    /// Flat name → value view used in reports.
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        [
            ("total_return", self.total_return),
            ("cagr", self.cagr),
            ("volatility", self.volatility),
            ("sharpe_ratio", self.sharpe_ratio),
            ("sortino_ratio", self.sortino_ratio),
            ("max_drawdown", self.max_drawdown),
            ("max_drawdown_duration", self.max_drawdown_duration as f64),
            ("calmar_ratio", self.calmar_ratio),
            ("var_95", self.var_95),
            ("cvar_95", self.cvar_95),
            ("total_trades", self.total_trades as f64),
            ("trades_won", self.trades_won as f64),
            ("trades_lost", self.trades_lost as f64),
            ("win_rate", self.win_rate),
            ("profit_factor", self.profit_factor),
            ("avg_win", self.avg_win),
            ("avg_loss", self.avg_loss),
            ("largest_win", self.largest_win),
            ("largest_loss", self.largest_loss),
            ("avg_holding_bars", self.avg_holding_bars),
            ("final_equity", self.final_equity),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

pub fn period_returns(curve: &[EquityPoint]) -> Vec<f64> {
    curve
        .windows(2)
        .map(|w| {
            let prev = w[0].equity;
            if prev > 0.0 {
                (w[1].equity - prev) / prev
            } else {
                0.0
            }
        })
        .collect()
}

pub fn total_return(curve: &[EquityPoint]) -> f64 {
    match (curve.first(), curve.last()) {
        (Some(first), Some(last)) if first.equity > 0.0 => {
            (last.equity - first.equity) / first.equity
        }
        _ => 0.0,
    }
}

/// Compound annual growth over `len - 1` periods.
pub fn cagr(curve: &[EquityPoint], periods_per_year: f64) -> f64 {
    if curve.len() < 2 {
        return 0.0;
    }
    let years = (curve.len() - 1) as f64 / periods_per_year;
    let growth = 1.0 + total_return(curve);
    if years > 0.0 && growth > 0.0 {
        growth.powf(1.0 / years) - 1.0
    } else {
        0.0
    }
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Annualized population standard deviation of period returns.
pub fn volatility(returns: &[f64], periods_per_year: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    mean_std(returns).1 * periods_per_year.sqrt()
}

pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64, periods_per_year: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let (mean, std) = mean_std(returns);
    if std > 1e-12 {
        (mean - risk_free_rate / periods_per_year) / std * periods_per_year.sqrt()
    } else {
        0.0
    }
}

/// Like Sharpe but scaled by downside deviation below the per-period
/// risk-free rate.
pub fn sortino_ratio(returns: &[f64], risk_free_rate: f64, periods_per_year: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let rf = risk_free_rate / periods_per_year;
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let downside = returns
        .iter()
        .filter(|r| **r < rf)
        .map(|r| (r - rf).powi(2))
        .sum::<f64>()
        / n;
    let downside = downside.sqrt();
    if downside > 1e-12 {
        (mean - rf) / downside * periods_per_year.sqrt()
    } else {
        0.0
    }
}

/// Largest peak-to-trough decline as a fraction of the peak, and the
/// longest stretch of periods spent below a peak.
pub fn max_drawdown(curve: &[EquityPoint]) -> (f64, usize) {
    let Some(first) = curve.first() else {
        return (0.0, 0);
    };
    let mut peak = first.equity;
    let mut max_dd = 0.0_f64;
    let mut duration = 0usize;
    let mut longest = 0usize;

    for point in curve {
        if point.equity >= peak {
            peak = point.equity;
            duration = 0;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - point.equity) / peak);
            duration += 1;
            longest = longest.max(duration);
        }
    }
    (max_dd, longest)
}

pub fn calmar_ratio(cagr: f64, max_drawdown: f64) -> f64 {
    if max_drawdown > 0.0 { cagr / max_drawdown } else { 0.0 }
}

/// Historical `(VaR, CVaR)` at `confidence`. The VaR is the lower-tail
/// percentile, linearly interpolated between order statistics; the CVaR is
/// the mean of returns at or below it.
pub fn value_at_risk(returns: &[f64], confidence: f64) -> (f64, f64) {
    if returns.len() < MIN_VAR_SAMPLES {
        return (0.0, 0.0);
    }
    let mut sorted = returns.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = (1.0 - confidence) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let var = sorted[lower] + (sorted[upper] - sorted[lower]) * (rank - lower as f64);

    let tail: Vec<f64> = sorted.iter().copied().filter(|r| *r <= var).collect();
    let cvar = if tail.is_empty() {
        var
    } else {
        tail.iter().sum::<f64>() / tail.len() as f64
    };
    (var, cvar)
}

pub fn win_rate(pnls: &[f64]) -> f64 {
    if pnls.is_empty() {
        return 0.0;
    }
    pnls.iter().filter(|p| **p > 0.0).count() as f64 / pnls.len() as f64
}

pub fn profit_factor(pnls: &[f64]) -> f64 {
    let wins: f64 = pnls.iter().filter(|p| **p > 0.0).sum();
    let losses: f64 = pnls.iter().filter(|p| **p < 0.0).map(|p| p.abs()).sum();
    if losses > 0.0 {
        wins / losses
    } else if wins > 0.0 {
        f64::INFINITY
    } else {
        0.0
    }
}

pub fn avg_win(pnls: &[f64]) -> f64 {
    let wins: Vec<f64> = pnls.iter().copied().filter(|p| *p > 0.0).collect();
    if wins.is_empty() {
        0.0
    } else {
        wins.iter().sum::<f64>() / wins.len() as f64
    }
}

/// Mean loss magnitude (positive).
pub fn avg_loss(pnls: &[f64]) -> f64 {
    let losses: Vec<f64> = pnls.iter().copied().filter(|p| *p < 0.0).collect();
    if losses.is_empty() {
        0.0
    } else {
        losses.iter().map(|p| p.abs()).sum::<f64>() / losses.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::env::{ExitReason, Side};
    use approx::assert_relative_eq;
    use chrono::{Duration, NaiveDate};

    fn curve(values: &[f64]) -> Vec<EquityPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| EquityPoint {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(i as i64),
                equity: v,
            })
            .collect()
    }

    fn trade(pnl: f64, bars: usize) -> Trade {
        let entry = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        Trade {
            side: Side::Long,
            size: 100,
            entry_price: 100.0,
            exit_price: 100.0 + pnl / 100.0,
            entry_time: entry,
            exit_time: entry + Duration::days(bars as i64),
            holding_bars: bars,
            gross_pnl: pnl,
            commission: 0.0,
            slippage: 0.0,
            net_pnl: pnl,
            exit_reason: ExitReason::Signal,
        }
    }

    #[test]
    fn empty_inputs_return_sentinels() {
        let m = Metrics::compute(&[], &[], &MetricsConfig::default());
        assert_eq!(m.total_return, 0.0);
        assert_eq!(m.sharpe_ratio, 0.0);
        assert_eq!(m.sortino_ratio, 0.0);
        assert_eq!(m.win_rate, 0.0);
        assert_eq!(m.profit_factor, 0.0);
        assert_eq!(m.max_drawdown, 0.0);
        assert_eq!(m.final_equity, 0.0);
    }

    #[test]
    fn flat_curve_has_zero_risk_metrics() {
        let m = Metrics::compute(&curve(&[100.0; 50]), &[], &MetricsConfig::default());
        assert_eq!(m.total_return, 0.0);
        assert_eq!(m.volatility, 0.0);
        assert_eq!(m.sharpe_ratio, 0.0);
        assert_eq!(m.max_drawdown, 0.0);
        assert_eq!(m.max_drawdown_duration, 0);
    }

    #[test]
    fn total_return_sign() {
        assert_relative_eq!(total_return(&curve(&[100.0, 110.0])), 0.10);
        assert_relative_eq!(total_return(&curve(&[100.0, 90.0])), -0.10);
    }

    #[test]
    fn cagr_over_one_year_equals_total_return() {
        let mut values = vec![100.0; 252];
        values.push(121.0);
        assert_relative_eq!(cagr(&curve(&values), 252.0), 0.21, epsilon = 1e-9);
    }

    #[test]
    fn drawdown_depth_and_duration() {
        let (dd, _) = max_drawdown(&curve(&[100.0, 110.0, 90.0, 95.0, 80.0, 100.0]));
        assert_relative_eq!(dd, 30.0 / 110.0);
        let (_, duration) = max_drawdown(&curve(&[100.0, 110.0, 100.0, 90.0, 85.0, 95.0]));
        assert_eq!(duration, 4);
    }

    #[test]
    fn sharpe_positive_for_steady_gains() {
        let values: Vec<f64> = (0..100)
            .map(|i| 100.0 * (1.0 + 0.001 * i as f64 + 0.0005 * (i % 3) as f64))
            .collect();
        let returns = period_returns(&curve(&values));
        assert!(sharpe_ratio(&returns, 0.0, 252.0) > 0.0);
        assert!(sortino_ratio(&returns, 0.0, 252.0).is_finite());
    }

    #[test]
    fn trade_statistics() {
        let trades = vec![trade(100.0, 5), trade(-60.0, 3), trade(200.0, 10), trade(-40.0, 2)];
        let m = Metrics::compute(&curve(&[100.0, 101.0]), &trades, &MetricsConfig::default());
        assert_eq!(m.total_trades, 4);
        assert_eq!(m.trades_won, 2);
        assert_eq!(m.trades_lost, 2);
        assert_relative_eq!(m.win_rate, 0.5);
        assert_relative_eq!(m.profit_factor, 3.0);
        assert_relative_eq!(m.avg_win, 150.0);
        assert_relative_eq!(m.avg_loss, 50.0);
        assert_relative_eq!(m.largest_win, 200.0);
        assert_relative_eq!(m.largest_loss, 60.0);
        assert_relative_eq!(m.avg_holding_bars, 5.0);
    }

    #[test]
    fn profit_factor_without_losses() {
        assert!(profit_factor(&[10.0, 5.0]).is_infinite());
        assert_eq!(profit_factor(&[0.0]), 0.0);
    }

    #[test]
    fn map_has_every_metric() {
        let m = Metrics::compute(&curve(&[100.0, 101.0]), &[], &MetricsConfig::default());
        let map = m.to_map();
        assert_eq!(map.len(), 21);
        assert_eq!(map["final_equity"], 101.0);
    }

    #[test]
    fn calmar_divides_cagr_by_drawdown() {
        assert_relative_eq!(calmar_ratio(0.2, 0.1), 2.0);
        assert_eq!(calmar_ratio(0.2, 0.0), 0.0);

        let m = Metrics::compute(
            &curve(&[100.0, 110.0, 99.0, 120.0]),
            &[],
            &MetricsConfig::default(),
        );
        assert!(m.max_drawdown > 0.0);
        assert_relative_eq!(m.calmar_ratio, m.cagr / m.max_drawdown);
    }

    #[test]
    fn var_and_cvar_read_the_lower_tail() {
        // -10, -9, ..., 9 percent: rank 0.05 * 19 = 0.95
        let returns: Vec<f64> = (-10..10).map(|i| i as f64 / 100.0).collect();
        let (var, cvar) = value_at_risk(&returns, 0.95);
        assert_relative_eq!(var, -0.0905, epsilon = 1e-12);
        assert_relative_eq!(cvar, -0.10, epsilon = 1e-12);
        assert!(cvar <= var);
    }

    #[test]
    fn var_needs_enough_returns() {
        assert_eq!(value_at_risk(&[-0.5, 0.1, 0.2], 0.95), (0.0, 0.0));
        let m = Metrics::compute(&curve(&[100.0; 5]), &[], &MetricsConfig::default());
        assert_eq!(m.var_95, 0.0);
        assert_eq!(m.cvar_95, 0.0);
        assert_eq!(m.calmar_ratio, 0.0);
    }

    #[test]
    fn config_validation() {
        assert!(MetricsConfig::default().validate().is_ok());
        let bad = MetricsConfig {
            periods_per_year: 0.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
