//! Single-asset, discrete-time trading environment.
//!
//! The decision at step `t` is taken on the observation built from row `t`
//! and is filled at the open of row `t + 1`. The new observation is built
//! from row `t + 1` after the account has been marked at its close, so no
//! price later than the fill bar can reach the reward of the same step.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::error::WfsimError;
use crate::domain::feature::FeatureFrame;

use super::account::AccountState;
use super::action::{Action, EnvState};
use super::config::EnvConfig;
use super::execution::{self, EntryResult};
use super::position::{ExitReason, Side, Trade};
use super::reward::RewardShaper;

/// Account-derived values appended to every observation.
pub const ACCOUNT_FEATURES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
}

/// Market features followed by `[side, unrealized / equity,
/// bars_in_position / episode_len, equity / starting_cash - 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub date: NaiveDate,
    pub values: Vec<f64>,
    market_width: usize,
}

impl Observation {
    pub fn market_features(&self) -> &[f64] {
        &self.values[..self.market_width]
    }

    pub fn account_features(&self) -> &[f64] {
        &self.values[self.market_width..]
    }

    /// -1 short, 0 flat, 1 long.
    pub fn position_side(&self) -> f64 {
        self.values[self.market_width]
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub date: NaiveDate,
    pub reference_price: f64,
    pub price: f64,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    pub requested: Action,
    pub executed: Action,
    /// The requested action was not a legal transition and ran as `Hold`.
    pub invalid_action: bool,
    pub shield_override: bool,
    pub decision_date: NaiveDate,
    pub fill: Option<Fill>,
    /// Set when a position closed during this step.
    pub exit_reason: Option<ExitReason>,
    pub equity: f64,
    pub drawdown: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub observation: Observation,
    pub reward: f64,
    pub terminated: bool,
    pub info: StepInfo,
}

pub struct MarketEnv {
    config: EnvConfig,
    frame: Option<Arc<FeatureFrame>>,
    account: AccountState,
    state: EnvState,
    trades: Vec<Trade>,
    equity_curve: Vec<EquityPoint>,
    shaper: RewardShaper,
}

impl MarketEnv {
    pub fn new(config: EnvConfig) -> Result<Self, WfsimError> {
        config.validate()?;
        let shaper = RewardShaper::new(config.reward.clone(), config.starting_cash);
        let account = AccountState::new(config.starting_cash);
        Ok(MarketEnv {
            config,
            frame: None,
            account,
            state: EnvState::Terminated,
            trades: Vec::new(),
            equity_curve: Vec::new(),
            shaper,
        })
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn state(&self) -> EnvState {
        self.state
    }

    pub fn account(&self) -> &AccountState {
        &self.account
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }

    pub fn observation_width(frame: &FeatureFrame) -> usize {
        frame.width() + ACCOUNT_FEATURES
    }

    /// Start a new episode over `frame`. Rows must already be complete; the
    /// pipeline's warmup rows have to be dropped by the caller.
    pub fn reset(&mut self, frame: Arc<FeatureFrame>) -> Result<Observation, WfsimError> {
        if frame.len() < 2 {
            return Err(WfsimError::EpisodeTooShort {
                rows: frame.len(),
                minimum: 2,
            });
        }
        check_row(&frame, 0)?;

        self.account = AccountState::new(self.config.starting_cash);
        self.trades.clear();
        self.shaper.reset();
        self.state = EnvState::Flat;

        let first = &frame.rows()[0];
        self.account.mark(first.bar.close);
        self.equity_curve = vec![EquityPoint {
            date: first.bar.date,
            equity: self.account.equity,
        }];
        self.frame = Some(frame);
        self.observation(0)
    }

    pub fn step(&mut self, action: Action) -> Result<StepOutcome, WfsimError> {
        if self.state == EnvState::Terminated {
            return Err(WfsimError::EpisodeTerminated);
        }
        let frame = match &self.frame {
            Some(frame) => Arc::clone(frame),
            None => return Err(WfsimError::EpisodeTerminated),
        };

        let t = self.account.step_index;
        let next_index = t + 1;
        check_row(&frame, next_index)?;
        let rows = frame.rows();
        let decision = &rows[t].bar;
        let next = &rows[next_index].bar;
        let last_index = frame.len() - 1;

        let resolved = self.state.resolve(action, self.config.allow_shorting);
        let invalid_action = resolved != action;

        let shield_override = resolved != Action::Close
            && self.account.position.as_ref().is_some_and(|pos| {
                pos.loss_fraction(decision.close) > self.config.max_trade_drawdown
            });
        let mut executed = if shield_override {
            debug!(
                date = %decision.date,
                requested = ?action,
                "shield overrides action to close"
            );
            Action::Close
        } else {
            resolved
        };

        let previous_equity = self.account.equity;
        let mut fill = None;
        let mut exit_reason = None;

        match executed {
            Action::Hold => {}
            Action::OpenLong | Action::OpenShort => {
                let side = if executed == Action::OpenLong {
                    Side::Long
                } else {
                    Side::Short
                };
                match execution::enter(
                    &mut self.account,
                    side,
                    next.open,
                    next.date,
                    next_index,
                    &self.config,
                ) {
                    EntryResult::Entered {
                        size, fill_price, ..
                    } => {
                        fill = Some(Fill {
                            date: next.date,
                            reference_price: next.open,
                            price: fill_price,
                            size,
                        });
                    }
                    EntryResult::InsufficientCapital => {
                        debug!(date = %next.date, "insufficient capital, open ignored");
                        executed = Action::Hold;
                    }
                }
            }
            Action::Close => {
                let reason = if shield_override {
                    ExitReason::Shield
                } else {
                    ExitReason::Signal
                };
                if let Some(trade) = execution::exit(
                    &mut self.account,
                    next.open,
                    next.date,
                    next_index,
                    reason,
                    &self.config,
                ) {
                    fill = Some(Fill {
                        date: next.date,
                        reference_price: next.open,
                        price: trade.exit_price,
                        size: trade.size,
                    });
                    exit_reason = Some(reason);
                    self.trades.push(trade);
                }
            }
        }

        self.account.step_index = next_index;

        let trigger = self.account.position.as_ref().and_then(|pos| {
            if pos.entry_step >= next_index {
                None
            } else if pos.should_stop_loss(next.close) {
                Some(ExitReason::Stop)
            } else if pos.should_take_profit(next.close) {
                Some(ExitReason::Target)
            } else {
                None
            }
        });
        if let Some(reason) = trigger {
            self.close_at(next.close, next.date, next_index, reason);
            exit_reason = Some(reason);
        }

        self.account.mark(next.close);

        let mut terminated = false;
        if self.account.equity < self.config.liquidation_floor * self.config.starting_cash {
            debug!(
                date = %next.date,
                equity = self.account.equity,
                "equity below liquidation floor"
            );
            if self.close_at(next.close, next.date, next_index, ExitReason::Liquidation) {
                exit_reason = Some(ExitReason::Liquidation);
            }
            terminated = true;
        } else if next_index == last_index {
            if self.close_at(next.close, next.date, next_index, ExitReason::Forced) {
                exit_reason = Some(ExitReason::Forced);
            }
            terminated = true;
        }
        self.account.mark(next.close);

        if !self.account.is_consistent(next.close) {
            return Err(WfsimError::AccountCorrupted {
                reason: format!(
                    "equity {} does not match cash {} plus position value at step {}",
                    self.account.equity, self.account.cash, next_index
                ),
            });
        }

        self.state = if terminated {
            EnvState::Terminated
        } else {
            match self.account.side() {
                None => EnvState::Flat,
                Some(Side::Long) => EnvState::Long,
                Some(Side::Short) => EnvState::Short,
            }
        };

        let drawdown = self.account.drawdown();
        let reward = self.shaper.reward(
            previous_equity,
            self.account.equity,
            drawdown,
            shield_override,
        );
        self.equity_curve.push(EquityPoint {
            date: next.date,
            equity: self.account.equity,
        });

        Ok(StepOutcome {
            observation: self.observation(next_index)?,
            reward,
            terminated,
            info: StepInfo {
                requested: action,
                executed,
                invalid_action,
                shield_override,
                decision_date: decision.date,
                fill,
                exit_reason,
                equity: self.account.equity,
                drawdown,
            },
        })
    }

    /// Liquidate the open position at `price`; returns whether one existed.
    fn close_at(&mut self, price: f64, date: NaiveDate, step: usize, reason: ExitReason) -> bool {
        match execution::exit(&mut self.account, price, date, step, reason, &self.config) {
            Some(trade) => {
                self.trades.push(trade);
                true
            }
            None => false,
        }
    }

    fn observation(&self, index: usize) -> Result<Observation, WfsimError> {
        let frame = self.frame.as_ref().ok_or(WfsimError::EpisodeTerminated)?;
        let row = frame
            .row(index)
            .ok_or_else(|| WfsimError::AccountCorrupted {
                reason: format!("step index {} beyond episode end", index),
            })?;

        let account = &self.account;
        let side = match account.side() {
            Some(Side::Long) => 1.0,
            Some(Side::Short) => -1.0,
            None => 0.0,
        };
        let unrealized = if account.equity > 0.0 {
            account.unrealized_pnl / account.equity
        } else {
            0.0
        };
        let episode_len = (frame.len() - 1).max(1) as f64;
        let in_position = account
            .position
            .as_ref()
            .map_or(0.0, |pos| index.saturating_sub(pos.entry_step) as f64 / episode_len);
        let growth = account.equity / self.config.starting_cash - 1.0;

        let mut values = Vec::with_capacity(row.values.len() + ACCOUNT_FEATURES);
        values.extend_from_slice(&row.values);
        values.extend_from_slice(&[side, unrealized, in_position, growth]);

        Ok(Observation {
            date: row.bar.date,
            values,
            market_width: row.values.len(),
        })
    }
}

fn check_row(frame: &FeatureFrame, index: usize) -> Result<(), WfsimError> {
    let Some(row) = frame.row(index) else {
        return Err(WfsimError::AccountCorrupted {
            reason: format!("step index {} beyond episode end", index),
        });
    };
    if let Some(col) = row.values.iter().position(|v| !v.is_finite()) {
        return Err(WfsimError::InvalidObservation {
            step: index,
            column: frame.columns()[col].clone(),
        });
    }
    let bar = &row.bar;
    if !(bar.open.is_finite() && bar.close.is_finite()) {
        return Err(WfsimError::InvalidObservation {
            step: index,
            column: "price".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bar::Bar;
    use crate::domain::feature::FeatureRow;
    use chrono::Duration;

    fn frame_from(prices: &[(f64, f64)]) -> Arc<FeatureFrame> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let rows = prices
            .iter()
            .enumerate()
            .map(|(i, &(open, close))| FeatureRow {
                bar: Bar {
                    symbol: "TEST".into(),
                    date: start + Duration::days(i as i64),
                    open,
                    high: open.max(close),
                    low: open.min(close),
                    close,
                    volume: 1_000.0,
                },
                values: vec![0.5],
            })
            .collect();
        Arc::new(FeatureFrame::new("TEST", vec!["f".into()], rows))
    }

    fn costless() -> EnvConfig {
        EnvConfig {
            commission_bps: 0.0,
            slippage_bps: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn reset_returns_padded_observation() {
        let mut env = MarketEnv::new(costless()).unwrap();
        let obs = env.reset(frame_from(&[(10.0, 10.0); 3])).unwrap();
        assert_eq!(obs.len(), 1 + ACCOUNT_FEATURES);
        assert_eq!(obs.market_features(), &[0.5]);
        assert_eq!(obs.position_side(), 0.0);
        assert_eq!(env.state(), EnvState::Flat);
        assert_eq!(env.account().equity, 10_000.0);
    }

    #[test]
    fn reset_rejects_single_row() {
        let mut env = MarketEnv::new(costless()).unwrap();
        assert!(matches!(
            env.reset(frame_from(&[(10.0, 10.0)])),
            Err(WfsimError::EpisodeTooShort { rows: 1, .. })
        ));
    }

    #[test]
    fn fill_uses_next_bar_open() {
        let mut env = MarketEnv::new(costless()).unwrap();
        env.reset(frame_from(&[(10.0, 10.0), (20.0, 21.0), (30.0, 30.0)]))
            .unwrap();
        let out = env.step(Action::OpenLong).unwrap();
        let fill = out.info.fill.unwrap();
        assert_eq!(fill.reference_price, 20.0);
        assert_eq!(fill.price, 20.0);
        assert_eq!(env.state(), EnvState::Long);
        assert_eq!(out.observation.position_side(), 1.0);
    }

    #[test]
    fn invalid_action_is_hold() {
        let mut env = MarketEnv::new(costless()).unwrap();
        env.reset(frame_from(&[(10.0, 10.0); 4])).unwrap();
        let out = env.step(Action::Close).unwrap();
        assert!(out.info.invalid_action);
        assert_eq!(out.info.executed, Action::Hold);
        assert!(out.info.fill.is_none());
    }

    #[test]
    fn shorting_disabled_degrades_to_hold() {
        let mut env = MarketEnv::new(EnvConfig {
            allow_shorting: false,
            ..costless()
        })
        .unwrap();
        env.reset(frame_from(&[(10.0, 10.0); 4])).unwrap();
        let out = env.step(Action::OpenShort).unwrap();
        assert_eq!(out.info.executed, Action::Hold);
        assert_eq!(env.state(), EnvState::Flat);
    }

    #[test]
    fn episode_end_forces_close() {
        let mut env = MarketEnv::new(costless()).unwrap();
        env.reset(frame_from(&[(10.0, 10.0), (10.0, 11.0), (12.0, 12.0)]))
            .unwrap();
        env.step(Action::OpenLong).unwrap();
        let out = env.step(Action::Hold).unwrap();
        assert!(out.terminated);
        assert_eq!(out.info.exit_reason, Some(ExitReason::Forced));
        assert_eq!(env.state(), EnvState::Terminated);
        assert_eq!(env.trades().len(), 1);
        assert!(env.trades()[0].net_pnl > 0.0);
        assert!(matches!(
            env.step(Action::Hold),
            Err(WfsimError::EpisodeTerminated)
        ));
    }

    #[test]
    fn shield_overrides_losing_position() {
        let mut env = MarketEnv::new(EnvConfig {
            max_trade_drawdown: 0.05,
            liquidation_floor: 0.0,
            ..costless()
        })
        .unwrap();
        env.reset(frame_from(&[
            (100.0, 100.0),
            (100.0, 90.0),
            (90.0, 90.0),
            (90.0, 90.0),
        ]))
        .unwrap();
        env.step(Action::OpenLong).unwrap();
        let out = env.step(Action::Hold).unwrap();
        assert!(out.info.shield_override);
        assert_eq!(out.info.executed, Action::Close);
        assert_eq!(out.info.exit_reason, Some(ExitReason::Shield));
        assert_eq!(env.trades()[0].exit_reason, ExitReason::Shield);
        assert_eq!(env.state(), EnvState::Flat);
    }

    #[test]
    fn stop_loss_exits_at_close() {
        let mut env = MarketEnv::new(EnvConfig {
            stop_loss_pct: 5.0,
            max_trade_drawdown: 1.0,
            ..costless()
        })
        .unwrap();
        env.reset(frame_from(&[
            (100.0, 100.0),
            (100.0, 100.0),
            (100.0, 94.0),
            (94.0, 94.0),
        ]))
        .unwrap();
        env.step(Action::OpenLong).unwrap();
        let out = env.step(Action::Hold).unwrap();
        assert_eq!(out.info.exit_reason, Some(ExitReason::Stop));
        assert_eq!(env.trades()[0].exit_price, 94.0);
    }

    #[test]
    fn liquidation_floor_terminates() {
        let mut env = MarketEnv::new(EnvConfig {
            liquidation_floor: 0.8,
            max_trade_drawdown: 1.0,
            ..costless()
        })
        .unwrap();
        env.reset(frame_from(&[
            (100.0, 100.0),
            (100.0, 70.0),
            (70.0, 70.0),
            (70.0, 70.0),
        ]))
        .unwrap();
        let out = env.step(Action::OpenLong).unwrap();
        assert!(out.terminated);
        assert_eq!(out.info.exit_reason, Some(ExitReason::Liquidation));
        assert!(env.account().is_flat());
    }

    #[test]
    fn nan_row_is_fatal() {
        let mut rows = frame_from(&[(10.0, 10.0); 3]).rows().to_vec();
        rows[1].values[0] = f64::NAN;
        let frame = Arc::new(FeatureFrame::new("TEST", vec!["f".into()], rows));
        let mut env = MarketEnv::new(costless()).unwrap();
        env.reset(frame).unwrap();
        assert!(matches!(
            env.step(Action::Hold),
            Err(WfsimError::InvalidObservation { step: 1, ref column }) if column == "f"
        ));
    }

    #[test]
    fn equity_curve_has_one_point_per_bar() {
        let mut env = MarketEnv::new(costless()).unwrap();
        env.reset(frame_from(&[(10.0, 10.0); 5])).unwrap();
        loop {
            if env.step(Action::Hold).unwrap().terminated {
                break;
            }
        }
        assert_eq!(env.equity_curve().len(), 5);
        assert!(env.equity_curve().iter().all(|p| p.equity == 10_000.0));
    }
}
