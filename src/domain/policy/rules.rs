//! Hand-coded baseline policies.

use crate::domain::env::{Action, Observation};

use super::Strategy;

/// Never trades.
#[derive(Debug, Clone, Copy, Default)]
pub struct HoldPolicy;

impl Strategy for HoldPolicy {
    fn name(&self) -> &str {
        "hold"
    }

    fn act(&self, _observation: &Observation) -> Action {
        Action::Hold
    }
}

/// Opens long whenever flat and never closes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuyAndHold;

impl Strategy for BuyAndHold {
    fn name(&self) -> &str {
        "buy_and_hold"
    }

    fn act(&self, observation: &Observation) -> Action {
        if observation.position_side() == 0.0 {
            Action::OpenLong
        } else {
            Action::Hold
        }
    }
}

/// Goes with the sign of one feature once it clears `threshold`, flipping
/// through flat when the signal reverses.
#[derive(Debug, Clone, Copy)]
pub struct Momentum {
    feature_index: usize,
    threshold: f64,
}

impl Momentum {
    pub fn new(feature_index: usize, threshold: f64) -> Self {
        Momentum {
            feature_index,
            threshold: threshold.abs(),
        }
    }
}

impl Strategy for Momentum {
    fn name(&self) -> &str {
        "momentum"
    }

    fn act(&self, observation: &Observation) -> Action {
        let Some(&signal) = observation.market_features().get(self.feature_index) else {
            return Action::Hold;
        };
        let side = observation.position_side();
        if signal > self.threshold {
            if side < 0.0 {
                Action::Close
            } else if side == 0.0 {
                Action::OpenLong
            } else {
                Action::Hold
            }
        } else if signal < -self.threshold {
            if side > 0.0 {
                Action::Close
            } else if side == 0.0 {
                Action::OpenShort
            } else {
                Action::Hold
            }
        } else {
            Action::Hold
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bar::Bar;
    use crate::domain::env::{EnvConfig, MarketEnv};
    use crate::domain::feature::{FeatureFrame, FeatureRow};
    use chrono::{Duration, NaiveDate};
    use std::sync::Arc;

    fn frame(signals: &[f64]) -> Arc<FeatureFrame> {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let rows = signals
            .iter()
            .enumerate()
            .map(|(i, &s)| FeatureRow {
                bar: Bar {
                    symbol: "X".into(),
                    date: start + Duration::days(i as i64),
                    open: 50.0,
                    high: 50.0,
                    low: 50.0,
                    close: 50.0,
                    volume: 1.0,
                },
                values: vec![s],
            })
            .collect();
        Arc::new(FeatureFrame::new("X", vec!["sig".into()], rows))
    }

    #[test]
    fn buy_and_hold_opens_once() {
        let mut env = MarketEnv::new(EnvConfig::default()).unwrap();
        let obs = env.reset(frame(&[0.0; 4])).unwrap();
        assert_eq!(BuyAndHold.act(&obs), Action::OpenLong);
        let out = env.step(Action::OpenLong).unwrap();
        assert_eq!(BuyAndHold.act(&out.observation), Action::Hold);
    }

    #[test]
    fn momentum_follows_signal() {
        let policy = Momentum::new(0, 0.5);
        let mut env = MarketEnv::new(EnvConfig::default()).unwrap();
        let obs = env.reset(frame(&[1.0, -1.0, 0.0, 0.0])).unwrap();
        assert_eq!(policy.act(&obs), Action::OpenLong);
        let out = env.step(Action::OpenLong).unwrap();
        assert_eq!(policy.act(&out.observation), Action::Close);
    }

    #[test]
    fn momentum_holds_inside_band() {
        let policy = Momentum::new(0, 0.5);
        let mut env = MarketEnv::new(EnvConfig::default()).unwrap();
        let obs = env.reset(frame(&[0.2, 0.0])).unwrap();
        assert_eq!(policy.act(&obs), Action::Hold);
    }

    #[test]
    fn momentum_shorts_negative_signal() {
        let policy = Momentum::new(0, 0.5);
        let mut env = MarketEnv::new(EnvConfig::default()).unwrap();
        let obs = env.reset(frame(&[-0.9, 0.0])).unwrap();
        assert_eq!(policy.act(&obs), Action::OpenShort);
    }
}
