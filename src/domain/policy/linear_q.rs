//! Linear action-value policy trained with epsilon-greedy Q-learning.
//!
//! Each action owns a weight vector over the observation plus a bias term.
//! Training is single-threaded against one environment; once `train`
//! returns the weights are frozen and `act` is purely greedy.

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::env::{ACCOUNT_FEATURES, Action, MarketEnv, Observation};
use crate::domain::error::WfsimError;
use crate::domain::feature::FeatureFrame;

use super::Strategy;

const TD_CLIP: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearQParams {
    pub episodes: usize,
    pub learning_rate: f64,
    pub discount: f64,
    /// Initial exploration rate, decayed linearly to zero over the episodes.
    pub epsilon: f64,
    pub seed: u64,
}

impl Default for LinearQParams {
    fn default() -> Self {
        LinearQParams {
            episodes: 20,
            learning_rate: 0.01,
            discount: 0.95,
            epsilon: 0.2,
            seed: 7,
        }
    }
}

impl LinearQParams {
    pub fn validate(&self) -> Result<(), WfsimError> {
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(WfsimError::invalid(
                "strategy",
                "learning_rate",
                "learning_rate must be in (0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.discount) {
            return Err(WfsimError::invalid(
                "strategy",
                "discount",
                "discount must be in [0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.epsilon) {
            return Err(WfsimError::invalid(
                "strategy",
                "epsilon",
                "epsilon must be in [0, 1]",
            ));
        }
        Ok(())
    }
}

/// Persisted form of the learned weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearQWeights {
    pub input_width: usize,
    /// One row per action in [`Action::ALL`] order, bias last.
    pub weights: Vec<Vec<f64>>,
}

#[derive(Debug, Clone)]
pub struct LinearQPolicy {
    params: LinearQParams,
    input_width: usize,
    weights: Vec<Vec<f64>>,
}

impl LinearQPolicy {
    /// `feature_width` is the market feature count; account features are
    /// added on top.
    pub fn new(feature_width: usize, params: LinearQParams) -> Result<Self, WfsimError> {
        params.validate()?;
        let input_width = feature_width + ACCOUNT_FEATURES;
        Ok(LinearQPolicy {
            params,
            input_width,
            weights: vec![vec![0.0; input_width + 1]; Action::ALL.len()],
        })
    }

    pub fn from_weights(stored: LinearQWeights, params: LinearQParams) -> Result<Self, WfsimError> {
        let valid = stored.weights.len() == Action::ALL.len()
            && stored
                .weights
                .iter()
                .all(|row| row.len() == stored.input_width + 1);
        if !valid {
            return Err(WfsimError::MalformedArtifact {
                reason: "policy weights do not match the action set".to_string(),
            });
        }
        Ok(LinearQPolicy {
            params,
            input_width: stored.input_width,
            weights: stored.weights,
        })
    }

    pub fn to_weights(&self) -> LinearQWeights {
        LinearQWeights {
            input_width: self.input_width,
            weights: self.weights.clone(),
        }
    }

    fn q(&self, observation: &Observation, action: Action) -> f64 {
        let row = &self.weights[action.index()];
        let linear: f64 = observation
            .values
            .iter()
            .take(self.input_width)
            .zip(row)
            .map(|(x, w)| x * w)
            .sum();
        linear + row[self.input_width]
    }

    fn greedy(&self, observation: &Observation) -> (Action, f64) {
        let mut best = (Action::Hold, self.q(observation, Action::Hold));
        for action in &Action::ALL[1..] {
            let value = self.q(observation, *action);
            if value > best.1 {
                best = (*action, value);
            }
        }
        best
    }

    fn update(&mut self, observation: &Observation, action: Action, td_error: f64) {
        let step = self.params.learning_rate * td_error.clamp(-TD_CLIP, TD_CLIP);
        let width = self.input_width;
        let row = &mut self.weights[action.index()];
        for (w, x) in row.iter_mut().zip(observation.values.iter().take(width)) {
            *w += step * x;
        }
        row[width] += step;
    }
}

impl Strategy for LinearQPolicy {
    fn name(&self) -> &str {
        "linear_q"
    }

    fn act(&self, observation: &Observation) -> Action {
        self.greedy(observation).0
    }

    fn train(&mut self, env: &mut MarketEnv, frame: Arc<FeatureFrame>) -> Result<(), WfsimError> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.params.seed);
        let episodes = self.params.episodes;

        for episode in 0..episodes {
            let epsilon = self.params.epsilon * (1.0 - episode as f64 / episodes as f64);
            let mut observation = env.reset(Arc::clone(&frame))?;
            let mut total_reward = 0.0;

            loop {
                let action = if rng.gen_bool(epsilon) {
                    Action::ALL[rng.gen_range(0..Action::ALL.len())]
                } else {
                    self.greedy(&observation).0
                };
                let outcome = env.step(action)?;
                total_reward += outcome.reward;

                let target = if outcome.terminated {
                    outcome.reward
                } else {
                    outcome.reward + self.params.discount * self.greedy(&outcome.observation).1
                };
                let td_error = target - self.q(&observation, action);
                self.update(&observation, action, td_error);

                if outcome.terminated {
                    break;
                }
                observation = outcome.observation;
            }

            debug!(episode, epsilon, total_reward, "linear_q training episode");
        }
        Ok(())
    }

    fn weights(&self) -> Result<Option<Vec<u8>>, WfsimError> {
        Ok(Some(serde_json::to_vec(&self.to_weights())?))
    }
}
