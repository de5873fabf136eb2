//! Closed action set and environment states.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Hold,
    OpenLong,
    OpenShort,
    Close,
}

impl Action {
    pub const ALL: [Action; 4] = [
        Action::Hold,
        Action::OpenLong,
        Action::OpenShort,
        Action::Close,
    ];

    pub fn index(self) -> usize {
        match self {
            Action::Hold => 0,
            Action::OpenLong => 1,
            Action::OpenShort => 2,
            Action::Close => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnvState {
    Flat,
    Long,
    Short,
    Terminated,
}

impl EnvState {
    /// Effective action after the state machine has been consulted. Any
    /// transition that is not allowed from this state degrades to `Hold`.
    pub fn resolve(self, action: Action, allow_shorting: bool) -> Action {
        match (self, action) {
            (EnvState::Terminated, _) => Action::Hold,
            (_, Action::Hold) => Action::Hold,
            (EnvState::Flat, Action::OpenLong) => Action::OpenLong,
            (EnvState::Flat, Action::OpenShort) if allow_shorting => Action::OpenShort,
            (EnvState::Flat, Action::OpenShort) => Action::Hold,
            (EnvState::Flat, Action::Close) => Action::Hold,
            (EnvState::Long | EnvState::Short, Action::Close) => Action::Close,
            (EnvState::Long | EnvState::Short, Action::OpenLong | Action::OpenShort) => {
                Action::Hold
            }
        }
    }
}
