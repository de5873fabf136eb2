//! Walk-forward evaluation: split generation, per-split orchestration,
//! reporting and Monte Carlo robustness bounds.

pub mod cancel;
pub mod monte_carlo;
pub mod orchestrator;
pub mod report;
pub mod split;

pub use cancel::CancellationToken;
pub use monte_carlo::{monte_carlo, MonteCarloConfig, MonteCarloDistribution, Summary};
pub use orchestrator::{summarize, Orchestrator, WalkForwardConfig};
pub use report::{
    Aggregate, ArtifactRefs, InSampleCheck, RunSummary, SplitReport, SplitStatus,
    WalkForwardReport, OVERFIT_DEGRADATION,
};
pub use split::{build_splits, SplitMode, WalkForwardSplit};
