//! Feature pipeline: declarative specs, causal transforms, fitted scaling
//! and versioned persistence.

pub mod artifact;
pub mod pipeline;
pub mod scaler;
pub mod spec;
pub mod transform;

pub use artifact::{export_state, restore, PipelineArtifact, RestoreMode};
pub use pipeline::{fit, transform, FeatureFrame, FeatureRow};
pub use scaler::{ColumnStats, FittedScaler};
pub use spec::{FeatureSpec, Normalization, PipelineContract, SourceColumn, Transform};
