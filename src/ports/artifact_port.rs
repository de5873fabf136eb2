//! Persistence port for per-split pipeline and policy artifacts.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::error::WfsimError;
use crate::domain::feature::PipelineArtifact;

/// Identifies the pipeline and weights produced for one split. A report
/// entry carrying the same key can always be traced back to them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactKey {
    pub symbol: String,
    pub strategy: String,
    pub split_index: usize,
    pub schema_version: String,
}

impl ArtifactKey {
    pub fn new(
        symbol: impl Into<String>,
        strategy: impl Into<String>,
        split_index: usize,
        schema_version: impl Into<String>,
    ) -> Self {
        ArtifactKey {
            symbol: symbol.into(),
            strategy: strategy.into(),
            split_index,
            schema_version: schema_version.into(),
        }
    }

    /// Filesystem-safe stem, e.g. `SPY_linear_q_v1_split003`.
    pub fn stem(&self) -> String {
        let clean = |s: &str| {
            s.chars()
                .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
                .collect::<String>()
        };
        format!(
            "{}_{}_{}_split{:03}",
            clean(&self.symbol),
            clean(&self.strategy),
            clean(&self.schema_version),
            self.split_index
        )
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}#{}",
            self.symbol, self.strategy, self.schema_version, self.split_index
        )
    }
}

/// Shared by parallel split workers, hence `Send + Sync`. Every call is a
/// scoped read or write; nothing is held open between calls.
pub trait ArtifactStore: Send + Sync {
    /// Persist a pipeline artifact and return where it went.
    fn save_pipeline(
        &self,
        key: &ArtifactKey,
        artifact: &PipelineArtifact,
    ) -> Result<String, WfsimError>;

    fn load_pipeline(&self, key: &ArtifactKey) -> Result<PipelineArtifact, WfsimError>;

    /// Persist an opaque weights blob and return where it went.
    fn save_weights(&self, key: &ArtifactKey, blob: &[u8]) -> Result<String, WfsimError>;

    /// `None` when no weights were stored under `key`.
    fn load_weights(&self, key: &ArtifactKey) -> Result<Option<Vec<u8>>, WfsimError>;
}
