//! Self-describing, versioned pipeline artifact.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::error::WfsimError;

use super::scaler::FittedScaler;
use super::spec::PipelineContract;

pub const ARTIFACT_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineArtifact {
    pub artifact_version: String,
    pub schema_version: String,
    pub feature_signature: String,
    pub contract: PipelineContract,
    pub scaler: FittedScaler,
}

impl PipelineArtifact {
    pub fn to_json(&self) -> Result<String, WfsimError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, WfsimError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// How strictly `restore` compares an artifact with the caller's contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestoreMode {
    #[default]
    Strict,
    /// Tolerates version and signature drift. For exploratory analysis only,
    /// never for production inference.
    BestEffort,
}

pub fn export_state(
    contract: &PipelineContract,
    scaler: &FittedScaler,
) -> Result<PipelineArtifact, WfsimError> {
    let signature = contract.signature();
    if scaler.signature != signature {
        return Err(WfsimError::SignatureMismatch {
            expected: signature,
            found: scaler.signature.clone(),
        });
    }
    Ok(PipelineArtifact {
        artifact_version: ARTIFACT_VERSION.to_string(),
        schema_version: contract.schema_version.clone(),
        feature_signature: signature,
        contract: contract.clone(),
        scaler: scaler.clone(),
    })
}

pub fn restore(
    artifact: PipelineArtifact,
    expected: &PipelineContract,
    mode: RestoreMode,
) -> Result<(PipelineContract, FittedScaler), WfsimError> {
    check_integrity(&artifact)?;

    if artifact.schema_version != expected.schema_version {
        match mode {
            RestoreMode::Strict => {
                return Err(WfsimError::SchemaMismatch {
                    expected: expected.schema_version.clone(),
                    found: artifact.schema_version,
                });
            }
            RestoreMode::BestEffort => warn!(
                expected = %expected.schema_version,
                found = %artifact.schema_version,
                "restoring pipeline artifact with mismatched schema version"
            ),
        }
    }

    let expected_signature = expected.signature();
    if artifact.feature_signature != expected_signature {
        match mode {
            RestoreMode::Strict => {
                return Err(WfsimError::SignatureMismatch {
                    expected: expected_signature,
                    found: artifact.feature_signature,
                });
            }
            RestoreMode::BestEffort => warn!(
                "restoring pipeline artifact whose feature definitions differ from the caller's"
            ),
        }
    }

    Ok((artifact.contract, artifact.scaler))
}

/// The artifact must agree with itself whatever the restore mode.
fn check_integrity(artifact: &PipelineArtifact) -> Result<(), WfsimError> {
    let signature = artifact.contract.signature();
    if artifact.feature_signature != signature || artifact.scaler.signature != signature {
        return Err(WfsimError::MalformedArtifact {
            reason: "stored signature does not match stored feature specs".to_string(),
        });
    }
    if artifact.schema_version != artifact.contract.schema_version {
        return Err(WfsimError::MalformedArtifact {
            reason: "schema_version disagrees with embedded contract".to_string(),
        });
    }
    for spec in &artifact.contract.features {
        if artifact.scaler.get(&spec.name).is_none() {
            return Err(WfsimError::MalformedArtifact {
                reason: format!("scaler has no statistics for feature {}", spec.name),
            });
        }
    }
    Ok(())
}
