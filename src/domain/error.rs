//! Domain error types.

use chrono::NaiveDate;

/// Coarse classification used by the walk-forward orchestrator to decide
/// whether an error aborts the run or only fails the affected split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Data,
    Schema,
    Simulation,
    Config,
    Io,
}

/// Top-level error type for wfsim.
#[derive(Debug, thiserror::Error)]
pub enum WfsimError {
    #[error("bars for {symbol} are not strictly increasing at {date} (previous {previous})")]
    UnsortedInput {
        symbol: String,
        date: NaiveDate,
        previous: NaiveDate,
    },

    #[error("duplicate bar for {symbol} at {date}")]
    DuplicateBar { symbol: String, date: NaiveDate },

    #[error("insufficient data for feature {feature}: have {rows} rows, need {minimum}")]
    InsufficientData {
        feature: String,
        rows: usize,
        minimum: usize,
    },

    #[error("missing input column {column}")]
    MissingColumn { column: String },

    #[error("no data: {reason}")]
    EmptyInput { reason: String },

    #[error("malformed input at {location}: {reason}")]
    MalformedInput { location: String, reason: String },

    #[error("schema mismatch: expected {expected}, artifact has {found}")]
    SchemaMismatch { expected: String, found: String },

    #[error("feature signature mismatch: expected {expected}, got {found}")]
    SignatureMismatch { expected: String, found: String },

    #[error("malformed artifact: {reason}")]
    MalformedArtifact { reason: String },

    #[error("invalid observation at step {step}: column {column} is not finite")]
    InvalidObservation { step: usize, column: String },

    #[error("episode needs at least {minimum} rows, got {rows}")]
    EpisodeTooShort { rows: usize, minimum: usize },

    #[error("step called on a terminated episode")]
    EpisodeTerminated,

    #[error("account state corrupted: {reason}")]
    AccountCorrupted { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl WfsimError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WfsimError::UnsortedInput { .. }
            | WfsimError::DuplicateBar { .. }
            | WfsimError::InsufficientData { .. }
            | WfsimError::MissingColumn { .. }
            | WfsimError::EmptyInput { .. }
            | WfsimError::MalformedInput { .. } => ErrorKind::Data,
            WfsimError::SchemaMismatch { .. }
            | WfsimError::SignatureMismatch { .. }
            | WfsimError::MalformedArtifact { .. }
            | WfsimError::Serialization(_) => ErrorKind::Schema,
            WfsimError::InvalidObservation { .. }
            | WfsimError::EpisodeTooShort { .. }
            | WfsimError::EpisodeTerminated
            | WfsimError::AccountCorrupted { .. } => ErrorKind::Simulation,
            WfsimError::ConfigParse { .. }
            | WfsimError::ConfigMissing { .. }
            | WfsimError::ConfigInvalid { .. } => ErrorKind::Config,
            WfsimError::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        WfsimError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&WfsimError> for std::process::ExitCode {
    fn from(err: &WfsimError) -> Self {
        let code: u8 = match err.kind() {
            ErrorKind::Io => 1,
            ErrorKind::Config => 2,
            ErrorKind::Schema => 3,
            ErrorKind::Simulation => 4,
            ErrorKind::Data => 5,
        };
        std::process::ExitCode::from(code)
    }
}
