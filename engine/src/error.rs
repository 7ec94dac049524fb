use thiserror::Error;

/// Errors surfaced by the survey engine.
///
/// Dataset, storage and transport failures are normally recovered inside the
/// engine (empty index, empty store, record left queued); these variants are
/// what the recovery paths log and what the JS boundary reports.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("location dataset unusable: {0}")]
    DataSource(String),

    #[error("storage write failed for key '{key}': {reason}")]
    Storage { key: String, reason: String },

    #[error("submission failed: {0}")]
    Transport(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization failed: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("form has no field named '{0}'")]
    UnknownField(String),

    #[error("'{value}' is not a valid value for '{field}'")]
    InvalidValue { field: String, value: String },

    #[error("draft name must not be empty")]
    EmptyDraftName,

    #[error("draft '{0}' not found")]
    DraftNotFound(String),

    #[error("form must be finalized before submitting")]
    NotFinalized,

    #[error("section {section} has missing required fields: {}", .missing.join(", "))]
    Incomplete { section: usize, missing: Vec<String> },
}

pub type Result<T> = std::result::Result<T, EngineError>;
