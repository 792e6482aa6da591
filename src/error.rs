use std::path::PathBuf;

use thiserror::Error;

pub type ReportResult<T> = Result<T, ReportError>;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("missing artifact: {what} ({})", path.display())]
    ArtifactMissing { what: String, path: PathBuf },

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("task panicked: {0}")]
    TaskPanicked(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ReportError {
    pub fn missing(what: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        ReportError::ArtifactMissing {
            what: what.into(),
            path: path.into(),
        }
    }

    pub fn is_artifact_missing(&self) -> bool {
        matches!(self, ReportError::ArtifactMissing { .. })
    }
}
