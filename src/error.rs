use thiserror::Error;

use crate::model::SourceKind;

/// Domain failures that callers (and the process exit code) distinguish.
/// Everything else travels as a plain `anyhow::Error`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("source unavailable: {kind} ({path}): {reason}")]
    SourceUnavailable {
        kind: SourceKind,
        path: String,
        reason: String,
    },

    #[error("unrecognized article identifier {raw:?}: {reason}")]
    GrammarError { raw: String, reason: String },

    #[error("structural validation failed for {document}:\n{}", .failures.join("\n"))]
    StructuralMismatch {
        document: String,
        failures: Vec<String>,
    },

    #[error("content drift detected for {document}: {}", .articles.join(", "))]
    RegressionDetected {
        document: String,
        articles: Vec<String>,
    },

    #[error("no approved expected structure for {document}: {reason}")]
    ApprovalMissing { document: String, reason: String },
}

impl PipelineError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::StructuralMismatch { .. } => 2,
            Self::ApprovalMissing { .. } => 3,
            Self::RegressionDetected { .. } => 4,
            Self::SourceUnavailable { .. } => 5,
            Self::GrammarError { .. } => 1,
        }
    }
}

pub fn exit_code_for(error: &anyhow::Error) -> i32 {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<PipelineError>())
        .map(PipelineError::exit_code)
        .unwrap_or(1)
}
