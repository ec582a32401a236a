//! Pipeline error types

use std::path::PathBuf;
use thiserror::Error;

use crate::aggregate::AggregateError;
use crate::classifier::ClassifierError;
use crate::confirm::ConfirmError;
use crate::geometry::GeometryError;

// ============================================================
// Error Types
// ============================================================

/// Pipeline error types
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No preset configured; pass --preset or set `preset` in the config file")]
    NoPreset,

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Failed to load confirmation model: {0}")]
    Confirm(#[from] ConfirmError),

    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    #[error("Aggregation failed: {0}")]
    Aggregate(#[from] AggregateError),

    #[error("Folder not found: {0}")]
    FolderNotFound(PathBuf),

    #[error("No normalized pages in {0}; cut the book first")]
    NoPages(PathBuf),

    #[error("An inspection is already running in this session")]
    AlreadyInspecting,

    #[error("Live pipeline is stopped")]
    Stopped,

    #[error("Failed to start worker '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl PipelineError {
    /// Artifact load failures that prevent a session from starting
    pub fn is_artifact_failure(&self) -> bool {
        matches!(
            self,
            PipelineError::NoPreset | PipelineError::Classifier(_) | PipelineError::Confirm(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_failures() {
        assert!(PipelineError::NoPreset.is_artifact_failure());
        assert!(PipelineError::Confirm(ConfirmError::InvalidModel("empty".into())).is_artifact_failure());
        assert!(!PipelineError::FolderNotFound(PathBuf::from("/x")).is_artifact_failure());
    }

    #[test]
    fn test_error_messages() {
        let err = PipelineError::NoPages(PathBuf::from("/srv/temp_images/B1"));
        assert!(err.to_string().contains("/srv/temp_images/B1"));
        assert!(PipelineError::AlreadyInspecting.to_string().contains("already"));
    }
}
