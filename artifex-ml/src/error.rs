//! Error types for the artifex-ml crate.

use thiserror::Error;

/// Top-level error type for feature building, artifact loading and prediction.
///
/// The variants split into two groups. Per-request failures (`InvalidImage`,
/// `InvalidInput`, `Scoring`) are isolated to a single call. Deployment
/// failures (`SchemaMismatch`, `ArtifactLoad`) mean the model and its schema
/// cannot be trusted and must stop the process from serving.
#[derive(Debug, Error)]
pub enum MlError {
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Artifact load error: {0}")]
    ArtifactLoad(String),

    #[error("Scoring error: {0}")]
    Scoring(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl MlError {
    pub fn invalid_image(msg: impl Into<String>) -> Self {
        Self::InvalidImage(msg.into())
    }

    pub fn schema_mismatch(msg: impl Into<String>) -> Self {
        Self::SchemaMismatch(msg.into())
    }

    pub fn artifact_load(msg: impl Into<String>) -> Self {
        Self::ArtifactLoad(msg.into())
    }

    pub fn scoring(msg: impl Into<String>) -> Self {
        Self::Scoring(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error signals a broken deployment rather than a bad request.
    pub fn is_deployment_defect(&self) -> bool {
        matches!(self, Self::SchemaMismatch(_) | Self::ArtifactLoad(_))
    }
}
