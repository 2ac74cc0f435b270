//! Inference: co-versioned artifacts, the scoring model and the prediction service.

pub mod artifacts;
pub mod model;
pub mod preprocessor;
pub mod service;

pub use artifacts::ArtifactBundle;
pub use model::{ScoringModel, Tree, TreeEnsemble, TreeNode};
pub use preprocessor::Preprocessor;
pub use service::{
    ArtistPopularity, ConfidenceLevel, HealthStatus, ImageAnalysis, ModelInfo, PredictionResult,
    PredictionService,
};
