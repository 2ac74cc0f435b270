//! Configuration types for the artifex-ml crate.
//!
//! These are the ML-specific sub-configs referenced from the top-level
//! `AppConfig` in artifex-core.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level ML configuration within artifex-ml.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MlConfig {
    /// Where the co-versioned artifacts live.
    #[serde(default)]
    pub artifacts: ArtifactConfig,
    /// Prediction post-processing.
    #[serde(default)]
    pub prediction: PredictionConfig,
    /// Image feature extraction.
    #[serde(default)]
    pub image: ImageConfig,
    /// Market reference data used by artist features.
    #[serde(default)]
    pub market: MarketConfig,
}

/// Artifact locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Directory holding the model, schema and preprocessor files.
    #[serde(default = "default_artifact_dir")]
    pub dir: PathBuf,
    /// Model file name, relative to `dir`.
    #[serde(default = "default_model_file")]
    pub model_file: String,
    /// Feature schema file name, relative to `dir`.
    #[serde(default = "default_schema_file")]
    pub schema_file: String,
    /// Preprocessor file name, relative to `dir`. Missing file means pass-through.
    #[serde(default = "default_preprocessor_file")]
    pub preprocessor_file: Option<String>,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            dir: default_artifact_dir(),
            model_file: default_model_file(),
            schema_file: default_schema_file(),
            preprocessor_file: default_preprocessor_file(),
        }
    }
}

impl ArtifactConfig {
    pub fn model_path(&self) -> PathBuf {
        self.dir.join(&self.model_file)
    }

    pub fn schema_path(&self) -> PathBuf {
        self.dir.join(&self.schema_file)
    }

    pub fn preprocessor_path(&self) -> Option<PathBuf> {
        self.preprocessor_file.as_ref().map(|f| self.dir.join(f))
    }
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_model_file() -> String {
    "art_price_model.json".to_string()
}

fn default_schema_file() -> String {
    "feature_info.json".to_string()
}

fn default_preprocessor_file() -> Option<String> {
    Some("preprocessor.json".to_string())
}

/// Prediction post-processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionConfig {
    /// Half-width of the heuristic confidence band as a fraction of the point
    /// estimate. This is not a statistical prediction interval.
    #[serde(default = "default_band_fraction")]
    pub band_fraction: f64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            band_fraction: default_band_fraction(),
        }
    }
}

fn default_band_fraction() -> f64 {
    0.5
}

/// Image feature extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Side length the grayscale grid is resized to before the SVD (0 = no resize).
    #[serde(default = "default_svd_resize")]
    pub svd_resize: u32,
    /// Largest accepted upload in bytes.
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: usize,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            svd_resize: default_svd_resize(),
            max_image_bytes: default_max_image_bytes(),
        }
    }
}

fn default_svd_resize() -> u32 {
    64
}

fn default_max_image_bytes() -> usize {
    10 * 1024 * 1024
}

/// Market reference configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Optional JSON file with artist and technique-artist statistics.
    #[serde(default)]
    pub reference_path: Option<PathBuf>,
}

impl PredictionConfig {
    /// Validate ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), crate::MlError> {
        if !self.band_fraction.is_finite() || !(0.0..1.0).contains(&self.band_fraction) {
            return Err(crate::MlError::config(format!(
                "prediction.band_fraction must be in [0, 1), got {}",
                self.band_fraction
            )));
        }
        Ok(())
    }
}
