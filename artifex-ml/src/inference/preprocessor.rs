//! Input preprocessing applied between the builder and the model.

use crate::error::MlError;
use crate::features::vector::{FeatureValue, FeatureVector};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Preprocessor {
    /// Values reach the model unchanged.
    Passthrough {
        #[serde(default)]
        n_features: Option<usize>,
    },
    /// `(x - mean) / scale` at numeric positions; labels are left alone.
    Standardize {
        n_features: usize,
        mean: Vec<f64>,
        scale: Vec<f64>,
    },
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::Passthrough { n_features: None }
    }
}

impl Preprocessor {
    /// Resolve the preprocessor artifact.
    ///
    /// Exports that had no real preprocessor wrote a copy of the model in its
    /// place, so bytes identical to the model mean pass-through, as does a
    /// missing file.
    pub fn from_artifact(bytes: Option<&[u8]>, model_bytes: &[u8]) -> Result<Self, MlError> {
        let Some(bytes) = bytes else {
            return Ok(Self::default());
        };
        if bytes == model_bytes {
            tracing::debug!("Preprocessor artifact duplicates the model; using pass-through");
            return Ok(Self::default());
        }
        let preprocessor: Self = serde_json::from_slice(bytes)
            .map_err(|e| MlError::artifact_load(format!("corrupt preprocessor: {e}")))?;
        preprocessor.validate()?;
        Ok(preprocessor)
    }

    pub fn validate(&self) -> Result<(), MlError> {
        if let Self::Standardize {
            n_features,
            mean,
            scale,
        } = self
        {
            if mean.len() != *n_features || scale.len() != *n_features {
                return Err(MlError::artifact_load(format!(
                    "standardize preprocessor has {} means and {} scales for {} features",
                    mean.len(),
                    scale.len(),
                    n_features
                )));
            }
            if mean.iter().any(|m| !m.is_finite())
                || scale.iter().any(|s| !s.is_finite() || *s == 0.0)
            {
                return Err(MlError::artifact_load(
                    "standardize preprocessor has non-finite mean or zero scale",
                ));
            }
        }
        Ok(())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Passthrough { .. } => "passthrough",
            Self::Standardize { .. } => "standardize",
        }
    }

    /// Declared input width, if the artifact records one.
    pub fn n_features(&self) -> Option<usize> {
        match self {
            Self::Passthrough { n_features } => *n_features,
            Self::Standardize { n_features, .. } => Some(*n_features),
        }
    }

    pub fn apply(&self, features: &mut FeatureVector) -> Result<(), MlError> {
        let Self::Standardize { mean, scale, .. } = self else {
            return Ok(());
        };
        if features.len() != mean.len() {
            return Err(MlError::scoring(format!(
                "preprocessor expects {} features, got {}",
                mean.len(),
                features.len()
            )));
        }
        for ((value, m), s) in features.values_mut().iter_mut().zip(mean).zip(scale) {
            if let FeatureValue::Numeric(v) = value {
                *v = (*v - m) / s;
            }
        }
        Ok(())
    }
}
