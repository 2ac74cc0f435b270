//! Feature schema (`feature_info.json`) and the contracts bound from it.
//!
//! The schema is written by the training export next to the model and is the
//! single source of truth for feature order, categorical positions, defaults
//! and the target transform. It is validated once, at load time.

use crate::error::MlError;
use crate::features::vector::FeatureValue;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Reference year used for age features when the schema does not record one.
pub const DEFAULT_REFERENCE_YEAR: i32 = 2024;

/// Default value for categorical features the input cannot resolve.
pub const UNKNOWN_CATEGORY: &str = "unknown";

/// Descriptor persisted alongside the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub feature_names: Vec<String>,
    pub categorical_indices: Vec<usize>,
    pub n_features: usize,
    pub model_type: String,
    pub target_transformation: String,
    pub inverse_transformation: String,
    #[serde(default)]
    pub r2_score: Option<f64>,
    #[serde(default)]
    pub categorical_columns: Vec<String>,
    /// Per-feature fallback values recorded by the export job.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub feature_defaults: BTreeMap<String, FeatureValue>,
    /// Ordered levels per categorical column, for numeric-only models.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub category_levels: BTreeMap<String, Vec<String>>,
    #[serde(default = "default_reference_year")]
    pub reference_year: i32,
}

fn default_reference_year() -> i32 {
    DEFAULT_REFERENCE_YEAR
}

impl FeatureSchema {
    /// Read and validate a schema file.
    pub fn load(path: &Path) -> Result<Self, MlError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MlError::artifact_load(format!("cannot read schema {}: {e}", path.display()))
        })?;
        Self::from_json(&content)
            .map_err(|e| match e {
                MlError::Serde(inner) => MlError::artifact_load(format!(
                    "corrupt schema {}: {inner}",
                    path.display()
                )),
                other => other,
            })
    }

    /// Parse and validate a schema document.
    pub fn from_json(content: &str) -> Result<Self, MlError> {
        let schema: Self = serde_json::from_str(content)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Integrity checks; any failure means the artifact set is unusable.
    pub fn validate(&self) -> Result<(), MlError> {
        if self.n_features != self.feature_names.len() {
            return Err(MlError::schema_mismatch(format!(
                "n_features is {} but feature_names has {} entries",
                self.n_features,
                self.feature_names.len()
            )));
        }

        let mut seen = HashSet::with_capacity(self.feature_names.len());
        for name in &self.feature_names {
            if name.is_empty() {
                return Err(MlError::schema_mismatch("empty feature name"));
            }
            if !seen.insert(name.as_str()) {
                return Err(MlError::schema_mismatch(format!(
                    "duplicate feature name '{name}'"
                )));
            }
        }

        let mut indices = HashSet::with_capacity(self.categorical_indices.len());
        for &idx in &self.categorical_indices {
            if idx >= self.n_features {
                return Err(MlError::schema_mismatch(format!(
                    "categorical index {idx} out of range for {} features",
                    self.n_features
                )));
            }
            if !indices.insert(idx) {
                return Err(MlError::schema_mismatch(format!(
                    "categorical index {idx} listed twice"
                )));
            }
        }

        for name in self.feature_defaults.keys() {
            if !seen.contains(name.as_str()) {
                return Err(MlError::schema_mismatch(format!(
                    "default given for unknown feature '{name}'"
                )));
            }
        }

        if let Some(r2) = self.r2_score {
            if !r2.is_finite() {
                return Err(MlError::schema_mismatch("r2_score is not finite"));
            }
        }

        self.target_transform()?;
        Ok(())
    }

    pub fn target_transform(&self) -> Result<TargetTransform, MlError> {
        TargetTransform::from_pair(&self.target_transformation, &self.inverse_transformation)
    }

    pub fn encoding_strategy(&self) -> EncodingStrategy {
        EncodingStrategy::for_model_type(&self.model_type)
    }

    /// Positions flagged categorical, as a lookup table.
    pub fn categorical_mask(&self) -> Vec<bool> {
        let mut mask = vec![false; self.n_features];
        for &idx in &self.categorical_indices {
            if let Some(slot) = mask.get_mut(idx) {
                *slot = true;
            }
        }
        mask
    }

    pub fn is_categorical_column(&self, name: &str) -> bool {
        self.categorical_columns.iter().any(|c| c == name)
    }

    /// Value used when a feature cannot be resolved from the input.
    pub fn default_for(&self, name: &str, categorical: bool) -> FeatureValue {
        if let Some(value) = self.feature_defaults.get(name) {
            return value.clone();
        }
        if categorical {
            FeatureValue::category(UNKNOWN_CATEGORY)
        } else {
            FeatureValue::Numeric(0.0)
        }
    }
}

/// Monotonic transform applied to the price before training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetTransform {
    /// `log1p` forward, `expm1` inverse.
    Log1p,
    /// `log` forward, `exp` inverse.
    Log,
    Identity,
}

impl TargetTransform {
    /// Resolve the named forward/inverse pair recorded in the schema.
    pub fn from_pair(forward: &str, inverse: &str) -> Result<Self, MlError> {
        let forward = forward.trim().to_ascii_lowercase();
        let inverse = inverse.trim().to_ascii_lowercase();
        match (forward.as_str(), inverse.as_str()) {
            ("log1p", "expm1") => Ok(Self::Log1p),
            ("log", "exp") => Ok(Self::Log),
            ("identity" | "none", "identity" | "none") => Ok(Self::Identity),
            _ => Err(MlError::schema_mismatch(format!(
                "unsupported target transformation pair '{forward}'/'{inverse}'"
            ))),
        }
    }

    pub fn forward(self, price: f64) -> f64 {
        match self {
            Self::Log1p => price.ln_1p(),
            Self::Log => price.ln(),
            Self::Identity => price,
        }
    }

    pub fn inverse(self, value: f64) -> f64 {
        match self {
            Self::Log1p => value.exp_m1(),
            Self::Log => value.exp(),
            Self::Identity => value,
        }
    }

    pub fn names(self) -> (&'static str, &'static str) {
        match self {
            Self::Log1p => ("log1p", "expm1"),
            Self::Log => ("log", "exp"),
            Self::Identity => ("identity", "identity"),
        }
    }
}

/// How categorical features are laid into the vector.
///
/// Chosen once from `model_type` when the artifacts load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodingStrategy {
    /// The model takes categorical labels directly at `categorical_indices`.
    NativeCategorical,
    /// Numeric-only model: categoricals arrive ordinal or one-hot encoded.
    NumericEncoded,
}

impl EncodingStrategy {
    pub fn for_model_type(model_type: &str) -> Self {
        if model_type.trim().to_ascii_lowercase().starts_with("catboost") {
            Self::NativeCategorical
        } else {
            Self::NumericEncoded
        }
    }
}
