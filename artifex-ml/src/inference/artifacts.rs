//! Co-versioned artifact loading.
//!
//! The schema, model and preprocessor are produced together by one training
//! export. They are loaded and cross-checked as a unit; a set that does not
//! agree is a deployment defect and never serves.

use crate::config::ArtifactConfig;
use crate::error::MlError;
use crate::inference::model::{ScoringModel, TreeEnsemble};
use crate::inference::preprocessor::Preprocessor;
use crate::schema::{FeatureSchema, TargetTransform};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Immutable, validated artifact set shared by every request.
#[derive(Debug)]
pub struct ArtifactBundle {
    pub schema: FeatureSchema,
    pub model: Box<dyn ScoringModel>,
    pub preprocessor: Preprocessor,
    pub transform: TargetTransform,
    /// SHA-256 over the schema and model bytes.
    pub fingerprint: String,
    pub source_dir: PathBuf,
    pub loaded_at: DateTime<Utc>,
}

impl ArtifactBundle {
    pub fn load(config: &ArtifactConfig) -> Result<Arc<Self>, MlError> {
        let schema_bytes = read_artifact(&config.schema_path(), "schema")?;
        let model_bytes = read_artifact(&config.model_path(), "model")?;

        let schema_text = std::str::from_utf8(&schema_bytes)
            .map_err(|e| MlError::artifact_load(format!("schema is not UTF-8: {e}")))?;
        let schema = FeatureSchema::from_json(schema_text).map_err(|e| match e {
            MlError::Serde(inner) => MlError::artifact_load(format!("corrupt schema: {inner}")),
            other => other,
        })?;

        let model_text = std::str::from_utf8(&model_bytes)
            .map_err(|e| MlError::artifact_load(format!("model is not UTF-8: {e}")))?;
        let model = TreeEnsemble::from_json(model_text)?;

        let preprocessor_bytes = match config.preprocessor_path() {
            Some(path) if path.exists() => Some(read_artifact(&path, "preprocessor")?),
            Some(path) => {
                tracing::debug!(path = %path.display(), "No preprocessor artifact; using pass-through");
                None
            }
            None => None,
        };
        let preprocessor = Preprocessor::from_artifact(preprocessor_bytes.as_deref(), &model_bytes)?;

        let fingerprint = fingerprint(&schema_bytes, &model_bytes);
        let bundle = Self::from_parts(schema, Box::new(model), preprocessor, fingerprint)?;
        let bundle = Self {
            source_dir: config.dir.clone(),
            ..bundle
        };

        tracing::info!(
            dir = %bundle.source_dir.display(),
            model_type = %bundle.schema.model_type,
            n_features = bundle.schema.n_features,
            preprocessor = bundle.preprocessor.kind(),
            fingerprint = %bundle.fingerprint,
            "Loaded model artifacts"
        );
        Ok(Arc::new(bundle))
    }

    /// Assemble a bundle from already-parsed parts, running the co-version checks.
    pub fn from_parts(
        schema: FeatureSchema,
        model: Box<dyn ScoringModel>,
        preprocessor: Preprocessor,
        fingerprint: String,
    ) -> Result<Self, MlError> {
        schema.validate()?;
        let transform = schema.target_transform()?;

        if model.n_features() != schema.n_features {
            return Err(MlError::schema_mismatch(format!(
                "model expects {} features but schema declares {}",
                model.n_features(),
                schema.n_features
            )));
        }
        if let Some(names) = model.feature_names() {
            if let Some((i, (m, s))) = names
                .iter()
                .zip(&schema.feature_names)
                .enumerate()
                .find(|(_, (m, s))| m != s)
            {
                return Err(MlError::schema_mismatch(format!(
                    "feature {i} is '{m}' in the model but '{s}' in the schema"
                )));
            }
        }
        if let Some(n) = preprocessor.n_features() {
            if n != schema.n_features {
                return Err(MlError::schema_mismatch(format!(
                    "preprocessor expects {n} features but schema declares {}",
                    schema.n_features
                )));
            }
        }

        Ok(Self {
            schema,
            model,
            preprocessor,
            transform,
            fingerprint,
            source_dir: PathBuf::new(),
            loaded_at: Utc::now(),
        })
    }
}

fn read_artifact(path: &Path, what: &str) -> Result<Vec<u8>, MlError> {
    std::fs::read(path)
        .map_err(|e| MlError::artifact_load(format!("cannot read {what} {}: {e}", path.display())))
}

/// Provenance hash of the schema and model bytes.
pub fn fingerprint(schema_bytes: &[u8], model_bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(schema_bytes);
    hasher.update(model_bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::model::{Tree, TreeNode};

    fn schema(names: &[&str]) -> FeatureSchema {
        FeatureSchema {
            feature_names: names.iter().map(|s| s.to_string()).collect(),
            categorical_indices: vec![],
            n_features: names.len(),
            model_type: "catboost".into(),
            target_transformation: "log1p".into(),
            inverse_transformation: "expm1".into(),
            r2_score: None,
            categorical_columns: vec![],
            feature_defaults: Default::default(),
            category_levels: Default::default(),
            reference_year: 2024,
        }
    }

    fn model(names: Option<&[&str]>, n: usize) -> Box<dyn ScoringModel> {
        Box::new(TreeEnsemble {
            format: TreeEnsemble::FORMAT.into(),
            n_features: n,
            feature_names: names.map(|ns| ns.iter().map(|s| s.to_string()).collect()),
            base_score: 6.0,
            trees: vec![Tree {
                nodes: vec![TreeNode::Leaf { value: 0.0 }],
            }],
        })
    }

    #[test]
    fn test_co_versioned_parts_accepted() {
        let bundle = ArtifactBundle::from_parts(
            schema(&["width", "height"]),
            model(Some(&["width", "height"]), 2),
            Preprocessor::default(),
            "abc".into(),
        )
        .unwrap();
        assert_eq!(bundle.transform, TargetTransform::Log1p);
    }

    #[test]
    fn test_count_disagreement_is_mismatch() {
        let err = ArtifactBundle::from_parts(
            schema(&["width", "height"]),
            model(None, 3),
            Preprocessor::default(),
            String::new(),
        )
        .unwrap_err();
        assert!(matches!(err, MlError::SchemaMismatch(_)));
    }

    #[test]
    fn test_name_disagreement_is_mismatch() {
        let err = ArtifactBundle::from_parts(
            schema(&["width", "height"]),
            model(Some(&["height", "width"]), 2),
            Preprocessor::default(),
            String::new(),
        )
        .unwrap_err();
        assert!(matches!(err, MlError::SchemaMismatch(_)));
    }

    #[test]
    fn test_preprocessor_width_disagreement_is_mismatch() {
        let err = ArtifactBundle::from_parts(
            schema(&["width"]),
            model(None, 1),
            Preprocessor::Passthrough {
                n_features: Some(4),
            },
            String::new(),
        )
        .unwrap_err();
        assert!(matches!(err, MlError::SchemaMismatch(_)));
    }

    #[test]
    fn test_fingerprint_is_stable_hex() {
        let a = fingerprint(b"schema", b"model");
        assert_eq!(a.len(), 64);
        assert_eq!(a, fingerprint(b"schema", b"model"));
        assert_ne!(a, fingerprint(b"schema", b"model2"));
    }
}
