//! Scoring models and the tree-ensemble export format.

use crate::error::MlError;
use crate::features::vector::{FeatureValue, FeatureVector};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A loaded model that maps a feature vector to a score in transformed space.
pub trait ScoringModel: Send + Sync + fmt::Debug {
    /// Export format name.
    fn format(&self) -> &str;

    /// Number of inputs the model was trained on.
    fn n_features(&self) -> usize;

    /// Input names recorded by the export, if any.
    fn feature_names(&self) -> Option<&[String]>;

    fn score(&self, features: &FeatureVector) -> Result<f64, MlError>;
}

/// One node of a decision tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    /// `value < threshold` goes left; missing values follow `default_left`.
    NumericSplit {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        #[serde(default)]
        default_left: bool,
    },
    /// Label in `categories` goes left.
    CategorySplit {
        feature: usize,
        categories: Vec<String>,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    fn validate(&self, index: usize, n_features: usize) -> Result<(), MlError> {
        if self.nodes.is_empty() {
            return Err(MlError::artifact_load(format!("tree {index} has no nodes")));
        }
        for (pos, node) in self.nodes.iter().enumerate() {
            let (feature, left, right) = match node {
                TreeNode::Leaf { value } => {
                    if !value.is_finite() {
                        return Err(MlError::artifact_load(format!(
                            "tree {index} node {pos}: leaf value is not finite"
                        )));
                    }
                    continue;
                }
                TreeNode::NumericSplit {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    if threshold.is_nan() {
                        return Err(MlError::artifact_load(format!(
                            "tree {index} node {pos}: threshold is NaN"
                        )));
                    }
                    (*feature, *left, *right)
                }
                TreeNode::CategorySplit {
                    feature,
                    left,
                    right,
                    ..
                } => (*feature, *left, *right),
            };
            if feature >= n_features {
                return Err(MlError::artifact_load(format!(
                    "tree {index} node {pos}: feature {feature} out of range"
                )));
            }
            // Children always sit after their parent, so a walk cannot loop.
            for child in [left, right] {
                if child <= pos || child >= self.nodes.len() {
                    return Err(MlError::artifact_load(format!(
                        "tree {index} node {pos}: invalid child reference {child}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn evaluate(&self, values: &[FeatureValue]) -> Result<f64, MlError> {
        let mut pos = 0;
        loop {
            let node = self
                .nodes
                .get(pos)
                .ok_or_else(|| MlError::scoring(format!("node {pos} out of range")))?;
            pos = match node {
                TreeNode::Leaf { value } => return Ok(*value),
                TreeNode::NumericSplit {
                    feature,
                    threshold,
                    left,
                    right,
                    default_left,
                } => {
                    let value = values.get(*feature).and_then(FeatureValue::as_f64).ok_or_else(
                        || MlError::scoring(format!("numeric split on non-numeric feature {feature}")),
                    )?;
                    let go_left = if value.is_nan() {
                        *default_left
                    } else {
                        value < *threshold
                    };
                    if go_left { *left } else { *right }
                }
                TreeNode::CategorySplit {
                    feature,
                    categories,
                    left,
                    right,
                } => {
                    let label = values.get(*feature).and_then(FeatureValue::as_str).ok_or_else(
                        || MlError::scoring(format!("category split on non-categorical feature {feature}")),
                    )?;
                    if categories.iter().any(|c| c == label) {
                        *left
                    } else {
                        *right
                    }
                }
            };
        }
    }
}

/// Additive tree ensemble: `base_score + Σ leaf`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    pub format: String,
    pub n_features: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_names: Option<Vec<String>>,
    #[serde(default)]
    pub base_score: f64,
    pub trees: Vec<Tree>,
}

impl TreeEnsemble {
    pub const FORMAT: &'static str = "tree_ensemble";

    /// Parse and check structural integrity.
    pub fn from_json(content: &str) -> Result<Self, MlError> {
        let model: Self = serde_json::from_str(content)
            .map_err(|e| MlError::artifact_load(format!("corrupt model: {e}")))?;
        model.validate()?;
        Ok(model)
    }

    pub fn validate(&self) -> Result<(), MlError> {
        if self.format != Self::FORMAT {
            return Err(MlError::artifact_load(format!(
                "unsupported model format '{}'",
                self.format
            )));
        }
        if !self.base_score.is_finite() {
            return Err(MlError::artifact_load("base_score is not finite"));
        }
        if self.trees.is_empty() {
            return Err(MlError::artifact_load("model has no trees"));
        }
        if let Some(names) = &self.feature_names {
            if names.len() != self.n_features {
                return Err(MlError::artifact_load(format!(
                    "model lists {} feature names for {} features",
                    names.len(),
                    self.n_features
                )));
            }
        }
        for (index, tree) in self.trees.iter().enumerate() {
            tree.validate(index, self.n_features)?;
        }
        Ok(())
    }
}

impl ScoringModel for TreeEnsemble {
    fn format(&self) -> &str {
        &self.format
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn feature_names(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }

    fn score(&self, features: &FeatureVector) -> Result<f64, MlError> {
        if features.len() != self.n_features {
            return Err(MlError::scoring(format!(
                "model expects {} features, got {}",
                self.n_features,
                features.len()
            )));
        }
        let values = features.values();
        self.trees
            .iter()
            .try_fold(self.base_score, |acc, tree| Ok(acc + tree.evaluate(values)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    // price ~ base 6.0; width < 40 → -0.5 else +0.5; ARTIST picasso → +2.0
    const MODEL: &str = r#"{
        "format": "tree_ensemble",
        "n_features": 2,
        "feature_names": ["width", "ARTIST"],
        "base_score": 6.0,
        "trees": [
            {"nodes": [
                {"kind": "numeric_split", "feature": 0, "threshold": 40.0, "left": 1, "right": 2},
                {"kind": "leaf", "value": -0.5},
                {"kind": "leaf", "value": 0.5}
            ]},
            {"nodes": [
                {"kind": "category_split", "feature": 1, "categories": ["pablo picasso"], "left": 1, "right": 2},
                {"kind": "leaf", "value": 2.0},
                {"kind": "leaf", "value": 0.0}
            ]}
        ]
    }"#;

    fn vector(width: FeatureValue, artist: FeatureValue) -> FeatureVector {
        let names: Arc<[String]> = vec!["width".to_string(), "ARTIST".to_string()].into();
        FeatureVector::new(names, vec![width, artist]).unwrap()
    }

    #[test]
    fn test_score_sums_leaves() {
        let model = TreeEnsemble::from_json(MODEL).unwrap();
        let score = model
            .score(&vector(50.0.into(), "pablo picasso".into()))
            .unwrap();
        assert_eq!(score, 8.5);
        let score = model.score(&vector(10.0.into(), "unknown".into())).unwrap();
        assert_eq!(score, 5.5);
    }

    #[test]
    fn test_nan_follows_default_direction() {
        let model = TreeEnsemble::from_json(MODEL).unwrap();
        // default_left is false
        let score = model
            .score(&vector(f64::NAN.into(), "unknown".into()))
            .unwrap();
        assert_eq!(score, 6.5);
    }

    #[test]
    fn test_wrong_value_kind_is_scoring_error() {
        let model = TreeEnsemble::from_json(MODEL).unwrap();
        let err = model.score(&vector("wide".into(), "x".into())).unwrap_err();
        assert!(matches!(err, MlError::Scoring(_)));
    }

    #[test]
    fn test_backward_child_rejected() {
        let json = r#"{"format": "tree_ensemble", "n_features": 1, "trees": [{"nodes": [
            {"kind": "numeric_split", "feature": 0, "threshold": 1.0, "left": 0, "right": 1},
            {"kind": "leaf", "value": 1.0}
        ]}]}"#;
        let err = TreeEnsemble::from_json(json).unwrap_err();
        assert!(matches!(err, MlError::ArtifactLoad(_)));
    }

    #[test]
    fn test_feature_out_of_range_rejected() {
        let json = r#"{"format": "tree_ensemble", "n_features": 1, "trees": [{"nodes": [
            {"kind": "numeric_split", "feature": 3, "threshold": 1.0, "left": 1, "right": 2},
            {"kind": "leaf", "value": 1.0},
            {"kind": "leaf", "value": 2.0}
        ]}]}"#;
        assert!(matches!(
            TreeEnsemble::from_json(json).unwrap_err(),
            MlError::ArtifactLoad(_)
        ));
    }

    #[test]
    fn test_corrupt_and_foreign_formats() {
        assert!(matches!(
            TreeEnsemble::from_json("{not json").unwrap_err(),
            MlError::ArtifactLoad(_)
        ));
        let pickle_like = r#"{"format": "catboost_cbm", "n_features": 1, "trees": []}"#;
        assert!(matches!(
            TreeEnsemble::from_json(pickle_like).unwrap_err(),
            MlError::ArtifactLoad(_)
        ));
    }

    #[test]
    fn test_length_mismatch_is_scoring_error() {
        let model = TreeEnsemble::from_json(MODEL).unwrap();
        let names: Arc<[String]> = vec!["width".to_string()].into();
        let short = FeatureVector::new(names, vec![1.0.into()]).unwrap();
        assert!(matches!(model.score(&short).unwrap_err(), MlError::Scoring(_)));
    }
}
