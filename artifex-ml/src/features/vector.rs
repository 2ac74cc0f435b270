//! Feature values and the ordered vector handed to the model.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A single feature value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Numeric(f64),
    Category(String),
}

impl FeatureValue {
    pub fn category(value: impl Into<String>) -> Self {
        Self::Category(value.into())
    }

    pub fn flag(value: bool) -> Self {
        Self::Numeric(if value { 1.0 } else { 0.0 })
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Numeric(v) => Some(*v),
            Self::Category(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Numeric(_) => None,
            Self::Category(s) => Some(s),
        }
    }

    /// Numeric view used at numeric positions: strings that parse as numbers
    /// are accepted, anything else becomes 0.
    pub fn coerce_numeric(&self) -> f64 {
        match self {
            Self::Numeric(v) if v.is_finite() => *v,
            Self::Numeric(_) => 0.0,
            Self::Category(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .unwrap_or(0.0),
        }
    }

    /// String view used at categorical positions.
    pub fn coerce_category(&self) -> String {
        match self {
            Self::Category(s) => s.clone(),
            Self::Numeric(v) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{}", *v as i64),
            Self::Numeric(v) => v.to_string(),
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        Self::Numeric(v)
    }
}

impl From<&str> for FeatureValue {
    fn from(v: &str) -> Self {
        Self::Category(v.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(v: String) -> Self {
        Self::Category(v)
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(v) => write!(f, "{v}"),
            Self::Category(s) => write!(f, "{s}"),
        }
    }
}

/// Ordered, named feature values matching a schema's `feature_names`.
///
/// Names are shared with the schema that produced the vector, so building a
/// vector never reorders or renames columns.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    names: Arc<[String]>,
    values: Vec<FeatureValue>,
}

impl FeatureVector {
    /// Pair `values` with `names`; lengths must agree.
    pub fn new(names: Arc<[String]>, values: Vec<FeatureValue>) -> Result<Self, crate::MlError> {
        if names.len() != values.len() {
            return Err(crate::MlError::schema_mismatch(format!(
                "feature vector has {} values for {} names",
                values.len(),
                names.len()
            )));
        }
        Ok(Self { names, values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[FeatureValue] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [FeatureValue] {
        &mut self.values
    }

    pub fn get(&self, index: usize) -> Option<&FeatureValue> {
        self.values.get(index)
    }

    /// Look a value up by feature name.
    pub fn value_of(&self, name: &str) -> Option<&FeatureValue> {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|i| self.values.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.names.iter().map(String::as_str).zip(self.values.iter())
    }

    /// Values as a JSON row in schema order, as written by `artifex featurize`.
    pub fn to_json_row(&self) -> Vec<serde_json::Value> {
        self.values
            .iter()
            .map(|value| match value {
                FeatureValue::Numeric(v) => serde_json::Number::from_f64(*v)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null),
                FeatureValue::Category(s) => serde_json::Value::String(s.clone()),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Arc<[String]> {
        list.iter().map(|s| s.to_string()).collect::<Vec<_>>().into()
    }

    #[test]
    fn test_untagged_serde() {
        let v: FeatureValue = serde_json::from_str("1.5").unwrap();
        assert_eq!(v, FeatureValue::Numeric(1.5));
        let v: FeatureValue = serde_json::from_str("\"unknown\"").unwrap();
        assert_eq!(v, FeatureValue::category("unknown"));
    }

    #[test]
    fn test_coercions() {
        assert_eq!(FeatureValue::category("3.5").coerce_numeric(), 3.5);
        assert_eq!(FeatureValue::category("pablo picasso").coerce_numeric(), 0.0);
        assert_eq!(FeatureValue::Numeric(f64::NAN).coerce_numeric(), 0.0);
        assert_eq!(FeatureValue::Numeric(2.0).coerce_category(), "2");
        assert_eq!(FeatureValue::Numeric(2.5).coerce_category(), "2.5");
    }

    #[test]
    fn test_vector_length_must_match() {
        let err = FeatureVector::new(names(&["a", "b"]), vec![1.0.into()]).unwrap_err();
        assert!(matches!(err, crate::MlError::SchemaMismatch(_)));
    }

    #[test]
    fn test_lookup_and_json_row() {
        let v = FeatureVector::new(
            names(&["width", "ARTIST"]),
            vec![50.0.into(), "pablo picasso".into()],
        )
        .unwrap();
        assert_eq!(v.value_of("ARTIST"), Some(&FeatureValue::category("pablo picasso")));
        assert_eq!(v.value_of("missing"), None);
        assert_eq!(
            v.to_json_row(),
            vec![serde_json::json!(50.0), serde_json::json!("pablo picasso")]
        );
    }
}
