//! Turns a listing into the exact vector the loaded model expects.

use crate::error::MlError;
use crate::features::derive::{
    CATEGORICAL_FEATURES, DerivationContext, DerivedFeatures, ListingRecord, derive_features,
    normalize_text,
};
use crate::features::market::MarketReference;
use crate::features::vector::{FeatureValue, FeatureVector};
use crate::image::ImageFeatures;
use crate::schema::{EncodingStrategy, FeatureSchema};
use std::collections::HashSet;
use std::sync::Arc;

/// How one schema position is filled.
#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Numeric {
        name: String,
        default: f64,
    },
    Categorical {
        name: String,
        default: String,
    },
    /// Level index + 1, 0 when the level was not seen in training.
    Ordinal {
        column: String,
        levels: Vec<String>,
        default: f64,
    },
    OneHot {
        column: String,
        level: String,
    },
}

/// Schema-bound feature builder. Construction resolves every position once;
/// `build` only derives and fills.
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    names: Arc<[String]>,
    slots: Vec<Slot>,
    strategy: EncodingStrategy,
    ctx: DerivationContext,
}

impl FeatureBuilder {
    pub fn new(schema: &FeatureSchema) -> Result<Self, MlError> {
        schema.validate()?;
        let strategy = schema.encoding_strategy();
        let mask = schema.categorical_mask();

        let mut categorical: HashSet<&str> = CATEGORICAL_FEATURES.iter().copied().collect();
        categorical.extend(schema.categorical_columns.iter().map(String::as_str));
        categorical.extend(
            schema
                .categorical_indices
                .iter()
                .filter_map(|&i| schema.feature_names.get(i).map(String::as_str)),
        );

        let slots = schema
            .feature_names
            .iter()
            .zip(&mask)
            .map(|(name, &is_cat)| match strategy {
                EncodingStrategy::NativeCategorical => Ok(Self::native_slot(schema, name, is_cat)),
                EncodingStrategy::NumericEncoded => {
                    Self::encoded_slot(schema, name, is_cat, &categorical)
                }
            })
            .collect::<Result<Vec<_>, MlError>>()?;

        tracing::debug!(
            features = slots.len(),
            strategy = ?strategy,
            "Feature builder bound to schema"
        );

        Ok(Self {
            names: schema.feature_names.clone().into(),
            slots,
            strategy,
            ctx: DerivationContext {
                reference_year: schema.reference_year,
            },
        })
    }

    fn native_slot(schema: &FeatureSchema, name: &str, is_cat: bool) -> Slot {
        let default = schema.default_for(name, is_cat);
        if is_cat {
            Slot::Categorical {
                name: name.to_string(),
                default: default.coerce_category(),
            }
        } else {
            Slot::Numeric {
                name: name.to_string(),
                default: default.coerce_numeric(),
            }
        }
    }

    fn encoded_slot(
        schema: &FeatureSchema,
        name: &str,
        is_cat: bool,
        categorical: &HashSet<&str>,
    ) -> Result<Slot, MlError> {
        if is_cat || categorical.contains(name) {
            let levels = schema.category_levels.get(name).ok_or_else(|| {
                MlError::schema_mismatch(format!(
                    "numeric model needs category_levels for '{name}'"
                ))
            })?;
            return Ok(Slot::Ordinal {
                column: name.to_string(),
                levels: levels.iter().map(|l| normalize_text(l)).collect(),
                default: schema
                    .feature_defaults
                    .get(name)
                    .map(FeatureValue::coerce_numeric)
                    .unwrap_or(0.0),
            });
        }

        // `<column>_<level>`; the longest matching column wins.
        let one_hot = categorical
            .iter()
            .filter(|col| {
                name.len() > col.len() + 1
                    && name.starts_with(*col)
                    && name.as_bytes()[col.len()] == b'_'
            })
            .max_by_key(|col| col.len());
        if let Some(column) = one_hot {
            return Ok(Slot::OneHot {
                column: column.to_string(),
                level: normalize_text(&name[column.len() + 1..].replace('_', " ")),
            });
        }

        Ok(Self::native_slot(schema, name, false))
    }

    pub fn strategy(&self) -> EncodingStrategy {
        self.strategy
    }

    pub fn feature_names(&self) -> &Arc<[String]> {
        &self.names
    }

    pub fn n_features(&self) -> usize {
        self.slots.len()
    }

    pub fn context(&self) -> &DerivationContext {
        &self.ctx
    }

    /// Derive and lay out features for one listing.
    ///
    /// Missing inputs never fail: unresolved positions take their default.
    pub fn build(
        &self,
        record: &ListingRecord,
        image: Option<&ImageFeatures>,
        market: &dyn MarketReference,
    ) -> Result<FeatureVector, MlError> {
        let derived = derive_features(record, image, market, &self.ctx);
        self.assemble(&derived)
    }

    /// Lay out already-derived features in schema order.
    pub fn assemble(&self, derived: &DerivedFeatures) -> Result<FeatureVector, MlError> {
        let values = self
            .slots
            .iter()
            .map(|slot| fill(slot, derived))
            .collect();
        FeatureVector::new(Arc::clone(&self.names), values)
    }
}

fn fill(slot: &Slot, derived: &DerivedFeatures) -> FeatureValue {
    match slot {
        Slot::Numeric { name, default } => FeatureValue::Numeric(
            derived
                .get(name)
                .map(FeatureValue::coerce_numeric)
                .unwrap_or(*default),
        ),
        Slot::Categorical { name, default } => FeatureValue::Category(
            derived
                .get(name)
                .map(FeatureValue::coerce_category)
                .unwrap_or_else(|| default.clone()),
        ),
        Slot::Ordinal {
            column,
            levels,
            default,
        } => match derived.get(column) {
            Some(value) => {
                let label = normalize_text(&value.coerce_category());
                let code = levels
                    .iter()
                    .position(|l| *l == label)
                    .map_or(0.0, |i| (i + 1) as f64);
                FeatureValue::Numeric(code)
            }
            None => FeatureValue::Numeric(*default),
        },
        Slot::OneHot { column, level } => {
            let hit = derived
                .get(column)
                .is_some_and(|v| normalize_text(&v.coerce_category()) == *level);
            FeatureValue::flag(hit)
        }
    }
}
