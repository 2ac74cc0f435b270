//! # artifex-ml - art auction price prediction
//!
//! Feature contract, image features, artifact loading and prediction.
//!
//! The pieces line up as a pipeline: a [`ListingRecord`] (and optionally an
//! image) is turned into a [`FeatureVector`] by a [`FeatureBuilder`] bound to
//! the [`FeatureSchema`] the model was trained with, then scored by the
//! [`PredictionService`]. The same derivation backs the offline export, so
//! training and serving cannot drift apart.

pub mod config;
pub mod error;
pub mod features;
pub mod image;
pub mod inference;
pub mod schema;

pub use config::MlConfig;
pub use error::MlError;
pub use features::{FeatureBuilder, FeatureValue, FeatureVector, ListingRecord, MarketReference};
pub use image::{ImageFeatures, analyze_image};
pub use inference::{ArtifactBundle, PredictionResult, PredictionService};
pub use schema::{EncodingStrategy, FeatureSchema, TargetTransform};
