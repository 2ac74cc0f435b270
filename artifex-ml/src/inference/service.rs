//! Prediction service: listing (+ optional image) → price estimate.

use crate::config::{ImageConfig, MlConfig, PredictionConfig};
use crate::error::MlError;
use crate::features::builder::FeatureBuilder;
use crate::features::derive::ListingRecord;
use crate::features::market::{ArtistStats, MarketReference, load_market_reference};
use crate::features::vector::FeatureVector;
use crate::image::{ImageFeatures, analyze_image, image_quality};
use crate::inference::artifacts::ArtifactBundle;
use crate::schema::EncodingStrategy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Number of feature names shown by [`PredictionService::model_info`].
const MODEL_INFO_NAME_PREVIEW: usize = 10;

/// Price estimate for one listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub point_estimate: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    /// Raw model output, in target-transform space.
    pub log_estimate: f64,
    /// How the bounds were produced. They are a fixed percentage band, not a
    /// statistical prediction interval.
    pub interval: String,
    pub model_type: String,
    pub r2_score: Option<f64>,
    pub features_used: usize,
    pub confidence: ConfidenceLevel,
    pub artist_popularity: ArtistPopularity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_features: Option<ImageFeatures>,
    pub image_quality: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    pub artifact_fingerprint: String,
}

/// How much auction history backs the estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn from_frequency(frequency: u32) -> Self {
        match frequency {
            f if f >= 20 => Self::High,
            f if f >= 5 => Self::Medium,
            _ => Self::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtistPopularity {
    VeryPopular,
    Popular,
    Known,
    Unknown,
}

impl ArtistPopularity {
    pub fn from_frequency(frequency: u32) -> Self {
        match frequency {
            f if f >= 50 => Self::VeryPopular,
            f if f >= 10 => Self::Popular,
            f if f >= 5 => Self::Known,
            _ => Self::Unknown,
        }
    }
}

/// Result of a stand-alone image analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAnalysis {
    pub colorfulness_score: f64,
    pub svd_entropy: f64,
    pub aspect_ratio: f64,
    pub width: u32,
    pub height: u32,
    pub image_quality: String,
}

impl From<ImageFeatures> for ImageAnalysis {
    fn from(f: ImageFeatures) -> Self {
        Self {
            colorfulness_score: f.colorfulness,
            svd_entropy: f.svd_entropy,
            aspect_ratio: f.aspect_ratio,
            width: f.width,
            height: f.height,
            image_quality: image_quality(&f).to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub model_loaded: bool,
    pub features_count: usize,
    pub image_processing: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_type: String,
    pub model_format: String,
    pub n_features: usize,
    pub r2_score: Option<f64>,
    pub categorical_indices: Vec<usize>,
    /// First few feature names, in schema order.
    pub feature_names: Vec<String>,
    pub target_transformation: String,
    pub inverse_transformation: String,
    pub encoding: EncodingStrategy,
    pub preprocessor: String,
    pub artifact_fingerprint: String,
    pub loaded_at: DateTime<Utc>,
}

/// Shared, read-only prediction service. One instance serves every request.
#[derive(Debug)]
pub struct PredictionService {
    bundle: Arc<ArtifactBundle>,
    builder: FeatureBuilder,
    market: Arc<dyn MarketReference>,
    prediction: PredictionConfig,
    image: ImageConfig,
}

impl PredictionService {
    /// Load artifacts and market data named by `config`.
    pub fn from_config(config: &MlConfig) -> Result<Self, MlError> {
        let bundle = ArtifactBundle::load(&config.artifacts)?;
        let market = load_market_reference(&config.market)?;
        Self::new(bundle, market, config)
    }

    pub fn new(
        bundle: Arc<ArtifactBundle>,
        market: Arc<dyn MarketReference>,
        config: &MlConfig,
    ) -> Result<Self, MlError> {
        config.prediction.validate()?;
        let builder = FeatureBuilder::new(&bundle.schema)?;
        Ok(Self {
            bundle,
            builder,
            market,
            prediction: config.prediction.clone(),
            image: config.image.clone(),
        })
    }

    pub fn bundle(&self) -> &Arc<ArtifactBundle> {
        &self.bundle
    }

    pub fn builder(&self) -> &FeatureBuilder {
        &self.builder
    }

    /// Schema-ordered features for one listing, without scoring.
    pub fn featurize(
        &self,
        record: &ListingRecord,
        image: Option<&ImageFeatures>,
    ) -> Result<FeatureVector, MlError> {
        self.builder.build(record, image, self.market.as_ref())
    }

    /// Estimate a price for `record`.
    ///
    /// A bad image never fails the request: its features fall back to the
    /// schema defaults and a note is attached to the result.
    pub fn predict(
        &self,
        record: &ListingRecord,
        image: Option<&[u8]>,
    ) -> Result<PredictionResult, MlError> {
        let mut notes = Vec::new();

        let image_features = match image {
            Some(bytes) => match analyze_image(bytes, &self.image) {
                Ok(features) => Some(features),
                Err(e) => {
                    tracing::warn!(error = %e, "Image analysis failed; using default image features");
                    notes.push(format!("Image analysis failed ({e}); image features used defaults"));
                    None
                }
            },
            None => None,
        };

        let mut features = self.featurize(record, image_features.as_ref())?;
        self.bundle.preprocessor.apply(&mut features)?;

        let log_estimate = self.bundle.model.score(&features)?;
        if !log_estimate.is_finite() {
            return Err(MlError::scoring(format!(
                "model produced a non-finite score {log_estimate}"
            )));
        }
        let point = self.bundle.transform.inverse(log_estimate);
        if !point.is_finite() {
            return Err(MlError::scoring(format!(
                "estimate overflowed inverting score {log_estimate}"
            )));
        }
        let point = point.max(0.0);

        let f = self.prediction.band_fraction;
        let lower_bound = (point * (1.0 - f)).max(0.0);
        let upper_bound = point * (1.0 + f);

        let stats = self.artist_stats(record, &mut notes);
        let quality = image_features
            .as_ref()
            .map_or("No image", image_quality);

        tracing::info!(
            point_estimate = point,
            log_estimate,
            artist_frequency = stats.frequency,
            has_image = image_features.is_some(),
            "Prediction complete"
        );

        Ok(PredictionResult {
            point_estimate: point,
            lower_bound,
            upper_bound,
            log_estimate,
            interval: format!(
                "Heuristic ±{:.0}% band around the point estimate; not a statistical prediction interval",
                f * 100.0
            ),
            model_type: self.bundle.schema.model_type.clone(),
            r2_score: self.bundle.schema.r2_score,
            features_used: features.len(),
            confidence: ConfidenceLevel::from_frequency(stats.frequency),
            artist_popularity: ArtistPopularity::from_frequency(stats.frequency),
            image_features,
            image_quality: quality.to_string(),
            notes,
            artifact_fingerprint: self.bundle.fingerprint.clone(),
        })
    }

    fn artist_stats(&self, record: &ListingRecord, notes: &mut Vec<String>) -> ArtistStats {
        let Some(artist) = record.artist.as_deref().filter(|a| !a.trim().is_empty()) else {
            return ArtistStats::default();
        };
        match self.market.artist(artist) {
            Some(stats) => stats,
            None => {
                notes.push(format!(
                    "Artist '{}' has no auction history; popularity features used defaults",
                    artist.trim()
                ));
                ArtistStats::default()
            }
        }
    }

    pub fn analyze_image(&self, bytes: &[u8]) -> Result<ImageAnalysis, MlError> {
        analyze_image(bytes, &self.image).map(ImageAnalysis::from)
    }

    pub fn max_image_bytes(&self) -> usize {
        self.image.max_image_bytes
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "healthy".to_string(),
            model_loaded: true,
            features_count: self.bundle.schema.n_features,
            image_processing: "available".to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn model_info(&self) -> ModelInfo {
        let schema = &self.bundle.schema;
        ModelInfo {
            model_type: schema.model_type.clone(),
            model_format: self.bundle.model.format().to_string(),
            n_features: schema.n_features,
            r2_score: schema.r2_score,
            categorical_indices: schema.categorical_indices.clone(),
            feature_names: schema
                .feature_names
                .iter()
                .take(MODEL_INFO_NAME_PREVIEW)
                .cloned()
                .collect(),
            target_transformation: schema.target_transformation.clone(),
            inverse_transformation: schema.inverse_transformation.clone(),
            encoding: self.builder.strategy(),
            preprocessor: self.bundle.preprocessor.kind().to_string(),
            artifact_fingerprint: self.bundle.fingerprint.clone(),
            loaded_at: self.bundle.loaded_at,
        }
    }
}
