//! Market reference statistics behind the artist popularity features.

use crate::config::MarketConfig;
use crate::error::MlError;
use crate::features::derive::normalize_text;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Median price assumed for a technique/artist pair with no history.
pub const DEFAULT_TECHNIQUE_ARTIST_MEDIAN: f64 = 1000.0;

/// Auction history summary for one artist.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArtistStats {
    pub frequency: u32,
    pub median_price: f64,
    pub price_std: f64,
}

impl Default for ArtistStats {
    /// Stats used for artists without auction history.
    fn default() -> Self {
        Self {
            frequency: 1,
            median_price: 500.0,
            price_std: 250.0,
        }
    }
}

/// Read-only lookup of artist statistics.
pub trait MarketReference: Send + Sync + std::fmt::Debug {
    /// Stats for a known artist; `None` for an artist without history.
    fn artist(&self, name: &str) -> Option<ArtistStats>;

    /// Median price for a technique/artist pair, if recorded.
    fn technique_artist_median(&self, technique: &str, artist: &str) -> Option<f64>;

    fn artist_or_default(&self, name: &str) -> ArtistStats {
        self.artist(name).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArtistEntry {
    name: String,
    #[serde(flatten)]
    stats: ArtistStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TechniqueArtistEntry {
    technique: String,
    artist: String,
    median_price: f64,
    #[serde(default)]
    sample_count: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ReferenceFile {
    #[serde(default)]
    artists: Vec<ArtistEntry>,
    #[serde(default)]
    technique_artist_medians: Vec<TechniqueArtistEntry>,
}

/// In-memory market reference, optionally loaded from a JSON file.
#[derive(Debug, Clone, Default)]
pub struct StaticMarketReference {
    artists: HashMap<String, ArtistStats>,
    technique_artist: HashMap<(String, String), f64>,
}

impl StaticMarketReference {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_artist(mut self, name: &str, stats: ArtistStats) -> Self {
        self.artists.insert(normalize_text(name), stats);
        self
    }

    pub fn with_technique_median(mut self, technique: &str, artist: &str, median: f64) -> Self {
        self.technique_artist
            .insert((normalize_text(technique), normalize_text(artist)), median);
        self
    }

    pub fn artist_count(&self) -> usize {
        self.artists.len()
    }

    /// Load from JSON (`artists`, `technique_artist_medians`).
    pub fn load(path: &Path) -> Result<Self, MlError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MlError::config(format!(
                "cannot read market reference {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, MlError> {
        let file: ReferenceFile = serde_json::from_str(content)?;
        let mut reference = Self::new();
        for entry in file.artists {
            reference = reference.with_artist(&entry.name, entry.stats);
        }
        for entry in file.technique_artist_medians {
            reference =
                reference.with_technique_median(&entry.technique, &entry.artist, entry.median_price);
        }
        tracing::debug!(
            artists = reference.artists.len(),
            pairs = reference.technique_artist.len(),
            "Loaded market reference"
        );
        Ok(reference)
    }
}

impl MarketReference for StaticMarketReference {
    fn artist(&self, name: &str) -> Option<ArtistStats> {
        self.artists.get(&normalize_text(name)).copied()
    }

    fn technique_artist_median(&self, technique: &str, artist: &str) -> Option<f64> {
        self.technique_artist
            .get(&(normalize_text(technique), normalize_text(artist)))
            .copied()
    }
}

/// The configured market reference, or an empty one when none is set.
pub fn load_market_reference(config: &MarketConfig) -> Result<Arc<dyn MarketReference>, MlError> {
    match &config.reference_path {
        Some(path) => Ok(Arc::new(StaticMarketReference::load(path)?)),
        None => {
            tracing::info!("No market reference configured; artist features use defaults");
            Ok(Arc::new(StaticMarketReference::new()))
        }
    }
}
