//! Feature contract: listing derivation, market lookups and schema-ordered vectors.

pub mod builder;
pub mod derive;
pub mod market;
pub mod vector;

pub use builder::FeatureBuilder;
pub use derive::{
    CATEGORICAL_FEATURES, DerivationContext, DerivedFeatures, EditionClass, IMAGE_FEATURE_NAMES,
    ListingRecord, derive_features, normalize_text,
};
pub use market::{ArtistStats, MarketReference, StaticMarketReference, load_market_reference};
pub use vector::{FeatureValue, FeatureVector};
