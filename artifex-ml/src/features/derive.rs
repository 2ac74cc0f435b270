//! Listing → named feature derivation.
//!
//! This is the one place the feature set is defined. Serving calls it through
//! the [`FeatureBuilder`](super::builder::FeatureBuilder); the offline export
//! calls it through `artifex featurize`, so both sides derive identically.

use crate::features::market::{DEFAULT_TECHNIQUE_ARTIST_MEDIAN, MarketReference};
use crate::features::vector::FeatureValue;
use crate::image::ImageFeatures;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Names under which image descriptors enter the feature set.
pub const IMAGE_FEATURE_NAMES: [&str; 3] = ["colorfulness_score", "svd_entropy", "image_aspect_ratio"];

/// Features derived as categorical labels.
pub const CATEGORICAL_FEATURES: [&str; 10] = [
    "OBJECT",
    "ARTIST",
    "EXPERT",
    "EXPERT_RAW",
    "TECHNIQUE_SIMPLE",
    "SIGNATURE_SIMPLE",
    "CONDITION_SIMPLE",
    "EDITION_TYPE",
    "size_category",
    "year_category",
];

/// Guards the ratio features against division by zero, as in training.
const RATIO_EPSILON: f64 = 1e-8;

/// Title word count assumed when neither a title nor a count is given.
const DEFAULT_TITLE_WORDS: f64 = 3.0;

/// Raw auction listing as supplied by a caller. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    #[serde(default, alias = "object")]
    pub object_type: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub expert: Option<String>,
    #[serde(default)]
    pub technique: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default, alias = "edition")]
    pub edition_type: Option<String>,
    /// Centimetres.
    #[serde(default)]
    pub width: Option<f64>,
    /// Centimetres.
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub title_word_count: Option<u32>,
    #[serde(default)]
    pub has_edition: Option<bool>,
    #[serde(default)]
    pub has_certificate: Option<bool>,
    #[serde(default)]
    pub has_frame: Option<bool>,
    #[serde(default)]
    pub has_damage: Option<bool>,
    /// Precomputed image descriptor, used only when no image is attached.
    #[serde(default)]
    pub colorfulness_score: Option<f64>,
    /// Precomputed image descriptor, used only when no image is attached.
    #[serde(default)]
    pub svd_entropy: Option<f64>,
}

/// Inputs to derivation that come from the artifact set rather than the listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivationContext {
    /// Year ages are measured against; must match the training export.
    pub reference_year: i32,
}

impl Default for DerivationContext {
    fn default() -> Self {
        Self {
            reference_year: crate::schema::DEFAULT_REFERENCE_YEAR,
        }
    }
}

/// Edition class normalised from free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditionClass {
    Unknown,
    Unique,
    Numbered,
    Limited,
    Open,
}

impl EditionClass {
    /// Classify free text such as "Limited edition of 50" or "12/100".
    pub fn from_text(text: &str) -> Self {
        let text = normalize_text(text);
        if text.contains("unique") {
            Self::Unique
        } else if text.contains("limited") {
            Self::Limited
        } else if text.contains("numbered") || has_fraction_numbering(&text) {
            Self::Numbered
        } else if text.contains("open") {
            Self::Open
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Unique => "unique",
            Self::Numbered => "numbered",
            Self::Limited => "limited",
            Self::Open => "open",
        }
    }

    /// Ordinal code used by the `edition_type` feature.
    pub fn code(self) -> f64 {
        match self {
            Self::Unknown => 0.0,
            Self::Unique => 1.0,
            Self::Numbered => 2.0,
            Self::Limited => 3.0,
            Self::Open => 4.0,
        }
    }
}

/// `12/100`, `12 / 100`.
fn has_fraction_numbering(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.iter().enumerate().any(|(i, &b)| {
        if b != b'/' {
            return false;
        }
        let before = bytes[..i].iter().rev().find(|c| **c != b' ');
        let after = bytes[i + 1..].iter().find(|c| **c != b' ');
        matches!((before, after), (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit())
    })
}

/// Trim, lowercase and collapse internal whitespace.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn normalized(field: Option<&String>) -> Option<String> {
    field.map(|s| normalize_text(s)).filter(|s| !s.is_empty())
}

/// Positive, finite dimension or nothing.
fn dimension(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

pub fn size_category(area: f64) -> &'static str {
    if area <= 100.0 {
        "tiny"
    } else if area <= 1000.0 {
        "small"
    } else if area <= 5000.0 {
        "medium"
    } else {
        "large"
    }
}

pub fn year_category(year: i32) -> &'static str {
    if year < 1900 {
        "pre_1900"
    } else if year < 1950 {
        "early_1900s"
    } else if year < 1980 {
        "mid_1900s"
    } else if year < 2000 {
        "late_1900s"
    } else {
        "modern"
    }
}

/// Every feature the listing (plus optional image) can resolve, by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedFeatures {
    values: BTreeMap<String, FeatureValue>,
}

impl DerivedFeatures {
    fn set(&mut self, name: &str, value: impl Into<FeatureValue>) {
        self.values.insert(name.to_string(), value.into());
    }

    fn set_flag(&mut self, name: &str, value: bool) {
        self.values.insert(name.to_string(), FeatureValue::flag(value));
    }

    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// Derive all resolvable features for one listing.
///
/// Features whose raw input is missing are left out; the builder fills them
/// from the schema defaults.
pub fn derive_features(
    record: &ListingRecord,
    image: Option<&ImageFeatures>,
    market: &dyn MarketReference,
    ctx: &DerivationContext,
) -> DerivedFeatures {
    let mut out = DerivedFeatures::default();

    // Categorical source fields.
    let object = normalized(record.object_type.as_ref());
    let artist = normalized(record.artist.as_ref());
    let expert = normalized(record.expert.as_ref());
    let technique = normalized(record.technique.as_ref());
    let signature = normalized(record.signature.as_ref());
    let condition = normalized(record.condition.as_ref());
    let edition = record
        .edition_type
        .as_deref()
        .map(EditionClass::from_text);

    if let Some(v) = &object {
        out.set("OBJECT", v.clone());
    }
    if let Some(v) = &artist {
        out.set("ARTIST", v.clone());
    }
    if let Some(v) = &expert {
        out.set("EXPERT", v.clone());
        out.set("EXPERT_RAW", v.clone());
    }
    if let Some(v) = &technique {
        out.set("TECHNIQUE_SIMPLE", v.clone());
    }
    if let Some(v) = &signature {
        out.set("SIGNATURE_SIMPLE", v.clone());
    }
    if let Some(v) = &condition {
        out.set("CONDITION_SIMPLE", v.clone());
    }
    if let Some(class) = edition {
        out.set("EDITION_TYPE", class.as_str());
        out.set("edition_type", class.code());
    }

    // Text flags; absent text matches nothing.
    let sig = signature.as_deref().unwrap_or("");
    let has_hand_signed = sig.contains("hand");
    let has_plate_signed = sig.contains("plate");
    out.set_flag("has_hand_signed", has_hand_signed);
    out.set_flag("has_plate_signed", has_plate_signed);
    out.set_flag("has_unsigned", sig.contains("unsigned"));
    out.set_flag("has_any_signature", has_hand_signed || has_plate_signed);

    let tech = technique.as_deref().unwrap_or("");
    let etching = tech.contains("etching");
    let lithograph = tech.contains("lithograph");
    let woodcut = tech.contains("woodcut");
    let screenprint = tech.contains("screenprint");
    out.set_flag("has_etching", etching);
    out.set_flag("has_lithograph", lithograph);
    out.set_flag("has_woodcut", woodcut);
    out.set_flag("has_screenprint", screenprint);
    let technique_count = [etching, lithograph, woodcut, screenprint]
        .iter()
        .filter(|f| **f)
        .count() as f64;
    let technique_score = f64::from(u8::from(etching)) * 2.0
        + f64::from(u8::from(lithograph)) * 2.0
        + f64::from(u8::from(woodcut)) * 3.0
        + f64::from(u8::from(screenprint));
    out.set("technique_count", technique_count);
    out.set("technique_score", technique_score);
    out.set_flag("has_multiple_techniques", technique_count > 1.0);

    // Edition and physical flags.
    let has_limited = edition == Some(EditionClass::Limited);
    let has_certificate = record.has_certificate.unwrap_or(false);
    let has_frame = record.has_frame.unwrap_or(false);
    let has_damage = record.has_damage.unwrap_or(false);
    let has_edition = record.has_edition.unwrap_or(false);
    out.set_flag("has_limited_edition", has_limited);
    out.set_flag("has_certificate", has_certificate);
    out.set_flag("has_frame", has_frame);
    out.set_flag("has_damage", has_damage);
    out.set_flag("has_edition", has_edition);
    let as_num = |b: bool| f64::from(u8::from(b));
    out.set(
        "edition_features",
        as_num(has_edition) + as_num(has_limited) + as_num(has_certificate),
    );
    out.set(
        "physical_features",
        as_num(has_frame) + as_num(has_certificate) - as_num(has_damage),
    );

    // Dimensions.
    let width = dimension(record.width);
    let height = dimension(record.height);
    if let Some(w) = width {
        out.set("width", w);
        out.set("log_width", w.ln_1p());
    }
    if let Some(h) = height {
        out.set("height", h);
        out.set("log_height", h.ln_1p());
    }
    let area = width.zip(height).map(|(w, h)| w * h);
    if let (Some(w), Some(h), Some(area)) = (width, height, area) {
        out.set("area", area);
        out.set("log_area", area.ln_1p());
        out.set("aspect_ratio", w / (h + RATIO_EPSILON));
        out.set("area_per_width", area / (w + RATIO_EPSILON));
        out.set("area_per_height", area / (h + RATIO_EPSILON));
        out.set("size_category", size_category(area));
    } else if let Some(img) = image {
        out.set("aspect_ratio", img.aspect_ratio);
    }

    // Image descriptors; caller-supplied values stand in when no image is attached.
    match image {
        Some(img) => {
            out.set("colorfulness_score", img.colorfulness);
            out.set("svd_entropy", img.svd_entropy);
            out.set("image_aspect_ratio", img.aspect_ratio);
        }
        None => {
            if let Some(c) = record.colorfulness_score.filter(|v| v.is_finite()) {
                out.set("colorfulness_score", c);
            }
            if let Some(e) = record.svd_entropy.filter(|v| v.is_finite()) {
                out.set("svd_entropy", e);
            }
        }
    }

    // Age.
    out.set("auction_year", f64::from(ctx.reference_year));
    if let Some(year) = record.year {
        let age = ctx.reference_year.saturating_sub(year);
        out.set("log_age", f64::from(age.max(0)).ln_1p());
        out.set_flag("is_antique", age >= 100);
        out.set_flag("is_vintage", (20..100).contains(&age));
        out.set_flag("is_modern", age < 20);
        out.set("year_category", year_category(year));
    }

    // Artist popularity, from the market reference or the unknown-artist stats.
    let stats = artist
        .as_deref()
        .map(|a| market.artist_or_default(a))
        .unwrap_or_default();
    let frequency = f64::from(stats.frequency);
    out.set("artist_frequency", frequency);
    out.set("log_artist_frequency", frequency.ln_1p());
    out.set("artist_rarity", 1.0 / (frequency + 1.0));
    out.set_flag("is_rare_artist", stats.frequency <= 5);
    out.set_flag("is_popular_artist", stats.frequency >= 50);
    out.set_flag("is_very_popular_artist", stats.frequency >= 100);
    if let Some(area) = area {
        out.set("size_artist_interaction", area * frequency);
    }
    out.set("technique_artist_interaction", technique_count * frequency);

    let tech_artist_median = match (technique.as_deref(), artist.as_deref()) {
        (Some(t), Some(a)) => market.technique_artist_median(t, a),
        _ => None,
    }
    .unwrap_or(DEFAULT_TECHNIQUE_ARTIST_MEDIAN);
    let ratio = if tech_artist_median > 0.0 && stats.median_price > 0.0 {
        tech_artist_median / stats.median_price
    } else {
        1.0
    };
    out.set("price_vs_tech_artist_median", ratio);

    // Object frequency is not tracked per listing; training used constants.
    out.set("object_frequency", 100.0);
    out.set_flag("is_rare_object", false);
    out.set_flag("is_common_object", true);

    // Title.
    let title_words = record
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty() && !t.eq_ignore_ascii_case("untitled"))
        .map(|t| t.split_whitespace().count() as f64)
        .or_else(|| record.title_word_count.map(f64::from))
        .unwrap_or(DEFAULT_TITLE_WORDS);
    out.set("title_word_count", title_words);

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::market::{ArtistStats, StaticMarketReference};

    fn picasso_record() -> ListingRecord {
        ListingRecord {
            artist: Some("Pablo Picasso".into()),
            technique: Some("Lithograph".into()),
            width: Some(50.0),
            height: Some(70.0),
            year: Some(1965),
            condition: Some("good".into()),
            signature: Some("signed".into()),
            ..Default::default()
        }
    }

    fn num(features: &DerivedFeatures, name: &str) -> f64 {
        features.get(name).and_then(FeatureValue::as_f64).unwrap()
    }

    fn cat<'a>(features: &'a DerivedFeatures, name: &str) -> &'a str {
        features.get(name).and_then(FeatureValue::as_str).unwrap()
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Oil   on\tCanvas "), "oil on canvas");
        assert_eq!(normalize_text("   "), "");
    }

    #[test]
    fn test_edition_classes() {
        assert_eq!(EditionClass::from_text("Unique piece"), EditionClass::Unique);
        assert_eq!(EditionClass::from_text("12/100"), EditionClass::Numbered);
        assert_eq!(EditionClass::from_text("ed. 12 / 100"), EditionClass::Numbered);
        assert_eq!(EditionClass::from_text("Limited edition 12/100"), EditionClass::Limited);
        assert_eq!(EditionClass::from_text("open edition"), EditionClass::Open);
        assert_eq!(EditionClass::from_text("n/a"), EditionClass::Unknown);
        assert_eq!(EditionClass::Limited.code(), 3.0);
    }

    #[test]
    fn test_buckets() {
        assert_eq!(size_category(100.0), "tiny");
        assert_eq!(size_category(100.5), "small");
        assert_eq!(size_category(3500.0), "medium");
        assert_eq!(size_category(5000.1), "large");
        assert_eq!(year_category(1899), "pre_1900");
        assert_eq!(year_category(1900), "early_1900s");
        assert_eq!(year_category(1965), "mid_1900s");
        assert_eq!(year_category(1999), "late_1900s");
        assert_eq!(year_category(2000), "modern");
    }

    #[test]
    fn test_picasso_lithograph() {
        let market = StaticMarketReference::new().with_artist(
            "pablo picasso",
            ArtistStats {
                frequency: 150,
                median_price: 50_000.0,
                price_std: 25_000.0,
            },
        );
        let f = derive_features(&picasso_record(), None, &market, &DerivationContext::default());

        assert_eq!(cat(&f, "ARTIST"), "pablo picasso");
        assert_eq!(cat(&f, "TECHNIQUE_SIMPLE"), "lithograph");
        assert_eq!(num(&f, "area"), 3500.0);
        assert_eq!(cat(&f, "size_category"), "medium");
        assert_eq!(cat(&f, "year_category"), "mid_1900s");
        assert_eq!(num(&f, "is_vintage"), 1.0);
        assert_eq!(num(&f, "is_antique"), 0.0);
        assert!((num(&f, "log_age") - 59.0f64.ln_1p()).abs() < 1e-12);
        assert_eq!(num(&f, "has_lithograph"), 1.0);
        assert_eq!(num(&f, "technique_score"), 2.0);
        assert_eq!(num(&f, "has_any_signature"), 0.0);
        assert_eq!(num(&f, "artist_frequency"), 150.0);
        assert_eq!(num(&f, "is_very_popular_artist"), 1.0);
        assert_eq!(num(&f, "size_artist_interaction"), 3500.0 * 150.0);
        // Pair unknown: 1000 / 50000.
        assert!((num(&f, "price_vs_tech_artist_median") - 0.02).abs() < 1e-12);
        assert!(!f.contains("colorfulness_score"));
        assert!(!f.contains("EDITION_TYPE"));
    }

    #[test]
    fn test_empty_record_resolves_only_derivable() {
        let f = derive_features(
            &ListingRecord::default(),
            None,
            &StaticMarketReference::new(),
            &DerivationContext::default(),
        );
        for missing in ["ARTIST", "width", "area", "size_category", "year_category", "log_age"] {
            assert!(!f.contains(missing), "{missing} should be unresolved");
        }
        assert_eq!(num(&f, "artist_frequency"), 1.0);
        assert_eq!(num(&f, "title_word_count"), 3.0);
        assert_eq!(num(&f, "auction_year"), 2024.0);
    }

    #[test]
    fn test_extreme_years_saturate() {
        let market = StaticMarketReference::new();
        let ctx = DerivationContext::default();
        let ancient = ListingRecord {
            year: Some(i32::MIN),
            ..Default::default()
        };
        let f = derive_features(&ancient, None, &market, &ctx);
        assert_eq!(num(&f, "is_antique"), 1.0);
        assert_eq!(num(&f, "log_age"), f64::from(i32::MAX).ln_1p());
        assert_eq!(cat(&f, "year_category"), "pre_1900");

        let future = ListingRecord {
            year: Some(i32::MAX),
            ..Default::default()
        };
        let f = derive_features(&future, None, &market, &ctx);
        assert_eq!(num(&f, "is_modern"), 1.0);
        assert_eq!(num(&f, "is_antique"), 0.0);
        assert_eq!(num(&f, "log_age"), 0.0);
    }

    #[test]
    fn test_image_features_and_aspect_fallback() {
        let image = ImageFeatures {
            colorfulness: 42.0,
            svd_entropy: 3.2,
            aspect_ratio: 0.75,
            width: 300,
            height: 400,
        };
        let record = ListingRecord {
            colorfulness_score: Some(1.0),
            ..Default::default()
        };
        let f = derive_features(
            &record,
            Some(&image),
            &StaticMarketReference::new(),
            &DerivationContext::default(),
        );
        assert_eq!(num(&f, "colorfulness_score"), 42.0);
        assert_eq!(num(&f, "svd_entropy"), 3.2);
        assert_eq!(num(&f, "image_aspect_ratio"), 0.75);
        // No listing dimensions: the image's aspect ratio stands in.
        assert_eq!(num(&f, "aspect_ratio"), 0.75);
    }

    #[test]
    fn test_supplied_descriptors_without_image() {
        let record = ListingRecord {
            colorfulness_score: Some(12.5),
            svd_entropy: Some(f64::NAN),
            ..Default::default()
        };
        let f = derive_features(
            &record,
            None,
            &StaticMarketReference::new(),
            &DerivationContext::default(),
        );
        assert_eq!(num(&f, "colorfulness_score"), 12.5);
        assert!(!f.contains("svd_entropy"));
    }

    #[test]
    fn test_invalid_dimensions_are_missing() {
        let record = ListingRecord {
            width: Some(-3.0),
            height: Some(f64::INFINITY),
            ..Default::default()
        };
        let f = derive_features(
            &record,
            None,
            &StaticMarketReference::new(),
            &DerivationContext::default(),
        );
        assert!(!f.contains("width"));
        assert!(!f.contains("height"));
        assert!(!f.contains("aspect_ratio"));
    }

    #[test]
    fn test_title_words() {
        let market = StaticMarketReference::new();
        let ctx = DerivationContext::default();
        let mut record = ListingRecord {
            title: Some("  Femme au chapeau ".into()),
            title_word_count: Some(9),
            ..Default::default()
        };
        assert_eq!(num(&derive_features(&record, None, &market, &ctx), "title_word_count"), 3.0);
        record.title = Some("Untitled".into());
        assert_eq!(num(&derive_features(&record, None, &market, &ctx), "title_word_count"), 9.0);
    }

    #[test]
    fn test_listing_json_aliases() {
        let record: ListingRecord = serde_json::from_str(
            r#"{"object": "print", "artist": "Andy Warhol", "edition": "50/250", "year": 1967}"#,
        )
        .unwrap();
        assert_eq!(record.object_type.as_deref(), Some("print"));
        assert_eq!(record.edition_type.as_deref(), Some("50/250"));
        assert_eq!(record.year, Some(1967));
        assert!(record.width.is_none());
    }
}
