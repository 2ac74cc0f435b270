//! Property-based tests for the feature contract and image features.

mod common;

use artifex_ml::config::ImageConfig;
use artifex_ml::features::StaticMarketReference;
use artifex_ml::image::analyze_image;
use artifex_ml::{FeatureBuilder, FeatureSchema, ListingRecord, TargetTransform};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use proptest::prelude::*;
use std::io::Cursor;

fn sample_builder() -> FeatureBuilder {
    let schema = FeatureSchema::load(&common::sample_artifacts().join("feature_info.json")).unwrap();
    FeatureBuilder::new(&schema).unwrap()
}

fn text() -> impl Strategy<Value = Option<String>> {
    prop::option::of("[ A-Za-z0-9/]{0,24}")
}

prop_compose! {
    fn listing()(
        artist in text(),
        technique in text(),
        signature in text(),
        condition in text(),
        edition_type in text(),
        title in text(),
        width in prop::option::of(-10.0f64..500.0),
        height in prop::option::of(-10.0f64..500.0),
        year in prop::option::of(1400i32..2030),
        has_frame in prop::option::of(any::<bool>()),
        has_damage in prop::option::of(any::<bool>()),
    ) -> ListingRecord {
        ListingRecord {
            artist, technique, signature, condition, edition_type, title,
            width, height, year, has_frame, has_damage,
            ..Default::default()
        }
    }
}

proptest! {
    #[test]
    fn builder_length_matches_schema(record in listing()) {
        let builder = sample_builder();
        let vector = builder.build(&record, None, &StaticMarketReference::new()).unwrap();
        prop_assert_eq!(vector.len(), builder.n_features());
        prop_assert_eq!(vector.names(), &builder.feature_names()[..]);
    }

    #[test]
    fn builder_is_deterministic(record in listing()) {
        let builder = sample_builder();
        let market = StaticMarketReference::new();
        let a = builder.build(&record, None, &market).unwrap();
        let b = builder.build(&record, None, &market).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn log1p_round_trip(price in 0.0f64..1e8) {
        let t = TargetTransform::Log1p;
        let back = t.inverse(t.forward(price));
        prop_assert!((back - price).abs() <= 1e-9 * price.max(1.0));
    }

    #[test]
    fn image_features_are_bit_identical(
        w in 1u32..40,
        h in 1u32..40,
        seed in any::<u8>(),
    ) {
        let img = RgbImage::from_fn(w, h, |x, y| {
            Rgb([seed.wrapping_add(x as u8), seed.wrapping_mul(y as u8), (x ^ y) as u8])
        });
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img).write_to(&mut buf, ImageFormat::Png).unwrap();
        let bytes = buf.into_inner();

        let config = ImageConfig::default();
        let a = analyze_image(&bytes, &config).unwrap();
        let b = analyze_image(&bytes, &config).unwrap();
        prop_assert_eq!(a.colorfulness.to_bits(), b.colorfulness.to_bits());
        prop_assert_eq!(a.svd_entropy.to_bits(), b.svd_entropy.to_bits());
        prop_assert!(a.colorfulness >= 0.0 && a.colorfulness.is_finite());
        prop_assert!(a.svd_entropy >= 0.0 && a.svd_entropy.is_finite());
    }

    #[test]
    fn uniform_image_has_zero_entropy(r in any::<u8>(), g in any::<u8>(), b in any::<u8>()) {
        let img = RgbImage::from_pixel(17, 9, Rgb([r, g, b]));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img).write_to(&mut buf, ImageFormat::Png).unwrap();
        let features = analyze_image(&buf.into_inner(), &ImageConfig::default()).unwrap();
        prop_assert_eq!(features.svd_entropy, 0.0);
    }
}

#[test]
fn test_all_absent_record_fills_every_position() {
    let builder = sample_builder();
    let vector = builder
        .build(&ListingRecord::default(), None, &StaticMarketReference::new())
        .unwrap();
    assert_eq!(vector.len(), 57);
    assert_eq!(
        vector.value_of("size_category").and_then(|v| v.as_str()),
        Some("unknown")
    );
    assert_eq!(
        vector.value_of("title_word_count").and_then(|v| v.as_f64()),
        Some(3.0)
    );
}
