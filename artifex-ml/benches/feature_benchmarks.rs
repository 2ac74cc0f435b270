use artifex_ml::config::ImageConfig;
use artifex_ml::features::{DerivationContext, StaticMarketReference, derive_features};
use artifex_ml::image::analyze_image;
use artifex_ml::{FeatureBuilder, FeatureSchema, ListingRecord};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::Path;

fn listing() -> ListingRecord {
    ListingRecord {
        artist: Some("Pablo Picasso".into()),
        technique: Some("Etching and aquatint".into()),
        signature: Some("Hand signed in pencil".into()),
        edition_type: Some("Limited edition 12/50".into()),
        width: Some(50.0),
        height: Some(70.0),
        year: Some(1965),
        title: Some("La femme qui pleure".into()),
        ..Default::default()
    }
}

fn bench_features(c: &mut Criterion) {
    let schema_path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../artifacts/feature_info.json");
    let schema = FeatureSchema::load(&schema_path).unwrap();
    let builder = FeatureBuilder::new(&schema).unwrap();
    let market = StaticMarketReference::new();
    let record = listing();

    c.bench_function("derive_features", |b| {
        let ctx = DerivationContext::default();
        b.iter(|| derive_features(black_box(&record), None, &market, &ctx))
    });

    c.bench_function("build_feature_vector", |b| {
        b.iter(|| builder.build(black_box(&record), None, &market))
    });
}

fn bench_image(c: &mut Criterion) {
    let config = ImageConfig::default();
    let img = RgbImage::from_fn(640, 480, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageFormat::Jpeg)
        .unwrap();
    let jpeg = buf.into_inner();

    c.bench_function("analyze_image_640x480_jpeg", |b| {
        b.iter(|| analyze_image(black_box(&jpeg), &config))
    });
}

criterion_group!(benches, bench_features, bench_image);
criterion_main!(benches);
