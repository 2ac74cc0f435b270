//! Shared fixtures for artifex-ml integration tests.

#![allow(dead_code)]

use artifex_ml::ListingRecord;
use artifex_ml::config::{ArtifactConfig, MlConfig};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};

pub const ARTIFACT_FILES: [&str; 4] = [
    "feature_info.json",
    "art_price_model.json",
    "preprocessor.json",
    "market_reference.json",
];

/// The sample artifact set checked in at the workspace root.
pub fn sample_artifacts() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../artifacts")
}

/// Copy the sample artifacts into `dir` so a test can tamper with them.
pub fn copy_artifacts(dir: &Path) -> ArtifactConfig {
    for file in ARTIFACT_FILES {
        std::fs::copy(sample_artifacts().join(file), dir.join(file)).unwrap();
    }
    ArtifactConfig {
        dir: dir.to_path_buf(),
        ..ArtifactConfig::default()
    }
}

pub fn ml_config(dir: &Path) -> MlConfig {
    let mut config = MlConfig::default();
    config.artifacts = copy_artifacts(dir);
    config.market.reference_path = Some(dir.join("market_reference.json"));
    config
}

pub fn picasso_lithograph() -> ListingRecord {
    ListingRecord {
        artist: Some("Pablo Picasso".into()),
        technique: Some("lithograph".into()),
        width: Some(50.0),
        height: Some(70.0),
        year: Some(1965),
        condition: Some("good".into()),
        signature: Some("signed".into()),
        ..Default::default()
    }
}

/// A colourful gradient, JPEG encoded.
pub fn jpeg_bytes() -> Vec<u8> {
    let img = RgbImage::from_fn(64, 48, |x, y| Rgb([(x * 4) as u8, (y * 5) as u8, 128]));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageFormat::Jpeg)
        .unwrap();
    buf.into_inner()
}
