//! Image-derived features: colorfulness, SVD entropy and aspect ratio.
//!
//! Everything here is a pure function of the image bytes. Nothing is cached
//! or shared, so analysis can run on any number of requests at once.

use crate::config::ImageConfig;
use crate::error::MlError;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

/// Singular values below this share of the spectrum are dropped before the entropy sum.
const SPECTRUM_FLOOR: f64 = 1e-10;

const JACOBI_TOLERANCE: f64 = 1e-12;
const JACOBI_MAX_SWEEPS: usize = 60;

/// Numeric descriptors extracted from an uploaded image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageFeatures {
    #[serde(rename = "colorfulness_score")]
    pub colorfulness: f64,
    pub svd_entropy: f64,
    pub aspect_ratio: f64,
    pub width: u32,
    pub height: u32,
}

/// Decode `bytes` and compute all image features.
pub fn analyze_image(bytes: &[u8], config: &ImageConfig) -> Result<ImageFeatures, MlError> {
    if bytes.is_empty() {
        return Err(MlError::invalid_image("empty image payload"));
    }
    if bytes.len() > config.max_image_bytes {
        return Err(MlError::invalid_image(format!(
            "image is {} bytes, limit is {}",
            bytes.len(),
            config.max_image_bytes
        )));
    }

    let decoded = image::load_from_memory(bytes)
        .map_err(|e| MlError::invalid_image(format!("cannot decode image: {e}")))?;
    analyze_decoded(&decoded, config)
}

/// Compute features for an already decoded image.
pub fn analyze_decoded(
    decoded: &DynamicImage,
    config: &ImageConfig,
) -> Result<ImageFeatures, MlError> {
    let (width, height) = decoded.dimensions();
    let aspect_ratio = aspect_ratio(width, height)?;

    let colorfulness = colorfulness(&decoded.to_rgb8());
    let svd_entropy = svd_entropy(&decoded.to_luma8(), config.svd_resize);

    tracing::debug!(
        width,
        height,
        colorfulness,
        svd_entropy,
        "Analyzed image"
    );

    Ok(ImageFeatures {
        colorfulness,
        svd_entropy,
        aspect_ratio,
        width,
        height,
    })
}

/// Width over height; degenerate dimensions are an invalid image.
pub fn aspect_ratio(width: u32, height: u32) -> Result<f64, MlError> {
    if width == 0 || height == 0 {
        return Err(MlError::invalid_image(format!(
            "degenerate image dimensions {width}x{height}"
        )));
    }
    Ok(f64::from(width) / f64::from(height))
}

/// Opponent-channel colorfulness over every pixel.
///
/// `sqrt(std(rg)^2 + std(yb)^2) + 0.3 * sqrt(mean(rg)^2 + mean(yb)^2)` with
/// `rg = R - G` and `yb = 0.5 * (R + G) - B`; population standard deviation.
pub fn colorfulness(rgb: &RgbImage) -> f64 {
    let n = f64::from(rgb.width()) * f64::from(rgb.height());
    if n == 0.0 {
        return 0.0;
    }

    let opponent = |px: &image::Rgb<u8>| {
        let r = f64::from(px[0]);
        let g = f64::from(px[1]);
        let b = f64::from(px[2]);
        (r - g, 0.5 * (r + g) - b)
    };

    let (mut sum_rg, mut sum_yb) = (0.0, 0.0);
    for px in rgb.pixels() {
        let (rg, yb) = opponent(px);
        sum_rg += rg;
        sum_yb += yb;
    }
    let mean_rg = sum_rg / n;
    let mean_yb = sum_yb / n;

    let (mut var_rg, mut var_yb) = (0.0, 0.0);
    for px in rgb.pixels() {
        let (rg, yb) = opponent(px);
        var_rg += (rg - mean_rg).powi(2);
        var_yb += (yb - mean_yb).powi(2);
    }
    var_rg /= n;
    var_yb /= n;

    // std^2 is the variance, so no square root before the sum.
    (var_rg + var_yb).sqrt() + 0.3 * (mean_rg.powi(2) + mean_yb.powi(2)).sqrt()
}

/// Shannon entropy (bits) of the normalized singular-value spectrum.
///
/// The grid is resized to `resize x resize` first when `resize > 0`. An
/// all-zero grid has no spectrum and yields 0.
pub fn svd_entropy(gray: &GrayImage, resize: u32) -> f64 {
    let grid = if resize > 0 && (gray.width() != resize || gray.height() != resize) {
        image::imageops::resize(gray, resize, resize, FilterType::Triangle)
    } else {
        gray.clone()
    };

    let rows = grid.height() as usize;
    let cols = grid.width() as usize;
    if rows == 0 || cols == 0 {
        return 0.0;
    }

    let values: Vec<f64> = grid.pixels().map(|p| f64::from(p[0])).collect();
    let spectrum = singular_values(&values, rows, cols);
    spectrum_entropy(&spectrum)
}

/// Entropy of a non-negative spectrum after normalising it to sum to one.
///
/// Results below `1e-10` bits are reported as 0.
pub fn spectrum_entropy(spectrum: &[f64]) -> f64 {
    let total: f64 = spectrum.iter().sum();
    if !total.is_finite() || total <= 0.0 {
        return 0.0;
    }

    let entropy: f64 = spectrum
        .iter()
        .map(|s| s / total)
        .filter(|p| *p > SPECTRUM_FLOOR)
        .map(|p| -p * p.log2())
        .sum();

    // Rounding residue from a rank-one spectrum reads as exactly zero.
    if entropy.is_finite() && entropy > SPECTRUM_FLOOR {
        entropy
    } else {
        0.0
    }
}

/// Singular values of a row-major `rows x cols` matrix, largest first.
///
/// One-sided Jacobi: columns are rotated pairwise until mutually orthogonal;
/// the column norms are then the singular values. The matrix is transposed
/// first when it is wider than tall so fewer columns need rotating.
pub fn singular_values(values: &[f64], rows: usize, cols: usize) -> Vec<f64> {
    debug_assert_eq!(values.len(), rows * cols);

    // Column-major working copy, transposed when wide.
    let (n_vec, vec_len) = if cols <= rows { (cols, rows) } else { (rows, cols) };
    let mut columns: Vec<Vec<f64>> = (0..n_vec)
        .map(|j| {
            (0..vec_len)
                .map(|i| {
                    if cols <= rows {
                        values[i * cols + j]
                    } else {
                        values[j * cols + i]
                    }
                })
                .collect()
        })
        .collect();

    for _ in 0..JACOBI_MAX_SWEEPS {
        let mut rotated = false;
        for p in 0..n_vec {
            for q in (p + 1)..n_vec {
                let (alpha, beta, gamma) = {
                    let (cp, cq) = (&columns[p], &columns[q]);
                    let mut alpha = 0.0;
                    let mut beta = 0.0;
                    let mut gamma = 0.0;
                    for (a, b) in cp.iter().zip(cq) {
                        alpha += a * a;
                        beta += b * b;
                        gamma += a * b;
                    }
                    (alpha, beta, gamma)
                };
                if gamma == 0.0 || gamma.abs() <= JACOBI_TOLERANCE * (alpha * beta).sqrt() {
                    continue;
                }
                rotated = true;

                let zeta = (beta - alpha) / (2.0 * gamma);
                let t = zeta.signum() / (zeta.abs() + (1.0 + zeta * zeta).sqrt());
                let c = 1.0 / (1.0 + t * t).sqrt();
                let s = c * t;

                let (left, right) = columns.split_at_mut(q);
                for (a, b) in left[p].iter_mut().zip(right[0].iter_mut()) {
                    let (ap, aq) = (*a, *b);
                    *a = c * ap - s * aq;
                    *b = s * ap + c * aq;
                }
            }
        }
        if !rotated {
            break;
        }
    }

    let mut singular: Vec<f64> = columns
        .iter()
        .map(|c| c.iter().map(|v| v * v).sum::<f64>().sqrt())
        .collect();
    singular.sort_by(|a, b| b.total_cmp(a));
    singular
}

/// Coarse quality label shown next to image features.
pub fn image_quality(features: &ImageFeatures) -> &'static str {
    if features.colorfulness > 10.0 && features.svd_entropy > 2.0 {
        "Good"
    } else {
        "Fair"
    }
}
