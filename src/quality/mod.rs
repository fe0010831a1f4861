//! Image quality comparison (PSNR / SSIM)
//!
//! Both calculators are pure numeric functions over equal-sized RGBA
//! buffers: no I/O, no async, deterministic for a given input pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A top-down, row-major RGBA8 pixel buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QualityError {
    /// The two buffers disagree on width or height. Fatal to this single
    /// comparison call only; callers record the message and move on.
    #[error("images must have the same dimensions: {a_width}x{a_height} vs {b_width}x{b_height}")]
    DimensionMismatch {
        a_width: u32,
        a_height: u32,
        b_width: u32,
        b_height: u32,
    },

    /// Buffer length is not width * height * 4.
    #[error("pixel buffer length {len} does not match {width}x{height} RGBA")]
    InvalidBufferLength { width: u32, height: u32, len: usize },
}

impl PixelBuffer {
    /// Wrap raw RGBA bytes. Fails when the length does not match the
    /// stated dimensions.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self, QualityError> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(QualityError::InvalidBufferLength {
                width,
                height,
                len: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Uniform single-color buffer.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * 4);
        for _ in 0..pixels {
            data.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Outcome of one quality comparison. `psnr`/`ssim` and `error` are
/// mutually exclusive; `psnr == f64::INFINITY` means the RGB channels were
/// bit-identical and is a valid result, not a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageQualityMetrics {
    pub psnr: Option<f64>,
    pub ssim: Option<f64>,
    pub captured_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl ImageQualityMetrics {
    pub fn empty() -> Self {
        Self {
            psnr: None,
            ssim: None,
            captured_at: None,
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            psnr: None,
            ssim: None,
            captured_at: None,
            error: Some(message.into()),
        }
    }
}

fn check_dimensions(a: &PixelBuffer, b: &PixelBuffer) -> Result<(), QualityError> {
    if a.width != b.width || a.height != b.height {
        return Err(QualityError::DimensionMismatch {
            a_width: a.width,
            a_height: a.height,
            b_width: b.width,
            b_height: b.height,
        });
    }
    Ok(())
}

/// Peak Signal-to-Noise Ratio in dB between two equal-sized buffers.
///
/// MSE is accumulated over the R, G and B channels only; alpha is
/// ignored. Returns `f64::INFINITY` when the RGB data is bit-identical.
/// Values are deliberately not clamped at zero: pure black vs pure white
/// lands near 0 dB and pathological inputs may go below it.
pub fn calculate_psnr(a: &PixelBuffer, b: &PixelBuffer) -> Result<f64, QualityError> {
    check_dimensions(a, b)?;

    let mut mse = 0.0f64;
    for (pa, pb) in a.data.chunks_exact(4).zip(b.data.chunks_exact(4)) {
        let diff_r = pa[0] as f64 - pb[0] as f64;
        let diff_g = pa[1] as f64 - pb[1] as f64;
        let diff_b = pa[2] as f64 - pb[2] as f64;
        mse += diff_r * diff_r + diff_g * diff_g + diff_b * diff_b;
    }
    mse /= a.pixel_count() as f64 * 3.0;

    if mse == 0.0 {
        return Ok(f64::INFINITY);
    }

    let max_pixel_value = 255.0f64;
    Ok(10.0 * ((max_pixel_value * max_pixel_value) / mse).log10())
}

// Per-pixel luminance: 0.299 R + 0.587 G + 0.114 B.
fn to_grayscale(buffer: &PixelBuffer) -> Vec<f64> {
    buffer
        .data
        .chunks_exact(4)
        .map(|px| 0.299 * px[0] as f64 + 0.587 * px[1] as f64 + 0.114 * px[2] as f64)
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn variance(values: &[f64], mean_value: f64) -> f64 {
    values
        .iter()
        .map(|v| (v - mean_value).powi(2))
        .sum::<f64>()
        / values.len() as f64
}

fn covariance(a: &[f64], b: &[f64], mean_a: f64, mean_b: f64) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - mean_a) * (y - mean_b))
        .sum::<f64>()
        / a.len() as f64
}

/// Structural Similarity Index between two equal-sized buffers.
///
/// This is a whole-image, non-windowed SSIM: grayscale conversion, then a
/// single global mean/variance/covariance region with the standard
/// constants C1=(0.01*255)^2 and C2=(0.03*255)^2. Identical images yield
/// exactly 1.0. Note that this systematically overestimates similarity
/// versus the standard 11x11 Gaussian-windowed SSIM on structurally
/// shifted content; scores are not directly comparable with windowed
/// implementations in external image libraries.
pub fn calculate_ssim(a: &PixelBuffer, b: &PixelBuffer) -> Result<f64, QualityError> {
    check_dimensions(a, b)?;

    let l = 255.0f64;
    let c1 = (0.01 * l).powi(2);
    let c2 = (0.03 * l).powi(2);

    let gray_a = to_grayscale(a);
    let gray_b = to_grayscale(b);

    let mean_a = mean(&gray_a);
    let mean_b = mean(&gray_b);
    let var_a = variance(&gray_a, mean_a);
    let var_b = variance(&gray_b, mean_b);
    let cov_ab = covariance(&gray_a, &gray_b, mean_a, mean_b);

    let numerator = (2.0 * mean_a * mean_b + c1) * (2.0 * cov_ab + c2);
    let denominator = (mean_a * mean_a + mean_b * mean_b + c1) * (var_a + var_b + c2);

    Ok(numerator / denominator)
}

/// Run both comparators and fold the outcome into one record.
///
/// A comparator failure populates `error` and leaves both scores `None`;
/// success stamps `captured_at`. Never panics.
pub fn compare(a: &PixelBuffer, b: &PixelBuffer) -> ImageQualityMetrics {
    let psnr = match calculate_psnr(a, b) {
        Ok(value) => value,
        Err(err) => return ImageQualityMetrics::failed(err.to_string()),
    };
    let ssim = match calculate_ssim(a, b) {
        Ok(value) => value,
        Err(err) => return ImageQualityMetrics::failed(err.to_string()),
    };
    ImageQualityMetrics {
        psnr: Some(psnr),
        ssim: Some(ssim),
        captured_at: Some(Utc::now()),
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::{calculate_psnr, calculate_ssim, compare, PixelBuffer, QualityError};

    fn gradient(width: u32, height: u32) -> PixelBuffer {
        let mut data = Vec::new();
        for y in 0..height {
            for x in 0..width {
                let v = ((x * 13 + y * 31) % 256) as u8;
                data.extend_from_slice(&[v, v.wrapping_add(40), v.wrapping_mul(3), 255]);
            }
        }
        PixelBuffer::from_rgba(width, height, data).unwrap()
    }

    #[test]
    fn psnr_identical_rgb_is_infinite_regardless_of_alpha() {
        let a = PixelBuffer::solid(4, 4, [120, 60, 200, 255]);
        let b = PixelBuffer::solid(4, 4, [120, 60, 200, 0]);
        assert_eq!(calculate_psnr(&a, &b).unwrap(), f64::INFINITY);
    }

    #[test]
    fn psnr_is_symmetric() {
        let a = gradient(8, 6);
        let b = PixelBuffer::solid(8, 6, [10, 200, 90, 255]);
        let ab = calculate_psnr(&a, &b).unwrap();
        let ba = calculate_psnr(&b, &a).unwrap();
        assert_eq!(ab, ba);
    }

    #[test]
    fn psnr_black_vs_white_is_near_zero_db() {
        let black = PixelBuffer::solid(2, 2, [0, 0, 0, 255]);
        let white = PixelBuffer::solid(2, 2, [255, 255, 255, 255]);
        let psnr = calculate_psnr(&black, &white).unwrap();
        assert!(psnr.abs() < 0.1, "expected ~0 dB, got {psnr}");
    }

    #[test]
    fn psnr_known_value_for_uniform_offset() {
        // Every channel differs by 5: mse = 25, psnr = 10*log10(255^2/25).
        let a = PixelBuffer::solid(2, 2, [100, 100, 100, 255]);
        let b = PixelBuffer::solid(2, 2, [105, 105, 105, 255]);
        let psnr = calculate_psnr(&a, &b).unwrap();
        assert!((psnr - 34.15).abs() < 0.1, "expected ~34.15 dB, got {psnr}");
    }

    #[test]
    fn psnr_is_not_clamped_below_zero() {
        // Uniform max-difference buffer on all channels: mse = 255^2,
        // psnr exactly 0; no clamp applies on the way there.
        let a = PixelBuffer::solid(1, 1, [0, 0, 0, 255]);
        let b = PixelBuffer::solid(1, 1, [255, 255, 255, 255]);
        assert!((calculate_psnr(&a, &b).unwrap() - 0.0).abs() < 1e-9);
    }

    #[test]
    fn ssim_identity_is_one() {
        let a = gradient(16, 12);
        let ssim = calculate_ssim(&a, &a).unwrap();
        assert!((ssim - 1.0).abs() < 1e-5, "expected 1.0, got {ssim}");
    }

    #[test]
    fn ssim_penalizes_differing_images() {
        let a = PixelBuffer::solid(8, 8, [30, 30, 30, 255]);
        let b = gradient(8, 8);
        let ssim = calculate_ssim(&a, &b).unwrap();
        assert!(ssim < 1.0);
    }

    #[test]
    fn dimension_mismatch_fails_both_calculators() {
        let a = PixelBuffer::solid(4, 4, [0, 0, 0, 255]);
        let wider = PixelBuffer::solid(5, 4, [0, 0, 0, 255]);
        let taller = PixelBuffer::solid(4, 5, [0, 0, 0, 255]);

        for other in [&wider, &taller] {
            assert!(matches!(
                calculate_psnr(&a, other),
                Err(QualityError::DimensionMismatch { .. })
            ));
            assert!(matches!(
                calculate_ssim(&a, other),
                Err(QualityError::DimensionMismatch { .. })
            ));
        }
    }

    #[test]
    fn buffer_length_is_validated() {
        assert!(matches!(
            PixelBuffer::from_rgba(2, 2, vec![0; 15]),
            Err(QualityError::InvalidBufferLength { .. })
        ));
        assert!(PixelBuffer::from_rgba(2, 2, vec![0; 16]).is_ok());
    }

    #[test]
    fn compare_records_error_instead_of_panicking() {
        let a = PixelBuffer::solid(2, 2, [0, 0, 0, 255]);
        let b = PixelBuffer::solid(3, 2, [0, 0, 0, 255]);
        let metrics = compare(&a, &b);
        assert!(metrics.psnr.is_none());
        assert!(metrics.ssim.is_none());
        assert!(metrics.captured_at.is_none());
        assert!(metrics.error.as_deref().unwrap().contains("dimensions"));
    }

    #[test]
    fn compare_stamps_capture_time_on_success() {
        let a = gradient(4, 4);
        let metrics = compare(&a, &a);
        assert_eq!(metrics.psnr, Some(f64::INFINITY));
        assert!(metrics.ssim.unwrap() > 0.999);
        assert!(metrics.captured_at.is_some());
        assert!(metrics.error.is_none());
    }
}
