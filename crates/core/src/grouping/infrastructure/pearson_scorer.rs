use image::imageops::{self, FilterType};

use crate::grouping::domain::similarity_scorer::{SimilarityScorer, SCORE_NOT_SIMILAR};
use crate::shared::frame::Frame;

/// Pearson correlation over flattened pixel data.
///
/// The second image is stretch-resized (aspect ratio ignored) to the first
/// image's dimensions, then both are flattened channel-interleaved and
/// correlated. Flat images carry no correlatable signal, so any operand
/// with zero pixel variance scores [`SCORE_NOT_SIMILAR`].
#[derive(Default)]
pub struct PearsonScorer;

impl PearsonScorer {
    pub fn new() -> Self {
        Self
    }
}

impl SimilarityScorer for PearsonScorer {
    fn score(&self, a: &Frame, b: &Frame) -> f64 {
        let b_data;
        let b_pixels: &[u8] = if a.width() == b.width() && a.height() == b.height() {
            b.data()
        } else {
            let Some(b_img) = b.to_rgb_image() else {
                return SCORE_NOT_SIMILAR;
            };
            let resized = imageops::resize(&b_img, a.width(), a.height(), FilterType::Nearest);
            b_data = resized.into_raw();
            &b_data
        };

        pearson_correlation(a.data(), b_pixels)
    }
}

/// Pearson correlation coefficient of two equal-length byte sequences.
fn pearson_correlation(a: &[u8], b: &[u8]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return SCORE_NOT_SIMILAR;
    }

    let n = a.len() as f64;
    let mean_a = a.iter().map(|&v| v as f64).sum::<f64>() / n;
    let mean_b = b.iter().map(|&v| v as f64).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (&va, &vb) in a.iter().zip(b.iter()) {
        let da = va as f64 - mean_a;
        let db = vb as f64 - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }

    // A constant image has no variance to correlate against, even with
    // itself.
    if var_a < f64::EPSILON || var_b < f64::EPSILON {
        return SCORE_NOT_SIMILAR;
    }

    cov / (var_a.sqrt() * var_b.sqrt())
}
