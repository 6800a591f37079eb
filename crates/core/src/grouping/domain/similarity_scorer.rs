use crate::shared::frame::Frame;

/// Score returned when similarity cannot be judged (degenerate input).
/// It sits below every usable threshold in (0, 1], so undecidable pairs
/// never cluster together.
pub const SCORE_NOT_SIMILAR: f64 = 0.0;

/// Domain interface for pairwise image similarity.
///
/// Scores are in [-1.0, 1.0]; higher means more alike. Implementations
/// must be symmetric in their arguments up to resampling error.
pub trait SimilarityScorer: Send + Sync {
    fn score(&self, a: &Frame, b: &Frame) -> f64;
}
