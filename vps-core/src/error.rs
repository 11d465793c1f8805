use thiserror::Error;

/// Failure of a [`FeatureExtractor`](crate::FeatureExtractor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FeatureError {
    /// The image has no pixels to detect features on.
    #[error("image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
}

/// Failure of a [`HomographyEstimator`](crate::HomographyEstimator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EstimateError {
    /// Not enough matches were supplied to attempt a fit.
    #[error("{found} matches are not enough to fit a homography (need at least {required})")]
    TooFewMatches { found: usize, required: usize },
    /// No candidate homography was supported by enough inliers.
    #[error("no homography reached consensus ({inliers} inliers, need at least {required})")]
    NoConsensus { inliers: usize, required: usize },
}
