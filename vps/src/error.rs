use crate::GeoPoint;
use core::fmt;
use thiserror::Error;
use vps_core::{EstimateError, FeatureError};

/// Failure reported by a [`ReferenceImageProvider`](crate::ReferenceImageProvider) while
/// looking up metadata.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("the request did not complete before the deadline")]
    Timeout,
    #[error("malformed metadata: {0}")]
    Decode(String),
}

/// Why a reference image could not be obtained.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("metadata request failed: {0}")]
    Metadata(#[from] ProviderError),
    #[error("the provider returned no image for reference {reference_id:?}")]
    Missing { reference_id: String },
    #[error("reference image {reference_id:?} has no pixels ({width}x{height})")]
    Empty {
        reference_id: String,
        width: u32,
        height: u32,
    },
    #[error("the deadline expired while acquiring the reference image")]
    Deadline,
}

/// The pipeline stage that was running when a match was cancelled.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Stage {
    Acquire,
    Detect,
    Match,
    Estimate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Acquire => "acquire",
            Self::Detect => "detect",
            Self::Match => "match",
            Self::Estimate => "estimate",
        })
    }
}

/// The terminal reason of a failed match, without its details.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FailureReason {
    NoReferenceImage,
    ImageFetchError,
    InsufficientCorrespondences,
    NoHomographyConsensus,
    InvalidImage,
    /// Outside [`FailureReason::OUTCOMES`], see [`MatchError::Cancelled`].
    Cancelled,
}

impl FailureReason {
    /// The reasons a match without a cancelled or expired deadline can fail for.
    pub const OUTCOMES: [Self; 5] = [
        Self::NoReferenceImage,
        Self::ImageFetchError,
        Self::InsufficientCorrespondences,
        Self::NoHomographyConsensus,
        Self::InvalidImage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoReferenceImage => "NoReferenceImage",
            Self::ImageFetchError => "ImageFetchError",
            Self::InsufficientCorrespondences => "InsufficientCorrespondences",
            Self::NoHomographyConsensus => "NoHomographyConsensus",
            Self::InvalidImage => "InvalidImage",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed match. No homography is produced in any of these cases.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatchError {
    /// The provider has no reference imagery near the query location.
    #[error("no reference image is available near {location}")]
    NoReferenceImage { location: GeoPoint },
    /// The reference image could not be fetched. Retrying later may succeed.
    #[error("reference image could not be fetched: {0}")]
    ImageFetch(#[from] FetchError),
    /// Fewer correspondences than needed to attempt a homography.
    #[error("{found} correspondences are not enough to estimate a homography (need {required})")]
    InsufficientCorrespondences { found: usize, required: usize },
    /// No homography was supported by enough correspondences.
    #[error("no homography reached consensus ({inliers} inliers, need {required})")]
    NoHomographyConsensus { inliers: usize, required: usize },
    /// An input image cannot be matched.
    #[error("invalid image: {0}")]
    InvalidImage(#[from] FeatureError),
    /// The caller cancelled the match or its deadline expired after the reference was acquired.
    ///
    /// This is not one of the five [`FailureReason::OUTCOMES`] a match can end in on its own
    /// inputs. It only occurs when a [`Deadline`](crate::Deadline) is cancelled or expires,
    /// and code that matches exhaustively on [`FailureReason`] has to expect it as well.
    #[error("cancelled during the {stage} stage")]
    Cancelled { stage: Stage },
}

impl MatchError {
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::NoReferenceImage { .. } => FailureReason::NoReferenceImage,
            Self::ImageFetch(_) => FailureReason::ImageFetchError,
            Self::InsufficientCorrespondences { .. } => FailureReason::InsufficientCorrespondences,
            Self::NoHomographyConsensus { .. } => FailureReason::NoHomographyConsensus,
            Self::InvalidImage(_) => FailureReason::InvalidImage,
            Self::Cancelled { .. } => FailureReason::Cancelled,
        }
    }

    /// Only transient fetch failures are worth retrying; every other failure is definitive
    /// for the given inputs.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ImageFetch(_))
    }
}

impl From<EstimateError> for MatchError {
    fn from(e: EstimateError) -> Self {
        match e {
            EstimateError::TooFewMatches { found, required } => {
                Self::InsufficientCorrespondences { found, required }
            }
            EstimateError::NoConsensus { inliers, required } => {
                Self::NoHomographyConsensus { inliers, required }
            }
        }
    }
}

/// A [`MatchSettings`](crate::MatchSettings) value that cannot be used.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SettingsError {
    #[error("ratio must be in (0, 1], got {0}")]
    Ratio(f64),
    #[error("reprojection threshold must be positive, got {0}")]
    ReprojectionThreshold(f64),
    #[error("canonical size must not be empty, got {width}x{height}")]
    CanonicalSize { width: u32, height: u32 },
    #[error("at least 4 correspondences are needed for a homography, got {0}")]
    MinCorrespondences(usize),
    #[error("a homography needs the support of at least 4 inliers, got {0}")]
    MinInliers(usize),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn only_fetch_failures_are_retryable() {
        let fetch = MatchError::from(FetchError::Metadata(ProviderError::Timeout));
        assert!(fetch.is_retryable());
        assert_eq!(fetch.reason(), FailureReason::ImageFetchError);

        let definitive = [
            MatchError::NoReferenceImage {
                location: GeoPoint::new(41.39, 2.19),
            },
            MatchError::InsufficientCorrespondences {
                found: 2,
                required: 4,
            },
            MatchError::NoHomographyConsensus {
                inliers: 3,
                required: 4,
            },
            MatchError::InvalidImage(FeatureError::EmptyImage {
                width: 0,
                height: 10,
            }),
            MatchError::Cancelled {
                stage: Stage::Detect,
            },
        ];
        for e in &definitive {
            assert!(!e.is_retryable(), "{}", e);
        }
    }

    #[test]
    fn cancellation_is_not_a_matching_outcome() {
        let cancelled = MatchError::Cancelled {
            stage: Stage::Estimate,
        };
        assert_eq!(cancelled.reason(), FailureReason::Cancelled);
        assert!(!FailureReason::OUTCOMES.contains(&cancelled.reason()));
        assert_eq!(cancelled.to_string(), "cancelled during the estimate stage");

        let mut names: Vec<&str> = FailureReason::OUTCOMES.iter().map(|r| r.as_str()).collect();
        names.push(FailureReason::Cancelled.as_str());
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 6);
    }

    #[test]
    fn estimate_errors_map_to_reasons() {
        let e = MatchError::from(EstimateError::TooFewMatches {
            found: 3,
            required: 4,
        });
        assert_eq!(e.reason(), FailureReason::InsufficientCorrespondences);
        let e = MatchError::from(EstimateError::NoConsensus {
            inliers: 0,
            required: 4,
        });
        assert_eq!(e.reason(), FailureReason::NoHomographyConsensus);
    }

    #[test]
    fn messages_are_readable() {
        let e = MatchError::InsufficientCorrespondences {
            found: 2,
            required: 4,
        };
        assert_eq!(
            e.to_string(),
            "2 correspondences are not enough to estimate a homography (need 4)"
        );
        assert_eq!(
            MatchError::from(FetchError::Deadline).to_string(),
            "reference image could not be fetched: the deadline expired while acquiring the reference image"
        );
    }
}
