use crate::SettingsError;
use vps_core::MIN_HOMOGRAPHY_MATCHES;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// The settings for the matching pipeline.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MatchSettings {
    /// Lowe's ratio: a match is accepted when its distance is below this fraction of the
    /// second best distance
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_ratio"))]
    pub ratio: f64,
    /// The reprojection error in pixels below which a match supports a homography
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_reprojection_threshold")
    )]
    pub reprojection_threshold: f64,
    /// The width query images are resized to before matching
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_canonical_width")
    )]
    pub canonical_width: u32,
    /// The height query images are resized to before matching
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_canonical_height")
    )]
    pub canonical_height: u32,
    /// The number of accepted correspondences needed to attempt estimation
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_min_correspondences")
    )]
    pub min_correspondences: usize,
    /// The number of inliers a homography needs to be reported
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_min_inliers"))]
    pub min_inliers: usize,
    /// Refit the consensus homography over all of its inliers
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_refine"))]
    pub refine: bool,
    /// Only keep correspondences that are mutual nearest neighbours
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_symmetric_matching")
    )]
    pub symmetric_matching: bool,
    /// Detect features on the query and reference images at the same time
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_parallel_detection")
    )]
    pub parallel_detection: bool,
    /// The threshold used for akaze
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_akaze_threshold")
    )]
    pub akaze_threshold: f64,
    /// The seed of the sample consensus random number generator
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_consensus_seed")
    )]
    pub consensus_seed: u64,
}

impl MatchSettings {
    /// Checks that every value is usable.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(self.ratio > 0.0 && self.ratio <= 1.0) {
            return Err(SettingsError::Ratio(self.ratio));
        }
        if !(self.reprojection_threshold > 0.0) {
            return Err(SettingsError::ReprojectionThreshold(
                self.reprojection_threshold,
            ));
        }
        if self.canonical_width == 0 || self.canonical_height == 0 {
            return Err(SettingsError::CanonicalSize {
                width: self.canonical_width,
                height: self.canonical_height,
            });
        }
        if self.min_correspondences < MIN_HOMOGRAPHY_MATCHES {
            return Err(SettingsError::MinCorrespondences(self.min_correspondences));
        }
        if self.min_inliers < MIN_HOMOGRAPHY_MATCHES {
            return Err(SettingsError::MinInliers(self.min_inliers));
        }
        Ok(())
    }

    pub fn canonical_size(&self) -> (u32, u32) {
        (self.canonical_width, self.canonical_height)
    }
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            ratio: default_ratio(),
            reprojection_threshold: default_reprojection_threshold(),
            canonical_width: default_canonical_width(),
            canonical_height: default_canonical_height(),
            min_correspondences: default_min_correspondences(),
            min_inliers: default_min_inliers(),
            refine: default_refine(),
            symmetric_matching: default_symmetric_matching(),
            parallel_detection: default_parallel_detection(),
            akaze_threshold: default_akaze_threshold(),
            consensus_seed: default_consensus_seed(),
        }
    }
}

fn default_ratio() -> f64 {
    0.75
}

fn default_reprojection_threshold() -> f64 {
    5.0
}

fn default_canonical_width() -> u32 {
    640
}

fn default_canonical_height() -> u32 {
    480
}

fn default_min_correspondences() -> usize {
    MIN_HOMOGRAPHY_MATCHES
}

fn default_min_inliers() -> usize {
    MIN_HOMOGRAPHY_MATCHES
}

fn default_refine() -> bool {
    true
}

fn default_symmetric_matching() -> bool {
    false
}

fn default_parallel_detection() -> bool {
    true
}

fn default_akaze_threshold() -> f64 {
    0.001
}

fn default_consensus_seed() -> u64 {
    0
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = MatchSettings::default();
        assert_eq!(settings.validate(), Ok(()));
        assert_eq!(settings.canonical_size(), (640, 480));
        assert_eq!(settings.ratio, 0.75);
        assert_eq!(settings.reprojection_threshold, 5.0);
        assert_eq!(settings.min_correspondences, 4);
    }

    #[test]
    fn invalid_values() {
        let base = MatchSettings::default();
        let cases = [
            (
                MatchSettings { ratio: 0.0, ..base },
                SettingsError::Ratio(0.0),
            ),
            (
                MatchSettings { ratio: 1.5, ..base },
                SettingsError::Ratio(1.5),
            ),
            (
                MatchSettings {
                    reprojection_threshold: -1.0,
                    ..base
                },
                SettingsError::ReprojectionThreshold(-1.0),
            ),
            (
                MatchSettings {
                    canonical_height: 0,
                    ..base
                },
                SettingsError::CanonicalSize {
                    width: 640,
                    height: 0,
                },
            ),
            (
                MatchSettings {
                    min_correspondences: 3,
                    ..base
                },
                SettingsError::MinCorrespondences(3),
            ),
            (
                MatchSettings {
                    min_inliers: 0,
                    ..base
                },
                SettingsError::MinInliers(0),
            ),
        ];
        for (settings, error) in cases {
            assert_eq!(settings.validate(), Err(error));
        }
        assert!(MatchSettings { ratio: 1.0, ..base }.validate().is_ok());
        assert!(MatchSettings {
            ratio: f64::NAN,
            ..base
        }
        .validate()
        .is_err());
    }

    #[cfg(feature = "serde-serialize")]
    #[test]
    fn partial_documents_use_defaults() {
        let settings: MatchSettings =
            serde_json::from_str(r#"{ "ratio": 0.6, "refine": false }"#).unwrap();
        assert_eq!(
            settings,
            MatchSettings {
                ratio: 0.6,
                refine: false,
                ..MatchSettings::default()
            }
        );
    }
}
