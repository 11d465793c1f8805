use nalgebra::Point2;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// Allows the retrieval of the point on the image the feature came from.
pub trait ImagePoint {
    /// Retrieves the point on the image
    fn image_point(&self) -> Point2<f64>;
}

impl ImagePoint for Point2<f64> {
    fn image_point(&self) -> Point2<f64> {
        *self
    }
}

/// A point of interest on an image frame together with the attributes of the
/// local patch it summarizes.
///
/// The location is in pixel coordinates and is neither undistorted nor normalized.
/// Keypoints are produced by a [`FeatureExtractor`](crate::FeatureExtractor) and
/// are not modified afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct KeyPoint {
    /// Location of the keypoint in pixels.
    pub point: Point2<f64>,
    /// The radius defining the extent of the keypoint, in pixel units.
    pub size: f64,
    /// The orientation of the patch in radians.
    pub angle: f64,
    /// The magnitude of response from the detector.
    pub response: f64,
    /// The level of scale space in which the keypoint was detected.
    pub octave: usize,
}

impl KeyPoint {
    /// A keypoint at `(x, y)` with unit size, no orientation and no response.
    ///
    /// Handy for feeding hand-made points through the matching machinery.
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            point: Point2::new(x, y),
            size: 1.0,
            angle: 0.0,
            response: 0.0,
            octave: 0,
        }
    }
}

impl ImagePoint for KeyPoint {
    fn image_point(&self) -> Point2<f64> {
        self.point
    }
}
