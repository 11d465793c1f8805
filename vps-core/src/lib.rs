//! # VPS Core
//!
//! Common types and abstractions shared by the crates that match a live camera frame against a
//! geolocated reference image. Everything that more than one crate needs to agree on lives here:
//! keypoints, feature sets, correspondences, the [`Homography`] model and the three strategy
//! traits that the matching pipeline is generic over.
//!
//! ## Strategies
//!
//! The pipeline is split into three interchangeable stages:
//!
//! * [`FeatureExtractor`] - turns one image into [`Features`] (keypoints plus index-aligned descriptors)
//! * [`DescriptorMatcher`] - turns two descriptor sets into accepted [`Correspondence`]s
//! * [`HomographyEstimator`] - fits a [`Homography`] to [`PointMatch`]es while tolerating outliers
//!
//! A descriptor type is only comparable with descriptors produced by the same extractor
//! configuration, which is why the descriptor is an associated type of the extractor and a
//! type parameter of the matcher.
//!
//! ## Coordinates
//!
//! All image points are in pixel coordinates with +x pointing right and +y pointing down,
//! starting from the top left corner of the image. A homography maps homogeneous points of
//! image A (the query) onto image B (the reference):
//!
//! ```text
//!   [x_b]       [x_a]
//!   [y_b] ~ H * [y_a]
//!   [ 1 ]       [ 1 ]
//! ```

mod error;
mod feature;
mod homography;
mod keypoint;
mod matches;

pub use error::*;
pub use feature::*;
pub use homography::*;
pub use keypoint::*;
pub use matches::*;
pub use nalgebra;
pub use sample_consensus;
