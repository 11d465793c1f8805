//! # VPS
//!
//! Visual positioning support: matches a live camera frame against a geolocated street-level
//! reference image and estimates the homography between them.
//!
//! A [`MatchPipeline`] asks a [`ReferenceImageProvider`] for the reference image closest to a
//! [`QueryLocation`], extracts AKAZE features from both images, keeps the correspondences that
//! pass Lowe's ratio test and fits a [`Homography`] to them with ARRSAC. Every failure is
//! reported as a [`MatchError`] and no degenerate homography is ever returned.
//!
//! ```no_run
//! use vps::{Deadline, GeoPoint, MatchPipeline, MatchSettings, ProviderMetadata, QueryLocation, StaticProvider};
//! use std::time::Duration;
//!
//! let reference = vps::image::open("reference.jpg").unwrap();
//! let provider = StaticProvider::new(
//!     ProviderMetadata::available(GeoPoint::new(41.3935598, 2.19204), "pano").heading(90.0),
//!     Some(reference),
//! );
//! let mut pipeline = MatchPipeline::new(provider, MatchSettings::default()).unwrap();
//! let frame = vps::image::open("frame.jpg").unwrap();
//! let matched = pipeline
//!     .match_image(
//!         &frame,
//!         &QueryLocation::new(41.3935598, 2.19204),
//!         &Deadline::after(Duration::from_secs(5)),
//!     )
//!     .unwrap();
//! println!("{}", *matched.homography);
//! ```
//!
//! Diagnostics such as stage timings ([`TimingLogger`]) or a rendering of the accepted
//! correspondences ([`MatchCanvas`]) are attached per call as a [`MatchObserver`].

mod cancel;
mod error;
mod estimate;
mod observer;
mod pipeline;
mod provider;
mod settings;

pub use cancel::*;
pub use error::*;
pub use estimate::*;
pub use observer::*;
pub use pipeline::*;
pub use provider::*;
pub use settings::*;

pub use vps_core::{
    Correspondence, DescriptorMatcher, EstimateError, FeatureExtractor, Features, Homography,
    HomographyEstimator, HomographyFit, KeyPoint, PointMatch,
};
pub use four_point::FourPoint;
pub use vps_feature::{AkazeExtractor, RatioMatcher};
pub use {image, vps_core, vps_feature};
