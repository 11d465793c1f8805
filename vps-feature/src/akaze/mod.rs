//! AKAZE keypoints, detected in a nonlinear diffusion scale space and described with the
//! binary M-LDB descriptor.

mod descriptor;
mod detector;
mod image;
mod scale_space;

use self::image::FloatImage;
use crate::Descriptor;
use ::image::GrayImage;
use log::*;
use vps_core::{nalgebra::Point2, KeyPoint};

/// No scale space is built for images whose smaller side is below this many pixels.
pub const MIN_EXTENT: u32 = 40;

/// Parameters of the AKAZE detector and descriptor.
///
/// The one that matters most is `detector_threshold`. [`Akaze::new`] sets it and leaves
/// everything else at its default; [`Akaze::sparse`] and [`Akaze::dense`] are shorthands.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Akaze {
    /// Sublevels per octave.
    pub num_sublevels: u32,
    /// Maximum number of octaves.
    pub max_octave_evolution: u32,
    /// Scale of the first level, in pixels.
    pub base_scale_offset: f64,
    /// Percentile of the gradient histogram used as the diffusion contrast factor.
    pub contrast_percentile: f64,
    pub contrast_factor_num_bins: usize,
    /// Multiplier from level scale to derivative filter scale.
    pub derivative_factor: f64,
    /// Minimum Hessian response of a keypoint.
    pub detector_threshold: f64,
    /// 1 (intensity), 2 (plus gradient magnitude) or 3 (plus rotated gradient).
    pub descriptor_channels: usize,
    /// Half width of the descriptor pattern in scale units.
    pub descriptor_pattern_size: usize,
}

impl Akaze {
    pub fn new(threshold: f64) -> Self {
        Self {
            detector_threshold: threshold,
            ..Default::default()
        }
    }

    /// Uses a threshold of `0.01`, detecting fewer but stronger features.
    pub fn sparse() -> Self {
        Self::new(0.01)
    }

    /// Uses a threshold of `0.0001`, detecting many weak features.
    pub fn dense() -> Self {
        Self::new(0.0001)
    }

    /// Detects keypoints and computes their descriptors, index aligned.
    ///
    /// Images too small for a scale space and images without contrast yield no features.
    pub fn extract(&self, image: &GrayImage) -> (Vec<KeyPoint>, Vec<Descriptor>) {
        let (width, height) = image.dimensions();
        let mut evolutions = self.allocate_evolutions(width, height);
        if evolutions.is_empty() {
            debug!("{}x{} image is too small for a scale space", width, height);
            return (vec![], vec![]);
        }
        trace!("{} levels for {}x{} image", evolutions.len(), width, height);

        self.build_scale_space(&mut evolutions, FloatImage::from_luma(image));
        self.detector_response(&mut evolutions);
        let candidates = self.detect_keypoints(&evolutions);
        let (candidates, descriptors) = self.describe(&evolutions, candidates);
        let keypoints = candidates.iter().map(Candidate::key_point).collect();
        (keypoints, descriptors)
    }
}

impl Default for Akaze {
    fn default() -> Self {
        Self {
            num_sublevels: 4,
            max_octave_evolution: 4,
            base_scale_offset: 1.6,
            contrast_percentile: 0.7,
            contrast_factor_num_bins: 300,
            derivative_factor: 1.5,
            detector_threshold: 0.001,
            descriptor_channels: 3,
            descriptor_pattern_size: 10,
        }
    }
}

/// A keypoint while it moves through detection, refinement and description.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    /// Location in input image pixels.
    x: f32,
    y: f32,
    response: f32,
    size: f32,
    angle: f32,
    octave: u32,
    /// Index of the level it was found on.
    level: usize,
}

impl Candidate {
    fn key_point(&self) -> KeyPoint {
        KeyPoint {
            point: Point2::new(f64::from(self.x), f64::from(self.y)),
            size: f64::from(self.size),
            angle: f64::from(self.angle),
            response: f64::from(self.response),
            octave: self.octave as usize,
        }
    }
}
