#![allow(dead_code)]

use image::{imageops, DynamicImage, GenericImageView, GrayImage, Luma};
use imageproc::{drawing, filter, rect::Rect};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};
use vps::{
    vps_core::{check_extent, nalgebra::Point2, EstimateError, FeatureError},
    CancelToken, Correspondence, DescriptorMatcher, FeatureExtractor, Features, Homography,
    HomographyEstimator, HomographyFit, KeyPoint, PointMatch,
};

/// A blurred pile of random shapes, rich in corners and blobs.
pub fn scene(width: u32, height: u32, seed: u64) -> GrayImage {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let mut image = GrayImage::from_pixel(width, height, Luma([127]));
    let shapes = (width * height / 600) as usize;
    for _ in 0..shapes {
        let x = rng.gen_range(0..width as i32);
        let y = rng.gen_range(0..height as i32);
        let color = Luma([rng.gen::<u8>()]);
        if rng.gen_bool(0.5) {
            drawing::draw_filled_circle_mut(&mut image, (x, y), rng.gen_range(3..20), color);
        } else {
            let rect = Rect::at(x, y).of_size(rng.gen_range(4..36), rng.gen_range(4..36));
            drawing::draw_filled_rect_mut(&mut image, rect, color);
        }
    }
    filter::gaussian_blur_f32(&image, 1.0)
}

/// A full height window of `width` pixels starting at column `x`.
pub fn window(image: &GrayImage, x: u32, width: u32) -> DynamicImage {
    DynamicImage::ImageLuma8(imageops::crop_imm(image, x, 0, width, image.height()).to_image())
}

/// Points spread over `[x0, x1] x [y0, y1]`.
pub fn grid(x0: f64, x1: f64, y0: f64, y1: f64) -> Vec<Point2<f64>> {
    let steps = 8;
    (0..=steps)
        .flat_map(|i| {
            (0..=steps).map(move |j| {
                Point2::new(
                    x0 + (x1 - x0) * i as f64 / steps as f64,
                    y0 + (y1 - y0) * j as f64 / steps as f64,
                )
            })
        })
        .collect()
}

/// The largest distance between where `estimated` and `truth` map the points.
pub fn max_transfer_error(estimated: &Homography, truth: &Homography, points: &[Point2<f64>]) -> f64 {
    points
        .iter()
        .map(|p| match (estimated.transform(p), truth.transform(p)) {
            (Some(a), Some(b)) => (a - b).norm(),
            _ => f64::INFINITY,
        })
        .fold(0.0, f64::max)
}

/// Produces `count` keypoints with descriptors `0..count` for every image and records
/// what it was given.
#[derive(Debug, Default)]
pub struct ScriptedExtractor {
    pub count: usize,
    pub calls: AtomicUsize,
    pub sizes: Mutex<Vec<(u32, u32)>>,
    /// Cancelled on every extraction.
    pub cancel: Option<CancelToken>,
}

impl ScriptedExtractor {
    pub fn new(count: usize) -> Self {
        Self {
            count,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FeatureExtractor for ScriptedExtractor {
    type Descriptor = u32;

    fn extract(&self, image: &DynamicImage) -> Result<Features<u32>, FeatureError> {
        check_extent(image)?;
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sizes.lock().unwrap().push(image.dimensions());
        if let Some(token) = &self.cancel {
            token.cancel();
        }
        let keypoints = (0..self.count)
            .map(|i| KeyPoint::at(10.0 + 37.0 * i as f64, 20.0 + (i * i) as f64))
            .collect();
        Ok(Features::new(keypoints, (0..self.count as u32).collect()))
    }
}

/// Matches descriptor `i` of the query with descriptor `i` of the reference.
#[derive(Debug, Copy, Clone, Default)]
pub struct Diagonal;

impl DescriptorMatcher<u32> for Diagonal {
    fn match_descriptors(&self, query: &[u32], train: &[u32]) -> Vec<Correspondence> {
        (0..query.len().min(train.len()))
            .map(|ix| Correspondence::new(ix, ix, 0.0))
            .collect()
    }
}

/// Reports the identity supported by every match and counts its invocations.
#[derive(Debug, Default)]
pub struct CountingEstimator {
    pub calls: AtomicUsize,
}

impl CountingEstimator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl HomographyEstimator for CountingEstimator {
    fn estimate(&self, matches: &[PointMatch]) -> Result<HomographyFit, EstimateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(HomographyFit {
            homography: Homography::identity(),
            inliers: (0..matches.len()).collect(),
        })
    }
}
