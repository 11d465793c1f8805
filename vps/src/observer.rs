use crate::{MatchError, Matched, Reference};
use image::{DynamicImage, RgbaImage};
use log::*;
use std::time::Duration;
use vps_core::{KeyPoint, PointMatch};
use vps_feature::render_matches;

/// How long each stage of one match took.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Timings {
    pub acquire: Duration,
    pub detect: Duration,
    pub matching: Duration,
    pub estimate: Duration,
    pub total: Duration,
}

/// The two images being matched, the query already at its canonical size.
#[derive(Debug, Copy, Clone)]
pub struct ImagePair<'a> {
    pub query: &'a DynamicImage,
    pub reference: &'a DynamicImage,
}

/// Diagnostic hooks invoked by [`MatchPipeline`](crate::MatchPipeline) at its checkpoints.
///
/// Every method does nothing by default. Observers must not influence the outcome of a match.
#[allow(unused_variables)]
pub trait MatchObserver {
    /// A reference image was fetched or taken from the cache.
    fn on_reference(&mut self, reference: &Reference, elapsed: Duration) {}

    fn on_detection(
        &mut self,
        images: ImagePair<'_>,
        query: &[KeyPoint],
        reference: &[KeyPoint],
        elapsed: Duration,
    ) {
    }

    /// Called with the correspondences accepted by the matcher, resolved to points.
    fn on_matching(&mut self, images: ImagePair<'_>, matches: &[PointMatch], elapsed: Duration) {}

    /// A homography was found; the match is complete.
    fn on_estimation(&mut self, matched: &Matched) {}

    fn on_failure(&mut self, error: &MatchError, timings: &Timings) {}
}

impl MatchObserver for () {}

impl<A, B> MatchObserver for (A, B)
where
    A: MatchObserver,
    B: MatchObserver,
{
    fn on_reference(&mut self, reference: &Reference, elapsed: Duration) {
        self.0.on_reference(reference, elapsed);
        self.1.on_reference(reference, elapsed);
    }

    fn on_detection(
        &mut self,
        images: ImagePair<'_>,
        query: &[KeyPoint],
        reference: &[KeyPoint],
        elapsed: Duration,
    ) {
        self.0.on_detection(images, query, reference, elapsed);
        self.1.on_detection(images, query, reference, elapsed);
    }

    fn on_matching(&mut self, images: ImagePair<'_>, matches: &[PointMatch], elapsed: Duration) {
        self.0.on_matching(images, matches, elapsed);
        self.1.on_matching(images, matches, elapsed);
    }

    fn on_estimation(&mut self, matched: &Matched) {
        self.0.on_estimation(matched);
        self.1.on_estimation(matched);
    }

    fn on_failure(&mut self, error: &MatchError, timings: &Timings) {
        self.0.on_failure(error, timings);
        self.1.on_failure(error, timings);
    }
}

/// Logs the duration of every stage at `info` level.
#[derive(Debug, Copy, Clone, Default)]
pub struct TimingLogger;

impl MatchObserver for TimingLogger {
    fn on_reference(&mut self, reference: &Reference, elapsed: Duration) {
        info!(
            "reference {:?} acquired in {:.3} seconds",
            reference.metadata.reference_id,
            elapsed.as_secs_f64()
        );
    }

    fn on_detection(
        &mut self,
        _: ImagePair<'_>,
        query: &[KeyPoint],
        reference: &[KeyPoint],
        elapsed: Duration,
    ) {
        info!(
            "detected {} query and {} reference keypoints in {:.3} seconds",
            query.len(),
            reference.len(),
            elapsed.as_secs_f64()
        );
    }

    fn on_matching(&mut self, _: ImagePair<'_>, matches: &[PointMatch], elapsed: Duration) {
        info!(
            "matched {} correspondences in {:.3} seconds",
            matches.len(),
            elapsed.as_secs_f64()
        );
    }

    fn on_estimation(&mut self, matched: &Matched) {
        info!(
            "homography with {} inliers estimated in {:.3} seconds, total {:.3} seconds",
            matched.inliers.len(),
            matched.timings.estimate.as_secs_f64(),
            matched.timings.total.as_secs_f64()
        );
    }

    fn on_failure(&mut self, error: &MatchError, timings: &Timings) {
        info!(
            "{} after {:.3} seconds",
            error.reason(),
            timings.total.as_secs_f64()
        );
    }
}

/// Renders the query and reference images side by side with a line for every accepted
/// correspondence.
#[derive(Debug, Clone, Default)]
pub struct MatchCanvas {
    image: Option<RgbaImage>,
}

impl MatchCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    /// The rendering of the most recent match that got as far as matching.
    pub fn image(&self) -> Option<&RgbaImage> {
        self.image.as_ref()
    }

    pub fn take(&mut self) -> Option<RgbaImage> {
        self.image.take()
    }
}

impl MatchObserver for MatchCanvas {
    fn on_matching(&mut self, images: ImagePair<'_>, matches: &[PointMatch], _: Duration) {
        self.image = Some(render_matches(images.query, images.reference, matches));
    }
}
