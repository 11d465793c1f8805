use bitarray::Hamming;
use log::*;
use rayon::prelude::*;
use space::Metric;
use vps_core::{Correspondence, DescriptorMatcher};

/// Lowe's ratio used when none is given.
pub const DEFAULT_RATIO: f64 = 0.75;

/// The two smallest distances from one descriptor into a set.
#[derive(Debug, Copy, Clone, PartialEq)]
struct TwoNearest {
    best: usize,
    best_distance: f64,
    second_distance: f64,
}

/// Exhaustive k=2 nearest neighbour matcher with Lowe's ratio test.
///
/// For every query descriptor the two closest train descriptors are found. The closest one
/// is accepted only if its distance is strictly less than `ratio` times the distance of
/// the second closest. Ties are resolved towards the lower train index, so the output is
/// deterministic and ordered by query index.
///
/// With `symmetric` set, a correspondence must additionally be the nearest query descriptor
/// of its train descriptor (a cross check). `max_distance` discards correspondences whose
/// descriptor distance exceeds it.
#[derive(Debug, Copy, Clone)]
pub struct RatioMatcher<M> {
    pub metric: M,
    pub ratio: f64,
    pub symmetric: bool,
    pub max_distance: Option<f64>,
}

impl RatioMatcher<Hamming> {
    /// Matches binary descriptors (such as AKAZE's) by their hamming distance.
    pub fn hamming() -> Self {
        Self::new(Hamming)
    }
}

impl Default for RatioMatcher<Hamming> {
    fn default() -> Self {
        Self::hamming()
    }
}

impl<M> RatioMatcher<M> {
    pub fn new(metric: M) -> Self {
        Self {
            metric,
            ratio: DEFAULT_RATIO,
            symmetric: false,
            max_distance: None,
        }
    }

    pub fn ratio(self, ratio: f64) -> Self {
        Self { ratio, ..self }
    }

    pub fn symmetric(self, symmetric: bool) -> Self {
        Self { symmetric, ..self }
    }

    pub fn max_distance(self, max_distance: impl Into<Option<f64>>) -> Self {
        Self {
            max_distance: max_distance.into(),
            ..self
        }
    }

    fn two_nearest<D>(&self, descriptor: &D, set: &[D]) -> Option<TwoNearest>
    where
        M: Metric<D>,
        M::Unit: Into<f64>,
    {
        let mut best: Option<(usize, f64)> = None;
        let mut second: Option<f64> = None;
        for (ix, candidate) in set.iter().enumerate() {
            let distance: f64 = self.metric.distance(descriptor, candidate).into();
            match best {
                Some((_, best_distance)) if distance >= best_distance => {
                    if second.map_or(true, |second| distance < second) {
                        second = Some(distance);
                    }
                }
                _ => {
                    second = best.map(|(_, d)| d);
                    best = Some((ix, distance));
                }
            }
        }
        let (best, best_distance) = best?;
        Some(TwoNearest {
            best,
            best_distance,
            second_distance: second?,
        })
    }

    fn nearest<D>(&self, descriptor: &D, set: &[D]) -> Option<usize>
    where
        M: Metric<D>,
        M::Unit: Into<f64>,
    {
        set.iter()
            .enumerate()
            .map(|(ix, candidate)| (ix, self.metric.distance(descriptor, candidate).into()))
            .fold(None, |best: Option<(usize, f64)>, (ix, distance)| match best {
                Some((_, best_distance)) if distance >= best_distance => best,
                _ => Some((ix, distance)),
            })
            .map(|(ix, _)| ix)
    }
}

impl<D, M> DescriptorMatcher<D> for RatioMatcher<M>
where
    D: Sync,
    M: Metric<D> + Sync,
    M::Unit: Into<f64>,
{
    fn match_descriptors(&self, query: &[D], train: &[D]) -> Vec<Correspondence> {
        if train.len() < 2 {
            debug!(
                "ratio test needs two train descriptors, got {}",
                train.len()
            );
            return vec![];
        }

        let mut correspondences: Vec<Correspondence> = query
            .par_iter()
            .enumerate()
            .filter_map(|(ix, descriptor)| {
                let nearest = self.two_nearest(descriptor, train)?;
                (nearest.best_distance < self.ratio * nearest.second_distance)
                    .then(|| Correspondence::new(ix, nearest.best, nearest.best_distance))
            })
            .filter(|c| self.max_distance.map_or(true, |max| c.distance <= max))
            .collect();
        let passed_ratio = correspondences.len();

        if self.symmetric {
            let reverse: Vec<Option<usize>> = train
                .par_iter()
                .map(|descriptor| self.nearest(descriptor, query))
                .collect();
            correspondences.retain(|c| reverse[c.train] == Some(c.query));
        }

        trace!(
            "{} query descriptors, {} passed the ratio test, {} kept",
            query.len(),
            passed_ratio,
            correspondences.len()
        );
        correspondences
    }
}
