use crate::ImagePoint;
use derive_more::Constructor;
use nalgebra::Point2;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// An accepted match between feature `query` of image A and feature `train` of image B.
///
/// `distance` is the descriptor distance of the best match, in the units of the
/// matcher's metric.
#[derive(Debug, Clone, Copy, PartialEq, Constructor)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Correspondence {
    pub query: usize,
    pub train: usize,
    pub distance: f64,
}

impl Correspondence {
    /// Looks up the pixel locations of both sides of the correspondence.
    ///
    /// # Panics
    ///
    /// Panics if an index is out of bounds, which means the correspondence was not
    /// produced from these keypoint sets.
    pub fn resolve<K: ImagePoint>(&self, query: &[K], train: &[K]) -> PointMatch {
        PointMatch(
            query[self.query].image_point(),
            train[self.train].image_point(),
        )
    }
}

/// A correspondence resolved to pixel coordinates: `.0` on image A, `.1` on image B.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Constructor)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct PointMatch(pub Point2<f64>, pub Point2<f64>);

/// Resolves every correspondence to a [`PointMatch`], keeping the order.
pub fn resolve_matches<K: ImagePoint>(
    correspondences: &[Correspondence],
    query: &[K],
    train: &[K],
) -> Vec<PointMatch> {
    correspondences
        .iter()
        .map(|c| c.resolve(query, train))
        .collect()
}

/// Finds candidate correspondences between two descriptor sets and rejects ambiguous ones.
///
/// The output must be deterministic for a given input pair.
pub trait DescriptorMatcher<D> {
    fn match_descriptors(&self, query: &[D], train: &[D]) -> Vec<Correspondence>;
}

impl<D, T> DescriptorMatcher<D> for &T
where
    T: DescriptorMatcher<D> + ?Sized,
{
    fn match_descriptors(&self, query: &[D], train: &[D]) -> Vec<Correspondence> {
        (**self).match_descriptors(query, train)
    }
}
