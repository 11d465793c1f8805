use crate::{EstimateError, PointMatch};
use derive_more::{AsMut, AsRef, Deref, DerefMut, From, Into};
use nalgebra::{Matrix3, Point2};
use sample_consensus::Model;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// The smallest number of matches that determines a homography.
pub const MIN_HOMOGRAPHY_MATCHES: usize = 4;

/// A projective transform mapping homogeneous points of image A onto image B up to scale.
///
/// A homography relates two views of a planar scene, or two views taken from the same optical
/// center (pure rotation). Street-level facades viewed from nearby positions are close enough to
/// planar that the homography between a camera frame and a reference panorama crop captures
/// most of the relationship.
///
/// Matrices built through [`Homography::from_matrix`] are scaled so that `H[(2, 2)] == 1`
/// whenever that entry is not zero.
#[derive(Debug, Clone, Copy, PartialEq, AsMut, AsRef, Deref, DerefMut, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Homography(pub Matrix3<f64>);

impl Homography {
    pub fn identity() -> Self {
        Self(Matrix3::identity())
    }

    /// A pure image translation by `(tx, ty)` pixels.
    pub fn translation(tx: f64, ty: f64) -> Self {
        Self(Matrix3::new(1.0, 0.0, tx, 0.0, 1.0, ty, 0.0, 0.0, 1.0))
    }

    /// Wraps a matrix after fixing its scale.
    ///
    /// Returns `None` for matrices that cannot be a homography: non-finite entries or a
    /// (numerically) singular matrix.
    pub fn from_matrix(mat: Matrix3<f64>) -> Option<Self> {
        let scale = if mat[(2, 2)].abs() > f64::EPSILON {
            mat[(2, 2)]
        } else {
            mat.norm()
        };
        if !scale.is_finite() || scale == 0.0 {
            return None;
        }
        let mat = mat / scale;
        if mat.iter().any(|v| !v.is_finite()) || mat.determinant().abs() < 1e-12 {
            return None;
        }
        Some(Self(mat))
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.0
    }

    /// Maps a point of image A onto image B.
    ///
    /// Returns `None` when the point maps onto the line at infinity.
    pub fn transform(&self, point: &Point2<f64>) -> Option<Point2<f64>> {
        let projected = self.0 * point.to_homogeneous();
        if projected.z.abs() < f64::EPSILON {
            return None;
        }
        Some(Point2::new(projected.x / projected.z, projected.y / projected.z))
    }

    /// The homography mapping image B back onto image A.
    pub fn inverse(&self) -> Option<Self> {
        self.0.try_inverse().and_then(Self::from_matrix)
    }

    /// Euclidean distance in pixels between the mapped `.0` and the observed `.1`.
    pub fn reprojection_error(&self, data: &PointMatch) -> f64 {
        let &PointMatch(a, b) = data;
        match self.transform(&a) {
            Some(projected) => (projected - b).norm(),
            None => f64::INFINITY,
        }
    }
}

impl Model<PointMatch> for Homography {
    fn residual(&self, data: &PointMatch) -> f64 {
        self.reprojection_error(data)
    }
}

/// A homography together with the matches that support it.
#[derive(Debug, Clone, PartialEq)]
pub struct HomographyFit {
    pub homography: Homography,
    /// Indices into the matches given to the estimator, ascending.
    pub inliers: Vec<usize>,
}

impl HomographyFit {
    /// The fraction of `total` matches that are inliers.
    pub fn inlier_ratio(&self, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            self.inliers.len() as f64 / total as f64
        }
    }

    /// Mean reprojection error over the inliers.
    pub fn mean_inlier_error(&self, matches: &[PointMatch]) -> f64 {
        if self.inliers.is_empty() {
            return 0.0;
        }
        let sum: f64 = self
            .inliers
            .iter()
            .map(|&ix| self.homography.reprojection_error(&matches[ix]))
            .sum();
        sum / self.inliers.len() as f64
    }
}

/// Fits a homography to point matches while tolerating mismatches.
///
/// Implementations must never return a degenerate or zero matrix; when no candidate is
/// supported well enough they report [`EstimateError::NoConsensus`].
pub trait HomographyEstimator {
    fn estimate(&self, matches: &[PointMatch]) -> Result<HomographyFit, EstimateError>;
}

impl<T> HomographyEstimator for &T
where
    T: HomographyEstimator + ?Sized,
{
    fn estimate(&self, matches: &[PointMatch]) -> Result<HomographyFit, EstimateError> {
        (**self).estimate(matches)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn translation_moves_points() {
        let h = Homography::translation(50.0, -3.0);
        let p = h.transform(&Point2::new(10.0, 20.0)).unwrap();
        assert_relative_eq!(p, Point2::new(60.0, 17.0));
        let m = PointMatch(Point2::new(10.0, 20.0), Point2::new(63.0, 21.0));
        assert_relative_eq!(h.residual(&m), 5.0);
    }

    #[test]
    fn scale_is_fixed() {
        let h = Homography::from_matrix(Matrix3::identity() * 4.0).unwrap();
        assert_relative_eq!(h.0, Matrix3::identity());
    }

    #[test]
    fn degenerate_matrices_are_rejected() {
        assert!(Homography::from_matrix(Matrix3::zeros()).is_none());
        let mut nan = Matrix3::identity();
        nan[(0, 1)] = f64::NAN;
        assert!(Homography::from_matrix(nan).is_none());
        let rank_one = Matrix3::new(1.0, 2.0, 3.0, 2.0, 4.0, 6.0, 3.0, 6.0, 9.0);
        assert!(Homography::from_matrix(rank_one).is_none());
    }

    #[test]
    fn inverse_round_trips() {
        let h = Homography::from_matrix(Matrix3::new(
            1.1, 0.05, 12.0, -0.02, 0.95, -7.0, 1e-4, -2e-4, 1.0,
        ))
        .unwrap();
        let inv = h.inverse().unwrap();
        let p = Point2::new(123.0, 45.0);
        let back = inv.transform(&h.transform(&p).unwrap()).unwrap();
        assert_relative_eq!(back, p, epsilon = 1e-9);
    }

    #[test]
    fn point_at_infinity_has_infinite_residual() {
        let h = Homography(Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0));
        let m = PointMatch(Point2::new(0.0, 5.0), Point2::new(0.0, 5.0));
        assert!(h.residual(&m).is_infinite());
    }

    #[test]
    fn fit_statistics() {
        let fit = HomographyFit {
            homography: Homography::identity(),
            inliers: vec![0, 2],
        };
        let matches = [
            PointMatch(Point2::new(0.0, 0.0), Point2::new(1.0, 0.0)),
            PointMatch(Point2::new(0.0, 0.0), Point2::new(100.0, 0.0)),
            PointMatch(Point2::new(0.0, 0.0), Point2::new(0.0, 3.0)),
        ];
        assert_relative_eq!(fit.inlier_ratio(4), 0.5);
        assert_relative_eq!(fit.mean_inlier_error(&matches), 2.0);
        assert_relative_eq!(fit.inlier_ratio(0), 0.0);
    }
}
