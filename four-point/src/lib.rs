use float_ord::FloatOrd;
use vps_core::{
    nalgebra::{Matrix3, Point2, SMatrix, SVector},
    sample_consensus::Estimator,
    Homography, PointMatch, MIN_HOMOGRAPHY_MATCHES,
};

/// Twice the area of a triangle in normalized coordinates below which its corners are
/// treated as collinear.
const COLLINEAR_EPSILON: f64 = 1e-8;

/// Similarity transform moving a point set's centroid to the origin and scaling it so the
/// mean distance from the origin is `sqrt(2)`.
#[derive(Copy, Clone, Debug)]
struct Normalization {
    scale: f64,
    centroid: Point2<f64>,
}

impl Normalization {
    fn new(points: &[Point2<f64>]) -> Option<Self> {
        let n = points.len() as f64;
        let centroid = points
            .iter()
            .fold(Point2::origin(), |acc, p| acc + p.coords / n);
        let mean_distance = points.iter().map(|p| (*p - centroid).norm()).sum::<f64>() / n;
        if !mean_distance.is_finite() || mean_distance < f64::EPSILON {
            return None;
        }
        Some(Self {
            scale: std::f64::consts::SQRT_2 / mean_distance,
            centroid,
        })
    }

    fn apply(&self, p: &Point2<f64>) -> Point2<f64> {
        Point2::from((*p - self.centroid) * self.scale)
    }

    fn matrix(&self) -> Matrix3<f64> {
        let s = self.scale;
        Matrix3::new(
            s,
            0.0,
            -s * self.centroid.x,
            0.0,
            s,
            -s * self.centroid.y,
            0.0,
            0.0,
            1.0,
        )
    }

    fn inverse_matrix(&self) -> Matrix3<f64> {
        let s = self.scale.recip();
        Matrix3::new(
            s,
            0.0,
            self.centroid.x,
            0.0,
            s,
            self.centroid.y,
            0.0,
            0.0,
            1.0,
        )
    }
}

fn has_collinear_triple(points: &[Point2<f64>]) -> bool {
    let n = points.len();
    for i in 0..n {
        for j in i + 1..n {
            for k in j + 1..n {
                let ab = points[j] - points[i];
                let ac = points[k] - points[i];
                if (ab.x * ac.y - ab.y * ac.x).abs() < COLLINEAR_EPSILON {
                    return true;
                }
            }
        }
    }
    false
}

/// Accumulates `AᵀA` for the direct linear transform `A h = 0`, where `h` is the
/// row-major homography and each match contributes two rows to `A`.
fn encode_normal_equations(a: &[Point2<f64>], b: &[Point2<f64>]) -> SMatrix<f64, 9, 9> {
    let mut ata = SMatrix::<f64, 9, 9>::zeros();
    for (pa, pb) in a.iter().zip(b) {
        let (x, y) = (pa.x, pa.y);
        let (u, v) = (pb.x, pb.y);
        let rows = [
            SVector::<f64, 9>::from_column_slice(&[
                -x,
                -y,
                -1.0,
                0.0,
                0.0,
                0.0,
                u * x,
                u * y,
                u,
            ]),
            SVector::<f64, 9>::from_column_slice(&[
                0.0,
                0.0,
                0.0,
                -x,
                -y,
                -1.0,
                v * x,
                v * y,
                v,
            ]),
        ];
        for row in &rows {
            ata += row * row.transpose();
        }
    }
    ata
}

/// Performs the normalized
/// [direct linear transform](https://en.wikipedia.org/wiki/Direct_linear_transformation)
/// for homographies as described by Richard Hartley and Andrew Zisserman.
///
/// With exactly four matches this is the minimal solver used inside sample consensus.
/// With more matches it produces the algebraic least-squares fit, which is how a
/// consensus result is refined over its inliers.
#[derive(Copy, Clone, Debug)]
pub struct FourPoint {
    pub epsilon: f64,
    pub iterations: usize,
}

impl FourPoint {
    pub fn new() -> Self {
        Default::default()
    }

    /// Fits a homography mapping every `.0` onto its `.1`.
    ///
    /// Returns `None` for fewer than four matches, for minimal samples containing three
    /// collinear points and for configurations that do not determine a homography.
    pub fn from_matches<I>(&self, data: I) -> Option<Homography>
    where
        I: Iterator<Item = PointMatch>,
    {
        let (a, b): (Vec<Point2<f64>>, Vec<Point2<f64>>) =
            data.map(|PointMatch(a, b)| (a, b)).unzip();
        if a.len() < MIN_HOMOGRAPHY_MATCHES {
            return None;
        }

        let norm_a = Normalization::new(&a)?;
        let norm_b = Normalization::new(&b)?;
        let a: Vec<_> = a.iter().map(|p| norm_a.apply(p)).collect();
        let b: Vec<_> = b.iter().map(|p| norm_b.apply(p)).collect();
        if a.len() == MIN_HOMOGRAPHY_MATCHES && (has_collinear_triple(&a) || has_collinear_triple(&b))
        {
            return None;
        }

        let ata = encode_normal_equations(&a, &b);
        let eigens = ata.try_symmetric_eigen(self.epsilon, self.iterations)?;
        let h = eigens
            .eigenvalues
            .iter()
            .enumerate()
            .min_by_key(|&(_, &n)| FloatOrd(n))
            .map(|(ix, _)| eigens.eigenvectors.column(ix).into_owned())?;
        let normalized = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);

        Homography::from_matrix(norm_b.inverse_matrix() * normalized * norm_a.matrix())
    }
}

impl Default for FourPoint {
    fn default() -> Self {
        Self {
            epsilon: 1e-12,
            iterations: 1000,
        }
    }
}

impl Estimator<PointMatch> for FourPoint {
    type Model = Homography;
    type ModelIter = Option<Homography>;
    const MIN_SAMPLES: usize = MIN_HOMOGRAPHY_MATCHES;

    fn estimate<I>(&self, data: I) -> Self::ModelIter
    where
        I: Iterator<Item = PointMatch> + Clone,
    {
        self.from_matches(data)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    fn square(h: &Homography) -> Vec<PointMatch> {
        [(0.0, 0.0), (100.0, 0.0), (100.0, 80.0), (0.0, 80.0)]
            .iter()
            .map(|&(x, y)| {
                let a = Point2::new(x, y);
                PointMatch(a, h.transform(&a).unwrap())
            })
            .collect()
    }

    #[test]
    fn identity_from_square() {
        let h = FourPoint::new()
            .from_matches(square(&Homography::identity()).into_iter())
            .unwrap();
        assert_relative_eq!(h.0, Matrix3::identity(), epsilon = 1e-9);
    }

    #[test]
    fn translation_from_square() {
        let truth = Homography::translation(50.0, 0.0);
        let h = FourPoint::new()
            .from_matches(square(&truth).into_iter())
            .unwrap();
        assert_relative_eq!(h.0, truth.0, epsilon = 1e-9);
    }

    #[test]
    fn too_few_matches() {
        let matches = square(&Homography::identity());
        assert!(FourPoint::new()
            .from_matches(matches.into_iter().take(3))
            .is_none());
    }

    #[test]
    fn collinear_sample_is_degenerate() {
        let matches: Vec<_> = [(0.0, 0.0), (10.0, 10.0), (20.0, 20.0), (5.0, 40.0)]
            .iter()
            .map(|&(x, y)| PointMatch(Point2::new(x, y), Point2::new(x + 1.0, y)))
            .collect();
        assert!(FourPoint::new().from_matches(matches.into_iter()).is_none());
    }

    #[test]
    fn coincident_points_are_degenerate() {
        let p = Point2::new(3.0, 4.0);
        let matches = vec![PointMatch(p, p); 6];
        assert!(FourPoint::new().from_matches(matches.into_iter()).is_none());
    }
}
