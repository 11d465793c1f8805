use crate::MatchSettings;
use arrsac::Arrsac;
use four_point::FourPoint;
use log::*;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use vps_core::{
    sample_consensus::Consensus, EstimateError, Homography, HomographyEstimator, HomographyFit,
    PointMatch, MIN_HOMOGRAPHY_MATCHES,
};

/// Upper bound on least-squares refits after consensus.
const REFINE_PASSES: usize = 3;

/// Robust homography estimation with ARRSAC over the [`FourPoint`] solver.
///
/// Every call seeds a fresh random number generator from `seed`, so the same matches always
/// produce the same homography. With `refine` set, the consensus model is refit by least
/// squares over its inliers as long as that does not lose any inliers.
#[derive(Debug, Copy, Clone)]
pub struct ConsensusHomography {
    pub solver: FourPoint,
    /// Reprojection error in pixels below which a match is an inlier.
    pub threshold: f64,
    pub min_matches: usize,
    pub min_inliers: usize,
    pub refine: bool,
    pub seed: u64,
}

impl ConsensusHomography {
    pub fn new(threshold: f64) -> Self {
        Self {
            solver: FourPoint::new(),
            threshold,
            min_matches: MIN_HOMOGRAPHY_MATCHES,
            min_inliers: MIN_HOMOGRAPHY_MATCHES,
            refine: true,
            seed: 0,
        }
    }

    pub fn from_settings(settings: &MatchSettings) -> Self {
        Self {
            solver: FourPoint::new(),
            threshold: settings.reprojection_threshold,
            min_matches: settings.min_correspondences.max(MIN_HOMOGRAPHY_MATCHES),
            min_inliers: settings.min_inliers.max(MIN_HOMOGRAPHY_MATCHES),
            refine: settings.refine,
            seed: settings.consensus_seed,
        }
    }

    pub fn seed(self, seed: u64) -> Self {
        Self { seed, ..self }
    }

    pub fn refine(self, refine: bool) -> Self {
        Self { refine, ..self }
    }

    /// Clamped to the minimal sample size; fewer inliers do not constrain a homography.
    pub fn min_inliers(self, min_inliers: usize) -> Self {
        Self {
            min_inliers: min_inliers.max(MIN_HOMOGRAPHY_MATCHES),
            ..self
        }
    }

    fn inliers(&self, homography: &Homography, matches: &[PointMatch]) -> Vec<usize> {
        matches
            .iter()
            .enumerate()
            .filter(|(_, m)| homography.reprojection_error(m) < self.threshold)
            .map(|(ix, _)| ix)
            .collect()
    }

    fn refined(&self, matches: &[PointMatch], fit: HomographyFit) -> HomographyFit {
        let mut best = fit;
        for _ in 0..REFINE_PASSES {
            let refit = match self
                .solver
                .from_matches(best.inliers.iter().map(|&ix| matches[ix]))
            {
                Some(refit) => refit,
                None => break,
            };
            let inliers = self.inliers(&refit, matches);
            if inliers.len() < best.inliers.len() {
                trace!(
                    "refit would drop from {} to {} inliers, keeping consensus model",
                    best.inliers.len(),
                    inliers.len()
                );
                break;
            }
            let converged = inliers == best.inliers;
            best = HomographyFit {
                homography: refit,
                inliers,
            };
            if converged {
                break;
            }
        }
        best
    }
}

impl Default for ConsensusHomography {
    fn default() -> Self {
        Self::from_settings(&MatchSettings::default())
    }
}

impl HomographyEstimator for ConsensusHomography {
    fn estimate(&self, matches: &[PointMatch]) -> Result<HomographyFit, EstimateError> {
        let required = self.min_matches.max(MIN_HOMOGRAPHY_MATCHES);
        if matches.len() < required {
            return Err(EstimateError::TooFewMatches {
                found: matches.len(),
                required,
            });
        }

        let mut arrsac = Arrsac::new(self.threshold, Xoshiro256PlusPlus::seed_from_u64(self.seed));
        let (homography, _) = arrsac
            .model_inliers(&self.solver, matches.iter().copied())
            .ok_or(EstimateError::NoConsensus {
                inliers: 0,
                required: self.min_inliers,
            })?;
        let mut fit = HomographyFit {
            inliers: self.inliers(&homography, matches),
            homography,
        };
        debug!(
            "consensus found {} inliers out of {} matches",
            fit.inliers.len(),
            matches.len()
        );
        if self.refine {
            fit = self.refined(matches, fit);
        }

        if fit.inliers.len() < self.min_inliers {
            return Err(EstimateError::NoConsensus {
                inliers: fit.inliers.len(),
                required: self.min_inliers,
            });
        }
        Ok(fit)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use vps_core::nalgebra::Point2;

    fn grid(h: &Homography) -> Vec<PointMatch> {
        // Jittered so that minimal samples are rarely collinear.
        (0..6usize)
            .flat_map(|i| {
                (0..5usize).map(move |j| {
                    Point2::new(
                        40.0 + 100.0 * i as f64 + ((i * 7 + j * 3) % 11) as f64 * 3.0,
                        30.0 + 90.0 * j as f64 + ((i * 5 + j * 11) % 7) as f64 * 4.0,
                    )
                })
            })
            .map(|p| PointMatch(p, h.transform(&p).unwrap()))
            .collect()
    }

    #[test]
    fn too_few_matches() {
        let matches = &grid(&Homography::identity())[..3];
        assert_eq!(
            ConsensusHomography::default().estimate(matches),
            Err(EstimateError::TooFewMatches {
                found: 3,
                required: 4
            })
        );
    }

    #[test]
    fn exact_translation() {
        let truth = Homography::translation(50.0, 0.0);
        let matches = grid(&truth);
        let fit = ConsensusHomography::default().estimate(&matches).unwrap();
        assert_eq!(fit.inliers, (0..matches.len()).collect::<Vec<_>>());
        assert!(fit.mean_inlier_error(&matches) < 1e-6);
    }

    #[test]
    fn refinement_keeps_inliers() {
        let truth = Homography::translation(-20.0, 7.0);
        let mut matches = grid(&truth);
        matches[3].1.x += 300.0;
        let coarse = ConsensusHomography::default()
            .refine(false)
            .estimate(&matches)
            .unwrap();
        let refined = ConsensusHomography::default().estimate(&matches).unwrap();
        assert!(refined.inliers.len() >= coarse.inliers.len());
        assert!(!refined.inliers.contains(&3));
    }

    #[test]
    fn inlier_floor() {
        let matches = grid(&Homography::identity());
        let result = ConsensusHomography::default()
            .min_inliers(matches.len() + 1)
            .estimate(&matches);
        assert_eq!(
            result,
            Err(EstimateError::NoConsensus {
                inliers: matches.len(),
                required: matches.len() + 1
            })
        );
    }

    #[test]
    fn inlier_floor_is_at_least_a_minimal_sample() {
        assert_eq!(
            ConsensusHomography::default().min_inliers(0).min_inliers,
            MIN_HOMOGRAPHY_MATCHES
        );
        let settings = MatchSettings {
            min_inliers: 1,
            ..MatchSettings::default()
        };
        assert_eq!(
            ConsensusHomography::from_settings(&settings).min_inliers,
            MIN_HOMOGRAPHY_MATCHES
        );
    }
}
