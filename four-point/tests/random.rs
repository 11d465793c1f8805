use four_point::FourPoint;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use vps_core::{
    nalgebra::{Matrix3, Point2},
    sample_consensus::Model,
    Homography, PointMatch,
};

const SAMPLE_POINTS: usize = 16;
const RESIDUAL_THRESHOLD: f64 = 1e-6;
const NOISY_RESIDUAL_THRESHOLD: f64 = 1.0;

const IMAGE_WIDTH: f64 = 640.0;
const IMAGE_HEIGHT: f64 = 480.0;
const PERSPECTIVE_MAGNITUDE: f64 = 2e-4;

#[test]
fn randomized() {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
    let successes = (0..1000).filter(|_| run_round(&mut rng)).count();
    eprintln!("successes: {}", successes);
    assert!(successes > 990);
}

#[test]
fn refit_with_noise() {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
    let truth = random_homography(&mut rng);
    let matches: Vec<PointMatch> = (0..200)
        .map(|_| {
            let PointMatch(a, b) = random_match(&mut rng, &truth);
            let noise = Point2::new(rng.gen_range(-0.5..0.5), rng.gen_range(-0.5..0.5));
            PointMatch(a, b + noise.coords)
        })
        .collect();
    let estimate = FourPoint::new()
        .from_matches(matches.iter().copied())
        .expect("didn't get any homography");

    // Compare against the noise-free truth on a fresh set of points.
    for _ in 0..50 {
        let m = random_match(&mut rng, &truth);
        assert!(estimate.residual(&m) < NOISY_RESIDUAL_THRESHOLD);
    }
}

fn run_round(rng: &mut Xoshiro256PlusPlus) -> bool {
    let truth = random_homography(rng);
    let minimal: Vec<PointMatch> = (0..4).map(|_| random_match(rng, &truth)).collect();
    let homography = match FourPoint::new().from_matches(minimal.iter().copied()) {
        Some(homography) => homography,
        None => {
            eprintln!("no homography from minimal sample");
            return false;
        }
    };
    let mut success = true;
    for _ in 0..SAMPLE_POINTS {
        let m = random_match(rng, &truth);
        let residual = homography.residual(&m);
        if residual > RESIDUAL_THRESHOLD * IMAGE_WIDTH {
            success = false;
            eprintln!("failed residual check: {}", residual);
        }
    }
    success
}

/// A near-identity homography with random translation, rotation, scale and a little perspective.
fn random_homography(rng: &mut impl Rng) -> Homography {
    let angle = rng.gen_range(-0.3..0.3f64);
    let scale = rng.gen_range(0.8..1.25);
    let (s, c) = angle.sin_cos();
    let mat = Matrix3::new(
        scale * c,
        -scale * s,
        rng.gen_range(-80.0..80.0),
        scale * s,
        scale * c,
        rng.gen_range(-60.0..60.0),
        rng.gen_range(-PERSPECTIVE_MAGNITUDE..PERSPECTIVE_MAGNITUDE),
        rng.gen_range(-PERSPECTIVE_MAGNITUDE..PERSPECTIVE_MAGNITUDE),
        1.0,
    );
    Homography::from_matrix(mat).expect("random homography is invertible")
}

fn random_match(rng: &mut impl Rng, truth: &Homography) -> PointMatch {
    let a = Point2::new(
        rng.gen_range(0.0..IMAGE_WIDTH),
        rng.gen_range(0.0..IMAGE_HEIGHT),
    );
    PointMatch(a, truth.transform(&a).expect("point maps to a finite location"))
}
