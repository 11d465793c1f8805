use super::image::{gaussian_blur, scharr_x, scharr_y, FloatImage};
use super::{Akaze, MIN_EXTENT};
use float_ord::FloatOrd;
use log::*;
use ndarray::{azip, s, Array2};
use std::f64::consts::PI;

/// Stability limit of a single explicit diffusion step.
const MAX_STEP: f64 = 0.25;

/// Contrast factor used when the gradient histogram is degenerate.
const FALLBACK_CONTRAST: f64 = 0.03;

/// One level of the nonlinear scale space.
#[derive(Debug)]
pub struct Evolution {
    /// Diffusion time, `sigma^2 / 2`.
    pub time: f64,
    pub sigma: f64,
    pub octave: u32,
    /// The diffused image.
    pub image: FloatImage,
    /// `image` after a further unit Gaussian blur.
    pub smooth: FloatImage,
    pub lx: FloatImage,
    pub ly: FloatImage,
    /// Scale-normalized determinant of the Hessian.
    pub response: FloatImage,
    /// FED step sizes leading to this level from the previous one.
    pub steps: Vec<f64>,
}

impl Evolution {
    fn new(octave: u32, sublevel: u32, akaze: &Akaze) -> Self {
        let sigma = akaze.base_scale_offset
            * 2f64.powf(f64::from(sublevel) / f64::from(akaze.num_sublevels) + f64::from(octave));
        Self {
            time: 0.5 * sigma * sigma,
            sigma,
            octave,
            image: FloatImage::new(0, 0),
            smooth: FloatImage::new(0, 0),
            lx: FloatImage::new(0, 0),
            ly: FloatImage::new(0, 0),
            response: FloatImage::new(0, 0),
            steps: vec![],
        }
    }

    /// Size of one pixel of this level in input image pixels.
    pub fn ratio(&self) -> f32 {
        (1u32 << self.octave) as f32
    }
}

impl Akaze {
    /// Lays out the levels of the scale space for an image of the given size.
    ///
    /// Octaves stop once the smaller side drops under [`MIN_EXTENT`]. Octaves under twice that
    /// get a single sublevel.
    pub(crate) fn allocate_evolutions(&self, width: u32, height: u32) -> Vec<Evolution> {
        let mut evolutions: Vec<Evolution> = (0..self.max_octave_evolution)
            .map(|octave| (octave, width.min(height) >> octave))
            .take_while(|&(_, extent)| extent >= MIN_EXTENT)
            .flat_map(|(octave, extent)| {
                let sublevels = if extent < 2 * MIN_EXTENT {
                    1
                } else {
                    self.num_sublevels
                };
                (0..sublevels).map(move |sublevel| Evolution::new(octave, sublevel, self))
            })
            .collect();
        for ix in 1..evolutions.len() {
            let elapsed = evolutions[ix].time - evolutions[ix - 1].time;
            evolutions[ix].steps = fed_steps(elapsed, MAX_STEP);
            trace!("{} diffusion steps into level {}", evolutions[ix].steps.len(), ix);
        }
        evolutions
    }

    /// Fills in `image` and `smooth` of every level by diffusing `input`.
    pub(crate) fn build_scale_space(&self, evolutions: &mut [Evolution], input: FloatImage) {
        let first = match evolutions.first_mut() {
            Some(first) => first,
            None => return,
        };
        first.image = gaussian_blur(&input, self.base_scale_offset as f32);
        first.smooth = first.image.clone();
        let mut contrast = contrast_factor(
            &first.smooth,
            self.contrast_percentile,
            1.0,
            self.contrast_factor_num_bins,
        );
        debug!("initial contrast factor {}", contrast);

        for ix in 1..evolutions.len() {
            let (built, rest) = evolutions.split_at_mut(ix);
            let previous = &built[ix - 1];
            let current = &mut rest[0];
            current.image = if current.octave > previous.octave {
                contrast *= 0.75;
                previous.image.half_size()
            } else {
                previous.image.clone()
            };
            current.smooth = gaussian_blur(&current.image, 1.0);
            let flow = conductance(
                &scharr_x(&current.smooth, 1),
                &scharr_y(&current.smooth, 1),
                contrast,
            );
            for &step in &current.steps {
                diffuse(&mut current.image, &flow, step as f32);
            }
        }
    }
}

/// Fast Explicit Diffusion step sizes reaching `time` in a single cycle.
///
/// Individual steps exceed `max_step`; only the cycle as a whole is stable. The steps are
/// permuted in a kappa cycle, which keeps rounding errors from piling up.
fn fed_steps(time: f64, max_step: f64) -> Vec<f64> {
    let n = ((3.0 * time / max_step + 0.25).sqrt() - 0.5 - 1.0e-8)
        .ceil()
        .max(0.0) as usize;
    if n == 0 {
        return vec![];
    }
    let scale = 3.0 * time / (max_step * (n * (n + 1)) as f64);
    let half = 0.5 * scale * max_step;
    let c = 1.0 / (4.0 * n as f64 + 2.0);
    let ascending: Vec<f64> = (0..n)
        .map(|k| {
            let h = (PI * (2.0 * k as f64 + 1.0) * c).cos();
            half / (h * h)
        })
        .collect();

    let kappa = n / 2;
    if kappa == 0 {
        return ascending;
    }
    let mut prime = n + 1;
    while !primal::is_prime(prime as u64) {
        prime += 1;
    }
    let mut steps = Vec::with_capacity(n);
    let mut k = 0;
    while steps.len() < n {
        k += 1;
        let index = (k * kappa) % prime;
        if (1..=n).contains(&index) {
            steps.push(ascending[index - 1]);
        }
    }
    steps
}

/// The contrast factor `k` of the conductance: the `percentile` of the gradient magnitude
/// histogram of `image` blurred by `sigma`.
fn contrast_factor(image: &FloatImage, percentile: f64, sigma: f32, bins: usize) -> f64 {
    let smooth = gaussian_blur(image, sigma);
    let lx = scharr_x(&smooth, 1);
    let ly = scharr_y(&smooth, 1);
    let (width, height) = (smooth.width(), smooth.height());
    let magnitudes: Vec<f64> = (1..height.saturating_sub(1))
        .flat_map(|y| (1..width.saturating_sub(1)).map(move |x| (x, y)))
        .map(|(x, y)| f64::from(lx.get(x, y)).hypot(f64::from(ly.get(x, y))))
        .collect();
    let hmax = magnitudes
        .iter()
        .copied()
        .map(FloatOrd)
        .max()
        .map_or(0.0, |max| max.0);
    if hmax == 0.0 {
        return FALLBACK_CONTRAST;
    }

    let mut histogram = vec![0usize; bins];
    let mut points = 0;
    for &magnitude in magnitudes.iter().filter(|&&m| m != 0.0) {
        let bin = ((bins as f64 * magnitude / hmax) as usize).min(bins - 1);
        histogram[bin] += 1;
        points += 1;
    }
    let threshold = (points as f64 * percentile) as usize;
    let mut accumulated = 0;
    let mut k = 0;
    while accumulated < threshold && k < bins {
        accumulated += histogram[k];
        k += 1;
    }
    trace!(
        "hmax {} threshold {} accumulated {} in {} bins",
        hmax,
        threshold,
        accumulated,
        k
    );
    if accumulated >= threshold && k > 0 {
        hmax * k as f64 / bins as f64
    } else {
        FALLBACK_CONTRAST
    }
}

/// Perona-Malik g2 conductance, `1 / (1 + |∇L|² / k²)`.
fn conductance(lx: &FloatImage, ly: &FloatImage, k: f64) -> FloatImage {
    let inverse_k2 = (1.0 / (k * k)) as f32;
    let mut flow = Array2::<f32>::zeros(lx.view().dim());
    azip!((c in &mut flow, &x in lx.view(), &y in ly.view()) {
        *c = 1.0 / (1.0 + inverse_k2 * (x * x + y * y));
    });
    FloatImage::from_array2(flow)
}

/// One explicit step of `dL/dt = div(c ∇L)` on a 4-neighbourhood.
fn diffuse(image: &mut FloatImage, flow: &FloatImage, step: f32) {
    let c = flow.view();
    let mut pixels = image.view_mut();
    let (rows, cols) = pixels.dim();

    let mut horizontal = Array2::<f32>::zeros((rows, cols - 1));
    azip!((
        f in &mut horizontal,
        &a in pixels.slice(s![.., ..-1]),
        &b in pixels.slice(s![.., 1..]),
        &ca in c.slice(s![.., ..-1]),
        &cb in c.slice(s![.., 1..]),
    ) {
        *f = 0.5 * step * (ca + cb) * (b - a);
    });
    let mut vertical = Array2::<f32>::zeros((rows - 1, cols));
    azip!((
        f in &mut vertical,
        &a in pixels.slice(s![..-1, ..]),
        &b in pixels.slice(s![1.., ..]),
        &ca in c.slice(s![..-1, ..]),
        &cb in c.slice(s![1.., ..]),
    ) {
        *f = 0.5 * step * (ca + cb) * (b - a);
    });

    pixels
        .slice_mut(s![.., ..-1])
        .zip_mut_with(&horizontal, |v, &f| *v += f);
    pixels
        .slice_mut(s![.., 1..])
        .zip_mut_with(&horizontal, |v, &f| *v -= f);
    pixels
        .slice_mut(s![..-1, ..])
        .zip_mut_with(&vertical, |v, &f| *v += f);
    pixels
        .slice_mut(s![1.., ..])
        .zip_mut_with(&vertical, |v, &f| *v -= f);
}
