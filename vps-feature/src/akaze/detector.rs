use super::image::{scharr_x, scharr_y, FloatImage};
use super::scale_space::Evolution;
use super::{Akaze, Candidate};
use log::*;
use ndarray::{azip, Array2};
use rayon::prelude::*;
use std::f32::consts::{FRAC_PI_3, TAU};

/// Extrema closer to the border than this many scale units cannot be described.
const DESCRIPTOR_REACH: f32 = 14.142_136;

impl Akaze {
    /// Integer scale of the derivative filters of a level.
    fn sigma_size(&self, evolution: &Evolution) -> u32 {
        (evolution.sigma * self.derivative_factor / f64::from(evolution.ratio())).round() as u32
    }

    /// Computes the first derivatives and the Hessian response of every level.
    pub(crate) fn detector_response(&self, evolutions: &mut [Evolution]) {
        evolutions.par_iter_mut().for_each(|evolution| {
            let sigma_size = self.sigma_size(evolution);
            let smooth = &evolution.smooth;
            let (lx, ly) = rayon::join(
                || scharr_x(smooth, sigma_size),
                || scharr_y(smooth, sigma_size),
            );
            let (lxx, (lyy, lxy)) = rayon::join(
                || scharr_x(&lx, sigma_size),
                || {
                    rayon::join(
                        || scharr_y(&ly, sigma_size),
                        || scharr_y(&lx, sigma_size),
                    )
                },
            );
            let normalization = (sigma_size as f32).powi(4);
            let mut response = Array2::<f32>::zeros(lxx.view().dim());
            azip!((
                r in &mut response,
                &xx in lxx.view(),
                &yy in lyy.view(),
                &xy in lxy.view(),
            ) {
                *r = (xx * yy - xy * xy) * normalization;
            });
            evolution.response = FloatImage::from_array2(response);
            evolution.lx = lx;
            evolution.ly = ly;
        });
    }

    /// Finds, refines and orients keypoints in a scale space with computed responses.
    pub(crate) fn detect_keypoints(&self, evolutions: &[Evolution]) -> Vec<Candidate> {
        let extrema = self.scale_space_extrema(evolutions);
        let refined: Vec<Candidate> = extrema
            .iter()
            .filter_map(|candidate| refine(candidate, evolutions))
            .collect();
        debug!(
            "{} of {} extrema kept after subpixel refinement",
            refined.len(),
            extrema.len()
        );
        refined
            .into_iter()
            .map(|candidate| Candidate {
                angle: orientation(&candidate, evolutions),
                ..candidate
            })
            .collect()
    }

    /// Local maxima of the response above the threshold, with non-maximum suppression
    /// against the same and the neighbouring levels.
    fn scale_space_extrema(&self, evolutions: &[Evolution]) -> Vec<Candidate> {
        let threshold = self.detector_threshold as f32;
        let mut found: Vec<Candidate> = vec![];
        for (level, evolution) in evolutions.iter().enumerate() {
            let response = &evolution.response;
            let (width, height) = (response.width(), response.height());
            let values = response.as_raw();
            let ratio = evolution.ratio();
            let size = (evolution.sigma * self.derivative_factor) as f32;
            let reach = DESCRIPTOR_REACH * (size / ratio).round();

            for y in 1..height - 1 {
                for x in 1..width - 1 {
                    let ix = y * width + x;
                    let value = values[ix];
                    if value <= threshold
                        || value <= values[ix - 1]
                        || value <= values[ix + 1]
                        || value <= values[ix - width]
                        || value <= values[ix + width]
                    {
                        continue;
                    }

                    let (px, py) = (x as f32 * ratio, y as f32 * ratio);
                    let mut replaces = None;
                    let mut suppressed = false;
                    for (other_ix, other) in found.iter().enumerate() {
                        if other.level != level && other.level + 1 != level {
                            continue;
                        }
                        let distance2 = (px - other.x).powi(2) + (py - other.y).powi(2);
                        if distance2 <= size * size {
                            if value > other.response {
                                replaces = Some(other_ix);
                            } else {
                                suppressed = true;
                            }
                            break;
                        }
                    }
                    if suppressed {
                        continue;
                    }

                    let (fx, fy) = (x as f32, y as f32);
                    if (fx - reach).round() - 1.0 < 0.0
                        || (fx + reach).round() + 1.0 >= width as f32
                        || (fy - reach).round() - 1.0 < 0.0
                        || (fy + reach).round() + 1.0 >= height as f32
                    {
                        continue;
                    }
                    let candidate = Candidate {
                        x: px + 0.5 * (ratio - 1.0),
                        y: py + 0.5 * (ratio - 1.0),
                        response: value.abs(),
                        size,
                        angle: 0.0,
                        octave: evolution.octave,
                        level,
                    };
                    match replaces {
                        Some(other_ix) => found[other_ix] = candidate,
                        None => found.push(candidate),
                    }
                }
            }
        }

        // Drop extrema repeated by the next level up.
        let kept: Vec<Candidate> = found
            .iter()
            .filter(|candidate| {
                !found.iter().any(|other| {
                    other.level == candidate.level + 1
                        && (candidate.x - other.x).powi(2) + (candidate.y - other.y).powi(2)
                            <= candidate.size * candidate.size
                })
            })
            .copied()
            .collect();
        trace!("{} scale space extrema", kept.len());
        kept
    }
}

/// Moves a candidate to the peak of the quadratic fitted to its 3x3 response neighbourhood.
///
/// Returns `None` when the peak lies more than a pixel away or the fit is degenerate.
fn refine(candidate: &Candidate, evolutions: &[Evolution]) -> Option<Candidate> {
    let evolution = &evolutions[candidate.level];
    let ratio = evolution.ratio();
    let x = (candidate.x / ratio).round() as usize;
    let y = (candidate.y / ratio).round() as usize;
    let at = |x: usize, y: usize| evolution.response.get(x, y);

    let center = at(x, y);
    let dx = 0.5 * (at(x + 1, y) - at(x - 1, y));
    let dy = 0.5 * (at(x, y + 1) - at(x, y - 1));
    let dxx = at(x + 1, y) + at(x - 1, y) - 2.0 * center;
    let dyy = at(x, y + 1) + at(x, y - 1) - 2.0 * center;
    let dxy = 0.25 * (at(x + 1, y + 1) + at(x - 1, y - 1) - at(x + 1, y - 1) - at(x - 1, y + 1));
    let det = dxx * dyy - dxy * dxy;
    let offset_x = -(dyy * dx - dxy * dy) / det;
    let offset_y = -(dxx * dy - dxy * dx) / det;
    // NaN offsets fail both comparisons.
    if !(offset_x.abs() <= 1.0 && offset_y.abs() <= 1.0) {
        return None;
    }
    Some(Candidate {
        x: (x as f32 + offset_x) * ratio + 0.5 * (ratio - 1.0),
        y: (y as f32 + offset_y) * ratio + 0.5 * (ratio - 1.0),
        ..*candidate
    })
}

/// Weight of the orientation window, a Gaussian with sigma 2.5 sample steps.
fn orientation_weight(i: i32, j: i32) -> f32 {
    let variance2 = 2.0 * 2.5 * 2.5;
    (-((i * i + j * j) as f32) / variance2).exp() / (std::f32::consts::PI * variance2)
}

fn in_window(angle: f32, start: f32, end: f32) -> bool {
    if end <= TAU {
        start < angle && angle < end
    } else {
        angle > start || angle < end - TAU
    }
}

/// Dominant gradient direction around a keypoint, in `[0, 2π)`.
///
/// Gradients sampled within six scale units are summed over a sliding `π/3` window. The
/// window with the longest sum gives the direction.
fn orientation(candidate: &Candidate, evolutions: &[Evolution]) -> f32 {
    let evolution = &evolutions[candidate.level];
    let ratio = evolution.ratio();
    let step = (0.5 * candidate.size / ratio).round();
    let (xf, yf) = (candidate.x / ratio, candidate.y / ratio);
    let samples: Vec<(f32, f32, f32)> = (-6..=6)
        .flat_map(|i| (-6..=6).map(move |j| (i, j)))
        .filter(|&(i, j)| i * i + j * j < 36)
        .map(|(i, j)| {
            let x = (xf + i as f32 * step).round() as usize;
            let y = (yf + j as f32 * step).round() as usize;
            let weight = orientation_weight(i, j);
            let gx = weight * evolution.lx.get(x, y);
            let gy = weight * evolution.ly.get(x, y);
            (gx, gy, gy.atan2(gx).rem_euclid(TAU))
        })
        .collect();

    let mut longest = 0.0;
    let mut angle = 0.0;
    let mut start = 0.0f32;
    while start < TAU {
        let end = start + FRAC_PI_3;
        let (sum_x, sum_y) = samples
            .iter()
            .filter(|sample| in_window(sample.2, start, end))
            .fold((0.0, 0.0), |(sx, sy), sample| (sx + sample.0, sy + sample.1));
        let length = sum_x * sum_x + sum_y * sum_y;
        if length > longest {
            longest = length;
            angle = f32::atan2(sum_y, sum_x).rem_euclid(TAU);
        }
        start += 0.15;
    }
    angle
}
