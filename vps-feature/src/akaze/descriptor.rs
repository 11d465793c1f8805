use super::scale_space::Evolution;
use super::{Akaze, Candidate};
use crate::Descriptor;
use rayon::prelude::*;

/// Cell sizes of the three M-LDB grids as fractions of the pattern size (2x2, 3x3 and 4x4).
const GRID_FRACTIONS: [f32; 3] = [1.0, 2.0 / 3.0, 0.5];

impl Akaze {
    /// Computes the M-LDB descriptor of every candidate.
    ///
    /// Candidates whose sampling pattern leaves their level are dropped, so the two returned
    /// vectors stay index aligned.
    pub(crate) fn describe(
        &self,
        evolutions: &[Evolution],
        candidates: Vec<Candidate>,
    ) -> (Vec<Candidate>, Vec<Descriptor>) {
        candidates
            .into_par_iter()
            .filter_map(|candidate| {
                let descriptor = self.mldb(&candidate, evolutions)?;
                Some((candidate, descriptor))
            })
            .unzip()
    }

    /// Rotation invariant M-LDB: pairwise comparisons of cell means of intensity and of
    /// gradients rotated into the keypoint frame, over three grids.
    fn mldb(&self, candidate: &Candidate, evolutions: &[Evolution]) -> Option<Descriptor> {
        let evolution = &evolutions[candidate.level];
        let ratio = evolution.ratio();
        let patch = Patch {
            evolution,
            x: candidate.x / ratio,
            y: candidate.y / ratio,
            cos: candidate.angle.cos(),
            sin: candidate.angle.sin(),
            scale: (0.5 * candidate.size / ratio).round(),
            channels: self.descriptor_channels.clamp(1, 3),
        };
        let pattern = self.descriptor_pattern_size as i32;

        let mut descriptor = Descriptor::zeros();
        let bytes = descriptor.bytes_mut();
        let mut bit = 0;
        for &fraction in &GRID_FRACTIONS {
            let step = (self.descriptor_pattern_size as f32 * fraction).ceil() as usize;
            let cells = patch.cells(pattern, step)?;
            for channel in 0..patch.channels {
                for (i, a) in cells.iter().enumerate() {
                    for b in &cells[i + 1..] {
                        if a[channel] > b[channel] {
                            bytes[bit / 8] |= 1 << (bit % 8);
                        }
                        bit += 1;
                    }
                }
            }
        }
        Some(descriptor)
    }
}

/// The oriented sampling frame of one keypoint, in the pixels of its level.
struct Patch<'a> {
    evolution: &'a Evolution,
    x: f32,
    y: f32,
    cos: f32,
    sin: f32,
    scale: f32,
    channels: usize,
}

impl Patch<'_> {
    /// Averages each `step` x `step` cell of the `2 * pattern` wide grid.
    ///
    /// Every cell holds the mean intensity followed by, depending on the channel count,
    /// the mean gradient magnitude or the mean rotated gradient.
    fn cells(&self, pattern: i32, step: usize) -> Option<Vec<[f32; 3]>> {
        let image = &self.evolution.image;
        let (width, height) = (image.width() as f32, image.height() as f32);
        let mut cells = vec![];
        for i in (-pattern..pattern).step_by(step) {
            for j in (-pattern..pattern).step_by(step) {
                let mut sum = [0f32; 3];
                let mut samples = 0;
                for k in i..i + step as i32 {
                    for l in j..j + step as i32 {
                        let (k, l) = (k as f32, l as f32);
                        let x = (self.x + self.scale * (k * self.cos - l * self.sin)).round();
                        let y = (self.y + self.scale * (l * self.cos + k * self.sin)).round();
                        if !(x >= 0.0 && y >= 0.0 && x < width && y < height) {
                            return None;
                        }
                        let (x, y) = (x as usize, y as usize);
                        sum[0] += image.get(x, y);
                        let gx = self.evolution.lx.get(x, y);
                        let gy = self.evolution.ly.get(x, y);
                        match self.channels {
                            2 => sum[1] += gx.hypot(gy),
                            3 => {
                                sum[1] += gy * self.cos - gx * self.sin;
                                sum[2] += gx * self.cos + gy * self.sin;
                            }
                            _ => {}
                        }
                        samples += 1;
                    }
                }
                cells.push(sum.map(|total| total / samples as f32));
            }
        }
        Some(cells)
    }
}
