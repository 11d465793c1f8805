use derive_more::{Deref, DerefMut};
use image::{GrayImage, ImageBuffer, Luma};
use ndarray::{azip, s, Array2, ArrayView2, ArrayViewMut2};
use nshare::{MutNdarray2, RefNdarray2};
use wide::f32x4;

type FloatBuffer = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Single channel `f32` image the scale space is built from, with intensities in `[0, 1]`.
///
/// Filters run over the raw row-major buffer. Pixelwise arithmetic goes through `ndarray`
/// views, which are `(row, column)` indexed.
#[derive(Debug, Clone, Deref, DerefMut)]
pub struct FloatImage(FloatBuffer);

impl FloatImage {
    pub fn new(width: usize, height: usize) -> Self {
        Self(FloatBuffer::new(width as u32, height as u32))
    }

    pub fn from_luma(image: &GrayImage) -> Self {
        let data = image
            .as_raw()
            .iter()
            .map(|&value| f32::from(value) / 255.0)
            .collect();
        Self::from_raw(image.width() as usize, image.height() as usize, data)
    }

    pub fn from_raw(width: usize, height: usize, data: Vec<f32>) -> Self {
        Self(
            FloatBuffer::from_raw(width as u32, height as u32, data)
                .expect("pixel buffer length must be width * height"),
        )
    }

    pub fn from_array2(array: Array2<f32>) -> Self {
        let (height, width) = array.dim();
        let data = if array.is_standard_layout() {
            array.into_raw_vec()
        } else {
            array.iter().copied().collect()
        };
        Self::from_raw(width, height, data)
    }

    pub fn view(&self) -> ArrayView2<f32> {
        self.0.ref_ndarray2()
    }

    pub fn view_mut(&mut self) -> ArrayViewMut2<f32> {
        self.0.mut_ndarray2()
    }

    pub fn width(&self) -> usize {
        self.0.width() as usize
    }

    pub fn height(&self) -> usize {
        self.0.height() as usize
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.0.as_raw()[y * self.width() + x]
    }

    /// Averages 2x2 blocks. An odd trailing row or column is dropped.
    pub fn half_size(&self) -> Self {
        let (width, height) = (self.width() / 2, self.height() / 2);
        let mut half = Array2::<f32>::zeros((height, width));
        azip!((
            out in &mut half,
            block in self.view().slice(s![..height * 2, ..width * 2]).exact_chunks((2, 2)),
        ) {
            *out = block.sum() * 0.25;
        });
        Self::from_array2(half)
    }
}

/// Splits a kernel into SIMD lanes, zero padding the last one.
fn lanes(kernel: &[f32]) -> Vec<f32x4> {
    kernel
        .chunks(4)
        .map(|chunk| {
            let mut lane = [0.0; 4];
            lane[..chunk.len()].copy_from_slice(chunk);
            f32x4::new(lane)
        })
        .collect()
}

fn dot(window: &[f32], lanes: &[f32x4]) -> f32 {
    window
        .chunks_exact(4)
        .zip(lanes)
        .fold(f32x4::splat(0.0), |acc, (chunk, &lane)| {
            f32x4::new([chunk[0], chunk[1], chunk[2], chunk[3]]).mul_add(lane, acc)
        })
        .reduce_add()
}

/// Correlates every row with `kernel`, replicating border pixels.
pub fn horizontal_filter(image: &FloatImage, kernel: &[f32]) -> FloatImage {
    debug_assert!(kernel.len() % 2 == 1);
    let (width, height) = (image.width(), image.height());
    let half = kernel.len() / 2;
    let lanes = lanes(kernel);
    let taps = lanes.len() * 4;
    let extended = width + 2 * half;
    let mut padded = vec![0.0; width + taps - 1];
    let mut output = Vec::with_capacity(width * height);
    for row in image.as_raw().chunks_exact(width) {
        for (ix, value) in padded.iter_mut().take(extended).enumerate() {
            *value = row[ix.saturating_sub(half).min(width - 1)];
        }
        output.extend(padded.windows(taps).map(|window| dot(window, &lanes)));
    }
    FloatImage::from_raw(width, height, output)
}

/// Correlates every column with `kernel`, replicating border pixels.
///
/// Whole rows are accumulated at a time so that memory is walked in order.
pub fn vertical_filter(image: &FloatImage, kernel: &[f32]) -> FloatImage {
    debug_assert!(kernel.len() % 2 == 1);
    let (width, height) = (image.width(), image.height());
    let half = kernel.len() / 2;
    let rows: Vec<&[f32]> = image.as_raw().chunks_exact(width).collect();
    let mut output = vec![0.0; width * height];
    for (y, out) in output.chunks_exact_mut(width).enumerate() {
        for (k, &weight) in kernel.iter().enumerate() {
            let source = rows[(y + k).saturating_sub(half).min(height - 1)];
            for (out, &value) in out.iter_mut().zip(source) {
                *out += weight * value;
            }
        }
    }
    FloatImage::from_raw(width, height, output)
}

pub fn separable_filter(image: &FloatImage, horizontal: &[f32], vertical: &[f32]) -> FloatImage {
    vertical_filter(&horizontal_filter(image, horizontal), vertical)
}

/// Normalized Gaussian kernel with `size` (odd) taps.
pub fn gaussian_kernel(sigma: f32, size: usize) -> Vec<f32> {
    assert!(size % 2 == 1, "kernel size must be odd");
    let center = (size / 2) as f32;
    let mut kernel: Vec<f32> = (0..size)
        .map(|ix| {
            let x = ix as f32 - center;
            (-x * x / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    for value in &mut kernel {
        *value /= sum;
    }
    kernel
}

/// Gaussian blur with a kernel reaching out to two standard deviations.
pub fn gaussian_blur(image: &FloatImage, sigma: f32) -> FloatImage {
    debug_assert!(sigma > 0.0);
    let radius = (2.0 * sigma).ceil() as usize;
    let kernel = gaussian_kernel(sigma, 2 * radius + 1);
    separable_filter(image, &kernel, &kernel)
}

/// Derivative and smoothing kernels of the Scharr operator at an integer scale.
///
/// At scale 1 this is the plain (unnormalized) 3x3 Scharr operator.
fn scharr_kernels(sigma_size: u32) -> (Vec<f32>, Vec<f32>) {
    if sigma_size <= 1 {
        return (vec![-1.0, 0.0, 1.0], vec![3.0, 10.0, 3.0]);
    }
    let size = 2 * sigma_size as usize + 1;
    let w = 10.0 / 3.0;
    let norm = (1.0 / (2.0 * f64::from(sigma_size) * (w + 2.0))) as f32;
    let mut derivative = vec![0.0; size];
    derivative[0] = -1.0;
    derivative[size - 1] = 1.0;
    let mut smoothing = vec![0.0; size];
    smoothing[0] = norm;
    smoothing[size / 2] = norm * w as f32;
    smoothing[size - 1] = norm;
    (derivative, smoothing)
}

pub fn scharr_x(image: &FloatImage, sigma_size: u32) -> FloatImage {
    let (derivative, smoothing) = scharr_kernels(sigma_size);
    separable_filter(image, &derivative, &smoothing)
}

pub fn scharr_y(image: &FloatImage, sigma_size: u32) -> FloatImage {
    let (derivative, smoothing) = scharr_kernels(sigma_size);
    separable_filter(image, &smoothing, &derivative)
}

#[cfg(test)]
mod test {
    use super::*;

    fn pattern(width: usize, height: usize) -> FloatImage {
        let data = (0..width * height)
            .map(|ix| ((ix % width) * 7 + (ix / width) * 13) % 17)
            .map(|value| value as f32 / 17.0)
            .collect();
        FloatImage::from_raw(width, height, data)
    }

    #[test]
    fn gaussian_kernel_values() {
        let kernel = gaussian_kernel(3.0, 7);
        let expected = [
            0.1062_8852,
            0.1403_2133,
            0.1657_7007,
            0.1752_4014,
            0.1657_7007,
            0.1403_2133,
            0.1062_8852,
        ];
        for (&actual, &expected) in kernel.iter().zip(&expected) {
            assert!((actual - expected).abs() < 1e-4);
        }
    }

    #[test]
    fn filters_agree_with_imageproc() {
        let image = pattern(23, 19);
        let kernel = gaussian_kernel(1.5, 7);
        let ours = horizontal_filter(&image, &kernel);
        let theirs = imageproc::filter::horizontal_filter(&*image, &kernel);
        for (a, b) in ours.as_raw().iter().zip(theirs.as_raw()) {
            assert!((a - b).abs() < 1e-4, "horizontal {} != {}", a, b);
        }
        let ours = vertical_filter(&image, &kernel);
        let theirs = imageproc::filter::vertical_filter(&*image, &kernel);
        for (a, b) in ours.as_raw().iter().zip(theirs.as_raw()) {
            assert!((a - b).abs() < 1e-4, "vertical {} != {}", a, b);
        }
    }

    #[test]
    fn blur_keeps_constant_images() {
        let image = FloatImage::from_raw(12, 9, vec![0.25; 12 * 9]);
        let blurred = gaussian_blur(&image, 1.6);
        assert!(blurred.as_raw().iter().all(|&v| (v - 0.25).abs() < 1e-5));
    }

    #[test]
    fn scharr_on_a_ramp() {
        let data = (0..10 * 10).map(|ix| (ix % 10) as f32 * 0.1).collect();
        let ramp = FloatImage::from_raw(10, 10, data);
        // Normalized kernels measure the slope itself.
        let dx = scharr_x(&ramp, 2);
        let dy = scharr_y(&ramp, 2);
        assert!((dx.get(5, 5) - 0.1).abs() < 1e-5);
        assert!(dy.get(5, 5).abs() < 1e-5);
    }

    #[test]
    fn half_size_averages_blocks() {
        let image = FloatImage::from_raw(5, 3, (0..15).map(|v| v as f32).collect());
        let half = image.half_size();
        assert_eq!((half.width(), half.height()), (2, 1));
        assert_eq!(half.as_raw(), &vec![3.0, 5.0]);
    }
}
