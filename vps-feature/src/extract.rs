use crate::{Akaze, Descriptor};
use image::{DynamicImage, GenericImageView, GrayImage};
use log::*;
use std::borrow::Cow;
use vps_core::{check_extent, FeatureError, FeatureExtractor, Features};

/// Returns the 8-bit intensity version of an image.
///
/// 8-bit grayscale images are borrowed unchanged, everything else is converted.
pub fn to_luma(image: &DynamicImage) -> Cow<'_, GrayImage> {
    match image {
        DynamicImage::ImageLuma8(gray) => Cow::Borrowed(gray),
        other => Cow::Owned(other.to_luma8()),
    }
}

/// [`FeatureExtractor`] backed by the AKAZE detector and its binary descriptor.
///
/// The most important parameter is the detector threshold, see [`Akaze::new`].
#[derive(Debug, Copy, Clone, Default)]
pub struct AkazeExtractor {
    pub akaze: Akaze,
}

impl AkazeExtractor {
    pub fn new(threshold: f64) -> Self {
        Self {
            akaze: Akaze::new(threshold),
        }
    }

    /// Uses a threshold of `0.01`, detecting fewer but stronger features.
    pub fn sparse() -> Self {
        Self {
            akaze: Akaze::sparse(),
        }
    }

    /// Uses a threshold of `0.0001`, detecting many weak features.
    pub fn dense() -> Self {
        Self {
            akaze: Akaze::dense(),
        }
    }
}

impl From<Akaze> for AkazeExtractor {
    fn from(akaze: Akaze) -> Self {
        Self { akaze }
    }
}

impl FeatureExtractor for AkazeExtractor {
    type Descriptor = Descriptor;

    fn extract(&self, image: &DynamicImage) -> Result<Features<Descriptor>, FeatureError> {
        check_extent(image)?;
        let (width, height) = image.dimensions();
        let (keypoints, descriptors) = self.akaze.extract(&to_luma(image));
        debug!(
            "extracted {} features from {}x{} image",
            keypoints.len(),
            width,
            height
        );
        Ok(Features::new(keypoints, descriptors))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use image::{GrayImage, Luma, RgbImage};

    #[test]
    fn gray_is_borrowed() {
        let gray = DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, Luma([9])));
        assert!(matches!(to_luma(&gray), Cow::Borrowed(_)));
        let color = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, image::Rgb([9, 9, 9])));
        let converted = to_luma(&color);
        assert!(matches!(converted, Cow::Owned(_)));
        assert_eq!(converted.dimensions(), (4, 4));
        assert_eq!(converted.get_pixel(1, 2), &Luma([9]));
    }

    #[test]
    fn empty_image_is_invalid() {
        let result = AkazeExtractor::default().extract(&DynamicImage::new_rgb8(0, 0));
        assert_eq!(
            result.unwrap_err(),
            FeatureError::EmptyImage {
                width: 0,
                height: 0
            }
        );
    }

    #[test]
    fn tiny_image_has_no_features() {
        let features = AkazeExtractor::default()
            .extract(&DynamicImage::new_luma8(16, 300))
            .unwrap();
        assert!(features.is_empty());
    }

    #[test]
    fn textureless_image_has_no_features() {
        let flat = DynamicImage::ImageLuma8(GrayImage::from_pixel(96, 96, Luma([128])));
        let features = AkazeExtractor::default().extract(&flat).unwrap();
        assert!(features.is_empty());
    }
}
