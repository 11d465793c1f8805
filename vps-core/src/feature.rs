use crate::{FeatureError, KeyPoint};
use image::{DynamicImage, GenericImageView};

/// Keypoints and their descriptors, index aligned.
///
/// `descriptors()[i]` describes the patch around `keypoints()[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Features<D> {
    keypoints: Vec<KeyPoint>,
    descriptors: Vec<D>,
}

impl<D> Features<D> {
    /// Pairs up keypoints with their descriptors.
    ///
    /// # Panics
    ///
    /// Panics if the two vectors differ in length. An extractor producing unaligned output
    /// is a programming error, not a runtime condition.
    pub fn new(keypoints: Vec<KeyPoint>, descriptors: Vec<D>) -> Self {
        assert_eq!(
            keypoints.len(),
            descriptors.len(),
            "every keypoint needs exactly one descriptor"
        );
        Self {
            keypoints,
            descriptors,
        }
    }

    /// A feature set with no features, the legitimate result for textureless images.
    pub fn empty() -> Self {
        Self {
            keypoints: Vec::new(),
            descriptors: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    pub fn keypoints(&self) -> &[KeyPoint] {
        &self.keypoints
    }

    pub fn descriptors(&self) -> &[D] {
        &self.descriptors
    }

    /// Iterates over `(keypoint, descriptor)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&KeyPoint, &D)> + '_ {
        self.keypoints.iter().zip(self.descriptors.iter())
    }

    pub fn into_parts(self) -> (Vec<KeyPoint>, Vec<D>) {
        (self.keypoints, self.descriptors)
    }
}

impl<D> Default for Features<D> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Detects keypoints on a single image and describes each of them.
///
/// Implementations must accept images of any content. An image without texture may
/// produce zero features and that is not an error. An image with zero width or height
/// must be rejected with [`FeatureError::EmptyImage`].
pub trait FeatureExtractor {
    /// The descriptor produced for every keypoint.
    type Descriptor;

    fn extract(&self, image: &DynamicImage) -> Result<Features<Self::Descriptor>, FeatureError>;
}

impl<T> FeatureExtractor for &T
where
    T: FeatureExtractor + ?Sized,
{
    type Descriptor = T::Descriptor;

    fn extract(&self, image: &DynamicImage) -> Result<Features<Self::Descriptor>, FeatureError> {
        (**self).extract(image)
    }
}

/// Checks that an image has at least one pixel.
pub fn check_extent(image: &DynamicImage) -> Result<(), FeatureError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        Err(FeatureError::EmptyImage { width, height })
    } else {
        Ok(())
    }
}
