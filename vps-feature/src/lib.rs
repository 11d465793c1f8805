//! Feature extraction and matching strategies.
//!
//! * [`AkazeExtractor`] - [`Akaze`] keypoints with 486-bit binary descriptors
//! * [`RatioMatcher`] - exact two-nearest-neighbour search with Lowe's ratio test
//! * [`render_matches`] - side-by-side rendering of accepted correspondences

pub mod akaze;
mod draw;
mod extract;
mod matching;

pub use akaze::Akaze;
pub use draw::*;
pub use extract::*;
pub use matching::*;

pub use bitarray;

/// The descriptor produced by [`AkazeExtractor`].
pub type Descriptor = bitarray::BitArray<64>;
