use crate::{Deadline, ProviderError};
use core::fmt;
use image::DynamicImage;
use log::*;
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// How far from the query point (in meters) a reference image may be taken when no radius is given.
pub const DEFAULT_SEARCH_RADIUS: f64 = 50.0;

/// A WGS84 position in degrees.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// The direction towards `other` in degrees clockwise from north, in `(-180, 180]`.
    ///
    /// This is `atan2(Δlon, Δlat)` on raw degrees, which treats the neighbourhood of `self`
    /// as a flat grid. It ignores the shrinking of longitude degrees away from the equator
    /// and is wrong across the anti-meridian, so it is only an approximation for points a
    /// few meters apart at moderate latitudes.
    pub fn bearing_to(&self, other: &GeoPoint) -> f64 {
        let d_lon = other.longitude - self.longitude;
        let d_lat = other.latitude - self.latitude;
        d_lon.atan2(d_lat).to_degrees()
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.7}, {:.7})", self.latitude, self.longitude)
    }
}

/// Where the camera is believed to be.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct QueryLocation {
    pub point: GeoPoint,
    /// Camera heading in degrees clockwise from north, if known.
    pub heading: Option<f64>,
    /// Search radius in meters.
    pub radius: f64,
}

impl QueryLocation {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            point: GeoPoint::new(latitude, longitude),
            heading: None,
            radius: DEFAULT_SEARCH_RADIUS,
        }
    }

    pub fn heading(self, heading: f64) -> Self {
        Self {
            heading: Some(heading),
            ..self
        }
    }

    pub fn radius(self, radius: f64) -> Self {
        Self { radius, ..self }
    }
}

/// Metadata as reported by the reference imagery service.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct ProviderMetadata {
    pub available: bool,
    /// Where the reference image was actually taken, which may differ from the query point.
    pub location: GeoPoint,
    pub reference_id: String,
    /// Heading of the reference image in degrees, if the service reports one.
    pub heading: Option<f64>,
}

impl ProviderMetadata {
    pub fn available(location: GeoPoint, reference_id: impl Into<String>) -> Self {
        Self {
            available: true,
            location,
            reference_id: reference_id.into(),
            heading: None,
        }
    }

    /// The service has no imagery near `location`.
    pub fn unavailable(location: GeoPoint) -> Self {
        Self {
            available: false,
            location,
            reference_id: String::new(),
            heading: None,
        }
    }

    pub fn heading(self, heading: f64) -> Self {
        Self {
            heading: Some(heading),
            ..self
        }
    }
}

/// Where a [`ReferenceMetadata::heading`] came from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub enum HeadingSource {
    /// Reported by the service.
    Service,
    /// Approximated by [`GeoPoint::bearing_to`] from the query point to the reference location.
    Bearing,
}

/// Metadata of an available reference image with its heading resolved.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct ReferenceMetadata {
    pub location: GeoPoint,
    /// Accepted exactly as the service supplied it.
    pub reference_id: String,
    pub heading: f64,
    pub heading_source: HeadingSource,
}

impl ReferenceMetadata {
    /// Resolves service metadata for a query, `None` if no reference is available.
    pub fn resolve(query: &QueryLocation, metadata: ProviderMetadata) -> Option<Self> {
        if !metadata.available {
            return None;
        }
        let (heading, heading_source) = match metadata.heading {
            Some(heading) => (heading, HeadingSource::Service),
            None => {
                let heading = query.point.bearing_to(&metadata.location);
                debug!(
                    "no heading for reference {:?}, approximated {:.2} degrees from the bearing",
                    metadata.reference_id, heading
                );
                (heading, HeadingSource::Bearing)
            }
        };
        Some(Self {
            location: metadata.location,
            reference_id: metadata.reference_id,
            heading,
            heading_source,
        })
    }
}

/// A fetched reference image and its metadata.
#[derive(Debug, Clone)]
pub struct Reference {
    pub metadata: ReferenceMetadata,
    pub image: DynamicImage,
}

/// Supplies geolocated reference images, typically from a street-level imagery service.
///
/// Both calls may block. Implementations should give up once the [`Deadline`] expires:
/// [`ProviderError::Timeout`] for metadata, `None` for images.
pub trait ReferenceImageProvider {
    fn query_metadata(
        &self,
        location: &QueryLocation,
        deadline: &Deadline,
    ) -> Result<ProviderMetadata, ProviderError>;

    /// Returns `None` on any transport or decode failure.
    fn fetch_image(&self, metadata: &ReferenceMetadata, deadline: &Deadline)
        -> Option<DynamicImage>;
}

impl<T> ReferenceImageProvider for &T
where
    T: ReferenceImageProvider + ?Sized,
{
    fn query_metadata(
        &self,
        location: &QueryLocation,
        deadline: &Deadline,
    ) -> Result<ProviderMetadata, ProviderError> {
        (**self).query_metadata(location, deadline)
    }

    fn fetch_image(
        &self,
        metadata: &ReferenceMetadata,
        deadline: &Deadline,
    ) -> Option<DynamicImage> {
        (**self).fetch_image(metadata, deadline)
    }
}

/// Serves one fixed answer from memory.
///
/// Useful when the reference image is already at hand and for testing. The number of calls
/// of each kind is counted.
#[derive(Debug)]
pub struct StaticProvider {
    metadata: Result<ProviderMetadata, ProviderError>,
    image: Option<DynamicImage>,
    metadata_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl StaticProvider {
    pub fn new(metadata: ProviderMetadata, image: Option<DynamicImage>) -> Self {
        Self {
            metadata: Ok(metadata),
            image,
            metadata_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
        }
    }

    /// Answers every metadata request with `error`.
    pub fn failing(error: ProviderError) -> Self {
        Self {
            metadata: Err(error),
            image: None,
            metadata_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
        }
    }

    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

impl ReferenceImageProvider for StaticProvider {
    fn query_metadata(
        &self,
        _: &QueryLocation,
        deadline: &Deadline,
    ) -> Result<ProviderMetadata, ProviderError> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        if deadline.is_expired() {
            return Err(ProviderError::Timeout);
        }
        self.metadata.clone()
    }

    fn fetch_image(&self, _: &ReferenceMetadata, deadline: &Deadline) -> Option<DynamicImage> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if deadline.is_expired() {
            return None;
        }
        self.image.clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn bearing_points_clockwise_from_north() {
        let origin = GeoPoint::new(41.39, 2.19);
        let offsets = [
            ((0.001, 0.0), 0.0),
            ((0.0, 0.001), 90.0),
            ((-0.001, 0.0), 180.0),
            ((0.0, -0.001), -90.0),
            ((0.001, 0.001), 45.0),
        ];
        for ((d_lat, d_lon), expected) in offsets {
            let other = GeoPoint::new(origin.latitude + d_lat, origin.longitude + d_lon);
            assert_relative_eq!(origin.bearing_to(&other), expected, epsilon = 1e-6);
        }
    }

    #[test]
    fn service_heading_wins() {
        let query = QueryLocation::new(41.39, 2.19);
        let metadata =
            ProviderMetadata::available(GeoPoint::new(41.3901, 2.19), "pano").heading(123.0);
        let resolved = ReferenceMetadata::resolve(&query, metadata).unwrap();
        assert_eq!(resolved.heading, 123.0);
        assert_eq!(resolved.heading_source, HeadingSource::Service);
        assert_eq!(resolved.reference_id, "pano");
    }

    #[test]
    fn missing_heading_falls_back_to_bearing() {
        let query = QueryLocation::new(41.39, 2.19);
        let metadata = ProviderMetadata::available(GeoPoint::new(41.39, 2.1901), "");
        let resolved = ReferenceMetadata::resolve(&query, metadata).unwrap();
        assert_relative_eq!(resolved.heading, 90.0, epsilon = 1e-6);
        assert_eq!(resolved.heading_source, HeadingSource::Bearing);
    }

    #[test]
    fn unavailable_does_not_resolve() {
        let query = QueryLocation::new(0.0, 0.0);
        let metadata = ProviderMetadata::unavailable(query.point);
        assert_eq!(ReferenceMetadata::resolve(&query, metadata), None);
    }

    #[test]
    fn static_provider_counts_calls() {
        let provider = StaticProvider::new(
            ProviderMetadata::available(GeoPoint::new(1.0, 2.0), "id"),
            Some(DynamicImage::new_luma8(8, 8)),
        );
        let query = QueryLocation::new(1.0, 2.0);
        let deadline = Deadline::none();
        let metadata = provider.query_metadata(&query, &deadline).unwrap();
        let metadata = ReferenceMetadata::resolve(&query, metadata).unwrap();
        assert!(provider.fetch_image(&metadata, &deadline).is_some());
        assert!(provider.fetch_image(&metadata, &deadline).is_some());
        assert_eq!(provider.metadata_calls(), 1);
        assert_eq!(provider.fetch_calls(), 2);
    }

    #[test]
    fn static_provider_honours_the_deadline() {
        let provider = StaticProvider::new(
            ProviderMetadata::available(GeoPoint::new(1.0, 2.0), "id"),
            None,
        );
        let deadline = Deadline::none();
        deadline.token().cancel();
        assert_eq!(
            provider.query_metadata(&QueryLocation::new(1.0, 2.0), &deadline),
            Err(ProviderError::Timeout)
        );
    }
}
