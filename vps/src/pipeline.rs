use crate::{
    ConsensusHomography, Deadline, FetchError, ImagePair, MatchError, MatchObserver,
    MatchSettings, QueryLocation, Reference, ReferenceImageProvider, ReferenceMetadata,
    SettingsError, Stage, Timings,
};
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use log::*;
use std::borrow::Cow;
use std::time::Instant;
use vps_core::{
    check_extent, resolve_matches, Correspondence, DescriptorMatcher, FeatureExtractor, Features,
    Homography, HomographyEstimator, PointMatch,
};
use vps_feature::{bitarray::Hamming, AkazeExtractor, RatioMatcher};

/// A successful match.
///
/// The homography maps query points, in the coordinates of the query image resized to the
/// canonical size, onto reference image pixels.
#[derive(Debug, Clone)]
pub struct Matched {
    pub homography: Homography,
    /// Every correspondence accepted by the matcher.
    pub correspondences: Vec<Correspondence>,
    /// The correspondences resolved to points, in the same order.
    pub matches: Vec<PointMatch>,
    /// Indices into `correspondences` that support the homography.
    pub inliers: Vec<usize>,
    /// The reference metadata, absent when the reference image was supplied by the caller.
    pub reference: Option<ReferenceMetadata>,
    pub query_keypoints: usize,
    pub reference_keypoints: usize,
    pub timings: Timings,
}

impl Matched {
    pub fn inlier_correspondences(&self) -> impl Iterator<Item = &Correspondence> + '_ {
        self.inliers.iter().map(move |&ix| &self.correspondences[ix])
    }

    pub fn inlier_ratio(&self) -> f64 {
        if self.correspondences.is_empty() {
            0.0
        } else {
            self.inliers.len() as f64 / self.correspondences.len() as f64
        }
    }
}

fn check_deadline(deadline: &Deadline, stage: Stage) -> Result<(), MatchError> {
    if deadline.is_expired() {
        Err(MatchError::Cancelled { stage })
    } else {
        Ok(())
    }
}

/// Matches camera frames against reference images from a [`ReferenceImageProvider`].
///
/// A match runs these stages, stopping at the first failure:
///
/// 1. the query image is validated
/// 2. a reference image is acquired for the query location (or reused, see below)
/// 3. the query image is resized to the canonical size
/// 4. features are extracted from both images
/// 5. query descriptors are matched against reference descriptors
/// 6. a homography is estimated from the correspondences, unless there are too few
///
/// The most recently acquired reference is cached together with the location it was acquired
/// for. Matching again at exactly that location reuses it; any other location replaces it.
///
/// The extractor, matcher and estimator are interchangeable. [`MatchPipeline::new`] uses AKAZE
/// features, hamming ratio-test matching and ARRSAC.
pub struct MatchPipeline<
    P,
    F = AkazeExtractor,
    M = RatioMatcher<Hamming>,
    E = ConsensusHomography,
> {
    provider: P,
    extractor: F,
    matcher: M,
    estimator: E,
    settings: MatchSettings,
    cache: Option<(QueryLocation, Reference)>,
}

impl<P> MatchPipeline<P>
where
    P: ReferenceImageProvider,
{
    pub fn new(provider: P, settings: MatchSettings) -> Result<Self, SettingsError> {
        let extractor = AkazeExtractor::new(settings.akaze_threshold);
        let matcher = RatioMatcher::hamming()
            .ratio(settings.ratio)
            .symmetric(settings.symmetric_matching);
        let estimator = ConsensusHomography::from_settings(&settings);
        Self::with_strategies(provider, extractor, matcher, estimator, settings)
    }
}

impl<P, F, M, E> MatchPipeline<P, F, M, E>
where
    P: ReferenceImageProvider,
    F: FeatureExtractor + Sync,
    F::Descriptor: Send,
    M: DescriptorMatcher<F::Descriptor>,
    E: HomographyEstimator,
{
    /// Builds a pipeline from any strategies.
    ///
    /// Only the settings that the pipeline itself applies (canonical size, minimum
    /// correspondences and parallel detection) take effect; the strategies are used as given.
    pub fn with_strategies(
        provider: P,
        extractor: F,
        matcher: M,
        estimator: E,
        settings: MatchSettings,
    ) -> Result<Self, SettingsError> {
        settings.validate()?;
        Ok(Self {
            provider,
            extractor,
            matcher,
            estimator,
            settings,
            cache: None,
        })
    }

    pub fn settings(&self) -> &MatchSettings {
        &self.settings
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// The most recently acquired reference, kept for a later pose estimation step.
    pub fn last_reference(&self) -> Option<&Reference> {
        self.cache.as_ref().map(|(_, reference)| reference)
    }

    /// Drops the cached reference unless it was acquired for exactly `location`.
    pub fn set_location(&mut self, location: &QueryLocation) {
        if self.cache.as_ref().map_or(false, |(cached, _)| cached != location) {
            self.invalidate();
        }
    }

    pub fn invalidate(&mut self) {
        self.cache = None;
    }

    /// Matches `query` against the reference image for `location`.
    pub fn match_image(
        &mut self,
        query: &DynamicImage,
        location: &QueryLocation,
        deadline: &Deadline,
    ) -> Result<Matched, MatchError> {
        self.match_image_with(query, location, deadline, &mut ())
    }

    /// [`MatchPipeline::match_image`] reporting its progress to `observer`.
    pub fn match_image_with(
        &mut self,
        query: &DynamicImage,
        location: &QueryLocation,
        deadline: &Deadline,
        observer: &mut dyn MatchObserver,
    ) -> Result<Matched, MatchError> {
        let start = Instant::now();
        let mut timings = Timings::default();
        let result = self.run(query, location, deadline, observer, &mut timings);
        self.finish(result, start, timings, observer)
    }

    /// Matches `query` against a reference image supplied by the caller.
    ///
    /// The provider and the cache are not used.
    pub fn match_pair(
        &self,
        query: &DynamicImage,
        reference: &DynamicImage,
        deadline: &Deadline,
    ) -> Result<Matched, MatchError> {
        self.match_pair_with(query, reference, deadline, &mut ())
    }

    /// [`MatchPipeline::match_pair`] reporting its progress to `observer`.
    pub fn match_pair_with(
        &self,
        query: &DynamicImage,
        reference: &DynamicImage,
        deadline: &Deadline,
        observer: &mut dyn MatchObserver,
    ) -> Result<Matched, MatchError> {
        let start = Instant::now();
        let mut timings = Timings::default();
        let result = match check_extent(query).and_then(|()| check_extent(reference)) {
            Ok(()) => self.match_images(query, reference, deadline, observer, &mut timings),
            Err(e) => Err(e.into()),
        };
        self.finish(result, start, timings, observer)
    }

    fn run(
        &mut self,
        query: &DynamicImage,
        location: &QueryLocation,
        deadline: &Deadline,
        observer: &mut dyn MatchObserver,
        timings: &mut Timings,
    ) -> Result<Matched, MatchError> {
        check_extent(query)?;
        let reference = self.acquire(location, deadline, observer, timings)?;
        let result = self.match_images(query, &reference.image, deadline, observer, timings);
        let metadata = reference.metadata.clone();
        self.cache = Some((*location, reference));
        let matched = result?;
        Ok(Matched {
            reference: Some(metadata),
            ..matched
        })
    }

    fn finish(
        &self,
        result: Result<Matched, MatchError>,
        start: Instant,
        mut timings: Timings,
        observer: &mut dyn MatchObserver,
    ) -> Result<Matched, MatchError> {
        timings.total = start.elapsed();
        match result {
            Ok(matched) => {
                let matched = Matched { timings, ..matched };
                debug!(
                    "matched with {} of {} correspondences as inliers",
                    matched.inliers.len(),
                    matched.correspondences.len()
                );
                observer.on_estimation(&matched);
                Ok(matched)
            }
            Err(e) => {
                warn!("match failed ({}): {}", e.reason(), e);
                observer.on_failure(&e, &timings);
                Err(e)
            }
        }
    }

    /// Takes the cached reference if it belongs to `location`, fetches a new one otherwise.
    fn acquire(
        &mut self,
        location: &QueryLocation,
        deadline: &Deadline,
        observer: &mut dyn MatchObserver,
        timings: &mut Timings,
    ) -> Result<Reference, MatchError> {
        if deadline.is_expired() {
            return Err(FetchError::Deadline.into());
        }
        let start = Instant::now();
        let reference = match self.cache.take() {
            Some((cached, reference)) if cached == *location => {
                debug!(
                    "reusing reference {:?} for {}",
                    reference.metadata.reference_id, location.point
                );
                reference
            }
            _ => self.fetch(location, deadline)?,
        };
        timings.acquire = start.elapsed();
        observer.on_reference(&reference, timings.acquire);
        Ok(reference)
    }

    fn fetch(&self, location: &QueryLocation, deadline: &Deadline) -> Result<Reference, MatchError> {
        let metadata = self
            .provider
            .query_metadata(location, deadline)
            .map_err(FetchError::from)?;
        let metadata = ReferenceMetadata::resolve(location, metadata).ok_or(
            MatchError::NoReferenceImage {
                location: location.point,
            },
        )?;
        debug!(
            "reference {:?} at {} heading {:.2}",
            metadata.reference_id, metadata.location, metadata.heading
        );

        if deadline.is_expired() {
            return Err(FetchError::Deadline.into());
        }
        let image = self
            .provider
            .fetch_image(&metadata, deadline)
            .ok_or_else(|| FetchError::Missing {
                reference_id: metadata.reference_id.clone(),
            })?;
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(FetchError::Empty {
                reference_id: metadata.reference_id,
                width,
                height,
            }
            .into());
        }
        if deadline.is_expired() {
            return Err(FetchError::Deadline.into());
        }
        Ok(Reference { metadata, image })
    }

    /// Resizes the query image to the canonical size unless it already has it.
    fn normalize<'a>(&self, query: &'a DynamicImage) -> Cow<'a, DynamicImage> {
        let (width, height) = self.settings.canonical_size();
        if query.dimensions() == (width, height) {
            Cow::Borrowed(query)
        } else {
            trace!(
                "resizing query from {:?} to {}x{}",
                query.dimensions(),
                width,
                height
            );
            Cow::Owned(query.resize_exact(width, height, FilterType::Triangle))
        }
    }

    fn detect_both(
        &self,
        query: &DynamicImage,
        reference: &DynamicImage,
    ) -> Result<(Features<F::Descriptor>, Features<F::Descriptor>), MatchError> {
        let extractor = &self.extractor;
        let (query, reference) = if self.settings.parallel_detection {
            rayon::join(|| extractor.extract(query), || extractor.extract(reference))
        } else {
            (extractor.extract(query), extractor.extract(reference))
        };
        Ok((query?, reference?))
    }

    fn match_images(
        &self,
        query: &DynamicImage,
        reference: &DynamicImage,
        deadline: &Deadline,
        observer: &mut dyn MatchObserver,
        timings: &mut Timings,
    ) -> Result<Matched, MatchError> {
        check_deadline(deadline, Stage::Detect)?;
        let query = self.normalize(query);
        let images = ImagePair {
            query: &*query,
            reference,
        };

        let start = Instant::now();
        let (query_features, reference_features) = self.detect_both(&*query, reference)?;
        timings.detect = start.elapsed();
        observer.on_detection(
            images,
            query_features.keypoints(),
            reference_features.keypoints(),
            timings.detect,
        );

        check_deadline(deadline, Stage::Match)?;
        let start = Instant::now();
        let correspondences = self.matcher.match_descriptors(
            query_features.descriptors(),
            reference_features.descriptors(),
        );
        let matches = resolve_matches(
            &correspondences,
            query_features.keypoints(),
            reference_features.keypoints(),
        );
        timings.matching = start.elapsed();
        observer.on_matching(images, &matches, timings.matching);

        if correspondences.len() < self.settings.min_correspondences {
            return Err(MatchError::InsufficientCorrespondences {
                found: correspondences.len(),
                required: self.settings.min_correspondences,
            });
        }

        check_deadline(deadline, Stage::Estimate)?;
        let start = Instant::now();
        let fit = self.estimator.estimate(&matches)?;
        timings.estimate = start.elapsed();

        Ok(Matched {
            homography: fit.homography,
            correspondences,
            matches,
            inliers: fit.inliers,
            reference: None,
            query_keypoints: query_features.len(),
            reference_keypoints: reference_features.len(),
            timings: *timings,
        })
    }
}
