use crate::config::SiftConfig;
use crate::descriptor_builder::DescriptorBuilder;
use crate::error::ConfigError;
use crate::feature::Feature;
use crate::float_image::FloatImage;
use crate::keypoint_detector::KeypointDetector;
use crate::scale_space_pyramid::ScaleSpacePyramid;
use rayon::prelude::*;
use std::time::Instant;
use tracing::debug;

/// Runs the extraction pipeline: scale space, keypoint detection, orientation
/// assignment and description.
///
/// The pyramid lives only for the duration of one [FeatureExtractor::extract]
/// call; the returned features own all their data.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    config: SiftConfig,
    detector: KeypointDetector,
    builder: DescriptorBuilder,
}

impl FeatureExtractor {
    /// Validates `config` and prepares the pipeline stages.
    pub fn new(config: SiftConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(FeatureExtractor {
            detector: KeypointDetector::new(&config),
            builder: DescriptorBuilder::new(&config),
            config,
        })
    }

    pub fn config(&self) -> &SiftConfig {
        &self.config
    }

    /// Extracts all features of `image`.
    ///
    /// # Parameters
    /// - `image`: Single-channel input of any intensity range.
    ///
    /// # Returns
    /// The features sorted by row, column, scale and orientation. An image smaller
    /// than `min_size` yields no features.
    pub fn extract(&self, image: &FloatImage) -> Vec<Feature> {
        let start = Instant::now();
        let pyramid = ScaleSpacePyramid::build_validated(image, &self.config);
        let keypoints = self.detector.detect(&pyramid);

        let mut features: Vec<Feature> = keypoints
            .par_iter()
            .map(|keypoint| self.builder.build(&pyramid, keypoint))
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect();
        features.sort_by(Feature::cmp_location);

        debug!(
            width = image.width(),
            height = image.height(),
            octaves = pyramid.len(),
            keypoints = keypoints.len(),
            features = features.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "extracted features"
        );
        features
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_image_has_no_features() {
        let extractor = FeatureExtractor::new(SiftConfig::default()).unwrap();
        let image = FloatImage::from_fn(63, 200, |x, y| ((x ^ y) & 7) as f32);
        assert!(extractor.extract(&image).is_empty());
    }

    #[test]
    fn rejects_invalid_config() {
        let config = SiftConfig {
            steps: 0,
            ..SiftConfig::default()
        };
        assert!(FeatureExtractor::new(config).is_err());
    }
}
