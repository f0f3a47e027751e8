use crate::config::AlignConfig;
use crate::error::{ConfigError, FitError};
use crate::feature::Feature;
use crate::feature_extractor::FeatureExtractor;
use crate::feature_matcher::FeatureMatcher;
use crate::float_image::FloatImage;
use crate::point_match::PointMatch;
use crate::robust_model_fitter::RobustModelFitter;
use crate::transform_model::TransformModel;
use rayon::prelude::*;
use tracing::{info, warn};

/// The transform found between two feature sets.
#[derive(Debug, Clone)]
pub struct PairAlignment {
    /// Maps coordinates of the first set into the coordinates of the second.
    pub model: TransformModel,

    /// Candidate matches consistent with `model`.
    pub inliers: Vec<PointMatch>,

    /// Number of unique candidate matches the model was fitted to.
    pub candidates: usize,

    /// Inlier tolerance in pixels the model was accepted with.
    pub epsilon: f64,

    /// Mean residual of the inliers in pixels.
    pub mean_error: f64,
}

/// One image of an aligned sequence.
#[derive(Debug, Clone)]
pub struct SequenceLayer {
    /// Maps coordinates of this image into the coordinates of the first image.
    pub cumulative: TransformModel,

    /// Alignment to the previous image. `None` for the first image and for
    /// images no model could be fitted for.
    pub alignment: Option<PairAlignment>,
}

/// Manages the pipeline for registering images with scale-invariant features:
///
/// 1. **Feature extraction** of every image with a [FeatureExtractor].
/// 2. **Candidate matching** of descriptors with a [FeatureMatcher].
/// 3. **Robust fitting** of a transform of the configured family with a
///    [RobustModelFitter].
///
/// The processor holds no per-image state, so one instance can align any number
/// of pairs or sequences.
#[derive(Debug, Clone)]
pub struct AlignmentProcessor {
    config: AlignConfig,
    extractor: FeatureExtractor,
    matcher: FeatureMatcher,
    fitter: RobustModelFitter,
}

impl AlignmentProcessor {
    /// Constructs a new `AlignmentProcessor` from a validated `config`.
    ///
    /// # Parameters
    /// - `config`: Parameters of all three stages and the model family to fit.
    ///
    /// # Returns
    /// The processor, or the first invalid parameter found.
    pub fn new(config: AlignConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(AlignmentProcessor {
            extractor: FeatureExtractor::new(config.sift.clone())?,
            matcher: FeatureMatcher::new(&config.matcher)?,
            fitter: RobustModelFitter::new(config.ransac.clone())?,
            config,
        })
    }

    pub fn config(&self) -> &AlignConfig {
        &self.config
    }

    /// Detects the features of `image`, in input-image coordinates.
    pub fn extract(&self, image: &FloatImage) -> Vec<Feature> {
        self.extractor.extract(image)
    }

    /// Finds the transform that maps the features `a` onto the features `b`.
    ///
    /// # Parameters
    /// - `a`: Features of the image being aligned.
    /// - `b`: Features of the reference image.
    ///
    /// # Returns
    /// - A [PairAlignment] whose model maps coordinates of `a` into `b`.
    /// - [FitError] if the candidate matches support no model.
    pub fn align_features(&self, a: &[Feature], b: &[Feature]) -> Result<PairAlignment, FitError> {
        let candidates = self.matcher.match_features(a, b);
        let fit = self.fitter.fit_family(self.config.model, &candidates)?;
        info!(
            model = %fit.model,
            candidates = fit.candidates,
            inliers = fit.inliers.len(),
            inlier_ratio = fit.inlier_ratio(),
            epsilon = fit.epsilon,
            "aligned feature sets"
        );
        Ok(PairAlignment {
            model: fit.model,
            inliers: fit.inliers,
            candidates: fit.candidates,
            epsilon: fit.epsilon,
            mean_error: fit.mean_error,
        })
    }

    /// Extracts the features of both images and aligns `image_a` to `image_b`.
    pub fn align_pair(&self, image_a: &FloatImage, image_b: &FloatImage) -> Result<PairAlignment, FitError> {
        let (a, b) = rayon::join(|| self.extract(image_a), || self.extract(image_b));
        self.align_features(&a, &b)
    }

    /// Aligns every image of a sequence into the frame of the first one.
    ///
    /// Each image is aligned to its predecessor, and the pairwise models are
    /// chained into cumulative transforms. An image without a model keeps the
    /// cumulative transform of its predecessor, so later images still align into
    /// the first frame through it.
    ///
    /// # Parameters
    /// - `images`: The sequence; features of each image are extracted once.
    ///
    /// # Returns
    /// One [SequenceLayer] per image, the first with the identity transform.
    pub fn align_sequence(&self, images: &[FloatImage]) -> Vec<SequenceLayer> {
        let features: Vec<Vec<Feature>> = images.par_iter().map(|image| self.extract(image)).collect();
        let Some(first) = features.first() else {
            return Vec::new();
        };
        info!(layers = images.len(), first_features = first.len(), "aligning sequence");

        let mut layers = vec![SequenceLayer {
            cumulative: TransformModel::identity(self.config.model),
            alignment: None,
        }];
        for (i, pair) in features.windows(2).enumerate() {
            let previous = layers[i].cumulative.clone();
            let layer = match self.align_features(&pair[1], &pair[0]) {
                Ok(alignment) => SequenceLayer {
                    cumulative: previous.compose(&alignment.model),
                    alignment: Some(alignment),
                },
                Err(err) => {
                    warn!(layer = i + 1, %err, "no model found, keeping previous transform");
                    SequenceLayer {
                        cumulative: previous,
                        alignment: None,
                    }
                }
            };
            layers.push(layer);
        }
        layers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiftConfig;
    use crate::error::ConfigError;

    #[test]
    fn rejects_invalid_configuration() {
        let config = AlignConfig {
            sift: SiftConfig {
                steps: 0,
                ..SiftConfig::default()
            },
            ..AlignConfig::default()
        };
        assert!(matches!(
            AlignmentProcessor::new(config),
            Err(ConfigError::NotPositive { name: "steps", .. })
        ));
    }

    #[test]
    fn featureless_images_have_no_alignment() {
        let processor = AlignmentProcessor::new(AlignConfig::default()).unwrap();
        let flat = FloatImage::new(80, 80);
        assert!(processor.extract(&flat).is_empty());
        assert_eq!(
            processor.align_pair(&flat, &flat).unwrap_err(),
            FitError::NotEnoughMatches { needed: 2, got: 0 }
        );
    }

    #[test]
    fn sequence_without_models_stays_at_identity() {
        let processor = AlignmentProcessor::new(AlignConfig::default()).unwrap();
        let flat = FloatImage::new(80, 80);
        let layers = processor.align_sequence(&[flat.clone(), flat.clone(), flat]);
        assert_eq!(layers.len(), 3);
        for layer in &layers {
            assert!(layer.alignment.is_none());
            assert_eq!(layer.cumulative.apply([5.0, 7.0]), [5.0, 7.0]);
        }
        assert!(processor.align_sequence(&[]).is_empty());
    }
}
