//! # SiftAlign Library
//!
//! The `siftalign` library registers grayscale images with scale-invariant
//! features. It detects blob-like keypoints in a Gaussian scale space, describes
//! them with rotation-invariant gradient histograms, matches descriptors between
//! images and fits a translation, rigid or affine transform to the matches with
//! RANSAC.
//!
//! ## Overview of Modules
//!
//! - **`alignment_processor`**: Orchestrates the high-level workflow of aligning
//!   two images, or a whole sequence, by extracting, matching and fitting.
//!
//! - **`float_image`**: Defines the single-channel `FloatImage` raster with
//!   mirrored border access, resampling and intensity normalization.
//!
//! - **`gaussian_filter`**: Separable Gaussian convolution.
//!
//! - **`scale_octave`** / **`scale_space_pyramid`**: The Gaussian scale space and
//!   its difference-of-Gaussian layers, one octave per halving of the image.
//!
//! - **`keypoint_detector`**: Finds and localizes extrema of the
//!   difference-of-Gaussian layers, rejecting low-contrast and edge responses.
//!
//! - **`descriptor_builder`**: Assigns dominant orientations to keypoints and
//!   computes their descriptors.
//!
//! - **`feature_extractor`**: Runs the whole extraction pipeline for one image.
//!
//! - **`feature_matcher`**: Nearest-neighbour descriptor matching with a ratio
//!   test.
//!
//! - **`point_match`**: Point correspondences and their de-duplication.
//!
//! - **`transform_model`**, **`translation_transform`**, **`rigid_transform`**,
//!   **`affine_transform`**: The fittable 2-D transform family.
//!
//! - **`transform_list`**: Chains of transforms and their bounds.
//!
//! - **`robust_model_fitter`**: RANSAC estimation with deterministic seeding.
//!
//! - **`config`** / **`error`**: Parameters with their defaults, and the error
//!   types of every stage.
//!
//! ## Example
//!
//! ```
//! use siftalign::alignment_processor::AlignmentProcessor;
//! use siftalign::config::AlignConfig;
//! use siftalign::float_image::FloatImage;
//!
//! let processor = AlignmentProcessor::new(AlignConfig::default()).unwrap();
//! // A constant image has no features, so there is nothing to align.
//! let flat = FloatImage::new(64, 64);
//! assert!(processor.extract(&flat).is_empty());
//! assert!(processor.align_pair(&flat, &flat).is_err());
//! ```

pub mod alignment_processor;
pub mod config;
pub mod error;
pub mod float_image;
pub mod gaussian_filter;

pub mod scale_octave;
pub mod scale_space_pyramid;
pub mod keypoint_detector;
pub mod descriptor_builder;
pub mod feature;
pub mod feature_extractor;
pub mod feature_matcher;

pub mod point_match;
pub mod transform_model;
pub mod translation_transform;
pub mod rigid_transform;
pub mod affine_transform;
pub mod transform_list;
pub mod robust_model_fitter;

pub use alignment_processor::{AlignmentProcessor, PairAlignment, SequenceLayer};
pub use config::{load_config, AlignConfig, EpsilonSchedule, MatcherConfig, RansacConfig, SiftConfig};
pub use error::{ConfigError, FitError, ImageError, ModelError};
pub use feature::Feature;
pub use float_image::FloatImage;
pub use transform_model::{Model, ModelFamily, TransformModel};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
