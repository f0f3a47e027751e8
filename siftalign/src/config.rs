//! Immutable parameter sets for every pipeline stage.
//!
//! Each struct carries its defaults, deserializes from partial JSON documents and
//! validates itself before a stage is built from it.

use crate::error::ConfigError;
use crate::transform_model::ModelFamily;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Scale space, detection and descriptor parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiftConfig {
    /// Scale steps per octave (`S`). Each octave holds `S + 3` blurred images.
    pub steps: usize,
    /// Blur of the first step of every octave, in that octave's pixels.
    pub initial_sigma: f32,
    /// Octaves whose shorter side is below this are not generated.
    pub min_size: usize,
    /// Octaves whose longer side exceeds this are decimated without being processed.
    pub max_size: usize,
    /// Number of spatial cells per descriptor side.
    pub fdsize: usize,
    /// Orientation bins per descriptor cell.
    pub fdbins: usize,
    /// Minimum absolute DoG response, relative to intensities in `[0, 1]`.
    pub contrast_threshold: f32,
    /// Maximum ratio of principal curvatures before a response counts as an edge.
    pub edge_ratio: f32,
    /// Bins of the dominant orientation histogram.
    pub orientation_bins: usize,
    /// Histogram peaks at least this fraction of the maximum spawn a feature.
    pub orientation_peak_ratio: f32,
    /// Ceiling applied to descriptor components between the two normalizations.
    pub descriptor_clip: f32,
    /// Quadratic sub-pixel and sub-scale localization of detected extrema.
    pub refine_location: bool,
    /// Stretch input intensities to `[0, 1]` before building the pyramid.
    pub normalize_intensity: bool,
    /// Upsample the input by two before building the pyramid.
    pub upscale: bool,
}

impl Default for SiftConfig {
    fn default() -> Self {
        Self {
            steps: 3,
            initial_sigma: 1.6,
            min_size: 64,
            max_size: 1024,
            fdsize: 8,
            fdbins: 8,
            contrast_threshold: 0.03,
            edge_ratio: 10.0,
            orientation_bins: 36,
            orientation_peak_ratio: 0.8,
            descriptor_clip: 0.2,
            refine_location: true,
            normalize_intensity: true,
            upscale: false,
        }
    }
}

impl SiftConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("steps", self.steps as f64)?;
        positive("initial_sigma", self.initial_sigma as f64)?;
        positive("min_size", self.min_size as f64)?;
        if self.max_size < self.min_size {
            return Err(ConfigError::Inconsistent(format!(
                "max_size {} is smaller than min_size {}",
                self.max_size, self.min_size
            )));
        }
        in_range("fdsize", self.fdsize as f64, 1.0, 16.0)?;
        in_range("fdbins", self.fdbins as f64, 1.0, 32.0)?;
        in_range("contrast_threshold", self.contrast_threshold as f64, 0.0, 1.0)?;
        in_range("edge_ratio", self.edge_ratio as f64, 1.0, f64::MAX)?;
        in_range("orientation_bins", self.orientation_bins as f64, 3.0, 360.0)?;
        positive("orientation_peak_ratio", self.orientation_peak_ratio as f64)?;
        in_range("orientation_peak_ratio", self.orientation_peak_ratio as f64, 0.0, 1.0)?;
        positive("descriptor_clip", self.descriptor_clip as f64)?;
        in_range("descriptor_clip", self.descriptor_clip as f64, 0.0, 1.0)?;
        Ok(())
    }

    /// Length of every descriptor produced with this configuration.
    pub fn descriptor_len(&self) -> usize {
        self.fdsize * self.fdsize * self.fdbins
    }
}

/// Nearest-neighbour ratio test parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// The second-nearest distance must exceed `rod` times the nearest one.
    pub rod: f32,
    /// Nearest distances at or above this bound are rejected.
    pub max_distance: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            rod: 1.5,
            max_distance: f32::MAX,
        }
    }
}

impl MatcherConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("rod", self.rod as f64)?;
        positive("max_distance", self.max_distance as f64)
    }
}

/// How the inlier tolerance evolves over the rounds of a robust fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpsilonSchedule {
    /// A single round at `min_epsilon`.
    Fixed,
    /// Rounds at `min_epsilon`, `2 * min_epsilon`, ... up to `max_epsilon`,
    /// drawing on one trial budget.
    Widening,
}

/// Robust model fitting parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacConfig {
    /// Inlier tolerance in pixels.
    pub min_epsilon: f64,
    /// Upper bound of the tolerance when widening.
    pub max_epsilon: f64,
    pub epsilon_schedule: EpsilonSchedule,
    /// Minimum share of candidates a model must explain.
    pub min_inlier_ratio: f64,
    /// Hard cap on minimal-subset trials, shared by all widening rounds.
    pub max_iterations: usize,
    pub seed: u64,
    /// Matches whose endpoints both lie within this distance of an earlier match are dropped.
    pub dedup_tolerance: f64,
    /// Drop inliers whose residual exceeds this multiple of the median residual.
    pub max_trust: Option<f64>,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            min_epsilon: 2.0,
            max_epsilon: 100.0,
            epsilon_schedule: EpsilonSchedule::Fixed,
            min_inlier_ratio: 0.05,
            max_iterations: 1000,
            seed: 0,
            dedup_tolerance: 0.01,
            max_trust: None,
        }
    }
}

impl RansacConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("min_epsilon", self.min_epsilon)?;
        if self.max_epsilon < self.min_epsilon {
            return Err(ConfigError::Inconsistent(format!(
                "max_epsilon {} is smaller than min_epsilon {}",
                self.max_epsilon, self.min_epsilon
            )));
        }
        in_range("min_inlier_ratio", self.min_inlier_ratio, 0.0, 1.0)?;
        positive("max_iterations", self.max_iterations as f64)?;
        in_range("dedup_tolerance", self.dedup_tolerance, 0.0, f64::MAX)?;
        if let Some(max_trust) = self.max_trust {
            in_range("max_trust", max_trust, 1.0, f64::MAX)?;
        }
        Ok(())
    }
}

/// Everything needed to align two or more images.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignConfig {
    pub sift: SiftConfig,
    pub matcher: MatcherConfig,
    pub ransac: RansacConfig,
    pub model: ModelFamily,
}

impl AlignConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sift.validate()?;
        self.matcher.validate()?;
        self.ransac.validate()
    }
}

/// Reads an [AlignConfig] from a JSON file. Missing fields take their defaults.
///
/// # Parameters
/// - `path`: Location of the JSON document.
///
/// # Returns
/// The validated configuration, or the I/O, parse or validation error.
pub fn load_config(path: &Path) -> Result<AlignConfig, ConfigError> {
    let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: AlignConfig = serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { name, value })
    }
}

fn in_range(name: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if value >= min && value <= max {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value,
            min,
            max,
        })
    }
}
