//! Typed errors for every stage of the pipeline.
//!
//! Configuration problems are reported before any pixel is touched. Geometry
//! problems ([ModelError]) surface from individual transform fits and are
//! swallowed per trial by the robust fitter. A fit that never reaches consensus
//! is reported as [FitError::NoConsensus], never as an identity transform.

use std::path::PathBuf;
use thiserror::Error;

/// Invalid numeric configuration, rejected before processing begins.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be positive, got {value}")]
    NotPositive { name: &'static str, value: f64 },

    #[error("{name} = {value} is outside the allowed range [{min}, {max}]")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("inconsistent configuration: {0}")]
    Inconsistent(String),

    #[error("cannot read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Construction errors of [crate::float_image::FloatImage].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImageError {
    #[error("pixel buffer holds {got} values, expected {width}x{height}")]
    SizeMismatch {
        width: usize,
        height: usize,
        got: usize,
    },
}

/// Errors raised by a single transform model.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("model needs at least {needed} point matches, got {got}")]
    NotEnoughMatches { needed: usize, got: usize },

    #[error("degenerate point configuration: {0}")]
    Degenerate(&'static str),

    #[error("transform is not invertible (determinant {determinant:e})")]
    NotInvertible { determinant: f64 },
}

/// Outcome of a robust fit that did not produce a model.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FitError {
    #[error("robust fit needs at least {needed} candidate matches, got {got}")]
    NotEnoughMatches { needed: usize, got: usize },

    #[error(
        "no consensus: best model explained {best_inliers} of {candidates} matches, \
         minimum inlier ratio is {min_inlier_ratio}"
    )]
    NoConsensus {
        best_inliers: usize,
        candidates: usize,
        min_inlier_ratio: f64,
    },
}
