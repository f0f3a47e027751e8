use crate::affine_transform::AffineModel;
use crate::error::ModelError;
use crate::point_match::PointMatch;
use crate::transform_model::{require_matches, weighted_centroids, Model};
use std::fmt;

/// A pure shift by `(translate_x, translate_y)`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TranslationModel {
    pub translate_x: f64,
    pub translate_y: f64,
}

impl TranslationModel {
    pub fn new(translate_x: f64, translate_y: f64) -> Self {
        TranslationModel {
            translate_x,
            translate_y,
        }
    }
}

impl Model for TranslationModel {
    const MIN_MATCHES: usize = 1;

    fn identity() -> Self {
        TranslationModel::new(0.0, 0.0)
    }

    fn fit_minimal(matches: &[PointMatch]) -> Result<Self, ModelError> {
        require_matches(matches, Self::MIN_MATCHES)?;
        let p = matches[0].p1.local();
        let q = matches[0].p2.world;
        Ok(TranslationModel::new(q[0] - p[0], q[1] - p[1]))
    }

    /// The shift between the weighted centroids.
    fn fit_weighted(matches: &[PointMatch]) -> Result<Self, ModelError> {
        require_matches(matches, Self::MIN_MATCHES)?;
        let (pc, qc, _) = weighted_centroids(matches)?;
        Ok(TranslationModel::new(qc[0] - pc[0], qc[1] - pc[1]))
    }

    fn apply(&self, [x, y]: [f64; 2]) -> [f64; 2] {
        [x + self.translate_x, y + self.translate_y]
    }

    fn apply_inverse(&self, [x, y]: [f64; 2]) -> Result<[f64; 2], ModelError> {
        Ok([x - self.translate_x, y - self.translate_y])
    }

    fn compose(&self, other: &Self) -> Self {
        TranslationModel::new(
            self.translate_x + other.translate_x,
            self.translate_y + other.translate_y,
        )
    }

    fn to_affine(&self) -> AffineModel {
        AffineModel::new(1.0, 0.0, 0.0, 1.0, self.translate_x, self.translate_y)
    }
}

impl fmt::Display for TranslationModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "translation ({:.3}, {:.3})",
            self.translate_x, self.translate_y
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weighted_fit_uses_weighted_centroids() {
        let m = vec![
            PointMatch::new([0.0, 0.0], [1.0, 0.0]).with_weight(3.0),
            PointMatch::new([5.0, 5.0], [10.0, 5.0]),
        ];
        let t = TranslationModel::fit_weighted(&m).unwrap();
        assert_eq!(t, TranslationModel::new(2.0, 0.0));
    }

    #[test]
    fn minimal_fit_needs_one_match() {
        assert_eq!(
            TranslationModel::fit_minimal(&[]),
            Err(ModelError::NotEnoughMatches { needed: 1, got: 0 })
        );
        let t = TranslationModel::fit_minimal(&[PointMatch::new([1.0, 2.0], [4.0, 0.0])]).unwrap();
        assert_eq!(t.apply([0.0, 0.0]), [3.0, -2.0]);
    }
}
