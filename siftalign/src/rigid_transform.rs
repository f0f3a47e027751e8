use crate::affine_transform::AffineModel;
use crate::error::ModelError;
use crate::point_match::PointMatch;
use crate::transform_model::{require_matches, weighted_centroids, Model};
use crate::translation_transform::TranslationModel;
use std::fmt;

/// Squared distance below which two points count as coincident.
const COINCIDENT_TOLERANCE: f64 = 1e-12;

/// A rotation by `angle` radians about the origin followed by a translation.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RigidModel {
    angle: f64,
    cos: f64,
    sin: f64,
    pub translate_x: f64,
    pub translate_y: f64,
}

impl RigidModel {
    pub fn new(angle: f64, translate_x: f64, translate_y: f64) -> Self {
        let (sin, cos) = angle.sin_cos();
        RigidModel {
            angle,
            cos,
            sin,
            translate_x,
            translate_y,
        }
    }

    /// Rotation angle in radians, in `(-pi, pi]`.
    pub fn angle(&self) -> f64 {
        self.sin.atan2(self.cos)
    }

    /// Closed-form weighted least-squares rotation and translation.
    ///
    /// The angle maximizes the weighted alignment of the centered point sets,
    /// `atan2(sum w (p x q), sum w (p . q))`; the translation then maps the
    /// rotated source centroid onto the target centroid.
    fn fit(matches: &[PointMatch]) -> Result<Self, ModelError> {
        let (pc, qc, _) = weighted_centroids(matches)?;
        let mut dot = 0.0;
        let mut cross = 0.0;
        let mut spread = 0.0;
        for m in matches {
            let p = m.p1.local();
            let q = m.p2.world;
            let (px, py) = (p[0] - pc[0], p[1] - pc[1]);
            let (qx, qy) = (q[0] - qc[0], q[1] - qc[1]);
            dot += m.weight * (px * qx + py * qy);
            cross += m.weight * (px * qy - py * qx);
            spread += m.weight * (px * px + py * py);
        }
        if spread <= COINCIDENT_TOLERANCE || (dot == 0.0 && cross == 0.0) {
            return Err(ModelError::Degenerate("coincident points"));
        }
        let angle = cross.atan2(dot);
        let (sin, cos) = angle.sin_cos();
        Ok(RigidModel::new(
            angle,
            qc[0] - (cos * pc[0] - sin * pc[1]),
            qc[1] - (sin * pc[0] + cos * pc[1]),
        ))
    }
}

impl Model for RigidModel {
    const MIN_MATCHES: usize = 2;

    fn identity() -> Self {
        RigidModel::new(0.0, 0.0, 0.0)
    }

    fn fit_minimal(matches: &[PointMatch]) -> Result<Self, ModelError> {
        require_matches(matches, Self::MIN_MATCHES)?;
        RigidModel::fit(&[
            matches[0].with_weight(1.0),
            matches[1].with_weight(1.0),
        ])
    }

    fn fit_weighted(matches: &[PointMatch]) -> Result<Self, ModelError> {
        require_matches(matches, Self::MIN_MATCHES)?;
        RigidModel::fit(matches)
    }

    fn apply(&self, [x, y]: [f64; 2]) -> [f64; 2] {
        [
            self.cos * x - self.sin * y + self.translate_x,
            self.sin * x + self.cos * y + self.translate_y,
        ]
    }

    /// Rotations are always invertible.
    fn apply_inverse(&self, [x, y]: [f64; 2]) -> Result<[f64; 2], ModelError> {
        let dx = x - self.translate_x;
        let dy = y - self.translate_y;
        Ok([self.cos * dx + self.sin * dy, -self.sin * dx + self.cos * dy])
    }

    fn compose(&self, other: &Self) -> Self {
        let [tx, ty] = self.apply([other.translate_x, other.translate_y]);
        RigidModel::new(self.angle + other.angle, tx, ty)
    }

    fn to_affine(&self) -> AffineModel {
        AffineModel::new(
            self.cos,
            -self.sin,
            self.sin,
            self.cos,
            self.translate_x,
            self.translate_y,
        )
    }
}

impl From<TranslationModel> for RigidModel {
    fn from(t: TranslationModel) -> Self {
        RigidModel::new(0.0, t.translate_x, t.translate_y)
    }
}

impl fmt::Display for RigidModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rigid angle {:.4} deg, translation ({:.3}, {:.3})",
            self.angle().to_degrees(),
            self.translate_x,
            self.translate_y
        )
    }
}
