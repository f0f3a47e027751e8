use crate::error::ModelError;
use crate::point_match::PointMatch;
use crate::transform_model::{require_matches, weighted_centroids, Model};
use nalgebra::{Matrix3, Vector3};
use std::fmt;

/// Relative area below which three points count as collinear.
const COLLINEAR_TOLERANCE: f64 = 1e-9;
/// Determinants below this magnitude make a transform non-invertible.
const SINGULAR_DETERMINANT: f64 = 1e-12;

/// Represents a 2D affine transformation: a 2×2 linear part followed by a
/// translation.
///
/// A point `(x, y)` is mapped to `(X, Y)` by:
///
/// ```text
///   X = (x * a11) + (y * a12) + translate_x;
///   Y = (x * a21) + (y * a22) + translate_y;
/// ```
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct AffineModel {
    /// Matrix entry: row 1, col 1 (scale in X, possibly combined with rotation/shear).
    pub a11: f64,

    /// Matrix entry: row 1, col 2 (shear or rotation).
    pub a12: f64,

    /// Matrix entry: row 2, col 1 (shear or rotation).
    pub a21: f64,

    /// Matrix entry: row 2, col 2 (scale in Y, possibly combined with rotation/shear).
    pub a22: f64,

    /// Translation offset in the transformed space (x-direction).
    pub translate_x: f64,

    /// Translation offset in the transformed space (y-direction).
    pub translate_y: f64,
}

impl AffineModel {
    pub fn new(a11: f64, a12: f64, a21: f64, a22: f64, translate_x: f64, translate_y: f64) -> Self {
        AffineModel {
            a11,
            a12,
            a21,
            a22,
            translate_x,
            translate_y,
        }
    }

    /// Determinant of the linear part.
    pub fn determinant(&self) -> f64 {
        self.a11 * self.a22 - self.a12 * self.a21
    }

    /// The inverse transformation.
    ///
    /// # Returns
    /// - The inverse if the linear part is regular.
    /// - [ModelError::NotInvertible] if its determinant vanishes.
    ///
    /// # Examples
    ///
    /// ```
    /// # use siftalign::affine_transform::AffineModel;
    /// # use siftalign::transform_model::Model;
    /// let t = AffineModel::new(2.0, 0.0, 0.0, 4.0, 1.0, -1.0);
    /// let inv = t.inverse().unwrap();
    /// assert_eq!(inv.apply(t.apply([3.0, 5.0])), [3.0, 5.0]);
    ///
    /// // A projection onto a line has no inverse.
    /// assert!(AffineModel::new(1.0, 1.0, 1.0, 1.0, 0.0, 0.0).inverse().is_err());
    /// ```
    pub fn inverse(&self) -> Result<AffineModel, ModelError> {
        let det = self.determinant();
        if det.abs() < SINGULAR_DETERMINANT || !det.is_finite() {
            return Err(ModelError::NotInvertible { determinant: det });
        }
        let a11 = self.a22 / det;
        let a12 = -self.a12 / det;
        let a21 = -self.a21 / det;
        let a22 = self.a11 / det;
        Ok(AffineModel {
            a11,
            a12,
            a21,
            a22,
            translate_x: -(a11 * self.translate_x + a12 * self.translate_y),
            translate_y: -(a21 * self.translate_x + a22 * self.translate_y),
        })
    }

    /// Rotation angle of the linear part in radians, meaningful for transforms
    /// without shear.
    pub fn rotation(&self) -> f64 {
        self.a21.atan2(self.a11)
    }
}

impl Model for AffineModel {
    const MIN_MATCHES: usize = 3;

    fn identity() -> Self {
        AffineModel::new(1.0, 0.0, 0.0, 1.0, 0.0, 0.0)
    }

    /// Solves the 6 parameters exactly from three point matches.
    fn fit_minimal(matches: &[PointMatch]) -> Result<Self, ModelError> {
        require_matches(matches, Self::MIN_MATCHES)?;
        let [p1, p2, p3] = [
            matches[0].p1.local(),
            matches[1].p1.local(),
            matches[2].p1.local(),
        ];
        let e1 = [p2[0] - p1[0], p2[1] - p1[1]];
        let e2 = [p3[0] - p1[0], p3[1] - p1[1]];
        let e3 = [p3[0] - p2[0], p3[1] - p2[1]];
        let longest = [e1, e2, e3]
            .iter()
            .map(|e| e[0] * e[0] + e[1] * e[1])
            .fold(0.0, f64::max);
        let cross = e1[0] * e2[1] - e1[1] * e2[0];
        if longest == 0.0 || cross.abs() <= COLLINEAR_TOLERANCE * longest {
            return Err(ModelError::Degenerate("collinear points"));
        }

        let source = Matrix3::new(
            p1[0], p1[1], 1.0, //
            p2[0], p2[1], 1.0, //
            p3[0], p3[1], 1.0,
        );
        let lu = source.lu();
        let xs = Vector3::new(matches[0].p2.world[0], matches[1].p2.world[0], matches[2].p2.world[0]);
        let ys = Vector3::new(matches[0].p2.world[1], matches[1].p2.world[1], matches[2].p2.world[1]);
        let row_x = lu.solve(&xs).ok_or(ModelError::Degenerate("collinear points"))?;
        let row_y = lu.solve(&ys).ok_or(ModelError::Degenerate("collinear points"))?;
        Ok(AffineModel::new(
            row_x[0], row_x[1], row_y[0], row_y[1], row_x[2], row_y[2],
        ))
    }

    /// Weighted least squares on coordinates centered at the weighted centroids.
    fn fit_weighted(matches: &[PointMatch]) -> Result<Self, ModelError> {
        require_matches(matches, Self::MIN_MATCHES)?;
        let (pc, qc, _) = weighted_centroids(matches)?;

        let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
        let (mut bxx, mut bxy, mut byx, mut byy) = (0.0, 0.0, 0.0, 0.0);
        for m in matches {
            let p = m.p1.local();
            let q = m.p2.world;
            let (px, py) = (p[0] - pc[0], p[1] - pc[1]);
            let (qx, qy) = (q[0] - qc[0], q[1] - qc[1]);
            let w = m.weight;
            sxx += w * px * px;
            sxy += w * px * py;
            syy += w * py * py;
            bxx += w * px * qx;
            bxy += w * px * qy;
            byx += w * py * qx;
            byy += w * py * qy;
        }

        let det = sxx * syy - sxy * sxy;
        let trace = sxx + syy;
        if trace == 0.0 || det.abs() <= COLLINEAR_TOLERANCE * trace * trace {
            return Err(ModelError::Degenerate("collinear points"));
        }
        let a11 = (syy * bxx - sxy * byx) / det;
        let a12 = (sxx * byx - sxy * bxx) / det;
        let a21 = (syy * bxy - sxy * byy) / det;
        let a22 = (sxx * byy - sxy * bxy) / det;
        Ok(AffineModel::new(
            a11,
            a12,
            a21,
            a22,
            qc[0] - (a11 * pc[0] + a12 * pc[1]),
            qc[1] - (a21 * pc[0] + a22 * pc[1]),
        ))
    }

    fn apply(&self, [x, y]: [f64; 2]) -> [f64; 2] {
        [
            x * self.a11 + y * self.a12 + self.translate_x,
            x * self.a21 + y * self.a22 + self.translate_y,
        ]
    }

    fn apply_inverse(&self, point: [f64; 2]) -> Result<[f64; 2], ModelError> {
        Ok(self.inverse()?.apply(point))
    }

    fn compose(&self, other: &Self) -> Self {
        AffineModel {
            a11: self.a11 * other.a11 + self.a12 * other.a21,
            a12: self.a11 * other.a12 + self.a12 * other.a22,
            a21: self.a21 * other.a11 + self.a22 * other.a21,
            a22: self.a21 * other.a12 + self.a22 * other.a22,
            translate_x: self.a11 * other.translate_x + self.a12 * other.translate_y + self.translate_x,
            translate_y: self.a21 * other.translate_x + self.a22 * other.translate_y + self.translate_y,
        }
    }

    fn to_affine(&self) -> AffineModel {
        *self
    }
}

impl fmt::Display for AffineModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "affine [[{:.6}, {:.6}, {:.3}], [{:.6}, {:.6}, {:.3}]]",
            self.a11, self.a12, self.translate_x, self.a21, self.a22, self.translate_y
        )
    }
}
