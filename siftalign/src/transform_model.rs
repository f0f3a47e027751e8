//! The family of 2-D transforms that can be fitted to point matches.
//!
//! Every family member implements [Model]. [TransformModel] wraps any member for
//! code that selects the family at runtime via [ModelFamily].

use crate::affine_transform::AffineModel;
use crate::error::ModelError;
use crate::point_match::PointMatch;
use crate::rigid_transform::RigidModel;
use crate::translation_transform::TranslationModel;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Capabilities shared by all fittable transforms.
///
/// Fits map the local coordinate of `p1` onto the world coordinate of `p2` of
/// each [PointMatch].
pub trait Model: Clone + fmt::Debug + Send + Sync {
    /// Number of matches that determine the model exactly.
    const MIN_MATCHES: usize;

    fn identity() -> Self;

    /// Fits the model exactly to the first [Model::MIN_MATCHES] matches.
    ///
    /// Fails with [ModelError::Degenerate] when those matches do not determine
    /// the model, e.g. collinear points for an affine fit.
    fn fit_minimal(matches: &[PointMatch]) -> Result<Self, ModelError>;

    /// Weighted least-squares fit to all `matches`.
    fn fit_weighted(matches: &[PointMatch]) -> Result<Self, ModelError>;

    fn apply(&self, point: [f64; 2]) -> [f64; 2];

    /// Maps `point` back, failing with [ModelError::NotInvertible] for a
    /// singular transform.
    fn apply_inverse(&self, point: [f64; 2]) -> Result<[f64; 2], ModelError>;

    /// The transform that applies `other` first and then `self`.
    fn compose(&self, other: &Self) -> Self;

    fn to_affine(&self) -> AffineModel;

    /// Distance between the mapped `p1` and the world coordinate of `p2`.
    fn residual(&self, m: &PointMatch) -> f64 {
        let [x, y] = self.apply(m.p1.local());
        (x - m.p2.world[0]).hypot(y - m.p2.world[1])
    }
}

pub(crate) fn require_matches(matches: &[PointMatch], needed: usize) -> Result<(), ModelError> {
    if matches.len() < needed {
        Err(ModelError::NotEnoughMatches {
            needed,
            got: matches.len(),
        })
    } else {
        Ok(())
    }
}

/// Weighted centroids of the `p1` local and `p2` world coordinates, and the
/// total weight.
pub(crate) fn weighted_centroids(
    matches: &[PointMatch],
) -> Result<([f64; 2], [f64; 2], f64), ModelError> {
    let mut total = 0.0;
    let mut pc = [0.0; 2];
    let mut qc = [0.0; 2];
    for m in matches {
        let p = m.p1.local();
        let q = m.p2.world;
        total += m.weight;
        pc[0] += m.weight * p[0];
        pc[1] += m.weight * p[1];
        qc[0] += m.weight * q[0];
        qc[1] += m.weight * q[1];
    }
    if total <= 0.0 || !total.is_finite() {
        return Err(ModelError::Degenerate("total match weight is not positive"));
    }
    Ok((
        [pc[0] / total, pc[1] / total],
        [qc[0] / total, qc[1] / total],
        total,
    ))
}

/// Selector of a transform family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    Translation,
    #[default]
    Rigid,
    Affine,
}

impl ModelFamily {
    pub fn min_matches(self) -> usize {
        match self {
            ModelFamily::Translation => TranslationModel::MIN_MATCHES,
            ModelFamily::Rigid => RigidModel::MIN_MATCHES,
            ModelFamily::Affine => AffineModel::MIN_MATCHES,
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelFamily::Translation => "translation",
            ModelFamily::Rigid => "rigid",
            ModelFamily::Affine => "affine",
        };
        f.write_str(name)
    }
}

impl FromStr for ModelFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "translation" => Ok(ModelFamily::Translation),
            "rigid" => Ok(ModelFamily::Rigid),
            "affine" => Ok(ModelFamily::Affine),
            other => Err(format!(
                "unknown model family '{other}', use translation, rigid or affine"
            )),
        }
    }
}

/// Any member of the transform family.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformModel {
    Translation(TranslationModel),
    Rigid(RigidModel),
    Affine(AffineModel),
}

impl TransformModel {
    pub fn identity(family: ModelFamily) -> Self {
        match family {
            ModelFamily::Translation => TranslationModel::identity().into(),
            ModelFamily::Rigid => RigidModel::identity().into(),
            ModelFamily::Affine => AffineModel::identity().into(),
        }
    }

    pub fn family(&self) -> ModelFamily {
        match self {
            TransformModel::Translation(_) => ModelFamily::Translation,
            TransformModel::Rigid(_) => ModelFamily::Rigid,
            TransformModel::Affine(_) => ModelFamily::Affine,
        }
    }

    /// Exact fit of a model of `family` to its minimal set of matches.
    pub fn fit_minimal(family: ModelFamily, matches: &[PointMatch]) -> Result<Self, ModelError> {
        Ok(match family {
            ModelFamily::Translation => TranslationModel::fit_minimal(matches)?.into(),
            ModelFamily::Rigid => RigidModel::fit_minimal(matches)?.into(),
            ModelFamily::Affine => AffineModel::fit_minimal(matches)?.into(),
        })
    }

    /// Weighted least-squares fit of a model of `family`.
    pub fn fit_weighted(family: ModelFamily, matches: &[PointMatch]) -> Result<Self, ModelError> {
        Ok(match family {
            ModelFamily::Translation => TranslationModel::fit_weighted(matches)?.into(),
            ModelFamily::Rigid => RigidModel::fit_weighted(matches)?.into(),
            ModelFamily::Affine => AffineModel::fit_weighted(matches)?.into(),
        })
    }

    pub fn apply(&self, point: [f64; 2]) -> [f64; 2] {
        match self {
            TransformModel::Translation(m) => m.apply(point),
            TransformModel::Rigid(m) => m.apply(point),
            TransformModel::Affine(m) => m.apply(point),
        }
    }

    pub fn apply_inverse(&self, point: [f64; 2]) -> Result<[f64; 2], ModelError> {
        match self {
            TransformModel::Translation(m) => m.apply_inverse(point),
            TransformModel::Rigid(m) => m.apply_inverse(point),
            TransformModel::Affine(m) => m.apply_inverse(point),
        }
    }

    /// The transform that applies `other` first and then `self`. Translations
    /// and rigid transforms stay rigid; anything composed with an affine
    /// transform becomes affine.
    pub fn compose(&self, other: &TransformModel) -> TransformModel {
        match (self, other) {
            (TransformModel::Translation(a), TransformModel::Translation(b)) => a.compose(b).into(),
            (TransformModel::Rigid(a), TransformModel::Rigid(b)) => a.compose(b).into(),
            (TransformModel::Rigid(a), TransformModel::Translation(b)) => {
                a.compose(&RigidModel::from(*b)).into()
            }
            (TransformModel::Translation(a), TransformModel::Rigid(b)) => {
                RigidModel::from(*a).compose(b).into()
            }
            (a, b) => a.to_affine().compose(&b.to_affine()).into(),
        }
    }

    pub fn to_affine(&self) -> AffineModel {
        match self {
            TransformModel::Translation(m) => m.to_affine(),
            TransformModel::Rigid(m) => m.to_affine(),
            TransformModel::Affine(m) => *m,
        }
    }

    pub fn residual(&self, m: &PointMatch) -> f64 {
        let [x, y] = self.apply(m.p1.local());
        (x - m.p2.world[0]).hypot(y - m.p2.world[1])
    }
}

impl From<TranslationModel> for TransformModel {
    fn from(m: TranslationModel) -> Self {
        TransformModel::Translation(m)
    }
}

impl From<RigidModel> for TransformModel {
    fn from(m: RigidModel) -> Self {
        TransformModel::Rigid(m)
    }
}

impl From<AffineModel> for TransformModel {
    fn from(m: AffineModel) -> Self {
        TransformModel::Affine(m)
    }
}

impl fmt::Display for TransformModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformModel::Translation(m) => write!(f, "{m}"),
            TransformModel::Rigid(m) => write!(f, "{m}"),
            TransformModel::Affine(m) => write!(f, "{m}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn family_parses_case_insensitively() {
        assert_eq!("Affine".parse::<ModelFamily>(), Ok(ModelFamily::Affine));
        assert_eq!(ModelFamily::Rigid.to_string(), "rigid");
        assert!("similarity".parse::<ModelFamily>().is_err());
        assert_eq!(ModelFamily::default().min_matches(), 2);
    }

    #[test]
    fn mixed_composition_matches_sequential_application() {
        let rigid = TransformModel::from(RigidModel::new(0.3, 4.0, -2.0));
        let affine = TransformModel::from(AffineModel::new(1.1, 0.2, -0.1, 0.9, 3.0, 1.0));
        let shift = TransformModel::from(TranslationModel::new(-5.0, 7.0));
        let p = [12.0, -3.5];

        let chained = rigid.compose(&affine).compose(&shift);
        assert_eq!(chained.family(), ModelFamily::Affine);
        let expected = rigid.apply(affine.apply(shift.apply(p)));
        let got = chained.apply(p);
        assert_abs_diff_eq!(got[0], expected[0], epsilon = 1e-9);
        assert_abs_diff_eq!(got[1], expected[1], epsilon = 1e-9);

        let rigid_shift = rigid.compose(&shift);
        assert_eq!(rigid_shift.family(), ModelFamily::Rigid);
        let expected = rigid.apply(shift.apply(p));
        assert_abs_diff_eq!(rigid_shift.apply(p)[0], expected[0], epsilon = 1e-9);
        assert_abs_diff_eq!(rigid_shift.apply(p)[1], expected[1], epsilon = 1e-9);
    }

    #[test]
    fn round_trip_for_every_family() {
        let models = [
            TransformModel::from(TranslationModel::new(3.5, -1.25)),
            TransformModel::from(RigidModel::new(-1.2, 10.0, 20.0)),
            TransformModel::from(AffineModel::new(0.8, -0.6, 0.5, 1.3, -7.0, 2.0)),
        ];
        for model in &models {
            for p in [[0.0, 0.0], [100.0, -50.0], [-3.25, 999.0]] {
                let back = model.apply_inverse(model.apply(p)).unwrap();
                assert_abs_diff_eq!(back[0], p[0], epsilon = 1e-4);
                assert_abs_diff_eq!(back[1], p[1], epsilon = 1e-4);
                let forth = model.apply(model.apply_inverse(p).unwrap());
                assert_abs_diff_eq!(forth[0], p[0], epsilon = 1e-4);
                assert_abs_diff_eq!(forth[1], p[1], epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn singular_affine_inverse_is_an_error() {
        let model = TransformModel::from(AffineModel::new(1.0, 2.0, 2.0, 4.0, 0.0, 0.0));
        assert!(matches!(
            model.apply_inverse([1.0, 1.0]),
            Err(ModelError::NotInvertible { .. })
        ));
    }
}
