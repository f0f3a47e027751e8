use crate::affine_transform::AffineModel;
use crate::error::ModelError;
use crate::transform_model::{Model, TransformModel};

/// An ordered chain of transforms, applied first to last.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformList {
    models: Vec<TransformModel>,
}

/// Axis-aligned rectangle `[min_x, max_x] × [min_y, max_y]`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

impl TransformList {
    pub fn new() -> Self {
        TransformList::default()
    }

    /// Appends `model`; it runs after every transform already in the list.
    pub fn push(&mut self, model: impl Into<TransformModel>) {
        self.models.push(model.into());
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn models(&self) -> &[TransformModel] {
        &self.models
    }

    pub fn apply(&self, point: [f64; 2]) -> [f64; 2] {
        self.models.iter().fold(point, |p, m| m.apply(p))
    }

    /// Undoes the chain by applying the inverses last to first.
    ///
    /// # Returns
    /// - The point in the coordinates the chain starts from.
    /// - [ModelError::NotInvertible] if any member is singular.
    ///
    /// # Examples
    ///
    /// ```
    /// # use siftalign::transform_list::TransformList;
    /// # use siftalign::translation_transform::TranslationModel;
    /// # use siftalign::affine_transform::AffineModel;
    /// let mut list = TransformList::new();
    /// list.push(TranslationModel::new(3.0, -1.0));
    /// list.push(AffineModel::new(2.0, 0.0, 0.0, 2.0, 0.0, 0.0));
    /// assert_eq!(list.apply([1.0, 1.0]), [8.0, 0.0]);
    /// assert_eq!(list.apply_inverse([8.0, 0.0]).unwrap(), [1.0, 1.0]);
    ///
    /// list.push(AffineModel::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0));
    /// assert!(list.apply_inverse([0.0, 0.0]).is_err());
    /// ```
    pub fn apply_inverse(&self, point: [f64; 2]) -> Result<[f64; 2], ModelError> {
        self.models
            .iter()
            .rev()
            .try_fold(point, |p, m| m.apply_inverse(p))
    }

    /// The whole chain as one affine model.
    pub fn to_affine(&self) -> AffineModel {
        self.models
            .iter()
            .fold(AffineModel::identity(), |acc, m| m.to_affine().compose(&acc))
    }

    /// Bounds of a `width × height` rectangle at the origin after the chain is
    /// applied. Affine maps send the rectangle to a parallelogram, so its four
    /// corners determine the bounds.
    pub fn bounding_box(&self, width: f64, height: f64) -> BoundingBox {
        let corners = [[0.0, 0.0], [width, 0.0], [0.0, height], [width, height]].map(|c| self.apply(c));
        corners.iter().skip(1).fold(
            BoundingBox {
                min_x: corners[0][0],
                min_y: corners[0][1],
                max_x: corners[0][0],
                max_y: corners[0][1],
            },
            |b, [x, y]| BoundingBox {
                min_x: b.min_x.min(*x),
                min_y: b.min_y.min(*y),
                max_x: b.max_x.max(*x),
                max_y: b.max_y.max(*y),
            },
        )
    }
}

impl FromIterator<TransformModel> for TransformList {
    fn from_iter<I: IntoIterator<Item = TransformModel>>(iter: I) -> Self {
        TransformList {
            models: iter.into_iter().collect(),
        }
    }
}
