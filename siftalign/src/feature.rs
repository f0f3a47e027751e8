use std::cmp::Ordering;

/// A detected, oriented and described image feature.
///
/// Coordinates and scale are expressed in pixels of the image the feature was
/// extracted from, regardless of the octave it was found in.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    /// Column of the feature center.
    pub x: f32,
    /// Row of the feature center.
    pub y: f32,
    /// Gaussian blur at which the feature was detected.
    pub scale: f32,
    /// Dominant gradient orientation in radians, in `(-pi, pi]`.
    pub orientation: f32,
    /// Unit length gradient histogram descriptor.
    pub descriptor: Vec<f32>,
}

impl Feature {
    pub fn location(&self) -> [f32; 2] {
        [self.x, self.y]
    }

    /// Euclidean distance between the descriptors of two features.
    ///
    /// # Examples
    /// ```
    /// # use siftalign::feature::Feature;
    /// let a = Feature { x: 0.0, y: 0.0, scale: 1.6, orientation: 0.0, descriptor: vec![1.0, 0.0] };
    /// let b = Feature { descriptor: vec![0.0, 1.0], ..a.clone() };
    /// assert!((a.descriptor_distance(&b) - 2f32.sqrt()).abs() < 1e-6);
    /// ```
    pub fn descriptor_distance(&self, other: &Feature) -> f32 {
        squared_distance(&self.descriptor, &other.descriptor).sqrt()
    }

    /// Total order by position, then scale, then orientation.
    pub fn cmp_location(&self, other: &Feature) -> Ordering {
        self.y
            .total_cmp(&other.y)
            .then(self.x.total_cmp(&other.x))
            .then(self.scale.total_cmp(&other.scale))
            .then(self.orientation.total_cmp(&other.orientation))
    }
}

pub(crate) fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(p, q)| (p - q) * (p - q)).sum()
}
