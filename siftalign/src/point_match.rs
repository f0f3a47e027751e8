//! Point correspondences handed from the matcher to the model fitter.

use crate::transform_model::Model;
use kd_tree::{KdPoint, KdTree};

/// A point with its detected (`local`) coordinate and the `world` coordinate
/// produced by the transform currently applied to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    local: [f64; 2],
    /// Derived from `local` by the last applied transform.
    pub world: [f64; 2],
}

impl Point {
    /// Creates a point whose world coordinate equals its local one.
    pub fn new(local: [f64; 2]) -> Self {
        Point {
            local,
            world: local,
        }
    }

    pub fn local(&self) -> [f64; 2] {
        self.local
    }

    /// Recomputes `world` from `local`. `local` never changes.
    pub fn apply<M: Model>(&mut self, model: &M) {
        self.world = model.apply(self.local);
    }
}

/// A correspondence between a point `p1` of one image and `p2` of another.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointMatch {
    pub p1: Point,
    pub p2: Point,
    /// Weight of the match in least-squares fits.
    pub weight: f64,
}

impl PointMatch {
    /// Creates a match of weight 1.
    pub fn new(p1: [f64; 2], p2: [f64; 2]) -> Self {
        PointMatch {
            p1: Point::new(p1),
            p2: Point::new(p2),
            weight: 1.0,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Maps `p1` through `model`, leaving `p2` untouched.
    pub fn apply<M: Model>(&mut self, model: &M) {
        self.p1.apply(model);
    }

    /// Distance between the world coordinates of both points.
    pub fn distance(&self) -> f64 {
        let dx = self.p1.world[0] - self.p2.world[0];
        let dy = self.p1.world[1] - self.p2.world[1];
        dx.hypot(dy)
    }
}

/// Both local endpoints of a match as one point in 4-D, tagged with the index of
/// the match.
struct MatchKey {
    coords: [f64; 4],
    index: usize,
}

impl KdPoint for MatchKey {
    type Scalar = f64;
    type Dim = typenum::U4;
    fn at(&self, k: usize) -> f64 {
        self.coords[k]
    }
}

impl MatchKey {
    fn of(index: usize, m: &PointMatch) -> Self {
        let [x1, y1] = m.p1.local;
        let [x2, y2] = m.p2.local;
        MatchKey {
            coords: [x1, y1, x2, y2],
            index,
        }
    }
}

/// Removes matches whose two endpoints both coincide, within `tolerance`, with an
/// earlier kept match. Order of the surviving matches is preserved.
///
/// # Parameters
/// - `matches`: Candidate correspondences, possibly with duplicates.
/// - `tolerance`: Maximum 4-D distance between duplicate matches.
///
/// # Returns
/// The de-duplicated matches.
pub fn dedup_matches(matches: &[PointMatch], tolerance: f64) -> Vec<PointMatch> {
    if matches.len() < 2 {
        return matches.to_vec();
    }
    let keys: Vec<MatchKey> = matches
        .iter()
        .enumerate()
        .map(|(i, m)| MatchKey::of(i, m))
        .collect();
    let tree = KdTree::build_by_ordered_float(keys);

    let mut kept = vec![false; matches.len()];
    for (i, m) in matches.iter().enumerate() {
        let query = MatchKey::of(i, m);
        let duplicate = tree
            .within_radius(&query, tolerance)
            .iter()
            .any(|other| other.index < i && kept[other.index]);
        kept[i] = !duplicate;
    }

    matches
        .iter()
        .zip(kept)
        .filter(|(_, keep)| *keep)
        .map(|(m, _)| *m)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation_transform::TranslationModel;

    #[test]
    fn dedup_keeps_first_occurrence() {
        let matches = vec![
            PointMatch::new([1.0, 2.0], [3.0, 4.0]),
            PointMatch::new([10.0, 2.0], [3.0, 4.0]),
            PointMatch::new([1.0, 2.0], [3.0, 4.0]).with_weight(0.5),
            PointMatch::new([1.0, 2.001], [3.0, 4.0]),
            PointMatch::new([1.0, 2.0], [3.0, 9.0]),
        ];
        let unique = dedup_matches(&matches, 0.01);
        assert_eq!(unique.len(), 3);
        assert_eq!(unique[0].weight, 1.0);
        assert_eq!(unique[1].p1.local(), [10.0, 2.0]);
        assert_eq!(unique[2].p2.local(), [3.0, 9.0]);
    }

    #[test]
    fn same_target_from_different_sources_is_kept() {
        let matches = vec![
            PointMatch::new([0.0, 0.0], [5.0, 5.0]),
            PointMatch::new([20.0, 0.0], [5.0, 5.0]),
        ];
        assert_eq!(dedup_matches(&matches, 0.5).len(), 2);
    }

    #[test]
    fn distance_follows_the_applied_model() {
        let mut m = PointMatch::new([1.0, 2.0], [3.0, 4.0]).with_weight(2.0);
        assert_eq!(m.distance(), 8f64.sqrt());
        m.apply(&TranslationModel::new(2.0, 2.0));
        assert_eq!(m.p1.world, [3.0, 4.0]);
        assert_eq!(m.p1.local(), [1.0, 2.0]);
        assert_eq!(m.distance(), 0.0);
    }
}
