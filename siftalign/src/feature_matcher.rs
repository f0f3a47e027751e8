use crate::config::MatcherConfig;
use crate::error::ConfigError;
use crate::feature::{squared_distance, Feature};
use crate::point_match::PointMatch;
use rayon::prelude::*;
use tracing::debug;

/// Matches two feature sets by descriptor distance.
///
/// For every feature of the first set the nearest and second-nearest features of
/// the second set are found by brute force. The nearest one becomes a candidate
/// correspondence when it is unambiguous (`nearest * rod < second_nearest`) and
/// closer than `max_distance`. Several features may be matched to the same
/// target; removing such duplicates is left to the model fitter.
#[derive(Debug, Clone)]
pub struct FeatureMatcher {
    rod: f32,
    max_distance: f32,
}

impl FeatureMatcher {
    pub fn new(config: &MatcherConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(FeatureMatcher {
            rod: config.rod,
            max_distance: config.max_distance,
        })
    }

    /// Finds candidate correspondences from `features1` into `features2`.
    ///
    /// # Parameters
    /// - `features1`: Features whose locations become `p1` of each match.
    /// - `features2`: Features searched for neighbours; their locations become `p2`.
    ///
    /// # Returns
    /// One match per accepted feature of `features1`, in the order of `features1`.
    /// A single candidate in `features2` has no second neighbour and is accepted
    /// on the distance bound alone.
    pub fn match_features(&self, features1: &[Feature], features2: &[Feature]) -> Vec<PointMatch> {
        let matches: Vec<PointMatch> = features1
            .par_iter()
            .filter_map(|f1| {
                let (nearest, best, second) = nearest_two(f1, features2)?;
                if best >= self.max_distance {
                    return None;
                }
                if let Some(second) = second {
                    if best * self.rod >= second {
                        return None;
                    }
                }
                Some(PointMatch::new(
                    f1.location().map(f64::from),
                    features2[nearest].location().map(f64::from),
                ))
            })
            .collect();
        debug!(
            features1 = features1.len(),
            features2 = features2.len(),
            matches = matches.len(),
            "matched features"
        );
        matches
    }
}

/// Index and distance of the nearest feature, and the distance of the second
/// nearest one.
fn nearest_two(query: &Feature, candidates: &[Feature]) -> Option<(usize, f32, Option<f32>)> {
    let mut nearest: Option<(usize, f32)> = None;
    let mut second = f32::INFINITY;
    for (i, candidate) in candidates.iter().enumerate() {
        let d = squared_distance(&query.descriptor, &candidate.descriptor);
        match nearest {
            Some((_, best)) if d >= best => second = second.min(d),
            Some((_, best)) => {
                second = best;
                nearest = Some((i, d));
            }
            None => nearest = Some((i, d)),
        }
    }
    let (index, best) = nearest?;
    let second = (candidates.len() > 1).then(|| second.sqrt());
    Some((index, best.sqrt(), second))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(x: f32, descriptor: [f32; 3]) -> Feature {
        Feature {
            x,
            y: 0.0,
            scale: 1.6,
            orientation: 0.0,
            descriptor: descriptor.to_vec(),
        }
    }

    fn matcher(rod: f32) -> FeatureMatcher {
        FeatureMatcher::new(&MatcherConfig {
            rod,
            ..MatcherConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn ambiguous_matches_are_rejected() {
        let a = vec![feature(0.0, [1.0, 0.0, 0.0]), feature(1.0, [0.0, 0.0, 1.0])];
        let b = vec![
            feature(10.0, [0.98, 0.2, 0.0]),
            feature(11.0, [0.0, 1.0, 0.0]),
            feature(12.0, [0.0, 0.7, 0.7]),
            feature(13.0, [0.0, 0.6, 0.8]),
        ];
        let matches = matcher(1.5).match_features(&a, &b);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].p1.local(), [0.0, 0.0]);
        assert_eq!(matches[0].p2.local(), [10.0, 0.0]);
    }

    #[test]
    fn matching_is_not_symmetric() {
        let a = vec![feature(0.0, [1.0, 0.0, 0.0]), feature(1.0, [0.95, 0.3, 0.0])];
        let b = vec![feature(10.0, [0.0, 1.0, 0.0]), feature(11.0, [0.9, 0.0, 0.4])];
        let ab = matcher(1.1).match_features(&a, &b);
        let ba = matcher(1.1).match_features(&b, &a);
        let forward: Vec<_> = ab.iter().map(|m| (m.p1.local(), m.p2.local())).collect();
        let backward: Vec<_> = ba.iter().map(|m| (m.p2.local(), m.p1.local())).collect();
        assert_ne!(forward, backward);
        // Both features of `a` prefer the same target.
        assert_eq!(ab.len(), 2);
        assert!(ab.iter().all(|m| m.p2.local() == [11.0, 0.0]));
    }

    #[test]
    fn prohibitive_ratio_yields_no_matches() {
        let a = vec![feature(0.0, [1.0, 0.0, 0.0]), feature(1.0, [0.0, 1.0, 0.0])];
        let b = vec![feature(10.0, [0.9, 0.1, 0.0]), feature(11.0, [0.1, 0.9, 0.0])];
        assert_eq!(matcher(1.5).match_features(&a, &b).len(), 2);
        assert!(matcher(1.0e6).match_features(&a, &b).is_empty());
    }

    #[test]
    fn max_distance_bounds_matches() {
        let a = vec![feature(0.0, [1.0, 0.0, 0.0])];
        let b = vec![feature(10.0, [0.0, 1.0, 0.0])];
        let loose = matcher(1.5);
        assert_eq!(loose.match_features(&a, &b).len(), 1);
        let strict = FeatureMatcher::new(&MatcherConfig {
            rod: 1.5,
            max_distance: 1.0,
        })
        .unwrap();
        assert!(strict.match_features(&a, &b).is_empty());
        assert!(strict.match_features(&a, &[]).is_empty());
    }
}
