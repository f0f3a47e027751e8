use crate::affine_transform::AffineModel;
use crate::config::{EpsilonSchedule, RansacConfig};
use crate::error::{ConfigError, FitError};
use crate::point_match::{dedup_matches, PointMatch};
use crate::rigid_transform::RigidModel;
use crate::transform_model::{Model, ModelFamily, TransformModel};
use crate::translation_transform::TranslationModel;
use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{debug, info};

/// Trials evaluated in parallel before the best model is updated.
const TRIAL_BATCH: usize = 64;
/// Widening rounds without improvement before the search stops.
const CONVERGENCE_ROUNDS: usize = 4;

/// A model together with the matches that support it.
#[derive(Debug, Clone)]
pub struct ConsensusFit<M> {
    pub model: M,
    /// Matches whose residual under `model` is below `epsilon`.
    pub inliers: Vec<PointMatch>,
    /// Number of candidates after de-duplication.
    pub candidates: usize,
    /// Inlier tolerance the model was accepted with.
    pub epsilon: f64,
    /// Mean residual of the inliers.
    pub mean_error: f64,
    /// Minimal-subset trials drawn, including discarded degenerate ones.
    pub trials: usize,
}

impl<M> ConsensusFit<M> {
    pub fn inlier_ratio(&self) -> f64 {
        self.inliers.len() as f64 / self.candidates as f64
    }

    pub fn map_model<N>(self, f: impl FnOnce(M) -> N) -> ConsensusFit<N> {
        ConsensusFit {
            model: f(self.model),
            inliers: self.inliers,
            candidates: self.candidates,
            epsilon: self.epsilon,
            mean_error: self.mean_error,
            trials: self.trials,
        }
    }
}

/// Inliers of one model: indices into the candidate set and their mean residual.
#[derive(Debug, Clone)]
struct Support<M> {
    model: M,
    inliers: Vec<usize>,
    mean_error: f64,
}

impl<M> Support<M> {
    /// More inliers wins; equal counts are decided by the lower mean residual.
    fn is_better_than(&self, other: &Support<M>) -> bool {
        self.inliers.len() > other.inliers.len()
            || (self.inliers.len() == other.inliers.len() && self.mean_error < other.mean_error)
    }
}

/// RANSAC estimation of a transform from noisy point matches.
///
/// Each trial draws a minimal subset of matches without replacement from its own
/// random stream, derived from the configured seed and the trial index. Trials
/// run in parallel batches and are merged in trial order, so the result does not
/// depend on the number of threads.
#[derive(Debug, Clone)]
pub struct RobustModelFitter {
    config: RansacConfig,
}

impl RobustModelFitter {
    pub fn new(config: RansacConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(RobustModelFitter { config })
    }

    pub fn config(&self) -> &RansacConfig {
        &self.config
    }

    /// Fits a model of the runtime-selected `family` with the configured epsilon
    /// schedule.
    pub fn fit_family(
        &self,
        family: ModelFamily,
        candidates: &[PointMatch],
    ) -> Result<ConsensusFit<TransformModel>, FitError> {
        Ok(match family {
            ModelFamily::Translation => self.fit::<TranslationModel>(candidates)?.map_model(Into::into),
            ModelFamily::Rigid => self.fit::<RigidModel>(candidates)?.map_model(Into::into),
            ModelFamily::Affine => self.fit::<AffineModel>(candidates)?.map_model(Into::into),
        })
    }

    /// Fits a model with the configured epsilon schedule.
    pub fn fit<M: Model>(&self, candidates: &[PointMatch]) -> Result<ConsensusFit<M>, FitError> {
        match self.config.epsilon_schedule {
            EpsilonSchedule::Fixed => self.estimate(candidates, self.config.min_epsilon),
            EpsilonSchedule::Widening => self.estimate_best(candidates),
        }
    }

    /// One RANSAC round at a fixed inlier tolerance.
    ///
    /// # Parameters
    /// - `candidates`: Tentative correspondences; duplicates are removed first.
    /// - `epsilon`: A match is an inlier when its residual is below this.
    ///
    /// # Returns
    /// - The refined model and its inliers, whose `p1` world coordinates are
    ///   mapped by the model.
    /// - [FitError::NotEnoughMatches] if there are fewer unique candidates than
    ///   the minimal set size.
    /// - [FitError::NoConsensus] if no model explains `min_inlier_ratio` of the
    ///   candidates within `max_iterations` trials.
    pub fn estimate<M: Model>(
        &self,
        candidates: &[PointMatch],
        epsilon: f64,
    ) -> Result<ConsensusFit<M>, FitError> {
        let candidates = self.unique_candidates::<M>(candidates)?;
        self.consensus(&candidates, epsilon, 0, self.config.max_iterations)
    }

    /// Repeats the RANSAC round with a widening tolerance
    /// `min_epsilon, 2 * min_epsilon, ...` up to `max_epsilon`.
    ///
    /// All rounds share one budget of `max_iterations` trials. Each round gets an
    /// even share of what is left, but at least one batch while trials remain,
    /// and draws from trial streams no earlier round used. A round that reaches
    /// consensus replaces the best one so far when its mean residual is lower.
    /// The search stops after four consecutive rounds without improvement once a
    /// model exists, or when the budget is spent.
    pub fn estimate_best<M: Model>(
        &self,
        candidates: &[PointMatch],
    ) -> Result<ConsensusFit<M>, FitError> {
        let candidates = self.unique_candidates::<M>(candidates)?;
        let step = self.config.min_epsilon;
        let rounds = ((self.config.max_epsilon / step).floor() as usize).max(1);
        let mut best: Option<ConsensusFit<M>> = None;
        let mut last_error = None;
        let mut stale_rounds = 0;
        let mut used = 0;

        for round in 0..rounds {
            let remaining = self.config.max_iterations - used;
            if remaining == 0 {
                break;
            }
            let budget = (remaining / (rounds - round)).max(TRIAL_BATCH.min(remaining));
            let epsilon = step * (round + 1) as f64;
            match self.consensus::<M>(&candidates, epsilon, used, budget) {
                Ok(fit) => {
                    used += fit.trials;
                    if best.as_ref().map_or(true, |b| fit.mean_error < b.mean_error) {
                        best = Some(fit);
                        stale_rounds = 0;
                    } else {
                        stale_rounds += 1;
                    }
                }
                Err(err) => {
                    used += budget;
                    if best.is_some() {
                        stale_rounds += 1;
                    }
                    last_error = Some(err);
                }
            }
            if best.is_some() && stale_rounds >= CONVERGENCE_ROUNDS {
                break;
            }
        }

        match best {
            Some(mut fit) => {
                fit.trials = used;
                info!(
                    inliers = fit.inliers.len(),
                    candidates = fit.candidates,
                    epsilon = fit.epsilon,
                    mean_error = fit.mean_error,
                    trials = used,
                    "widening search converged"
                );
                Ok(fit)
            }
            None => Err(last_error.unwrap_or(FitError::NoConsensus {
                best_inliers: 0,
                candidates: candidates.len(),
                min_inlier_ratio: self.config.min_inlier_ratio,
            })),
        }
    }

    /// De-duplicated candidates, or an error if they cannot determine a model.
    fn unique_candidates<M: Model>(&self, candidates: &[PointMatch]) -> Result<Vec<PointMatch>, FitError> {
        let candidates = dedup_matches(candidates, self.config.dedup_tolerance);
        if candidates.len() < M::MIN_MATCHES {
            return Err(FitError::NotEnoughMatches {
                needed: M::MIN_MATCHES,
                got: candidates.len(),
            });
        }
        Ok(candidates)
    }

    /// Runs trials `first_trial..first_trial + budget` on unique candidates at
    /// tolerance `epsilon`, then refines the best model. A failed round always
    /// spends its whole budget.
    fn consensus<M: Model>(
        &self,
        candidates: &[PointMatch],
        epsilon: f64,
        first_trial: usize,
        budget: usize,
    ) -> Result<ConsensusFit<M>, FitError> {
        let n = candidates.len();
        let last_trial = first_trial + budget;
        let mut best: Option<Support<M>> = None;
        let mut next = first_trial;
        while next < last_trial {
            let end = (next + TRIAL_BATCH).min(last_trial);
            let batch: Vec<Option<Support<M>>> = (next..end)
                .into_par_iter()
                .map(|trial| self.trial::<M>(candidates, trial, epsilon))
                .collect();
            next = end;
            for support in batch.into_iter().flatten() {
                if best.as_ref().map_or(true, |b| support.is_better_than(b)) {
                    best = Some(support);
                }
            }
            if best.as_ref().is_some_and(|b| b.inliers.len() == n) {
                break;
            }
        }
        let trials = next - first_trial;

        let best = match best {
            Some(best) if self.is_consensus(best.inliers.len(), n, M::MIN_MATCHES) => best,
            other => {
                return Err(FitError::NoConsensus {
                    best_inliers: other.map_or(0, |b| b.inliers.len()),
                    candidates: n,
                    min_inlier_ratio: self.config.min_inlier_ratio,
                })
            }
        };

        let mut support = self.refine(candidates, best, epsilon);
        if let Some(max_trust) = self.config.max_trust {
            support = self.trust_filter(candidates, support, max_trust);
        }

        debug!(
            candidates = n,
            inliers = support.inliers.len(),
            epsilon,
            mean_error = support.mean_error,
            trials,
            "ransac round"
        );
        let inliers = support
            .inliers
            .iter()
            .map(|&i| {
                let mut m = candidates[i];
                m.apply(&support.model);
                m
            })
            .collect();
        Ok(ConsensusFit {
            model: support.model,
            inliers,
            candidates: n,
            epsilon,
            mean_error: support.mean_error,
            trials,
        })
    }

    fn is_consensus(&self, inliers: usize, candidates: usize, min_matches: usize) -> bool {
        inliers >= min_matches
            && inliers as f64 >= self.config.min_inlier_ratio * candidates as f64
    }

    /// Fits a model to the minimal subset of trial `trial`. Degenerate subsets
    /// yield `None`.
    fn trial<M: Model>(&self, candidates: &[PointMatch], trial: usize, epsilon: f64) -> Option<Support<M>> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        rng.set_stream(trial as u64);
        let sample: Vec<PointMatch> = index::sample(&mut rng, candidates.len(), M::MIN_MATCHES)
            .iter()
            .map(|i| candidates[i])
            .collect();
        let model = M::fit_minimal(&sample).ok()?;
        Some(support_of(model, candidates, epsilon))
    }

    /// Weighted refit over all inliers followed by one re-filtering pass at the
    /// same tolerance. The minimal-subset model is kept when the refit is
    /// degenerate or explains fewer matches.
    fn refine<M: Model>(&self, candidates: &[PointMatch], best: Support<M>, epsilon: f64) -> Support<M> {
        let inliers: Vec<PointMatch> = best.inliers.iter().map(|&i| candidates[i]).collect();
        match M::fit_weighted(&inliers) {
            Ok(model) => {
                let refined = support_of(model, candidates, epsilon);
                if refined.inliers.len() >= best.inliers.len() {
                    refined
                } else {
                    best
                }
            }
            Err(_) => best,
        }
    }

    /// Iteratively drops inliers whose residual exceeds `max_trust` times the
    /// median residual and refits, until no inlier is dropped.
    fn trust_filter<M: Model>(&self, candidates: &[PointMatch], mut support: Support<M>, max_trust: f64) -> Support<M> {
        loop {
            let residuals: Vec<f64> = support
                .inliers
                .iter()
                .map(|&i| support.model.residual(&candidates[i]))
                .collect();
            let mut sorted = residuals.clone();
            sorted.sort_by(f64::total_cmp);
            let median = sorted[sorted.len() / 2];
            if median <= 0.0 {
                return support;
            }
            let kept: Vec<usize> = support
                .inliers
                .iter()
                .zip(residuals.iter())
                .filter(|(_, &r)| r <= max_trust * median)
                .map(|(&i, _)| i)
                .collect();
            if kept.len() == support.inliers.len() || kept.len() < M::MIN_MATCHES {
                return support;
            }
            let matches: Vec<PointMatch> = kept.iter().map(|&i| candidates[i]).collect();
            let Ok(model) = M::fit_weighted(&matches) else {
                return support;
            };
            let mean_error = mean_residual(&model, candidates, &kept);
            support = Support {
                model,
                inliers: kept,
                mean_error,
            };
        }
    }
}

/// Candidates within `epsilon` of `model` and their mean residual.
fn support_of<M: Model>(model: M, candidates: &[PointMatch], epsilon: f64) -> Support<M> {
    let mut inliers = Vec::new();
    let mut total = 0.0;
    for (i, m) in candidates.iter().enumerate() {
        let r = model.residual(m);
        if r < epsilon {
            inliers.push(i);
            total += r;
        }
    }
    let mean_error = if inliers.is_empty() {
        f64::INFINITY
    } else {
        total / inliers.len() as f64
    };
    Support {
        model,
        inliers,
        mean_error,
    }
}

fn mean_residual<M: Model>(model: &M, candidates: &[PointMatch], indices: &[usize]) -> f64 {
    indices
        .iter()
        .map(|&i| model.residual(&candidates[i]))
        .sum::<f64>()
        / indices.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::Rng;

    fn cloud(rng: &mut ChaCha8Rng, count: usize) -> Vec<[f64; 2]> {
        (0..count)
            .map(|_| [rng.random_range(0.0..200.0), rng.random_range(0.0..200.0)])
            .collect()
    }

    /// Matches under `truth` with uniform noise of `noise` pixels, followed by
    /// `outliers` random matches.
    fn synthetic(truth: &AffineModel, inliers: usize, outliers: usize, noise: f64, seed: u64) -> Vec<PointMatch> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut matches: Vec<PointMatch> = cloud(&mut rng, inliers)
            .into_iter()
            .map(|p| {
                let q = truth.apply(p);
                let n = [rng.random_range(-noise..=noise), rng.random_range(-noise..=noise)];
                PointMatch::new(p, [q[0] + n[0], q[1] + n[1]])
            })
            .collect();
        let sources = cloud(&mut rng, outliers);
        let targets = cloud(&mut rng, outliers);
        matches.extend(sources.into_iter().zip(targets).map(|(p, q)| PointMatch::new(p, q)));
        matches
    }

    fn fitter(config: RansacConfig) -> RobustModelFitter {
        RobustModelFitter::new(config).unwrap()
    }

    #[test]
    fn recovers_affine_transform_among_outliers() {
        let truth = AffineModel::new(0.95, -0.25, 0.2, 1.05, 14.0, -6.0);
        let candidates = synthetic(&truth, 60, 40, 0.3, 7);
        let fit = fitter(RansacConfig::default())
            .estimate::<AffineModel>(&candidates, 2.0)
            .unwrap();
        assert_abs_diff_eq!(fit.model.a11, truth.a11, epsilon = 0.01);
        assert_abs_diff_eq!(fit.model.a12, truth.a12, epsilon = 0.01);
        assert_abs_diff_eq!(fit.model.a21, truth.a21, epsilon = 0.01);
        assert_abs_diff_eq!(fit.model.a22, truth.a22, epsilon = 0.01);
        assert_abs_diff_eq!(fit.model.translate_x, truth.translate_x, epsilon = 1.0);
        assert_abs_diff_eq!(fit.model.translate_y, truth.translate_y, epsilon = 1.0);
        assert!(fit.inliers.len() >= 60, "{} inliers", fit.inliers.len());
        assert!(fit.inliers.len() <= 62);
        assert!(fit.mean_error < 1.0);
    }

    #[test]
    fn fitting_is_reproducible() {
        let truth = RigidModel::new(0.4, 3.0, -8.0).to_affine();
        let candidates = synthetic(&truth, 30, 30, 0.5, 11);
        let config = RansacConfig {
            seed: 1234,
            ..RansacConfig::default()
        };
        let a = fitter(config.clone()).estimate::<RigidModel>(&candidates, 2.0).unwrap();
        let b = fitter(config).estimate::<RigidModel>(&candidates, 2.0).unwrap();
        assert_eq!(a.model, b.model);
        assert_eq!(a.inliers, b.inliers);
        assert_eq!(a.trials, b.trials);
    }

    #[test]
    fn random_matches_have_no_consensus() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let candidates: Vec<PointMatch> = cloud(&mut rng, 40)
            .into_iter()
            .zip(cloud(&mut rng, 40))
            .map(|(p, q)| PointMatch::new(p, q))
            .collect();
        let config = RansacConfig {
            min_inlier_ratio: 0.5,
            max_iterations: 200,
            ..RansacConfig::default()
        };
        let result = fitter(config).estimate::<AffineModel>(&candidates, 1.0);
        assert!(matches!(
            result,
            Err(FitError::NoConsensus { candidates: 40, .. })
        ));
    }

    #[test]
    fn too_few_unique_candidates() {
        let candidates = vec![
            PointMatch::new([0.0, 0.0], [1.0, 1.0]),
            PointMatch::new([0.0, 0.0], [1.0, 1.0]),
            PointMatch::new([5.0, 0.0], [6.0, 1.0]),
        ];
        let result = fitter(RansacConfig::default()).estimate::<AffineModel>(&candidates, 2.0);
        assert_eq!(result.unwrap_err(), FitError::NotEnoughMatches { needed: 3, got: 2 });
    }

    #[test]
    fn degenerate_samples_are_skipped() {
        // Every triple of these sources is collinear, so no affine trial succeeds.
        let candidates: Vec<PointMatch> = (0..10)
            .map(|i| PointMatch::new([i as f64, 2.0 * i as f64], [i as f64, 0.0]))
            .collect();
        let result = fitter(RansacConfig {
            max_iterations: 50,
            ..RansacConfig::default()
        })
        .estimate::<AffineModel>(&candidates, 2.0);
        assert_eq!(
            result.unwrap_err(),
            FitError::NoConsensus {
                best_inliers: 0,
                candidates: 10,
                min_inlier_ratio: 0.05
            }
        );
    }

    #[test]
    fn stops_early_on_full_consensus() {
        let truth = TranslationModel::new(4.0, -2.0).to_affine();
        let candidates = synthetic(&truth, 20, 0, 0.0, 5);
        let fit = fitter(RansacConfig::default())
            .estimate::<TranslationModel>(&candidates, 1.0)
            .unwrap();
        assert_eq!(fit.trials, TRIAL_BATCH);
        assert_eq!(fit.inliers.len(), 20);
        assert_abs_diff_eq!(fit.model.translate_x, 4.0, epsilon = 1e-9);
    }

    #[test]
    fn widening_schedule_finds_coarse_consensus() {
        let truth = RigidModel::new(-0.3, 10.0, 5.0).to_affine();
        let candidates = synthetic(&truth, 40, 10, 3.0, 21);
        let config = RansacConfig {
            min_epsilon: 1.0,
            max_epsilon: 20.0,
            min_inlier_ratio: 0.6,
            epsilon_schedule: EpsilonSchedule::Widening,
            max_iterations: 1000,
            ..RansacConfig::default()
        };
        let fit = fitter(config).fit_family(ModelFamily::Rigid, &candidates).unwrap();
        assert!(fit.epsilon > 1.0);
        assert!(fit.inliers.len() >= 30);
        assert!(fit.trials <= 1000, "{} trials", fit.trials);
        match fit.model {
            TransformModel::Rigid(model) => assert_abs_diff_eq!(model.angle(), -0.3, epsilon = 0.05),
            other => panic!("unexpected model {other:?}"),
        }
    }

    #[test]
    fn widening_rounds_share_the_trial_budget() {
        let truth = RigidModel::new(0.2, -4.0, 7.0).to_affine();
        let candidates = synthetic(&truth, 40, 10, 0.3, 17);
        let config = RansacConfig {
            min_epsilon: 1.0,
            max_epsilon: 20.0,
            epsilon_schedule: EpsilonSchedule::Widening,
            max_iterations: 100,
            ..RansacConfig::default()
        };
        let fit = fitter(config).fit::<RigidModel>(&candidates).unwrap();
        assert!(fit.trials <= 100, "{} trials", fit.trials);
        assert!(fit.inliers.len() >= 40);
    }

    #[test]
    fn widening_without_consensus_stops_at_the_trial_budget() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let candidates: Vec<PointMatch> = cloud(&mut rng, 30)
            .into_iter()
            .zip(cloud(&mut rng, 30))
            .map(|(p, q)| PointMatch::new(p, q))
            .collect();
        let config = RansacConfig {
            min_epsilon: 0.5,
            max_epsilon: 5.0,
            min_inlier_ratio: 0.9,
            epsilon_schedule: EpsilonSchedule::Widening,
            max_iterations: 200,
            ..RansacConfig::default()
        };
        let err = fitter(config).fit::<TranslationModel>(&candidates).unwrap_err();
        assert!(matches!(err, FitError::NoConsensus { .. }), "{err:?}");
    }

    #[test]
    fn inliers_carry_mapped_coordinates() {
        let truth = TranslationModel::new(100.0, 0.0).to_affine();
        let candidates = synthetic(&truth, 10, 0, 0.2, 4);
        let fit = fitter(RansacConfig::default())
            .estimate::<TranslationModel>(&candidates, 2.0)
            .unwrap();
        assert_eq!(fit.inliers.len(), 10);
        assert_eq!(fit.inlier_ratio(), 1.0);
        for m in &fit.inliers {
            assert!(m.distance() < 2.0, "distance {}", m.distance());
            assert_ne!(m.p1.world, m.p1.local());
        }
    }

    #[test]
    fn trust_filter_drops_far_inliers() {
        let truth = TranslationModel::new(1.0, 1.0).to_affine();
        let mut candidates = synthetic(&truth, 30, 0, 0.1, 8);
        candidates.push(PointMatch::new([50.0, 50.0], [52.8, 51.0]));
        let config = RansacConfig {
            max_trust: Some(4.0),
            ..RansacConfig::default()
        };
        let fit = fitter(config).estimate::<TranslationModel>(&candidates, 2.0).unwrap();
        assert_eq!(fit.inliers.len(), 30);
        assert!(fit.inliers.iter().all(|m| m.p1.local() != [50.0, 50.0]));
    }
}
