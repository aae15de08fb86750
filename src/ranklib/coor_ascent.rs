//! Coordinate Ascent: a linear model tuned one weight at a time by line
//! search directly on the ranking metric.

use rand::seq::SliceRandom;

use super::config::CoorAscentParams;
use super::data::{FeatureLookup, RankList};
use super::error::{parse_num, RankLibError, Result};
use super::metric::MetricScorer;
use super::model_text::{content_lines, parse_pairs, FeatureResolver};
use super::ranker::{Ranker, RankerKind, TrainingContext};
use crate::utils::{sort_indices, WorkerPool};

const SIGNS: [f64; 3] = [1.0, -1.0, 0.0];

#[derive(Debug, Clone, Default)]
pub struct CoorAscent {
    params: CoorAscentParams,
    features: Vec<usize>,
    weights: Vec<f64>,
}

impl CoorAscent {
    pub fn new(params: CoorAscentParams) -> Self {
        Self {
            params,
            features: Vec::new(),
            weights: Vec::new(),
        }
    }

    pub fn params(&self) -> &CoorAscentParams {
        &self.params
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    fn score_with(
        &self,
        weights: &[f64],
        ctx: &TrainingContext<'_>,
        cache: &ScoreCache,
        candidate: Option<(usize, f64)>,
    ) -> f64 {
        let mut score = cache.metric(ctx.samples, &self.features, candidate, ctx.scorer, ctx.pool);
        if self.params.regularized {
            score -= self.params.slack * distance(weights, &cache.reg_vector);
        }
        score
    }

    /// One restart of the local search from uniform weights.
    ///
    /// Returns the best weights found and their training score.
    fn search(&self, ctx: &TrainingContext<'_>, restart: usize) -> (Vec<f64>, f64) {
        let n = self.features.len();
        let mut rng = ctx.rng(restart as u64);
        let mut weights = vec![1.0 / n as f64; n];
        let mut cache = ScoreCache::new(ctx.samples, &self.features, &weights);

        let mut best_score = self.score_with(&weights, ctx, &cache, None);
        let mut best_weights = weights.clone();
        let mut order: Vec<usize> = (0..n).collect();
        let mut consecutive_fails = 0;

        while (n > 1 && consecutive_fails < n - 1) || (n == 1 && consecutive_fails == 0) {
            let pass_start = best_score;
            order.shuffle(&mut rng);
            for &fi in &order {
                let orig = weights[fi];
                let mut best_total_step = None;

                for dir in SIGNS {
                    let mut step = 0.001 * dir;
                    if orig != 0.0 && step.abs() > 0.5 * orig.abs() {
                        step = self.params.step_base * orig.abs();
                    }
                    let mut total_step = step;
                    let n_iter = if dir == 0.0 {
                        total_step = -orig;
                        1
                    } else {
                        self.params.max_iteration
                    };
                    for j in 0..n_iter {
                        weights[fi] = orig + total_step;
                        let score = self.score_with(&weights, ctx, &cache, Some((fi, total_step)));
                        if score > best_score {
                            best_score = score;
                            best_total_step = Some(total_step);
                        }
                        if j + 1 < self.params.max_iteration {
                            step *= self.params.step_scale;
                            total_step += step;
                        }
                    }
                    weights[fi] = orig;
                    if best_total_step.is_some() {
                        break;
                    }
                }

                match best_total_step {
                    Some(total_step) => {
                        weights[fi] = orig + total_step;
                        cache.shift(ctx.samples, self.features[fi], total_step);
                        let sum = normalize(&mut weights);
                        cache.scale(1.0 / sum);
                        best_weights.copy_from_slice(&weights);
                        consecutive_fails = 0;
                        ctx.logger.detail(&format!(
                            "feature {} -> {:.4} ({:.4})",
                            self.features[fi], weights[fi], best_score
                        ));
                    }
                    None => consecutive_fails += 1,
                }
            }
            if best_score - pass_start < self.params.tolerance {
                break;
            }
        }
        (best_weights, best_score)
    }
}

impl Ranker for CoorAscent {
    fn kind(&self) -> RankerKind {
        RankerKind::CoordinateAscent
    }

    fn features(&self) -> &[usize] {
        &self.features
    }

    fn init(&mut self, ctx: &TrainingContext<'_>) -> Result<()> {
        self.features = ctx.features.to_vec();
        let n = self.features.len();
        self.weights = vec![1.0 / n as f64; n];
        Ok(())
    }

    fn learn(&mut self, ctx: &TrainingContext<'_>) -> Result<()> {
        if self.weights.len() != self.features.len() || self.features.is_empty() {
            return Err(RankLibError::Config("CoorAscent::learn() called before init()".into()));
        }
        let metric = ctx.scorer.name();
        let mut best: Option<(Vec<f64>, f64)> = None;
        for restart in 0..self.params.n_restart {
            let (weights, train_score) = self.search(ctx, restart);
            let score = match ctx.validation {
                Some(validation) => {
                    let candidate = CoorAscent {
                        params: self.params.clone(),
                        features: self.features.clone(),
                        weights: weights.clone(),
                    };
                    super::ranker::evaluate(&candidate, validation, ctx.scorer, ctx.pool)
                }
                None => train_score,
            };
            ctx.logger.round(
                restart + 1,
                &metric,
                train_score,
                ctx.validation.map(|_| score),
            );
            if best.as_ref().map_or(true, |(_, best_score)| score > *best_score) {
                best = Some((weights, score));
            }
        }
        if let Some((weights, _)) = best {
            self.weights = weights;
        }
        Ok(())
    }

    fn eval(&self, point: &dyn FeatureLookup) -> f64 {
        self.features
            .iter()
            .zip(&self.weights)
            .map(|(&fid, w)| w * point.feature_value(fid) as f64)
            .sum()
    }

    fn model(&self) -> String {
        let p = &self.params;
        let mut out = format!("## {}\n", self.name());
        out += &format!("## Restart = {}\n", p.n_restart);
        out += &format!("## MaxIteration = {}\n", p.max_iteration);
        out += &format!("## StepBase = {:?}\n", p.step_base);
        out += &format!("## StepScale = {:?}\n", p.step_scale);
        out += &format!("## Tolerance = {:?}\n", p.tolerance);
        out += &format!("## Regularized = {}\n", p.regularized);
        out += &format!("## Slack = {:?}\n", p.slack);
        let pairs: Vec<String> = self
            .features
            .iter()
            .zip(&self.weights)
            .map(|(fid, w)| format!("{fid}:{w:?}"))
            .collect();
        out += &pairs.join(" ");
        out
    }

    fn load_from_string(&mut self, text: &str, resolver: &FeatureResolver<'_>) -> Result<()> {
        let load = || -> Result<(Vec<usize>, Vec<f64>)> {
            let line = content_lines(text)
                .next()
                .ok_or_else(|| RankLibError::InvalidModel("Model has no weights.".into()))?;
            let mut features = Vec::new();
            let mut weights = Vec::new();
            for (key, value) in parse_pairs(line) {
                features.push(resolver.resolve(key)?);
                weights.push(parse_num(value, "weight")?);
            }
            Ok((features, weights))
        };
        let (features, weights) = load().map_err(|e| e.context("Error in CoorAscent::load()"))?;
        self.features = features;
        self.weights = weights;
        Ok(())
    }
}

// =============================================================================
// Score cache
// =============================================================================

/// Model scores of every training document under the accepted weights.
///
/// A candidate weight change for one feature is scored as
/// `cached + delta * x[f]`, so a line-search step costs one pass over the
/// documents instead of a full dot product each.
struct ScoreCache {
    scores: Vec<Vec<f64>>,
    reg_vector: Vec<f64>,
}

impl ScoreCache {
    fn new(samples: &[RankList], features: &[usize], weights: &[f64]) -> Self {
        let scores = samples
            .iter()
            .map(|rl| {
                rl.points()
                    .iter()
                    .map(|p| {
                        features
                            .iter()
                            .zip(weights)
                            .map(|(&fid, w)| w * p.feature_value(fid) as f64)
                            .sum()
                    })
                    .collect()
            })
            .collect();
        Self {
            scores,
            reg_vector: weights.to_vec(),
        }
    }

    /// Mean metric with the weight of feature `features[fi]` moved by `delta`.
    fn metric(
        &self,
        samples: &[RankList],
        features: &[usize],
        candidate: Option<(usize, f64)>,
        scorer: &dyn MetricScorer,
        pool: &WorkerPool,
    ) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let lists: Vec<usize> = (0..samples.len()).collect();
        let scores = pool.map(&lists, |&l| {
            let rl = &samples[l];
            let cached = &self.scores[l];
            let ranked: Vec<f64> = match candidate {
                Some((fi, delta)) => rl
                    .points()
                    .iter()
                    .zip(cached)
                    .map(|(p, s)| s + delta * p.feature_value(features[fi]) as f64)
                    .collect(),
                None => cached.clone(),
            };
            let order = sort_indices(&ranked, false);
            let labels: Vec<f32> = order.iter().map(|&i| rl.get(i).label()).collect();
            scorer.score(&labels)
        });
        scores.iter().sum::<f64>() / samples.len() as f64
    }

    fn shift(&mut self, samples: &[RankList], fid: usize, delta: f64) {
        for (rl, cached) in samples.iter().zip(&mut self.scores) {
            for (p, s) in rl.points().iter().zip(cached.iter_mut()) {
                *s += delta * p.feature_value(fid) as f64;
            }
        }
    }

    fn scale(&mut self, factor: f64) {
        self.scores.iter_mut().flatten().for_each(|s| *s *= factor);
    }
}

/// Scale `weights` to unit L1 norm and return the old norm.
///
/// An all-zero vector becomes uniform (norm reported as 1).
fn normalize(weights: &mut [f64]) -> f64 {
    let sum: f64 = weights.iter().map(|w| w.abs()).sum();
    if sum > 0.0 {
        weights.iter_mut().for_each(|w| *w /= sum);
        sum
    } else {
        let n = weights.len() as f64;
        weights.iter_mut().for_each(|w| *w = 1.0 / n);
        1.0
    }
}

/// Euclidean distance between the L1-normalised weight vectors.
fn distance(a: &[f64], b: &[f64]) -> f64 {
    let sa: f64 = a.iter().map(|w| w.abs()).sum();
    let sb: f64 = b.iter().map(|w| w.abs()).sum();
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let t = x / sa - y / sb;
            t * t
        })
        .sum::<f64>()
        .sqrt()
}
