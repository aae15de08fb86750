//! AdaRank: boosting over single-feature weak rankers with per-query
//! sample weights driven directly by the ranking metric.

use super::super::config::AdaRankParams;
use super::super::data::{FeatureLookup, RankList};
use super::super::error::{parse_num, RankLibError, Result};
use super::super::model_text::{content_lines, parse_pairs, yes_no, FeatureResolver};
use super::super::ranker::{Ranker, RankerKind, TrainingContext};
use crate::utils::sort_indices;

#[derive(Debug, Clone, Default)]
pub struct AdaRank {
    params: AdaRankParams,
    features: Vec<usize>,
    /// `(feature id, weight)` of every selected weak ranker, in selection order.
    rankers: Vec<(usize, f64)>,
    state: Option<TrainState>,
}

#[derive(Debug, Clone)]
struct TrainState {
    sample_weights: Vec<f64>,
    benched: Vec<usize>,
    last_feature: Option<usize>,
    consecutive: usize,
    last_trained_score: f64,
    best_on_validation: Option<(f64, Vec<(usize, f64)>)>,
}

/// Metric of a list ordered by one feature, descending.
fn weak_score(ctx: &TrainingContext<'_>, rl: &RankList, fid: usize) -> f64 {
    let values: Vec<f32> = rl.points().iter().map(|p| p.feature_value(fid)).collect();
    let labels: Vec<f32> = sort_indices(&values, false)
        .into_iter()
        .map(|i| rl.get(i).label())
        .collect();
    ctx.scorer.score(&labels)
}

impl AdaRank {
    pub fn new(params: AdaRankParams) -> Self {
        Self {
            params,
            ..Default::default()
        }
    }

    pub fn weak_rankers(&self) -> &[(usize, f64)] {
        &self.rankers
    }

    /// The feature maximising the weighted metric, skipping benched features.
    fn learn_weak_ranker(&self, ctx: &TrainingContext<'_>, state: &TrainState) -> Option<usize> {
        let candidates: Vec<usize> = self
            .features
            .iter()
            .copied()
            .filter(|fid| !state.benched.contains(fid))
            .collect();
        let scores = ctx.pool.map(&candidates, |&fid| {
            ctx.samples
                .iter()
                .zip(&state.sample_weights)
                .map(|(rl, w)| weak_score(ctx, rl, fid) * w)
                .sum::<f64>()
        });
        let mut best: Option<(usize, f64)> = None;
        for (fid, score) in candidates.into_iter().zip(scores) {
            if best.map_or(true, |(_, s)| s < score) {
                best = Some((fid, score));
            }
        }
        best.map(|(fid, _)| fid)
    }

    /// One boosting phase starting at round `start`; returns the next round.
    fn learn_phase(
        &mut self,
        ctx: &TrainingContext<'_>,
        state: &mut TrainState,
        start: usize,
    ) -> usize {
        let metric = ctx.scorer.name();
        let mut t = start;
        while t <= self.params.n_iteration {
            let Some(fid) = self.learn_weak_ranker(ctx, state) else {
                break;
            };

            if state.last_feature == Some(fid) {
                state.consecutive += 1;
            } else {
                state.last_feature = Some(fid);
                state.consecutive = 1;
            }
            if state.consecutive > self.params.max_sel_count {
                ctx.logger
                    .detail(&format!("feature {fid} selected too often, benched"));
                state.benched.push(fid);
                state.last_feature = None;
                state.consecutive = 0;
                t += 1;
                continue;
            }

            let (mut num, mut denom) = (0.0, 0.0);
            for (rl, w) in ctx.samples.iter().zip(&state.sample_weights) {
                let s = weak_score(ctx, rl, fid);
                num += w * (1.0 + s);
                denom += w * (1.0 - s);
            }
            let alpha = 0.5 * (num / denom.max(1e-10)).ln();
            self.rankers.push((fid, alpha));

            let scores: Vec<f64> = ctx
                .samples
                .iter()
                .map(|rl| ctx.scorer.score(&self.rank(rl).labels()))
                .collect();
            let trained = scores.iter().sum::<f64>() / scores.len().max(1) as f64;
            if trained + self.params.tolerance - state.last_trained_score <= 0.0 {
                self.rankers.pop();
                break;
            }
            state.last_trained_score = trained;

            let total: f64 = scores.iter().map(|s| (-s).exp()).sum();
            for (w, s) in state.sample_weights.iter_mut().zip(&scores) {
                *w = (-s).exp() / total;
            }

            let validation = ctx.validation_score(&*self);
            if let Some(score) = validation {
                if state.best_on_validation.as_ref().map_or(true, |(best, _)| score > *best) {
                    state.best_on_validation = Some((score, self.rankers.clone()));
                }
            }
            ctx.logger.round(t, &metric, trained, validation);
            t += 1;
        }
        t
    }
}

impl Ranker for AdaRank {
    fn kind(&self) -> RankerKind {
        RankerKind::AdaRank
    }

    fn features(&self) -> &[usize] {
        &self.features
    }

    fn init(&mut self, ctx: &TrainingContext<'_>) -> Result<()> {
        self.features = ctx.features.to_vec();
        self.rankers.clear();
        let n = ctx.samples.len();
        self.state = Some(TrainState {
            sample_weights: vec![1.0 / n as f64; n],
            benched: Vec::new(),
            last_feature: None,
            consecutive: 0,
            last_trained_score: -1.0,
            best_on_validation: None,
        });
        Ok(())
    }

    fn learn(&mut self, ctx: &TrainingContext<'_>) -> Result<()> {
        let mut state = self
            .state
            .take()
            .ok_or_else(|| RankLibError::Config("AdaRank::learn() called before init()".into()))?;

        let mut t = self.learn_phase(ctx, &mut state, 1);
        if self.params.train_with_enqueue {
            while let Some(fid) = state.benched.pop() {
                if t > self.params.n_iteration {
                    break;
                }
                ctx.logger.detail(&format!("feature {fid} back in play"));
                state.last_feature = None;
                state.consecutive = 0;
                t = self.learn_phase(ctx, &mut state, t);
            }
        }
        if let Some((_, best)) = state.best_on_validation {
            self.rankers = best;
        }
        Ok(())
    }

    fn eval(&self, point: &dyn FeatureLookup) -> f64 {
        self.rankers
            .iter()
            .map(|&(fid, w)| w * point.feature_value(fid) as f64)
            .sum()
    }

    fn model(&self) -> String {
        let p = &self.params;
        let mut out = format!("## {}\n", self.name());
        out += &format!("## Iteration = {}\n", p.n_iteration);
        out += &format!("## Train with enqueue: {}\n", yes_no(p.train_with_enqueue));
        out += &format!("## Tolerance = {:?}\n", p.tolerance);
        out += &format!("## Max consecutive selection count = {}\n", p.max_sel_count);
        let pairs: Vec<String> = self
            .rankers
            .iter()
            .map(|(fid, w)| format!("{fid}:{w:?}"))
            .collect();
        out += &pairs.join(" ");
        out
    }

    fn load_from_string(&mut self, text: &str, resolver: &FeatureResolver<'_>) -> Result<()> {
        let load = || -> Result<Vec<(usize, f64)>> {
            let line = content_lines(text)
                .next()
                .ok_or_else(|| RankLibError::InvalidModel("Model has no weak rankers.".into()))?;
            parse_pairs(line)
                .into_iter()
                .map(|(key, value)| Ok((resolver.resolve(key)?, parse_num(value, "weight")?)))
                .collect()
        };
        self.rankers = load().map_err(|e| e.context("Error in AdaRank::load()"))?;
        self.features = self.rankers.iter().map(|&(fid, _)| fid).collect();
        self.state = None;
        Ok(())
    }
}
