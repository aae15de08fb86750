//! RankBoost: pairwise boosting over threshold stumps `x[fid] > θ`.

use super::super::config::RankBoostParams;
use super::super::data::{FeatureLookup, RankList};
use super::super::error::{parse_num, RankLibError, Result};
use super::super::model_text::{content_lines, parse_fields, FeatureResolver};
use super::super::ranker::{Ranker, RankerKind, TrainingContext};
use crate::utils::sort_indices;

/// One weak ranker and its weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stump {
    pub fid: usize,
    pub threshold: f64,
    pub alpha: f64,
}

impl Stump {
    #[inline]
    fn fires(&self, point: &dyn FeatureLookup) -> bool {
        point.feature_value(self.fid) as f64 > self.threshold
    }
}

#[derive(Debug, Clone, Default)]
pub struct RankBoost {
    params: RankBoostParams,
    features: Vec<usize>,
    stumps: Vec<Stump>,
    state: Option<BoostState>,
}

/// Per-training data: lists in label order and the pair distribution.
#[derive(Debug, Clone)]
struct BoostState {
    lists: Vec<RankList>,
    /// Row-major `n × n` pair weights per list; non-zero only for
    /// `j < k` with `label[j] > label[k]`.
    pair_weights: Vec<Vec<f64>>,
    potential: Vec<Vec<f64>>,
    /// Candidate thresholds per feature, descending.
    thresholds: Vec<Vec<f64>>,
    /// Per feature then per list, document indices by descending value.
    sorted_docs: Vec<Vec<Vec<usize>>>,
}

impl BoostState {
    fn new(samples: &[RankList], features: &[usize], n_threshold: usize) -> Self {
        let lists: Vec<RankList> = samples.iter().map(RankList::correct_ranking).collect();

        let mut total_pairs = 0usize;
        for rl in &lists {
            let labels = rl.labels();
            for (j, a) in labels.iter().enumerate() {
                total_pairs += labels[j + 1..].iter().filter(|b| a > b).count();
            }
        }
        let init = if total_pairs > 0 { 1.0 / total_pairs as f64 } else { 0.0 };
        let pair_weights = lists
            .iter()
            .map(|rl| {
                let labels = rl.labels();
                let n = labels.len();
                let mut w = vec![0.0; n * n];
                for j in 0..n {
                    for k in j + 1..n {
                        if labels[j] > labels[k] {
                            w[j * n + k] = init;
                        }
                    }
                }
                w
            })
            .collect();

        let thresholds = features
            .iter()
            .map(|&fid| candidate_thresholds(&lists, fid, n_threshold))
            .collect();
        let sorted_docs = features
            .iter()
            .map(|&fid| {
                lists
                    .iter()
                    .map(|rl| {
                        let values: Vec<f32> =
                            rl.points().iter().map(|p| p.feature_value(fid)).collect();
                        sort_indices(&values, false)
                    })
                    .collect()
            })
            .collect();

        Self {
            potential: lists.iter().map(|rl| vec![0.0; rl.len()]).collect(),
            lists,
            pair_weights,
            thresholds,
            sorted_docs,
        }
    }

    fn update_potential(&mut self) {
        for ((rl, w), pot) in self.lists.iter().zip(&self.pair_weights).zip(&mut self.potential) {
            let n = rl.len();
            for j in 0..n {
                let out: f64 = (j + 1..n).map(|k| w[j * n + k]).sum();
                let inc: f64 = (0..j).map(|k| w[k * n + j]).sum();
                pot[j] = out - inc;
            }
        }
    }

    /// Best `(threshold, r)` of one feature: walk thresholds from the top,
    /// adding the potential of every document that rises above.
    fn best_threshold(&self, fi: usize, fid: usize) -> Option<(f64, f64)> {
        let mut consumed = vec![0usize; self.lists.len()];
        let mut r = 0.0;
        let mut best: Option<(f64, f64)> = None;
        for &t in &self.thresholds[fi] {
            for (li, rl) in self.lists.iter().enumerate() {
                let order = &self.sorted_docs[fi][li];
                while consumed[li] < order.len() {
                    let doc = order[consumed[li]];
                    if rl.get(doc).feature_value(fid) as f64 > t {
                        r += self.potential[li][doc];
                        consumed[li] += 1;
                    } else {
                        break;
                    }
                }
            }
            if best.map_or(true, |(_, best_r)| r > best_r) {
                best = Some((t, r));
            }
        }
        best
    }

    /// `D(j,k) *= exp(α (h(k) - h(j)))`, then renormalise.
    fn reweight(&mut self, stump: &Stump) {
        let mut z = 0.0;
        for (rl, w) in self.lists.iter().zip(&mut self.pair_weights) {
            let n = rl.len();
            let h: Vec<f64> = rl
                .points()
                .iter()
                .map(|p| if stump.fires(p) { 1.0 } else { 0.0 })
                .collect();
            for j in 0..n {
                for k in j + 1..n {
                    let slot = &mut w[j * n + k];
                    if *slot != 0.0 {
                        *slot *= (stump.alpha * (h[k] - h[j])).exp();
                        z += *slot;
                    }
                }
            }
        }
        if z > 0.0 {
            for w in self.pair_weights.iter_mut().flatten() {
                *w /= z;
            }
        }
    }
}

/// `n_threshold == 0`: every distinct value. Otherwise `n_threshold` evenly
/// spaced values from the max down, plus one below the minimum.
fn candidate_thresholds(lists: &[RankList], fid: usize, n_threshold: usize) -> Vec<f64> {
    let values = lists
        .iter()
        .flat_map(|rl| rl.points())
        .map(|p| p.feature_value(fid) as f64);
    if n_threshold == 0 {
        let mut all: Vec<f64> = values.collect();
        all.sort_by(|a, b| b.total_cmp(a));
        all.dedup();
        return all;
    }
    let (mut fmin, mut fmax) = (1e6, -1e6);
    for v in values {
        fmin = f64::min(fmin, v);
        fmax = f64::max(fmax, v);
    }
    let step = (fmax - fmin).abs() / n_threshold as f64;
    let mut out = Vec::with_capacity(n_threshold + 1);
    out.push(fmax);
    for j in 1..n_threshold {
        out.push(out[j - 1] - step);
    }
    out.push(fmin - 1e8);
    out
}

impl RankBoost {
    pub fn new(params: RankBoostParams) -> Self {
        Self {
            params,
            ..Default::default()
        }
    }

    pub fn stumps(&self) -> &[Stump] {
        &self.stumps
    }

    fn learn_weak_ranker(
        &self,
        ctx: &TrainingContext<'_>,
        state: &BoostState,
    ) -> Option<(usize, f64, f64)> {
        let indices: Vec<usize> = (0..self.features.len()).collect();
        let per_feature = ctx.pool.map(&indices, |&fi| state.best_threshold(fi, self.features[fi]));
        let mut best: Option<(usize, f64, f64)> = None;
        for (fi, found) in per_feature.into_iter().enumerate() {
            if let Some((t, r)) = found {
                if best.map_or(true, |(_, _, best_r)| r > best_r) {
                    best = Some((self.features[fi], t, r));
                }
            }
        }
        best
    }
}

impl Ranker for RankBoost {
    fn kind(&self) -> RankerKind {
        RankerKind::RankBoost
    }

    fn features(&self) -> &[usize] {
        &self.features
    }

    fn init(&mut self, ctx: &TrainingContext<'_>) -> Result<()> {
        self.features = ctx.features.to_vec();
        self.stumps.clear();
        self.state = Some(BoostState::new(ctx.samples, &self.features, self.params.n_threshold));
        Ok(())
    }

    fn learn(&mut self, ctx: &TrainingContext<'_>) -> Result<()> {
        let mut state = self
            .state
            .take()
            .ok_or_else(|| RankLibError::Config("RankBoost::learn() called before init()".into()))?;
        let metric = ctx.scorer.name();
        let mut best_on_validation: Option<(f64, usize)> = None;

        for t in 1..=self.params.n_iteration {
            state.update_potential();
            let Some((fid, threshold, r)) = self.learn_weak_ranker(ctx, &state) else {
                break;
            };
            if r <= 0.0 {
                ctx.logger.detail("no weak ranker with positive gain, stopping");
                break;
            }
            let r = r.min(1.0 - 1e-12);
            let stump = Stump {
                fid,
                threshold,
                alpha: 0.5 * ((1.0 + r) / (1.0 - r)).ln(),
            };
            self.stumps.push(stump);
            state.reweight(&stump);

            let train = ctx.training_score(&*self);
            let validation = ctx.validation_score(&*self);
            if let Some(score) = validation {
                if best_on_validation.map_or(true, |(best, _)| score > best) {
                    best_on_validation = Some((score, self.stumps.len()));
                }
            }
            ctx.logger.round(t, &metric, train, validation);
        }

        if let Some((_, n)) = best_on_validation {
            self.stumps.truncate(n);
        }
        Ok(())
    }

    fn eval(&self, point: &dyn FeatureLookup) -> f64 {
        self.stumps
            .iter()
            .filter(|s| s.fires(point))
            .map(|s| s.alpha)
            .sum()
    }

    fn model(&self) -> String {
        let mut out = format!("## {}\n", self.name());
        out += &format!("## Iteration = {}\n", self.params.n_iteration);
        out += &format!("## No. of threshold candidates = {}\n", self.params.n_threshold);
        let triples: Vec<String> = self
            .stumps
            .iter()
            .map(|s| format!("{}:{:?}:{:?}", s.fid, s.threshold, s.alpha))
            .collect();
        out += &triples.join(" ");
        out
    }

    fn load_from_string(&mut self, text: &str, resolver: &FeatureResolver<'_>) -> Result<()> {
        let load = || -> Result<Vec<Stump>> {
            let line = content_lines(text)
                .next()
                .ok_or_else(|| RankLibError::InvalidModel("Model has no weak rankers.".into()))?;
            parse_fields(line)
                .into_iter()
                .map(|fields| match fields.as_slice() {
                    [fid, threshold, alpha] => Ok(Stump {
                        fid: resolver.resolve(fid)?,
                        threshold: parse_num(threshold, "threshold")?,
                        alpha: parse_num(alpha, "weight")?,
                    }),
                    _ => Err(RankLibError::InvalidModel(format!(
                        "Expected fid:threshold:weight, got [{}]",
                        fields.join(":")
                    ))),
                })
                .collect()
        };
        self.stumps = load().map_err(|e| e.context("Error in RankBoost::load()"))?;
        self.features = self.stumps.iter().map(|s| s.fid).collect();
        self.state = None;
        Ok(())
    }
}
