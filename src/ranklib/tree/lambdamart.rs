//! MART and LambdaMART: gradient-boosted regression trees.
//!
//! Both share one training loop and differ only in their pseudo-responses
//! and leaf outputs:
//!
//! - MART fits the residual `label - score` and outputs the leaf mean
//! - LambdaMART fits pairwise lambdas weighted by the metric change of
//!   swapping each pair, and outputs a Newton step `Σλ / Σw`

use super::super::config::LambdaMartParams;
use super::super::data::{DataPoint, FeatureLookup, RankList};
use super::super::error::{RankLibError, Result};
use super::super::logger::EarlyStopping;
use super::super::metric::MetricScorer;
use super::super::model_text::{strip_comments, FeatureResolver};
use super::super::ranker::{Ranker, RankerKind, TrainingContext};
use super::ensemble::Ensemble;
use super::histogram::{FeatureHistogram, HistogramLayout};
use super::regression_tree::{FitParams, TreeFitter};
use crate::utils::{sort_indices, sort_indices_range};

/// What each boosting round fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Objective {
    /// LambdaMART.
    Lambda,
    /// MART.
    Residual,
}

#[derive(Debug, Clone)]
pub struct LambdaMart {
    params: LambdaMartParams,
    objective: Objective,
    features: Vec<usize>,
    ensemble: Ensemble,
    /// Error reduction credited to each feature index over all splits.
    impacts: Vec<f64>,
    state: Option<Box<MartState>>,
}

/// Per-training buffers over every sample of every list, flattened.
#[derive(Debug, Clone)]
struct MartState {
    points: Vec<DataPoint>,
    labels: Vec<f32>,
    /// List `i` covers `offsets[i]..offsets[i + 1]`.
    offsets: Vec<usize>,
    layout: HistogramLayout,
    root_hist: FeatureHistogram,
    model_scores: Vec<f64>,
    pseudo: Vec<f64>,
    weights: Vec<f64>,
    validation_scores: Option<Vec<Vec<f64>>>,
}

impl MartState {
    fn n_lists(&self) -> usize {
        self.offsets.len() - 1
    }

    fn list(&self, i: usize) -> std::ops::Range<usize> {
        self.offsets[i]..self.offsets[i + 1]
    }

    /// Mean metric of the cached model scores on the training lists.
    fn training_score(&self, ctx: &TrainingContext<'_>) -> f64 {
        let lists: Vec<usize> = (0..self.n_lists()).collect();
        let scores = ctx.pool.map(&lists, |&i| {
            let labels: Vec<f32> = sort_indices_range(&self.model_scores, self.list(i), false)
                .into_iter()
                .map(|k| self.labels[k])
                .collect();
            ctx.scorer.score(&labels)
        });
        scores.iter().sum::<f64>() / lists.len().max(1) as f64
    }

    /// Mean metric of the cached validation scores, if there is validation data.
    fn validation_score(&self, ctx: &TrainingContext<'_>) -> Option<f64> {
        let cached = self.validation_scores.as_ref()?;
        let lists = ctx.validation?;
        let total: f64 = lists
            .iter()
            .zip(cached)
            .map(|(rl, scores)| {
                let labels: Vec<f32> = sort_indices(scores, false)
                    .into_iter()
                    .map(|k| rl.get(k).label())
                    .collect();
                ctx.scorer.score(&labels)
            })
            .sum();
        Some(total / lists.len().max(1) as f64)
    }
}

/// Lambdas and Newton weights of one list under the current scores.
fn list_lambdas(scorer: &dyn MetricScorer, labels: &[f32], scores: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let n = labels.len();
    let order = sort_indices(scores, false);
    let ranked: Vec<f32> = order.iter().map(|&i| labels[i]).collect();
    let changes = scorer.swap_change(&ranked);
    let cutoff = if scorer.k() == 0 { n } else { scorer.k() };

    let mut lambdas = vec![0.0; n];
    let mut weights = vec![0.0; n];
    for j in 0..n {
        let mj = order[j];
        for k in 0..n {
            // pairs both below the cutoff cannot change the metric
            if j > cutoff && k > cutoff {
                break;
            }
            if ranked[j] <= ranked[k] {
                continue;
            }
            let delta = changes[j][k].abs();
            if delta > 0.0 {
                let mk = order[k];
                let rho = 1.0 / (1.0 + (scores[mj] - scores[mk]).exp());
                let lambda = rho * delta;
                lambdas[mj] += lambda;
                lambdas[mk] -= lambda;
                let w = rho * (1.0 - rho) * delta;
                weights[mj] += w;
                weights[mk] += w;
            }
        }
    }
    (lambdas, weights)
}

impl LambdaMart {
    /// LambdaMART.
    pub fn new(params: LambdaMartParams) -> Self {
        Self::with_objective(params, Objective::Lambda)
    }

    /// MART: the same booster fitting plain residuals.
    pub fn mart(params: LambdaMartParams) -> Self {
        Self::with_objective(params, Objective::Residual)
    }

    fn with_objective(params: LambdaMartParams, objective: Objective) -> Self {
        Self {
            params,
            objective,
            features: Vec::new(),
            ensemble: Ensemble::new(),
            impacts: Vec::new(),
            state: None,
        }
    }

    pub fn params(&self) -> &LambdaMartParams {
        &self.params
    }

    pub fn ensemble(&self) -> &Ensemble {
        &self.ensemble
    }

    pub fn into_ensemble(self) -> Ensemble {
        self.ensemble
    }

    /// `(feature id, error reduction)` accumulated during training.
    pub fn feature_impacts(&self) -> Vec<(usize, f64)> {
        self.features.iter().copied().zip(self.impacts.iter().copied()).collect()
    }

    fn compute_pseudo_responses(
        &self,
        ctx: &TrainingContext<'_>,
        state: &mut MartState,
    ) -> Result<()> {
        match self.objective {
            Objective::Residual => {
                let targets = state.labels.iter().zip(&state.model_scores);
                for (p, (&y, &s)) in state.pseudo.iter_mut().zip(targets) {
                    *p = f64::from(y) - s;
                }
            }
            Objective::Lambda => {
                let st = &*state;
                let chunks = ctx.pool.run_partitioned(st.n_lists(), |range| {
                    Ok(range
                        .map(|i| {
                            let r = st.list(i);
                            list_lambdas(ctx.scorer, &st.labels[r.clone()], &st.model_scores[r])
                        })
                        .collect::<Vec<_>>())
                })?;
                let mut at = 0;
                for (lambdas, weights) in chunks.into_iter().flatten() {
                    let n = lambdas.len();
                    state.pseudo[at..at + n].copy_from_slice(&lambdas);
                    state.weights[at..at + n].copy_from_slice(&weights);
                    at += n;
                }
            }
        }
        Ok(())
    }

    fn leaf_output(&self, state: &MartState, samples: &[usize]) -> f32 {
        match self.objective {
            Objective::Residual => {
                let s1 = samples
                    .iter()
                    .fold(0.0f32, |s, &k| (f64::from(s) + state.pseudo[k]) as f32);
                s1 / samples.len() as f32
            }
            Objective::Lambda => {
                let (s1, s2) = samples.iter().fold((0.0f32, 0.0f32), |(s1, s2), &k| {
                    (
                        (f64::from(s1) + state.pseudo[k]) as f32,
                        (f64::from(s2) + state.weights[k]) as f32,
                    )
                });
                if s2 == 0.0 {
                    0.0
                } else {
                    s1 / s2
                }
            }
        }
    }

    fn fit_params(&self) -> FitParams {
        FitParams {
            n_leaves: self.params.n_tree_leaves,
            min_leaf_support: self.params.min_leaf_support,
            feature_sampling_rate: self.params.feature_sampling_rate,
            histogram_reuse: self.params.histogram_reuse,
        }
    }
}

impl Ranker for LambdaMart {
    fn kind(&self) -> RankerKind {
        match self.objective {
            Objective::Lambda => RankerKind::LambdaMart,
            Objective::Residual => RankerKind::Mart,
        }
    }

    fn features(&self) -> &[usize] {
        &self.features
    }

    fn init(&mut self, ctx: &TrainingContext<'_>) -> Result<()> {
        let points: Vec<DataPoint> = ctx
            .samples
            .iter()
            .flat_map(|rl| rl.points().iter().cloned())
            .collect();
        let mut offsets = Vec::with_capacity(ctx.samples.len() + 1);
        offsets.push(0);
        for rl in ctx.samples {
            offsets.push(offsets[offsets.len() - 1] + rl.len());
        }
        let n = points.len();

        let layout =
            HistogramLayout::new(&points, ctx.features, self.params.n_threshold, ctx.pool)?;
        let all: Vec<usize> = (0..n).collect();
        let root_hist = FeatureHistogram::build(&layout, &all, &vec![0.0; n], ctx.pool)?;

        self.features = ctx.features.to_vec();
        self.impacts = vec![0.0; ctx.features.len()];
        self.ensemble = Ensemble::new();
        self.state = Some(Box::new(MartState {
            labels: points.iter().map(DataPoint::label).collect(),
            points,
            offsets,
            layout,
            root_hist,
            model_scores: vec![0.0; n],
            pseudo: vec![0.0; n],
            weights: vec![0.0; n],
            validation_scores: ctx
                .validation
                .map(|lists| lists.iter().map(|rl| vec![0.0; rl.len()]).collect()),
        }));
        ctx.logger.detail(&format!("{n} samples prepared"));
        Ok(())
    }

    fn learn(&mut self, ctx: &TrainingContext<'_>) -> Result<()> {
        let mut state = self.state.take().ok_or_else(|| {
            RankLibError::Config(format!("{}::learn() called before init()", self.name()))
        })?;
        let metric = ctx.scorer.name();
        let lr = self.params.learning_rate;
        let fit_params = self.fit_params();
        let mut rng = ctx.rng(0);
        // stop once more than `early_stop_rounds` trees follow the best one
        let patience =
            (self.params.early_stop_rounds > 0).then_some(self.params.early_stop_rounds + 1);
        let mut stopping = EarlyStopping::new(patience);

        for m in 0..self.params.n_trees {
            self.compute_pseudo_responses(ctx, &mut state)?;
            state.root_hist.update(&state.layout, &state.pseudo, ctx.pool)?;

            let fitted = TreeFitter::new(
                &state.layout,
                &state.root_hist,
                &state.pseudo,
                fit_params,
                ctx.pool,
            )
            .fit(&mut rng, &mut self.impacts)?;
            let mut tree = fitted.tree;
            for (leaf, samples) in &fitted.leaf_samples {
                tree.set_output(*leaf, self.leaf_output(&state, samples));
            }

            for (score, p) in state.model_scores.iter_mut().zip(&state.points) {
                *score += f64::from(lr * tree.eval(p));
            }
            let validation = state.validation_scores.as_mut().zip(ctx.validation);
            if let Some((cached, lists)) = validation {
                for (scores, rl) in cached.iter_mut().zip(lists) {
                    for (score, p) in scores.iter_mut().zip(rl.points()) {
                        *score += f64::from(lr * tree.eval(p));
                    }
                }
            }
            self.ensemble.add(tree, lr);

            let train = state.training_score(ctx);
            let validation = state.validation_score(ctx);
            ctx.logger.round(m + 1, &metric, train, validation);
            if let Some(score) = validation {
                if stopping.should_stop(score) {
                    ctx.logger.early_stopping(m + 1, stopping.best_round() + 1, &metric);
                    break;
                }
            }
        }

        if stopping.best_value().is_some() {
            self.ensemble.truncate(stopping.best_round() + 1);
        }
        ctx.logger.detail(&format!(
            "{} trees, {} leaves",
            self.ensemble.tree_count(),
            self.ensemble.leaf_count()
        ));
        Ok(())
    }

    fn eval(&self, point: &dyn FeatureLookup) -> f64 {
        f64::from(self.ensemble.eval(point))
    }

    fn model(&self) -> String {
        let p = &self.params;
        let mut out = format!("## {}\n", self.name());
        out += &format!("## No. of trees = {}\n", p.n_trees);
        out += &format!("## No. of leaves = {}\n", p.n_tree_leaves);
        out += &format!("## No. of threshold candidates = {}\n", p.n_threshold);
        out += &format!("## Learning rate = {:?}\n", p.learning_rate);
        out += &format!("## Stop early = {}\n", p.early_stop_rounds);
        out += "\n";
        out += &self.ensemble.to_xml();
        out
    }

    fn load_from_string(&mut self, text: &str, resolver: &FeatureResolver<'_>) -> Result<()> {
        let load = || Ensemble::parse(&strip_comments(text), resolver);
        let context = format!("Error in {}::load()", self.name());
        self.ensemble = load().map_err(|e| e.context(context))?;
        self.features = self.ensemble.features();
        self.impacts = vec![0.0; self.features.len()];
        self.state = None;
        Ok(())
    }

    fn rank(&self, list: &RankList) -> RankList {
        let scores: Vec<f32> = list.points().iter().map(|p| self.ensemble.eval(p)).collect();
        list.reorder(&sort_indices(&scores, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_approx_eq_f64;
    use crate::ranklib::data::parse_samples;
    use crate::ranklib::metric::MetricKind;
    use crate::ranklib::ranker::{evaluate, RankerFactory};
    use crate::ranklib::TrainingLogger;
    use crate::utils::WorkerPool;

    // feature 1 is low for the relevant document of each query
    const TRAIN: &str = "\
        0 qid:1 1:0.8 2:0.5\n\
        1 qid:1 1:0.2 2:0.5\n\
        0 qid:2 1:0.9 2:0.1\n\
        2 qid:2 1:0.1 2:0.3\n";

    fn train(ranker: &mut LambdaMart, samples: &[RankList], validation: Option<&[RankList]>) {
        let scorer = MetricKind::Ndcg(10).scorer();
        let pool = WorkerPool::sequential();
        let ctx = TrainingContext {
            samples,
            validation,
            features: &[1, 2],
            scorer: scorer.as_ref(),
            pool: &pool,
            logger: TrainingLogger::silent(),
            seed: 7,
        };
        ranker.init(&ctx).unwrap();
        ranker.learn(&ctx).unwrap();
    }

    fn small_params(n_trees: usize) -> LambdaMartParams {
        LambdaMartParams::builder()
            .n_trees(n_trees)
            .n_tree_leaves(4)
            .learning_rate(0.5)
            .build()
            .unwrap()
    }

    #[test]
    fn lambdas_push_the_relevant_document_up() {
        let scorer = MetricKind::Ndcg(10).scorer();
        // the relevant document is ranked second
        let (lambdas, weights) = list_lambdas(scorer.as_ref(), &[0.0, 1.0], &[1.0, 0.0]);
        assert!(lambdas[1] > 0.0);
        assert_approx_eq_f64!(lambdas[0], -lambdas[1], 1e-12);
        assert_approx_eq_f64!(weights[0], weights[1], 1e-12);

        // equal labels produce no pair
        let (lambdas, _) = list_lambdas(scorer.as_ref(), &[1.0, 1.0], &[0.3, 0.1]);
        assert_eq!(lambdas, vec![0.0, 0.0]);
    }

    #[test]
    fn lambdamart_learns_the_training_order() {
        let samples = parse_samples(TRAIN).unwrap();
        let scorer = MetricKind::Ndcg(10).scorer();
        let untrained = LambdaMart::new(small_params(3));
        let pool = WorkerPool::sequential();
        assert!(evaluate(&untrained, &samples, scorer.as_ref(), &pool) < 1.0);

        let mut ranker = LambdaMart::new(small_params(3));
        train(&mut ranker, &samples, None);
        assert_eq!(ranker.ensemble().tree_count(), 3);
        assert_eq!(ranker.features(), &[1, 2]);
        assert_approx_eq_f64!(
            evaluate(&ranker, &samples, scorer.as_ref(), &pool),
            1.0,
            1e-9
        );
    }

    #[test]
    fn mart_first_tree_fits_the_residual_means() {
        let samples =
            parse_samples("1 qid:1 1:1\n1 qid:1 1:2\n3 qid:1 1:3\n3 qid:1 1:4\n").unwrap();
        let params = LambdaMartParams::builder()
            .n_trees(1)
            .n_tree_leaves(2)
            .learning_rate(1.0)
            .build()
            .unwrap();
        let mut ranker = LambdaMart::mart(params);
        train(&mut ranker, &samples, None);
        let pts = samples[0].points();
        assert_approx_eq_f64!(ranker.eval(&pts[0]), 1.0, 1e-6);
        assert_approx_eq_f64!(ranker.eval(&pts[3]), 3.0, 1e-6);
    }

    #[test]
    fn validation_keeps_the_best_prefix() {
        let samples = parse_samples(TRAIN).unwrap();
        let validation = samples.clone();
        let params = LambdaMartParams::builder()
            .n_trees(6)
            .n_tree_leaves(4)
            .early_stop_rounds(2)
            .build()
            .unwrap();
        let mut ranker = LambdaMart::new(params);
        train(&mut ranker, &samples, Some(&validation));
        assert!(ranker.ensemble().tree_count() >= 1);
        assert!(ranker.ensemble().tree_count() <= 6);
    }

    #[test]
    fn learn_requires_init() {
        let samples = parse_samples(TRAIN).unwrap();
        let scorer = MetricKind::Ndcg(10).scorer();
        let pool = WorkerPool::sequential();
        let ctx = TrainingContext {
            samples: &samples,
            validation: None,
            features: &[1, 2],
            scorer: scorer.as_ref(),
            pool: &pool,
            logger: TrainingLogger::silent(),
            seed: 0,
        };
        let err = LambdaMart::mart(Default::default()).learn(&ctx).unwrap_err();
        assert_eq!(err.to_string(), "Invalid configuration: MART::learn() called before init()");
    }

    #[test]
    fn model_text_reloads_to_the_same_scores() {
        let samples = parse_samples(TRAIN).unwrap();
        let mut ranker = LambdaMart::new(small_params(3));
        train(&mut ranker, &samples, None);

        let text = ranker.model();
        assert!(text.starts_with("## LambdaMART\n## No. of trees = 3\n"));
        assert!(text.contains("## Learning rate = 0.5\n"));

        let loaded = RankerFactory.load_ranker_from_string(&text).unwrap();
        assert_eq!(loaded.kind(), RankerKind::LambdaMart);
        for p in samples.iter().flat_map(|rl| rl.points()) {
            assert_eq!(loaded.eval(p), ranker.eval(p));
        }
    }

    #[test]
    fn load_errors_carry_the_ranker_name() {
        let text = "## MART\n<ensemble><tree id=\"1\">\
                    <split><output>1</output></split></tree></ensemble>";
        let err = RankerFactory.load_ranker_from_string(text).unwrap_err();
        assert_eq!(err.to_string(), "Error in MART::load()");
    }
}
