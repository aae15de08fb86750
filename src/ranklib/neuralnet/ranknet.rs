//! RankNet and LambdaRank: pairwise training of a sigmoid network.

use super::super::config::RankNetParams;
use super::super::data::{FeatureLookup, RankList};
use super::super::error::{RankLibError, Result};
use super::super::logger::Verbosity;
use super::super::model_text::FeatureResolver;
use super::super::ranker::{Ranker, RankerKind, TrainingContext};
use super::network::{load_network, random_weight, Network, Pair, PairLoss};

#[derive(Debug, Clone, Default)]
pub struct RankNet {
    params: RankNetParams,
    lambda: bool,
    features: Vec<usize>,
    network: Network,
    state: Option<TrainState>,
}

#[derive(Debug, Clone)]
struct TrainState {
    total_pairs: usize,
    best_on_validation: Option<(f64, Vec<f64>)>,
}

impl RankNet {
    pub fn new(params: RankNetParams) -> Self {
        Self {
            params,
            ..Default::default()
        }
    }

    /// LambdaRank: lists are re-ranked by the current model and every pair
    /// is weighted by the metric change of swapping it.
    pub fn lambda_rank(params: RankNetParams) -> Self {
        Self {
            params,
            lambda: true,
            ..Default::default()
        }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    fn loss(&self) -> PairLoss {
        if self.lambda {
            PairLoss::Lambda
        } else {
            PairLoss::CrossEntropy
        }
    }

    /// Pairs of every document of `rl`, indexed by position.
    fn pairs(&self, ctx: &TrainingContext<'_>, rl: &RankList) -> Vec<Vec<Pair>> {
        let labels = rl.labels();
        if !self.lambda {
            return labels
                .iter()
                .map(|&li| {
                    labels
                        .iter()
                        .enumerate()
                        .filter(|&(_, &lj)| li > lj)
                        .map(|(j, _)| Pair {
                            other: j,
                            weight: 1.0,
                            target: 1.0,
                        })
                        .collect()
                })
                .collect();
        }

        let changes = ctx.scorer.swap_change(&labels);
        labels
            .iter()
            .enumerate()
            .map(|(i, &li)| {
                labels
                    .iter()
                    .enumerate()
                    .filter(|&(_, &lj)| li != lj)
                    .map(|(j, &lj)| {
                        let sign = if li > lj { 1.0 } else { -1.0 };
                        Pair {
                            other: j,
                            weight: changes[i][j].abs() as f32 * sign,
                            target: if li > lj { 1.0 } else { 0.0 },
                        }
                    })
                    .collect()
            })
            .collect()
    }

    fn train_list(&mut self, ctx: &TrainingContext<'_>, rl: &RankList) {
        let reordered;
        let rl = if self.lambda {
            reordered = self.rank(rl);
            &reordered
        } else {
            rl
        };
        let outputs: Vec<Vec<f64>> = rl
            .points()
            .iter()
            .map(|p| self.network.forward(p, &self.features))
            .collect();
        let loss = self.loss();
        for (i, pairs) in self.pairs(ctx, rl).iter().enumerate() {
            if !pairs.is_empty() {
                self.network
                    .pairwise_update(&outputs, i, pairs, loss, self.params.learning_rate);
            }
        }
    }

    /// Mean pairwise cross-entropy and the number of misordered pairs.
    fn estimate_loss(&self, samples: &[RankList], total_pairs: usize) -> (f64, usize) {
        let mut error = 0.0;
        let mut misordered = 0;
        for rl in samples {
            let scores: Vec<f64> = rl.points().iter().map(|p| self.eval(p)).collect();
            for k in 0..rl.len() {
                for l in (k + 1)..rl.len() {
                    if rl.get(k).label() > rl.get(l).label() {
                        let o = scores[k] - scores[l];
                        error += -o + (1.0 + o.exp()).log2();
                        if scores[k] < scores[l] {
                            misordered += 1;
                        }
                    }
                }
            }
        }
        (error / total_pairs.max(1) as f64, misordered)
    }
}

impl Ranker for RankNet {
    fn kind(&self) -> RankerKind {
        if self.lambda {
            RankerKind::LambdaRank
        } else {
            RankerKind::RankNet
        }
    }

    fn features(&self) -> &[usize] {
        &self.features
    }

    fn init(&mut self, ctx: &TrainingContext<'_>) -> Result<()> {
        self.features = ctx.features.to_vec();
        let hidden = vec![self.params.n_hidden_nodes; self.params.n_hidden_layer];
        let mut rng = ctx.rng(0);
        self.network = Network::new(self.features.len(), &hidden, 1, || random_weight(&mut rng));

        let total_pairs = ctx
            .samples
            .iter()
            .map(|rl| {
                let labels = rl.labels();
                labels
                    .iter()
                    .enumerate()
                    .map(|(j, &lj)| labels[j + 1..].iter().filter(|&&lk| lj > lk).count())
                    .sum::<usize>()
            })
            .sum();
        self.state = Some(TrainState {
            total_pairs,
            best_on_validation: None,
        });
        ctx.logger
            .detail(&format!("{} synapses, {total_pairs} pairs", self.network.synapses().len()));
        Ok(())
    }

    fn learn(&mut self, ctx: &TrainingContext<'_>) -> Result<()> {
        let mut state = self.state.take().ok_or_else(|| {
            RankLibError::Config(format!("{}::learn() called before init()", self.name()))
        })?;
        let metric = ctx.scorer.name();

        for epoch in 1..=self.params.n_iteration {
            for rl in ctx.samples {
                self.train_list(ctx, rl);
            }
            let train = ctx.training_score(&*self);
            if ctx.logger.enabled(Verbosity::Debug) {
                let (error, misordered) = self.estimate_loss(ctx.samples, state.total_pairs);
                let message =
                    format!("epoch {epoch}: loss {error:.4}, {misordered} misordered pairs");
                ctx.logger.detail(&message);
            }
            let validation = ctx.validation_score(&*self);
            if let Some(score) = validation {
                if state.best_on_validation.as_ref().map_or(true, |(best, _)| score > *best) {
                    state.best_on_validation = Some((score, self.network.weights()));
                }
            }
            ctx.logger.round(epoch, &metric, train, validation);
        }

        if let Some((_, weights)) = state.best_on_validation {
            self.network.set_weights(&weights);
        }
        Ok(())
    }

    fn eval(&self, point: &dyn FeatureLookup) -> f64 {
        self.network.eval(point, &self.features)
    }

    fn model(&self) -> String {
        let net = &self.network;
        let mut out = format!("## {}\n", self.name());
        out += &format!("## Epochs = {}\n", self.params.n_iteration);
        out += &format!("## No. of features = {}\n", self.features.len());
        out += &format!("## No. of hidden layers = {}\n", net.n_hidden_layers());
        for l in 1..=net.n_hidden_layers() {
            out += &format!("## Layer {l}: {} neurons\n", net.layer(l).len());
        }
        let features: Vec<String> = self.features.iter().map(usize::to_string).collect();
        out += &features.join(" ");
        out += "\n";
        out += &format!("{}\n", net.n_hidden_layers());
        for l in 1..=net.n_hidden_layers() {
            out += &format!("{}\n", net.layer(l).len());
        }
        net.write_weights(&mut out);
        out
    }

    fn load_from_string(&mut self, text: &str, resolver: &FeatureResolver<'_>) -> Result<()> {
        let (features, network) = load_network(text, resolver)
            .map_err(|e| e.context(format!("Error in {}::load()", self.name())))?;
        self.features = features;
        self.network = network;
        self.state = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranklib::data::parse_samples;
    use crate::ranklib::metric::MetricKind;
    use crate::ranklib::ranker::RankerFactory;
    use crate::ranklib::TrainingLogger;
    use crate::utils::WorkerPool;

    const TRAIN: &str = "2 qid:1 1:1.0 2:0.2\n1 qid:1 1:0.5 2:0.4\n0 qid:1 1:0.0 2:0.9\n\
                         1 qid:2 1:0.8 2:0.1\n0 qid:2 1:0.1 2:0.3\n";

    fn trained(mut ranker: RankNet) -> RankNet {
        let samples = parse_samples(TRAIN).unwrap();
        let scorer = MetricKind::Ndcg(10).scorer();
        let pool = WorkerPool::sequential();
        let ctx = TrainingContext {
            samples: &samples,
            validation: Some(&samples),
            features: &[1, 2],
            scorer: scorer.as_ref(),
            pool: &pool,
            logger: TrainingLogger::silent(),
            seed: 11,
        };
        ranker.init(&ctx).unwrap();
        ranker.learn(&ctx).unwrap();
        ranker
    }

    fn params() -> RankNetParams {
        RankNetParams::builder()
            .n_iteration(5)
            .n_hidden_nodes(3)
            .learning_rate(0.1)
            .build()
            .unwrap()
    }

    #[test]
    fn lambda_pairs_are_signed_by_label_order() {
        let samples = parse_samples("1 qid:1 1:1\n0 qid:1 1:0\n").unwrap();
        let scorer = MetricKind::Ndcg(10).scorer();
        let pool = WorkerPool::sequential();
        let ctx = TrainingContext {
            samples: &samples,
            validation: None,
            features: &[1],
            scorer: scorer.as_ref(),
            pool: &pool,
            logger: TrainingLogger::silent(),
            seed: 0,
        };
        let pairs = RankNet::lambda_rank(params()).pairs(&ctx, &samples[0]);
        assert_eq!(pairs[0].len(), 1);
        assert!(pairs[0][0].weight > 0.0 && pairs[0][0].target == 1.0);
        assert!(pairs[1][0].weight < 0.0 && pairs[1][0].target == 0.0);
        assert_eq!(pairs[0][0].weight, -pairs[1][0].weight);

        let plain = RankNet::new(params()).pairs(&ctx, &samples[0]);
        assert_eq!(plain[0].len(), 1);
        assert!(plain[1].is_empty());
    }

    #[test]
    fn model_text_round_trips() {
        for ranker in [RankNet::new(params()), RankNet::lambda_rank(params())] {
            let ranker = trained(ranker);
            let text = ranker.model();
            assert!(text.contains("## No. of hidden layers = 1\n## Layer 1: 3 neurons\n1 2\n1\n3\n"));

            let loaded = RankerFactory.load_ranker_from_string(&text).unwrap();
            assert_eq!(loaded.kind(), ranker.kind());
            assert_eq!(loaded.features(), &[1, 2]);
            for p in parse_samples(TRAIN).unwrap().iter().flat_map(|rl| rl.points().to_vec()) {
                assert_eq!(loaded.eval(&p), ranker.eval(&p));
            }
        }
    }

    #[test]
    fn training_is_reproducible() {
        let a = trained(RankNet::new(params()));
        let b = trained(RankNet::new(params()));
        assert_eq!(a.network().weights(), b.network().weights());
    }

    #[test]
    fn load_errors_name_the_ranker() {
        let err = RankerFactory
            .load_ranker_from_string("## LambdaRank\n1 2\nx\n")
            .unwrap_err();
        assert_eq!(err.to_string(), "Error in LambdaRank::load()");
    }
}
