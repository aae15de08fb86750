//! ListNet: a single sigmoid unit trained on top-one probabilities.

use super::super::config::ListNetParams;
use super::super::data::{FeatureLookup, RankList};
use super::super::error::{RankLibError, Result};
use super::super::logger::Verbosity;
use super::super::model_text::FeatureResolver;
use super::super::ranker::{Ranker, RankerKind, TrainingContext};
use super::network::{load_network, random_weight, Network};

#[derive(Debug, Clone, Default)]
pub struct ListNet {
    params: ListNetParams,
    features: Vec<usize>,
    network: Network,
    initialized: bool,
}

impl ListNet {
    pub fn new(params: ListNetParams) -> Self {
        Self {
            params,
            ..Default::default()
        }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    fn outputs(&self, rl: &RankList) -> Vec<Vec<f64>> {
        rl.points()
            .iter()
            .map(|p| self.network.forward(p, &self.features))
            .collect()
    }

    /// Cross entropy between the label and score top-one distributions,
    /// summed over lists.
    fn loss(&self, samples: &[RankList]) -> f64 {
        samples
            .iter()
            .map(|rl| {
                let labels: Vec<f64> = rl.labels().iter().map(|&l| f64::from(l).exp()).collect();
                let scores: Vec<f64> = rl.points().iter().map(|p| self.eval(p).exp()).collect();
                let label_sum: f64 = labels.iter().sum();
                let score_sum: f64 = scores.iter().sum();
                labels
                    .iter()
                    .zip(&scores)
                    .map(|(l, s)| -(l / label_sum) * (s / score_sum).ln())
                    .sum::<f64>()
            })
            .sum()
    }
}

impl Ranker for ListNet {
    fn kind(&self) -> RankerKind {
        RankerKind::ListNet
    }

    fn features(&self) -> &[usize] {
        &self.features
    }

    fn init(&mut self, ctx: &TrainingContext<'_>) -> Result<()> {
        self.features = ctx.features.to_vec();
        let mut rng = ctx.rng(0);
        self.network = Network::new(self.features.len(), &[], 1, || random_weight(&mut rng));
        self.initialized = true;
        Ok(())
    }

    fn learn(&mut self, ctx: &TrainingContext<'_>) -> Result<()> {
        if !self.initialized {
            return Err(RankLibError::Config("ListNet::learn() called before init()".into()));
        }
        let metric = ctx.scorer.name();
        let mut best: Option<(f64, Vec<f64>)> = None;

        for epoch in 1..=self.params.n_iteration {
            for rl in ctx.samples {
                let outputs = self.outputs(rl);
                self.network
                    .listwise_update(&outputs, &rl.labels(), self.params.learning_rate);
            }
            if ctx.logger.enabled(Verbosity::Debug) {
                ctx.logger
                    .detail(&format!("epoch {epoch}: loss {:.6}", self.loss(ctx.samples)));
            }
            let train = ctx.training_score(&*self);
            let validation = ctx.validation_score(&*self);
            if let Some(score) = validation {
                if best.as_ref().map_or(true, |(b, _)| score > *b) {
                    best = Some((score, self.network.weights()));
                }
            }
            ctx.logger.round(epoch, &metric, train, validation);
        }

        if let Some((_, weights)) = best {
            self.network.set_weights(&weights);
        }
        self.initialized = false;
        Ok(())
    }

    fn eval(&self, point: &dyn FeatureLookup) -> f64 {
        self.network.eval(point, &self.features)
    }

    fn model(&self) -> String {
        let mut out = format!("## {}\n", self.name());
        out += &format!("## Epochs = {}\n", self.params.n_iteration);
        out += &format!("## No. of features = {}\n", self.features.len());
        let features: Vec<String> = self.features.iter().map(usize::to_string).collect();
        out += &features.join(" ");
        out += "\n0\n";
        self.network.write_weights(&mut out);
        out
    }

    fn load_from_string(&mut self, text: &str, resolver: &FeatureResolver<'_>) -> Result<()> {
        let (features, network) =
            load_network(text, resolver).map_err(|e| e.context("Error in ListNet::load()"))?;
        if network.n_hidden_layers() != 0 {
            return Err(RankLibError::InvalidModel("ListNet has no hidden layers.".into())
                .context("Error in ListNet::load()"));
        }
        self.features = features;
        self.network = network;
        self.initialized = false;
        Ok(())
    }
}
