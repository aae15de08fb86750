//! Random Forests: the mean of boosted ensembles trained on bootstrap bags.

use std::collections::BTreeSet;

use rand::Rng;

use super::super::config::{BaggedRanker, RandomForestParams};
use super::super::data::{FeatureLookup, RankList};
use super::super::error::{RankLibError, Result};
use super::super::logger::Verbosity;
use super::super::model_text::{strip_comments, FeatureResolver};
use super::super::ranker::{Ranker, RankerKind, TrainingContext};
use super::ensemble::Ensemble;
use super::lambdamart::LambdaMart;

const END_TAG: &str = "</ensemble>";

#[derive(Debug, Clone, Default)]
pub struct RandomForest {
    params: RandomForestParams,
    features: Vec<usize>,
    ensembles: Vec<Ensemble>,
}

impl RandomForest {
    pub fn new(params: RandomForestParams) -> Self {
        Self {
            params,
            ..Default::default()
        }
    }

    pub fn ensembles(&self) -> &[Ensemble] {
        &self.ensembles
    }

    /// Queries drawn with replacement for one bag.
    fn draw_bag<R: Rng>(&self, rng: &mut R, samples: &[RankList]) -> Vec<RankList> {
        let n = samples.len();
        let size = ((n as f64 * self.params.sub_sampling) as usize).max(1);
        (0..size)
            .map(|_| samples[rng.gen_range(0..n)].clone())
            .collect()
    }

    fn train_bag(
        &self,
        ctx: &TrainingContext<'_>,
        bag: &[RankList],
        seed: u64,
    ) -> Result<Ensemble> {
        let bag_ctx = ctx.with_samples(bag, seed);
        let mut ranker = match self.params.ranker {
            BaggedRanker::Mart => LambdaMart::mart(self.params.bag_params()),
            BaggedRanker::LambdaMart => LambdaMart::new(self.params.bag_params()),
        };
        ranker.init(&bag_ctx)?;
        ranker.learn(&bag_ctx)?;
        Ok(ranker.into_ensemble())
    }
}

impl Ranker for RandomForest {
    fn kind(&self) -> RankerKind {
        RankerKind::RandomForests
    }

    fn features(&self) -> &[usize] {
        &self.features
    }

    fn init(&mut self, ctx: &TrainingContext<'_>) -> Result<()> {
        self.features = ctx.features.to_vec();
        self.ensembles = Vec::with_capacity(self.params.n_bag);
        Ok(())
    }

    fn learn(&mut self, ctx: &TrainingContext<'_>) -> Result<()> {
        if ctx.samples.is_empty() {
            return Err(RankLibError::InvalidData("No training samples.".into()));
        }
        let metric = ctx.scorer.name();
        let mut rng = ctx.rng(0);
        self.ensembles.clear();
        for b in 0..self.params.n_bag {
            let bag = self.draw_bag(&mut rng, ctx.samples);
            let seed = ctx.seed.wrapping_add(b as u64 + 1);
            let ensemble = self.train_bag(ctx, &bag, seed)?;
            self.ensembles.push(ensemble);
            if ctx.logger.enabled(Verbosity::Info) {
                let train = ctx.training_score(&*self);
                ctx.logger
                    .round(b + 1, &metric, train, ctx.validation_score(&*self));
            }
        }
        Ok(())
    }

    fn eval(&self, point: &dyn FeatureLookup) -> f64 {
        if self.ensembles.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.ensembles.iter().map(|e| f64::from(e.eval(point))).sum();
        sum / self.ensembles.len() as f64
    }

    fn model(&self) -> String {
        let p = &self.params;
        let mut out = format!("## {}\n", self.name());
        out += &format!("## No. of bags = {}\n", p.n_bag);
        out += &format!("## Sub-sampling = {:?}\n", p.sub_sampling);
        out += &format!("## Feature-sampling = {:?}\n", p.feature_sampling);
        out += &format!("## No. of trees = {}\n", p.n_trees);
        out += &format!("## No. of leaves = {}\n", p.n_tree_leaves);
        out += &format!("## No. of threshold candidates = {}\n", p.n_threshold);
        out += &format!("## Learning rate = {:?}\n", p.learning_rate);
        out += "\n";
        for ensemble in &self.ensembles {
            out += &ensemble.to_xml();
            out += "\n";
        }
        out
    }

    fn load_from_string(&mut self, text: &str, resolver: &FeatureResolver<'_>) -> Result<()> {
        let load = || -> Result<Vec<Ensemble>> {
            let body = strip_comments(text);
            let ensembles = body
                .split_inclusive(END_TAG)
                .filter(|chunk| chunk.trim_end().ends_with(END_TAG))
                .map(|chunk| Ensemble::parse(chunk, resolver))
                .collect::<Result<Vec<_>>>()?;
            if ensembles.is_empty() {
                return Err(RankLibError::InvalidModel("Model has no <ensemble> block.".into()));
            }
            Ok(ensembles)
        };
        self.ensembles = load().map_err(|e| e.context("Error in RFRanker::load()"))?;
        self.features = self
            .ensembles
            .iter()
            .flat_map(Ensemble::features)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        Ok(())
    }
}
