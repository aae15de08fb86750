//! RankLib model text served as an [`LtrRanker`].

use super::error::Result;
use super::ModelParser;
use crate::feature::{DenseFeatureVector, FeatureSet, FeatureVector};
use crate::ranker::LtrRanker;
use crate::ranklib::{FeatureResolver, FeatureType, OneBased, Ranker, RankerFactory};

pub const TYPE: &str = "model/ranklib";

/// Parser for `model/ranklib`.
///
/// By default feature ids in the model text are integers, as training
/// writes them; id `i` reads the feature at ordinal `i - 1`. [`named`]
/// resolves feature names through the feature set instead.
///
/// [`named`]: RanklibParser::named
#[derive(Debug, Clone, Copy, Default)]
pub struct RanklibParser {
    feature_type: FeatureType,
}

impl RanklibParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named() -> Self {
        Self {
            feature_type: FeatureType::Named,
        }
    }
}

impl ModelParser for RanklibParser {
    fn parse(&self, set: &FeatureSet, model: &str) -> Result<Box<dyn LtrRanker>> {
        let resolver = FeatureResolver::new(Some(set), self.feature_type);
        let ranker = RankerFactory.load(model, &resolver)?;
        if let Some(&max) = ranker.features().iter().max() {
            if max > set.size() {
                tracing::warn!(
                    ranker = ranker.name(),
                    feature = max,
                    n_features = set.size(),
                    "model reads features beyond the feature set, they score as 0"
                );
            }
        }
        Ok(Box::new(RanklibRanker::new(ranker, set.size())))
    }
}

/// A reloaded RankLib ranker scoring dense feature vectors.
#[derive(Debug)]
pub struct RanklibRanker {
    ranker: Box<dyn Ranker>,
    n_features: usize,
}

impl RanklibRanker {
    pub fn new(ranker: Box<dyn Ranker>, n_features: usize) -> Self {
        Self { ranker, n_features }
    }

    pub fn ranker(&self) -> &dyn Ranker {
        self.ranker.as_ref()
    }
}

impl LtrRanker for RanklibRanker {
    fn name(&self) -> String {
        "ranklib".to_string()
    }

    fn new_feature_vector(&self) -> Box<dyn FeatureVector> {
        Box::new(DenseFeatureVector::new(self.n_features))
    }

    fn score(&self, vector: &dyn FeatureVector) -> f32 {
        self.ranker.eval(&OneBased(vector)) as f32
    }
}
