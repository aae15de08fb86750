//! Linear model: one weight per feature, no bias.

use crate::feature::{DenseFeatureVector, FeatureVector};
use crate::ranker::LtrRanker;

#[derive(Debug, Clone, PartialEq)]
pub struct LinearRanker {
    weights: Vec<f32>,
}

impl LinearRanker {
    pub fn new(weights: Vec<f32>) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }
}

impl LtrRanker for LinearRanker {
    fn name(&self) -> String {
        "linear".to_string()
    }

    fn new_feature_vector(&self) -> Box<dyn FeatureVector> {
        Box::new(DenseFeatureVector::new(self.weights.len()))
    }

    fn score(&self, vector: &dyn FeatureVector) -> f32 {
        match vector.as_dense() {
            Some(values) => self.weights.iter().zip(values).map(|(w, x)| w * x).sum(),
            None => self
                .weights
                .iter()
                .enumerate()
                .map(|(i, w)| w * vector.feature_score(i))
                .sum(),
        }
    }
}
