//! Weighted additive tree ensemble.

use super::normalizer::Normalizer;
use super::tree::{Tree, TreeValidationError};
use crate::feature::{DenseFeatureVector, FeatureVector};
use crate::ranker::LtrRanker;
use crate::utils::Parallelism;

/// Structural validation errors for [`AdditiveModel`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelValidationError {
    #[error("{n_trees} trees but {n_weights} weights")]
    WeightsLenMismatch { n_trees: usize, n_weights: usize },
    #[error("tree {tree_idx} splits on feature {feature} but the model has {n_features} features")]
    FeatureOutOfRange {
        tree_idx: usize,
        feature: u32,
        n_features: usize,
    },
    #[error("tree {tree_idx} is invalid: {error}")]
    InvalidTree {
        tree_idx: usize,
        error: TreeValidationError,
    },
}

/// Sum of weighted tree outputs, passed through a [`Normalizer`].
///
/// `score(x) = normalize(Σ weight[i] * tree[i](x))`, accumulated in f32.
#[derive(Debug, Clone, PartialEq)]
pub struct AdditiveModel {
    trees: Vec<Tree>,
    weights: Vec<f32>,
    n_features: usize,
    normalizer: Normalizer,
}

impl AdditiveModel {
    pub fn new(
        trees: Vec<Tree>,
        weights: Vec<f32>,
        n_features: usize,
        normalizer: Normalizer,
    ) -> Result<Self, ModelValidationError> {
        let model = Self {
            trees,
            weights,
            n_features,
            normalizer,
        };
        model.validate()?;
        Ok(model)
    }

    /// Every tree with weight 1.
    pub fn unweighted(
        trees: Vec<Tree>,
        n_features: usize,
        normalizer: Normalizer,
    ) -> Result<Self, ModelValidationError> {
        let weights = vec![1.0; trees.len()];
        Self::new(trees, weights, n_features, normalizer)
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        if self.trees.len() != self.weights.len() {
            return Err(ModelValidationError::WeightsLenMismatch {
                n_trees: self.trees.len(),
                n_weights: self.weights.len(),
            });
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate()
                .map_err(|e| ModelValidationError::InvalidTree { tree_idx: i, error: e })?;
            if let Some(feature) = tree.max_feature() {
                if feature as usize >= self.n_features {
                    return Err(ModelValidationError::FeatureOutOfRange {
                        tree_idx: i,
                        feature,
                        n_features: self.n_features,
                    });
                }
            }
        }
        Ok(())
    }

    #[inline]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn normalizer(&self) -> Normalizer {
        self.normalizer
    }

    /// Score one dense row of features.
    pub fn score_row(&self, features: &[f32]) -> f32 {
        let sum = self
            .trees
            .iter()
            .zip(&self.weights)
            .fold(0.0f32, |acc, (tree, &w)| acc + w * tree.eval(features));
        self.normalizer.normalize(sum)
    }

    /// Score many rows, optionally across rayon's global pool.
    pub fn score_batch(&self, rows: &[Vec<f32>], parallelism: Parallelism) -> Vec<f32> {
        parallelism.maybe_par_map(rows, |row| self.score_row(row))
    }
}

impl LtrRanker for AdditiveModel {
    fn name(&self) -> String {
        "naive_additive_decision_tree".to_string()
    }

    fn new_feature_vector(&self) -> Box<dyn FeatureVector> {
        Box::new(DenseFeatureVector::new(self.n_features))
    }

    fn score(&self, vector: &dyn FeatureVector) -> f32 {
        match vector.as_dense() {
            Some(values) => self.score_row(values),
            None => self.score_row(&vector.to_dense()),
        }
    }
}
