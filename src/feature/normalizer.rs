//! Per-feature value normalizers applied before scoring.

use super::{DenseFeatureVector, FeatureError, FeatureVector};
use crate::ranker::LtrRanker;

/// Maps a raw feature value into the range the model was trained on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeatureNormalizer {
    /// `(v - min) / (max - min)`.
    MinMax { min: f32, max: f32 },
    /// `(v - mean) / std_dev`.
    Standard { mean: f32, std_dev: f32 },
}

impl FeatureNormalizer {
    pub fn min_max(min: f32, max: f32) -> Result<Self, FeatureError> {
        if !(min < max) {
            return Err(FeatureError::InvalidMinMax { min, max });
        }
        Ok(FeatureNormalizer::MinMax { min, max })
    }

    pub fn standard(mean: f32, std_dev: f32) -> Result<Self, FeatureError> {
        if !(std_dev > 0.0) {
            return Err(FeatureError::InvalidStdDev(std_dev));
        }
        Ok(FeatureNormalizer::Standard { mean, std_dev })
    }

    #[inline]
    pub fn normalize(&self, value: f32) -> f32 {
        match *self {
            FeatureNormalizer::MinMax { min, max } => (value - min) / (max - min),
            FeatureNormalizer::Standard { mean, std_dev } => (value - mean) / std_dev,
        }
    }
}

/// Normalizes selected features, then delegates to the wrapped ranker.
pub struct FeatureNormalizingRanker {
    inner: Box<dyn LtrRanker>,
    normalizers: Vec<(usize, FeatureNormalizer)>,
}

impl FeatureNormalizingRanker {
    /// `normalizers` pairs a feature ordinal with the normalizer applied to it.
    pub fn new(
        inner: Box<dyn LtrRanker>,
        normalizers: Vec<(usize, FeatureNormalizer)>,
    ) -> Result<Self, FeatureError> {
        let size = inner.new_feature_vector().len();
        if let Some(&(ordinal, _)) = normalizers.iter().find(|(ordinal, _)| *ordinal >= size) {
            return Err(FeatureError::OrdinalOutOfBounds { ordinal, size });
        }
        Ok(Self { inner, normalizers })
    }

    pub fn normalizers(&self) -> &[(usize, FeatureNormalizer)] {
        &self.normalizers
    }
}

impl LtrRanker for FeatureNormalizingRanker {
    fn name(&self) -> String {
        self.inner.name()
    }

    fn new_feature_vector(&self) -> Box<dyn FeatureVector> {
        self.inner.new_feature_vector()
    }

    fn score(&self, vector: &dyn FeatureVector) -> f32 {
        let mut normalized = DenseFeatureVector::from_scores(vector.to_dense());
        for (ordinal, normalizer) in &self.normalizers {
            let value = normalized.feature_score(*ordinal);
            normalized.set_feature_score(*ordinal, normalizer.normalize(value));
        }
        self.inner.score(&normalized)
    }
}
