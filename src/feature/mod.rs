//! Feature sets and feature vectors.
//!
//! A [`FeatureSet`] is the ordered list of feature names a model is scored
//! against. Models refer to features by ordinal (position in the set);
//! parsers resolve names to ordinals through the set.

use std::collections::HashMap;

pub mod normalizer;

pub use normalizer::{FeatureNormalizer, FeatureNormalizingRanker};

/// Errors raised while building feature-layer objects.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FeatureError {
    #[error("Feature [{0}] is defined more than once")]
    DuplicateFeature(String),
    #[error("Minimum {min} must be smaller than than maximum: {max}")]
    InvalidMinMax { min: f32, max: f32 },
    #[error("Standard deviation must be positive, got {0}")]
    InvalidStdDev(f32),
    #[error("Feature ordinal {ordinal} is out of bounds for a set of {size} features")]
    OrdinalOutOfBounds { ordinal: usize, size: usize },
}

// =============================================================================
// FeatureSet
// =============================================================================

/// Ordered, duplicate-free list of feature names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureSet {
    names: Vec<String>,
    ordinals: HashMap<String, usize>,
}

impl FeatureSet {
    pub fn new<I, S>(names: I) -> Result<Self, FeatureError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = FeatureSet::default();
        for name in names {
            let name = name.into();
            if set.ordinals.contains_key(&name) {
                return Err(FeatureError::DuplicateFeature(name));
            }
            set.ordinals.insert(name.clone(), set.names.len());
            set.names.push(name);
        }
        Ok(set)
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.names.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn has_feature(&self, name: &str) -> bool {
        self.ordinals.contains_key(name)
    }

    pub fn feature_ordinal(&self, name: &str) -> Option<usize> {
        self.ordinals.get(name).copied()
    }

    pub fn feature(&self, ordinal: usize) -> Option<&str> {
        self.names.get(ordinal).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Names from `candidates` that are not in the set, in input order.
    pub fn unknown_features<'a, I>(&self, candidates: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        candidates
            .into_iter()
            .filter(|name| !self.has_feature(name))
            .map(str::to_string)
            .collect()
    }
}

// =============================================================================
// FeatureVector
// =============================================================================

/// Per-document feature scores addressed by ordinal.
pub trait FeatureVector: Send {
    fn set_feature_score(&mut self, ordinal: usize, score: f32);

    /// Score for `ordinal`; unset or out-of-range ordinals read as 0.
    fn feature_score(&self, ordinal: usize) -> f32;

    /// Number of addressable ordinals.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear every score so the vector can be reused for the next document.
    fn reset(&mut self);

    /// Contiguous view of the scores, when the vector stores them densely.
    fn as_dense(&self) -> Option<&[f32]> {
        None
    }

    /// Dense copy of the scores.
    fn to_dense(&self) -> Vec<f32> {
        match self.as_dense() {
            Some(values) => values.to_vec(),
            None => (0..self.len()).map(|i| self.feature_score(i)).collect(),
        }
    }
}

/// Zero-initialised dense feature vector.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseFeatureVector {
    scores: Vec<f32>,
}

impl DenseFeatureVector {
    pub fn new(size: usize) -> Self {
        Self {
            scores: vec![0.0; size],
        }
    }

    pub fn from_scores(scores: Vec<f32>) -> Self {
        Self { scores }
    }

    pub fn scores(&self) -> &[f32] {
        &self.scores
    }
}

impl FeatureVector for DenseFeatureVector {
    #[inline]
    fn set_feature_score(&mut self, ordinal: usize, score: f32) {
        if let Some(slot) = self.scores.get_mut(ordinal) {
            *slot = score;
        }
    }

    #[inline]
    fn feature_score(&self, ordinal: usize) -> f32 {
        self.scores.get(ordinal).copied().unwrap_or(0.0)
    }

    fn len(&self) -> usize {
        self.scores.len()
    }

    fn reset(&mut self) {
        self.scores.fill(0.0);
    }

    fn as_dense(&self) -> Option<&[f32]> {
        Some(&self.scores)
    }
}

/// Sparse feature vector for wide feature sets with few active features.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseFeatureVector {
    size: usize,
    scores: HashMap<usize, f32>,
}

impl SparseFeatureVector {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            scores: HashMap::new(),
        }
    }

    /// Number of explicitly set features.
    pub fn active(&self) -> usize {
        self.scores.len()
    }
}

impl FeatureVector for SparseFeatureVector {
    fn set_feature_score(&mut self, ordinal: usize, score: f32) {
        if ordinal < self.size {
            self.scores.insert(ordinal, score);
        }
    }

    fn feature_score(&self, ordinal: usize) -> f32 {
        self.scores.get(&ordinal).copied().unwrap_or(0.0)
    }

    fn len(&self) -> usize {
        self.size
    }

    fn reset(&mut self) {
        self.scores.clear();
    }
}
