//! Serving-side ranker abstraction.
//!
//! An [`LtrRanker`] turns one document's feature vector into a score. Every
//! parsed model (tree ensembles, linear models, reloaded RankLib models)
//! implements it, as do the wrappers that normalize or log features.

use std::sync::Arc;

use crate::feature::{DenseFeatureVector, FeatureVector};

/// A model that scores documents.
pub trait LtrRanker: Send + Sync {
    /// Short type name of the model, for diagnostics.
    fn name(&self) -> String;

    /// A fresh vector with room for every feature the model reads.
    fn new_feature_vector(&self) -> Box<dyn FeatureVector>;

    fn score(&self, vector: &dyn FeatureVector) -> f32;
}

impl std::fmt::Debug for dyn LtrRanker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LtrRanker").field("name", &self.name()).finish()
    }
}

// =============================================================================
// Feature logging
// =============================================================================

/// Receives every feature score written through a [`LoggingRanker`] vector.
pub trait LogConsumer: Send + Sync {
    fn accept(&self, ordinal: usize, score: f32);

    /// Called when a new document starts.
    fn reset(&self) {}
}

/// Wraps a ranker so that feature scores are reported as they are set.
///
/// The value reported is exactly the value the caller stores. Callers that
/// store a cached feature score already multiplied by a query boost other
/// than 1 will see the boosted value logged; the wrapper does not divide
/// the boost back out.
pub struct LoggingRanker {
    inner: Box<dyn LtrRanker>,
    consumer: Arc<dyn LogConsumer>,
}

impl LoggingRanker {
    pub fn new(inner: Box<dyn LtrRanker>, consumer: Arc<dyn LogConsumer>) -> Self {
        Self { inner, consumer }
    }

    /// Logging without a model: every document scores 0.
    pub fn logging_only(n_features: usize, consumer: Arc<dyn LogConsumer>) -> Self {
        Self::new(Box::new(NullRanker::new(n_features)), consumer)
    }
}

impl LtrRanker for LoggingRanker {
    fn name(&self) -> String {
        format!("log({})", self.inner.name())
    }

    fn new_feature_vector(&self) -> Box<dyn FeatureVector> {
        self.consumer.reset();
        Box::new(LoggingFeatureVector {
            inner: self.inner.new_feature_vector(),
            consumer: Arc::clone(&self.consumer),
        })
    }

    fn score(&self, vector: &dyn FeatureVector) -> f32 {
        self.inner.score(vector)
    }
}

struct LoggingFeatureVector {
    inner: Box<dyn FeatureVector>,
    consumer: Arc<dyn LogConsumer>,
}

impl FeatureVector for LoggingFeatureVector {
    fn set_feature_score(&mut self, ordinal: usize, score: f32) {
        self.consumer.accept(ordinal, score);
        self.inner.set_feature_score(ordinal, score);
    }

    fn feature_score(&self, ordinal: usize) -> f32 {
        self.inner.feature_score(ordinal)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn reset(&mut self) {
        self.consumer.reset();
        self.inner.reset();
    }

    fn as_dense(&self) -> Option<&[f32]> {
        self.inner.as_dense()
    }
}

/// Ranker that scores every document as 0.
#[derive(Debug, Clone)]
pub struct NullRanker {
    n_features: usize,
}

impl NullRanker {
    pub fn new(n_features: usize) -> Self {
        Self { n_features }
    }
}

impl LtrRanker for NullRanker {
    fn name(&self) -> String {
        "null_ranker".to_string()
    }

    fn new_feature_vector(&self) -> Box<dyn FeatureVector> {
        Box::new(DenseFeatureVector::new(self.n_features))
    }

    fn score(&self, _vector: &dyn FeatureVector) -> f32 {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repr::LinearRanker;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(usize, f32)>>,
        resets: Mutex<usize>,
    }

    impl LogConsumer for Recorder {
        fn accept(&self, ordinal: usize, score: f32) {
            self.seen.lock().unwrap().push((ordinal, score));
        }

        fn reset(&self) {
            *self.resets.lock().unwrap() += 1;
        }
    }

    #[test]
    fn logs_every_set_and_scores_through() {
        let recorder = Arc::new(Recorder::default());
        let ranker = LoggingRanker::new(
            Box::new(LinearRanker::new(vec![1.0, 2.0])),
            recorder.clone(),
        );
        assert_eq!(ranker.name(), "log(linear)");

        let mut v = ranker.new_feature_vector();
        v.set_feature_score(0, 3.0);
        v.set_feature_score(1, 0.5);
        assert_eq!(ranker.score(v.as_ref()), 4.0);
        assert_eq!(*recorder.seen.lock().unwrap(), vec![(0, 3.0), (1, 0.5)]);
        assert_eq!(*recorder.resets.lock().unwrap(), 1);
    }

    #[test]
    fn boosted_values_are_logged_as_stored() {
        let recorder = Arc::new(Recorder::default());
        let ranker = LoggingRanker::logging_only(1, recorder.clone());
        let mut v = ranker.new_feature_vector();
        // A cached score that already carries a boost of 2.
        v.set_feature_score(0, 2.0 * 1.5);
        assert_eq!(*recorder.seen.lock().unwrap(), vec![(0, 3.0)]);
        assert_eq!(ranker.score(v.as_ref()), 0.0);
    }
}
