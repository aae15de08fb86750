//! The trained-ranker abstraction, the ranker factory and the training driver.

use std::fmt;

use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use super::config::TrainingConfig;
use super::data::{max_feature_id, FeatureLookup, RankList};
use super::error::{RankLibError, Result};
use super::logger::TrainingLogger;
use super::metric::MetricScorer;
use super::model_text::{ranker_name, FeatureResolver};
use crate::utils::{sort_indices, WorkerPool};

// =============================================================================
// RankerKind
// =============================================================================

/// The ten training algorithms, named as in their model text header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RankerKind {
    Mart,
    RankBoost,
    RankNet,
    AdaRank,
    CoordinateAscent,
    LambdaRank,
    LambdaMart,
    ListNet,
    RandomForests,
    LinearRegression,
}

impl RankerKind {
    pub const ALL: [RankerKind; 10] = [
        RankerKind::Mart,
        RankerKind::RankBoost,
        RankerKind::RankNet,
        RankerKind::AdaRank,
        RankerKind::CoordinateAscent,
        RankerKind::LambdaRank,
        RankerKind::LambdaMart,
        RankerKind::ListNet,
        RankerKind::RandomForests,
        RankerKind::LinearRegression,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RankerKind::Mart => "MART",
            RankerKind::RankBoost => "RankBoost",
            RankerKind::RankNet => "RankNet",
            RankerKind::AdaRank => "AdaRank",
            RankerKind::CoordinateAscent => "Coordinate Ascent",
            RankerKind::LambdaRank => "LambdaRank",
            RankerKind::LambdaMart => "LambdaMART",
            RankerKind::ListNet => "ListNet",
            RankerKind::RandomForests => "Random Forests",
            RankerKind::LinearRegression => "Linear Regression",
        }
    }

    /// Case-insensitive lookup by header name.
    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.trim().to_uppercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().to_uppercase() == upper)
    }
}

impl fmt::Display for RankerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Ranker
// =============================================================================

/// A learning-to-rank model that can be trained, evaluated, written out as
/// text and read back.
///
/// Lifecycle: a fresh ranker is `init`ialised against a training context,
/// `learn`s from it, and is then evaluated or serialized with [`model`].
/// A ranker can also be rebuilt from model text with [`load_from_string`]
/// without ever being trained.
///
/// [`model`]: Ranker::model
/// [`load_from_string`]: Ranker::load_from_string
pub trait Ranker: Send + Sync + fmt::Debug {
    fn kind(&self) -> RankerKind;

    fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Feature ids (1-based) the model reads.
    fn features(&self) -> &[usize];

    /// Set up the model and any per-training state.
    fn init(&mut self, ctx: &TrainingContext<'_>) -> Result<()>;

    /// Run the optimisation loop. Requires a prior [`init`](Ranker::init).
    fn learn(&mut self, ctx: &TrainingContext<'_>) -> Result<()>;

    fn eval(&self, point: &dyn FeatureLookup) -> f64;

    /// Model text: a `## <Name>` header, parameter lines, then the payload.
    fn model(&self) -> String;

    /// Replace the model with the one described by `text`.
    fn load_from_string(&mut self, text: &str, resolver: &FeatureResolver<'_>) -> Result<()>;

    /// `list` reordered by descending model score (stable).
    fn rank(&self, list: &RankList) -> RankList {
        let scores: Vec<f64> = list.points().iter().map(|p| self.eval(p)).collect();
        list.reorder(&sort_indices(&scores, false))
    }
}

/// Mean metric of `ranker`'s ordering over `lists`.
pub fn evaluate<R: Ranker + ?Sized>(
    ranker: &R,
    lists: &[RankList],
    scorer: &dyn MetricScorer,
    pool: &WorkerPool,
) -> f64 {
    if lists.is_empty() {
        return 0.0;
    }
    let scores = pool.map(lists, |rl| scorer.score(&ranker.rank(rl).labels()));
    scores.iter().sum::<f64>() / lists.len() as f64
}

// =============================================================================
// Training context
// =============================================================================

/// Everything a ranker needs while training.
pub struct TrainingContext<'a> {
    pub samples: &'a [RankList],
    pub validation: Option<&'a [RankList]>,
    /// Feature ids to learn from.
    pub features: &'a [usize],
    pub scorer: &'a dyn MetricScorer,
    pub pool: &'a WorkerPool,
    pub logger: TrainingLogger,
    pub seed: u64,
}

impl<'a> TrainingContext<'a> {
    /// A fresh generator seeded from the run's seed and a per-use `stream`.
    pub fn rng(&self, stream: u64) -> Xoshiro256PlusPlus {
        Xoshiro256PlusPlus::seed_from_u64(self.seed.wrapping_add(stream))
    }

    /// Mean metric of `ranker` on the training samples.
    pub fn training_score<R: Ranker + ?Sized>(&self, ranker: &R) -> f64 {
        evaluate(ranker, self.samples, self.scorer, self.pool)
    }

    /// Mean metric of `ranker` on the validation samples, if any.
    pub fn validation_score<R: Ranker + ?Sized>(&self, ranker: &R) -> Option<f64> {
        self.validation
            .map(|lists| evaluate(ranker, lists, self.scorer, self.pool))
    }

    /// The same context over other samples, without validation data.
    pub fn with_samples<'b>(&'b self, samples: &'b [RankList], seed: u64) -> TrainingContext<'b> {
        TrainingContext {
            samples,
            validation: None,
            features: self.features,
            scorer: self.scorer,
            pool: self.pool,
            logger: self.logger.clone(),
            seed,
        }
    }
}

impl fmt::Debug for TrainingContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrainingContext")
            .field("samples", &self.samples.len())
            .field("validation", &self.validation.map(<[RankList]>::len))
            .field("features", &self.features.len())
            .field("scorer", &self.scorer.name())
            .field("seed", &self.seed)
            .finish()
    }
}

// =============================================================================
// Trainer
// =============================================================================

/// Scores reached by a finished training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub metric: String,
    pub train_score: f64,
    pub validation_score: Option<f64>,
}

/// Drives `init` + `learn` with a worker pool and scorer built from config.
#[derive(Debug, Clone, Default)]
pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train `ranker` on `samples`.
    ///
    /// `features` defaults to every feature id present in the samples.
    pub fn train(
        &self,
        ranker: &mut dyn Ranker,
        samples: &[RankList],
        validation: Option<&[RankList]>,
        features: Option<&[usize]>,
    ) -> Result<TrainingReport> {
        if samples.iter().all(RankList::is_empty) {
            return Err(RankLibError::InvalidData("No training samples.".into()));
        }
        let all_features: Vec<usize>;
        let features = match features {
            Some(features) => features,
            None => {
                all_features = (1..=max_feature_id(samples)).collect();
                &all_features
            }
        };
        if features.is_empty() {
            return Err(RankLibError::InvalidData("No features to learn from.".into()));
        }

        let pool = WorkerPool::new(self.config.pool_size())?;
        let result = self.run(ranker, samples, validation, features, &pool);
        let shutdown = pool.shutdown();
        let report = result?;
        shutdown?;
        Ok(report)
    }

    fn run(
        &self,
        ranker: &mut dyn Ranker,
        samples: &[RankList],
        validation: Option<&[RankList]>,
        features: &[usize],
        pool: &WorkerPool,
    ) -> Result<TrainingReport> {
        let scorer = self.config.metric.scorer();
        let ctx = TrainingContext {
            samples,
            validation,
            features,
            scorer: scorer.as_ref(),
            pool,
            logger: TrainingLogger::new(ranker.name(), self.config.verbosity),
            seed: self.config.seed,
        };

        ctx.logger.start(samples.len(), features.len());
        ranker.init(&ctx)?;
        ranker.learn(&ctx)?;

        let report = TrainingReport {
            metric: scorer.name(),
            train_score: ctx.training_score(&*ranker),
            validation_score: ctx.validation_score(&*ranker),
        };
        ctx.logger
            .finish(&report.metric, report.train_score, report.validation_score);
        Ok(report)
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Creates rankers by kind and rebuilds them from model text.
#[derive(Debug, Clone, Copy, Default)]
pub struct RankerFactory;

impl RankerFactory {
    /// An untrained ranker with default parameters.
    pub fn create(&self, kind: RankerKind) -> Box<dyn Ranker> {
        use super::boosting::{AdaRank, RankBoost};
        use super::coor_ascent::CoorAscent;
        use super::linear_reg::LinearReg;
        use super::neuralnet::{ListNet, RankNet};
        use super::tree::{LambdaMart, RandomForest};

        match kind {
            RankerKind::Mart => Box::new(LambdaMart::mart(Default::default())),
            RankerKind::LambdaMart => Box::new(LambdaMart::new(Default::default())),
            RankerKind::RankBoost => Box::new(RankBoost::new(Default::default())),
            RankerKind::AdaRank => Box::new(AdaRank::new(Default::default())),
            RankerKind::RankNet => Box::new(RankNet::new(Default::default())),
            RankerKind::LambdaRank => Box::new(RankNet::lambda_rank(Default::default())),
            RankerKind::ListNet => Box::new(ListNet::new(Default::default())),
            RankerKind::CoordinateAscent => Box::new(CoorAscent::new(Default::default())),
            RankerKind::RandomForests => Box::new(RandomForest::new(Default::default())),
            RankerKind::LinearRegression => Box::new(LinearReg::new(Default::default())),
        }
    }

    /// Rebuild a ranker from model text; the `## <Name>` header picks the kind.
    pub fn load(&self, text: &str, resolver: &FeatureResolver<'_>) -> Result<Box<dyn Ranker>> {
        let name = ranker_name(text).ok_or_else(|| {
            RankLibError::InvalidModel("Model text has no `## <Ranker>` header.".into())
        })?;
        let kind = RankerKind::from_name(name)
            .ok_or_else(|| RankLibError::UnknownRanker(name.to_string()))?;
        let mut ranker = self.create(kind);
        ranker.load_from_string(text, resolver)?;
        tracing::debug!(ranker = kind.name(), n_features = ranker.features().len(), "model loaded");
        Ok(ranker)
    }

    /// [`load`](Self::load) with integer feature ids.
    pub fn load_ranker_from_string(&self, text: &str) -> Result<Box<dyn Ranker>> {
        self.load(text, &FeatureResolver::ordinal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranklib::data::parse_samples;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records the widest thread pool any `score` call ran on.
    #[derive(Default)]
    struct ThreadCountingScorer {
        max_threads: AtomicUsize,
    }

    impl MetricScorer for ThreadCountingScorer {
        fn k(&self) -> usize {
            0
        }

        fn name(&self) -> String {
            "threads".into()
        }

        fn score(&self, _labels: &[f32]) -> f64 {
            self.max_threads
                .fetch_max(rayon::current_num_threads(), Ordering::SeqCst);
            1.0
        }
    }

    #[test]
    fn kind_lookup_is_case_insensitive() {
        assert_eq!(RankerKind::from_name("LAMBDAMART"), Some(RankerKind::LambdaMart));
        assert_eq!(
            RankerKind::from_name("coordinate ascent"),
            Some(RankerKind::CoordinateAscent)
        );
        assert_eq!(RankerKind::from_name("Random Forests"), Some(RankerKind::RandomForests));
        assert_eq!(RankerKind::from_name("SVMRank"), None);
    }

    #[test]
    fn every_kind_round_trips_its_name() {
        let factory = RankerFactory;
        for kind in RankerKind::ALL {
            assert_eq!(RankerKind::from_name(kind.name()), Some(kind));
            assert_eq!(factory.create(kind).kind(), kind);
        }
    }

    #[test]
    fn load_rejects_unknown_or_missing_header() {
        let factory = RankerFactory;
        let err = factory.load_ranker_from_string("## SVMRank\n1:1").unwrap_err();
        assert!(matches!(err, RankLibError::UnknownRanker(name) if name == "SVMRank"));
        assert!(factory.load_ranker_from_string("1:1").is_err());
    }

    #[test]
    fn evaluation_runs_on_the_configured_pool() {
        let text: String = (1..=64)
            .map(|q| format!("1 qid:{q} 1:0.5\n0 qid:{q} 1:0.1\n"))
            .collect();
        let samples = parse_samples(&text).unwrap();
        assert_eq!(samples.len(), 64);

        let scorer = ThreadCountingScorer::default();
        let pool = WorkerPool::new(3).unwrap();
        let ctx = TrainingContext {
            samples: &samples,
            validation: Some(samples.as_slice()),
            features: &[1],
            scorer: &scorer,
            pool: &pool,
            logger: TrainingLogger::silent(),
            seed: 1,
        };
        let ranker = RankerFactory.create(RankerKind::LinearRegression);
        assert_eq!(ctx.training_score(ranker.as_ref()), 1.0);
        assert_eq!(ctx.validation_score(ranker.as_ref()), Some(1.0));
        assert_eq!(scorer.score_all(&samples, &pool), 1.0);
        assert_eq!(scorer.max_threads.load(Ordering::SeqCst), pool.size());
    }

    #[derive(Debug)]
    struct FailingRanker;

    impl Ranker for FailingRanker {
        fn kind(&self) -> RankerKind {
            RankerKind::LinearRegression
        }

        fn features(&self) -> &[usize] {
            &[]
        }

        fn init(&mut self, _ctx: &TrainingContext<'_>) -> Result<()> {
            Ok(())
        }

        fn learn(&mut self, ctx: &TrainingContext<'_>) -> Result<()> {
            ctx.pool.map(ctx.samples, |rl| rl.len());
            Err(RankLibError::InvalidData("diverged".into()))
        }

        fn eval(&self, _point: &dyn FeatureLookup) -> f64 {
            0.0
        }

        fn model(&self) -> String {
            String::new()
        }

        fn load_from_string(&mut self, _text: &str, _resolver: &FeatureResolver<'_>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_training_reports_the_ranker_error() {
        let samples = parse_samples("1 qid:1 1:0.5\n0 qid:1 1:0.1\n").unwrap();
        let config = TrainingConfig::builder()
            .n_threads(std::num::NonZeroUsize::new(2).unwrap())
            .build()
            .unwrap();
        let trainer = Trainer::new(config);
        let err = trainer.train(&mut FailingRanker, &samples, None, None).unwrap_err();
        assert!(matches!(err, RankLibError::InvalidData(ref m) if m == "diverged"), "{err}");

        let mut ranker = RankerFactory.create(RankerKind::LinearRegression);
        assert!(trainer.train(ranker.as_mut(), &samples, None, None).is_ok());
    }
}
