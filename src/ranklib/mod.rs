//! Learning-to-rank training engine.
//!
//! # Overview
//!
//! Training data is a list of [`RankList`]s, one per query, each holding
//! labelled [`DataPoint`]s. A [`Ranker`] is initialised against a
//! [`TrainingContext`], learns, and can then score documents or write its
//! model as text. [`RankerFactory`] rebuilds any of the ten rankers from
//! that text.
//!
//! # Rankers
//!
//! | Name | Type |
//! |---|---|
//! | `MART`, `LambdaMART` | [`LambdaMart`] |
//! | `Random Forests` | [`RandomForest`] |
//! | `RankNet`, `LambdaRank` | [`RankNet`] |
//! | `ListNet` | [`ListNet`] |
//! | `Coordinate Ascent` | [`CoorAscent`] |
//! | `Linear Regression` | [`LinearReg`] |
//! | `AdaRank` | [`AdaRank`] |
//! | `RankBoost` | [`RankBoost`] |
//!
//! # Example
//!
//! ```
//! use ltrkit::ranklib::{parse_samples, RankerFactory, RankerKind, Trainer, TrainingConfig};
//!
//! let samples = parse_samples("2 qid:1 1:0.9\n0 qid:1 1:0.1\n1 qid:2 1:0.8\n0 qid:2 1:0.3\n")?;
//! let mut ranker = RankerFactory.create(RankerKind::LinearRegression);
//! let trainer = Trainer::new(TrainingConfig::default());
//! let report = trainer.train(ranker.as_mut(), &samples, None, None)?;
//! assert!(report.train_score > 0.99);
//!
//! let reloaded = RankerFactory.load_ranker_from_string(&ranker.model())?;
//! assert_eq!(reloaded.kind(), RankerKind::LinearRegression);
//! # Ok::<(), ltrkit::ranklib::RankLibError>(())
//! ```

pub mod boosting;
pub mod config;
pub mod coor_ascent;
pub mod data;
pub mod error;
pub mod linear_reg;
pub mod logger;
pub mod metric;
pub mod model_text;
pub mod neuralnet;
pub mod ranker;
pub mod tree;

pub use boosting::{AdaRank, RankBoost};
pub use config::{
    AdaRankParams, BaggedRanker, ConfigError, CoorAscentParams, HistogramReuse, LambdaMartParams,
    LinearRegParams, ListNetParams, RandomForestParams, RankBoostParams, RankNetParams,
    TrainingConfig,
};
pub use coor_ascent::CoorAscent;
pub use data::{group_by_query, parse_samples, DataPoint, FeatureLookup, OneBased, RankList};
pub use error::{RankLibError, Result};
pub use linear_reg::LinearReg;
pub use logger::{EarlyStopping, TrainingLogger, Verbosity};
pub use metric::{MetricKind, MetricScorer};
pub use model_text::{FeatureResolver, FeatureType};
pub use neuralnet::{ListNet, RankNet};
pub use ranker::{
    evaluate, Ranker, RankerFactory, RankerKind, Trainer, TrainingContext, TrainingReport,
};
pub use tree::{Ensemble, LambdaMart, RandomForest};
