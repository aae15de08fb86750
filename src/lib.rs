//! ltrkit: learning-to-rank model evaluation and training for Rust.
//!
//! Serves ranking models exported from XGBoost, LightGBM and RankLib, and
//! trains RankLib's ranker family natively.
//!
//! # Key Types
//!
//! - [`FeatureSet`] / [`FeatureVector`] - Named features and per-document scores
//! - [`LtrRanker`] - A model that scores a feature vector
//! - [`AdditiveModel`] / [`LinearRanker`] - Native serving models
//! - [`ParserFactory`] - Model text to [`LtrRanker`], keyed by model type
//!
//! # Loading Models
//!
//! Use [`ParserFactory::default()`] and a model type such as
//! `model/xgboost+json`. See the [`compat`] module for the supported formats.
//!
//! # Training
//!
//! Use [`ranklib::RankerFactory`] to create a ranker and
//! [`ranklib::Trainer`] to train it. The trained model's text loads back
//! through `model/ranklib`. See the [`ranklib`] module for details.

// Re-export approx traits for users who want to compare scores
pub use approx;

pub mod compat;
pub mod feature;
pub mod ranker;
pub mod ranklib;
pub mod repr;
pub mod stats;
pub mod testing;
pub mod utils;

// =============================================================================
// Convenience Re-exports
// =============================================================================

// Serving
pub use feature::{DenseFeatureVector, FeatureSet, FeatureVector, SparseFeatureVector};
pub use ranker::{LogConsumer, LoggingRanker, LtrRanker, NullRanker};
pub use repr::{AdditiveModel, LinearRanker, Normalizer};

// Model formats
pub use compat::{ModelParser, ParseError, ParserFactory};

// Feature statistics
pub use stats::Statistics;

// Shared utilities
pub use utils::{Parallelism, WorkerPool};
