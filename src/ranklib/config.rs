//! Hyper-parameters of the training algorithms.
//!
//! Every ranker has its own parameter struct built with `bon`. Defaults are
//! the values RankLib ships with; `build()` validates ranges. All structs
//! deserialize from JSON with missing fields taking their defaults, so a
//! training job can be described in a file.
//!
//! # Example
//!
//! ```
//! use ltrkit::ranklib::{LambdaMartParams, TrainingConfig, MetricKind};
//!
//! let params = LambdaMartParams::builder()
//!     .n_trees(50)
//!     .n_tree_leaves(8)
//!     .build()
//!     .unwrap();
//! let config = TrainingConfig::builder()
//!     .metric(MetricKind::Ndcg(5))
//!     .seed(7)
//!     .build()
//!     .unwrap();
//! assert_eq!(params.learning_rate, 0.1);
//! assert_eq!(config.metric.to_string(), "NDCG@5");
//! ```

use std::num::NonZeroUsize;

use bon::Builder;
use serde::{Deserialize, Serialize};

use super::logger::Verbosity;
use super::metric::MetricKind;

// =============================================================================
// ConfigError
// =============================================================================

/// Errors raised while validating training parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Learning rate must be positive.
    InvalidLearningRate(f64),
    /// A count that must be at least 1.
    InvalidCount { field: &'static str },
    /// Sampling ratio outside (0, 1].
    InvalidSamplingRatio { field: &'static str, value: f64 },
    /// A parameter that must be non-negative.
    Negative { field: &'static str, value: f64 },
    /// A parameter that must be strictly positive.
    NotPositive { field: &'static str, value: f64 },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidLearningRate(v) => write!(f, "learning_rate must be positive, got {}", v),
            Self::InvalidCount { field } => write!(f, "{} must be at least 1", field),
            Self::InvalidSamplingRatio { field, value } => {
                write!(f, "{} must be in (0, 1], got {}", field, value)
            }
            Self::Negative { field, value } => {
                write!(f, "{} must be non-negative, got {}", field, value)
            }
            Self::NotPositive { field, value } => {
                write!(f, "{} must be positive, got {}", field, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

fn check_count(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidCount { field });
    }
    Ok(())
}

fn check_learning_rate(value: f64) -> Result<(), ConfigError> {
    if !(value > 0.0) {
        return Err(ConfigError::InvalidLearningRate(value));
    }
    Ok(())
}

fn check_ratio(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(value > 0.0 && value <= 1.0) {
        return Err(ConfigError::InvalidSamplingRatio { field, value });
    }
    Ok(())
}

fn check_non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(value >= 0.0) {
        return Err(ConfigError::Negative { field, value });
    }
    Ok(())
}

fn check_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(value > 0.0) {
        return Err(ConfigError::NotPositive { field, value });
    }
    Ok(())
}

// =============================================================================
// TrainingConfig
// =============================================================================

/// Settings shared by every training run.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(derive(Clone, Debug), finish_fn(vis = "", name = __build_internal))]
#[serde(default)]
pub struct TrainingConfig {
    /// Metric optimised (and reported). Default: `NDCG@10`.
    #[builder(default)]
    pub metric: MetricKind,

    /// Worker threads. `None` uses all available cores.
    pub n_threads: Option<NonZeroUsize>,

    /// Random seed. Default: 42.
    #[builder(default = 42)]
    pub seed: u64,

    /// Default: `Silent`.
    #[builder(default)]
    pub verbosity: Verbosity,
}

impl<S: training_config_builder::IsComplete> TrainingConfigBuilder<S> {
    pub fn build(self) -> Result<TrainingConfig, ConfigError> {
        Ok(self.__build_internal())
    }
}

impl TrainingConfig {
    /// Pool size for [`WorkerPool::new`](crate::utils::WorkerPool::new); `0` means auto.
    pub fn pool_size(&self) -> usize {
        self.n_threads.map_or(0, NonZeroUsize::get)
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self::builder().__build_internal()
    }
}

// =============================================================================
// Coordinate Ascent
// =============================================================================

/// Coordinate Ascent line search.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(derive(Clone, Debug), finish_fn(vis = "", name = __build_internal))]
#[serde(default)]
pub struct CoorAscentParams {
    /// Random restarts. Default: 5.
    #[builder(default = 5)]
    pub n_restart: usize,
    /// Passes over the features per restart. Default: 25.
    #[builder(default = 25)]
    pub max_iteration: usize,
    #[builder(default = 0.05)]
    pub step_base: f64,
    #[builder(default = 2.0)]
    pub step_scale: f64,
    /// Minimum pass improvement to keep going. Default: 0.001.
    #[builder(default = 0.001)]
    pub tolerance: f64,
    /// Penalise distance from the starting weights.
    #[builder(default = false)]
    pub regularized: bool,
    #[builder(default = 0.001)]
    pub slack: f64,
}

impl<S: coor_ascent_params_builder::IsComplete> CoorAscentParamsBuilder<S> {
    pub fn build(self) -> Result<CoorAscentParams, ConfigError> {
        let params = self.__build_internal();
        check_count("n_restart", params.n_restart)?;
        check_count("max_iteration", params.max_iteration)?;
        check_positive("step_base", params.step_base)?;
        check_positive("step_scale", params.step_scale)?;
        check_non_negative("tolerance", params.tolerance)?;
        check_non_negative("slack", params.slack)?;
        Ok(params)
    }
}

impl Default for CoorAscentParams {
    fn default() -> Self {
        Self::builder().__build_internal()
    }
}

// =============================================================================
// Linear Regression
// =============================================================================

/// Ridge-regularised least squares on the labels.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(derive(Clone, Debug), finish_fn(vis = "", name = __build_internal))]
#[serde(default)]
pub struct LinearRegParams {
    /// L2 penalty. Default: 1e-10.
    #[builder(default = 1e-10)]
    pub lambda: f64,
}

impl<S: linear_reg_params_builder::IsComplete> LinearRegParamsBuilder<S> {
    pub fn build(self) -> Result<LinearRegParams, ConfigError> {
        let params = self.__build_internal();
        check_non_negative("lambda", params.lambda)?;
        Ok(params)
    }
}

impl Default for LinearRegParams {
    fn default() -> Self {
        Self::builder().__build_internal()
    }
}

// =============================================================================
// Boosted trees
// =============================================================================

/// How a child histogram gets the buffers it is derived into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistogramReuse {
    /// Allocate fresh buffers for every child.
    #[default]
    Copy,
    /// Move the parent's buffers into the larger child once the parent is split.
    ReuseParent,
}

/// MART and LambdaMART.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(derive(Clone, Debug), finish_fn(vis = "", name = __build_internal))]
#[serde(default)]
pub struct LambdaMartParams {
    /// Boosting rounds. Default: 1000.
    #[builder(default = 1000)]
    pub n_trees: usize,
    /// Shrinkage. Default: 0.1.
    #[builder(default = 0.1)]
    pub learning_rate: f32,
    /// Candidate thresholds per feature; `0` uses every distinct value. Default: 256.
    #[builder(default = 256)]
    pub n_threshold: usize,
    /// Default: 10.
    #[builder(default = 10)]
    pub n_tree_leaves: usize,
    /// Minimum samples per leaf. Default: 1.
    #[builder(default = 1)]
    pub min_leaf_support: usize,
    /// Stop after this many rounds without a better validation score;
    /// `0` trains every tree. Default: 100.
    #[builder(default = 100)]
    pub early_stop_rounds: usize,
    /// Fraction of features considered per split. Default: 1.0.
    #[builder(default = 1.0)]
    pub feature_sampling_rate: f64,
    #[builder(default)]
    pub histogram_reuse: HistogramReuse,
}

impl<S: lambda_mart_params_builder::IsComplete> LambdaMartParamsBuilder<S> {
    pub fn build(self) -> Result<LambdaMartParams, ConfigError> {
        let params = self.__build_internal();
        params.validate()?;
        Ok(params)
    }
}

impl LambdaMartParams {
    fn validate(&self) -> Result<(), ConfigError> {
        check_count("n_trees", self.n_trees)?;
        check_learning_rate(self.learning_rate as f64)?;
        check_count("n_tree_leaves", self.n_tree_leaves)?;
        check_count("min_leaf_support", self.min_leaf_support)?;
        check_ratio("feature_sampling_rate", self.feature_sampling_rate)
    }
}

impl Default for LambdaMartParams {
    fn default() -> Self {
        Self::builder().__build_internal()
    }
}

/// Boosting algorithm trained inside each bag of a random forest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaggedRanker {
    #[default]
    Mart,
    LambdaMart,
}

/// Random Forests: bags of small boosted ensembles.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(derive(Clone, Debug), finish_fn(vis = "", name = __build_internal))]
#[serde(default)]
pub struct RandomForestParams {
    /// Default: 300.
    #[builder(default = 300)]
    pub n_bag: usize,
    /// Fraction of queries drawn (with replacement) per bag. Default: 1.0.
    #[builder(default = 1.0)]
    pub sub_sampling: f64,
    /// Fraction of features considered per split. Default: 0.3.
    #[builder(default = 0.3)]
    pub feature_sampling: f64,
    #[builder(default)]
    pub ranker: BaggedRanker,
    /// Trees per bag. Default: 1.
    #[builder(default = 1)]
    pub n_trees: usize,
    /// Default: 100.
    #[builder(default = 100)]
    pub n_tree_leaves: usize,
    /// Only matters when `n_trees > 1`. Default: 0.1.
    #[builder(default = 0.1)]
    pub learning_rate: f32,
    #[builder(default = 256)]
    pub n_threshold: usize,
    #[builder(default = 1)]
    pub min_leaf_support: usize,
}

impl<S: random_forest_params_builder::IsComplete> RandomForestParamsBuilder<S> {
    pub fn build(self) -> Result<RandomForestParams, ConfigError> {
        let params = self.__build_internal();
        check_count("n_bag", params.n_bag)?;
        check_ratio("sub_sampling", params.sub_sampling)?;
        check_ratio("feature_sampling", params.feature_sampling)?;
        check_count("n_trees", params.n_trees)?;
        check_count("n_tree_leaves", params.n_tree_leaves)?;
        check_learning_rate(params.learning_rate as f64)?;
        check_count("min_leaf_support", params.min_leaf_support)?;
        Ok(params)
    }
}

impl RandomForestParams {
    /// Parameters of the boosted ensemble trained inside one bag.
    pub fn bag_params(&self) -> LambdaMartParams {
        LambdaMartParams {
            n_trees: self.n_trees,
            learning_rate: self.learning_rate,
            n_threshold: self.n_threshold,
            n_tree_leaves: self.n_tree_leaves,
            min_leaf_support: self.min_leaf_support,
            early_stop_rounds: 0,
            feature_sampling_rate: self.feature_sampling,
            histogram_reuse: HistogramReuse::default(),
        }
    }
}

impl Default for RandomForestParams {
    fn default() -> Self {
        Self::builder().__build_internal()
    }
}

// =============================================================================
// Boosting over weak rankers
// =============================================================================

/// AdaRank with single-feature weak rankers.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(derive(Clone, Debug), finish_fn(vis = "", name = __build_internal))]
#[serde(default)]
pub struct AdaRankParams {
    /// Default: 500.
    #[builder(default = 500)]
    pub n_iteration: usize,
    /// Stop once the training score gains less than this. Default: 0.002.
    #[builder(default = 0.002)]
    pub tolerance: f64,
    /// Put features back into play after they were benched. Default: true.
    #[builder(default = true)]
    pub train_with_enqueue: bool,
    /// Consecutive selections before a feature is benched. Default: 5.
    #[builder(default = 5)]
    pub max_sel_count: usize,
}

impl<S: ada_rank_params_builder::IsComplete> AdaRankParamsBuilder<S> {
    pub fn build(self) -> Result<AdaRankParams, ConfigError> {
        let params = self.__build_internal();
        check_count("n_iteration", params.n_iteration)?;
        check_non_negative("tolerance", params.tolerance)?;
        check_count("max_sel_count", params.max_sel_count)?;
        Ok(params)
    }
}

impl Default for AdaRankParams {
    fn default() -> Self {
        Self::builder().__build_internal()
    }
}

/// RankBoost with threshold weak rankers.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(derive(Clone, Debug), finish_fn(vis = "", name = __build_internal))]
#[serde(default)]
pub struct RankBoostParams {
    /// Default: 300.
    #[builder(default = 300)]
    pub n_iteration: usize,
    /// Candidate thresholds per feature; `0` uses every feature value. Default: 10.
    #[builder(default = 10)]
    pub n_threshold: usize,
}

impl<S: rank_boost_params_builder::IsComplete> RankBoostParamsBuilder<S> {
    pub fn build(self) -> Result<RankBoostParams, ConfigError> {
        let params = self.__build_internal();
        check_count("n_iteration", params.n_iteration)?;
        Ok(params)
    }
}

impl Default for RankBoostParams {
    fn default() -> Self {
        Self::builder().__build_internal()
    }
}

// =============================================================================
// Neural nets
// =============================================================================

/// RankNet and LambdaRank.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(derive(Clone, Debug), finish_fn(vis = "", name = __build_internal))]
#[serde(default)]
pub struct RankNetParams {
    /// Epochs. Default: 100.
    #[builder(default = 100)]
    pub n_iteration: usize,
    /// Default: 1.
    #[builder(default = 1)]
    pub n_hidden_layer: usize,
    /// Default: 10.
    #[builder(default = 10)]
    pub n_hidden_nodes: usize,
    /// Default: 5e-5.
    #[builder(default = 5e-5)]
    pub learning_rate: f64,
    /// Accepted for compatibility; weight updates do not use it.
    #[builder(default = 0.9)]
    pub momentum: f64,
}

impl<S: rank_net_params_builder::IsComplete> RankNetParamsBuilder<S> {
    pub fn build(self) -> Result<RankNetParams, ConfigError> {
        let params = self.__build_internal();
        check_count("n_iteration", params.n_iteration)?;
        if params.n_hidden_layer > 0 {
            check_count("n_hidden_nodes", params.n_hidden_nodes)?;
        }
        check_learning_rate(params.learning_rate)?;
        Ok(params)
    }
}

impl Default for RankNetParams {
    fn default() -> Self {
        Self::builder().__build_internal()
    }
}

/// ListNet: a single linear layer trained on top-one probabilities.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(derive(Clone, Debug), finish_fn(vis = "", name = __build_internal))]
#[serde(default)]
pub struct ListNetParams {
    /// Epochs. Default: 1500.
    #[builder(default = 1500)]
    pub n_iteration: usize,
    /// Default: 1e-5.
    #[builder(default = 1e-5)]
    pub learning_rate: f64,
}

impl<S: list_net_params_builder::IsComplete> ListNetParamsBuilder<S> {
    pub fn build(self) -> Result<ListNetParams, ConfigError> {
        let params = self.__build_internal();
        check_count("n_iteration", params.n_iteration)?;
        check_learning_rate(params.learning_rate)?;
        Ok(params)
    }
}

impl Default for ListNetParams {
    fn default() -> Self {
        Self::builder().__build_internal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configs_are_valid() {
        assert!(TrainingConfig::builder().build().is_ok());
        assert!(CoorAscentParams::builder().build().is_ok());
        assert!(LinearRegParams::builder().build().is_ok());
        assert!(LambdaMartParams::builder().build().is_ok());
        assert!(RandomForestParams::builder().build().is_ok());
        assert!(AdaRankParams::builder().build().is_ok());
        assert!(RankBoostParams::builder().build().is_ok());
        assert!(RankNetParams::builder().build().is_ok());
        assert!(ListNetParams::builder().build().is_ok());
    }

    #[test]
    fn test_defaults_match_ranklib() {
        let mart = LambdaMartParams::default();
        assert_eq!(mart.n_trees, 1000);
        assert_eq!(mart.n_threshold, 256);
        assert_eq!(mart.n_tree_leaves, 10);
        assert_eq!(mart.early_stop_rounds, 100);

        let rf = RandomForestParams::default();
        assert_eq!(rf.n_bag, 300);
        assert_eq!(rf.n_tree_leaves, 100);
        assert_eq!(rf.bag_params().early_stop_rounds, 0);
        assert_eq!(rf.bag_params().feature_sampling_rate, 0.3);

        assert_eq!(CoorAscentParams::default().n_restart, 5);
        assert_eq!(ListNetParams::default().n_iteration, 1500);
        assert_eq!(TrainingConfig::default().seed, 42);
        assert_eq!(TrainingConfig::default().pool_size(), 0);
    }

    #[test]
    fn test_invalid_learning_rate() {
        let result = LambdaMartParams::builder().learning_rate(0.0).build();
        assert!(matches!(result, Err(ConfigError::InvalidLearningRate(_))));

        let result = RankNetParams::builder().learning_rate(-1.0).build();
        assert!(matches!(result, Err(ConfigError::InvalidLearningRate(_))));
    }

    #[test]
    fn test_invalid_counts_and_ratios() {
        let result = LambdaMartParams::builder().n_trees(0).build();
        assert!(matches!(result, Err(ConfigError::InvalidCount { field: "n_trees" })));

        let result = RandomForestParams::builder().sub_sampling(1.5).build();
        assert!(matches!(result, Err(ConfigError::InvalidSamplingRatio { .. })));

        let result = CoorAscentParams::builder().slack(-0.1).build();
        assert!(matches!(result, Err(ConfigError::Negative { field: "slack", .. })));

        // no hidden layer: node count is irrelevant
        assert!(RankNetParams::builder().n_hidden_layer(0).n_hidden_nodes(0).build().is_ok());
    }

    #[test]
    fn test_params_from_json() {
        let params: LambdaMartParams =
            serde_json::from_str(r#"{"n_trees": 20, "histogram_reuse": "reuse_parent"}"#).unwrap();
        assert_eq!(params.n_trees, 20);
        assert_eq!(params.n_tree_leaves, 10);
        assert_eq!(params.histogram_reuse, HistogramReuse::ReuseParent);

        let config: TrainingConfig =
            serde_json::from_str(r#"{"metric": "ERR@5", "verbosity": "info"}"#).unwrap();
        assert_eq!(config.metric, MetricKind::ExpectedReciprocalRank(5));
        assert_eq!(config.verbosity, Verbosity::Info);
    }

    #[test]
    fn test_error_messages() {
        let err = ConfigError::InvalidSamplingRatio {
            field: "sub_sampling",
            value: 1.5,
        };
        assert_eq!(err.to_string(), "sub_sampling must be in (0, 1], got 1.5");
    }
}
