//! Regression-tree learners: MART, LambdaMART and Random Forests.
//!
//! Trees are grown best-first on cumulative feature histograms; see
//! [`histogram`] for the split search and [`regression_tree`] for growth.

pub mod ensemble;
pub mod histogram;
mod lambdamart;
mod random_forest;
pub mod regression_tree;

pub use ensemble::Ensemble;
pub use histogram::{FeatureHistogram, HistogramLayout, SplitCandidate};
pub use lambdamart::LambdaMart;
pub use random_forest::RandomForest;
pub use regression_tree::{FitParams, FittedTree, NodeIndex, RegressionTree, TreeFitter, TreeNode};
