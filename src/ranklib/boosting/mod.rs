//! Boosted linear ensembles over single-feature weak rankers.

mod adarank;
mod rankboost;

pub use adarank::AdaRank;
pub use rankboost::{RankBoost, Stump};
