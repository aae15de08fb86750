//! Neural-net rankers: RankNet, LambdaRank and ListNet.

mod listnet;
mod network;
mod ranknet;

pub use listnet::ListNet;
pub use network::{Network, Pair, PairLoss, Synapse};
pub use ranknet::RankNet;
