//! Canonical model representations scored at serving time.
//!
//! Every model format parser converts into one of these types.

pub mod ensemble;
pub mod linear;
pub mod normalizer;
pub mod tree;

pub use ensemble::{AdditiveModel, ModelValidationError};
pub use linear::LinearRanker;
pub use normalizer::Normalizer;
pub use tree::{
    is_zero, Comparator, Node, NodeId, Tree, TreeBuilder, TreeValidationError, ZERO_THRESHOLD,
};
