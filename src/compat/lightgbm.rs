//! LightGBM JSON model loader (`dump_model()` output, version `v2`).
//!
//! Only numerical `<=` splits are supported. Split nodes carry the missing
//! value policy which is folded into a [`Comparator`] per split.

use serde::Deserialize;
use serde_json::Value;

use super::error::{ParseError, Result};
use super::ModelParser;
use crate::feature::FeatureSet;
use crate::ranker::LtrRanker;
use crate::repr::{AdditiveModel, Comparator, NodeId, Normalizer, Tree, TreeBuilder, ZERO_THRESHOLD};

pub const TYPE: &str = "model/lightgbm+json";

// =============================================================================
// Foreign types
// =============================================================================

#[derive(Debug, Deserialize)]
struct LgbModel {
    version: Option<String>,
    #[serde(default)]
    feature_names: Vec<String>,
    tree_info: Option<Vec<LgbTreeInfo>>,
}

#[derive(Debug, Deserialize)]
struct LgbTreeInfo {
    tree_structure: Option<LgbNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
enum MissingType {
    None,
    Zero,
    NaN,
}

/// Either a leaf (`leaf_value` present) or a split.
#[derive(Debug, Deserialize)]
struct LgbNode {
    leaf_value: Option<f32>,
    split_feature: Option<i64>,
    threshold: Option<Value>,
    decision_type: Option<String>,
    default_left: Option<bool>,
    missing_type: Option<MissingType>,
    left_child: Option<Box<LgbNode>>,
    right_child: Option<Box<LgbNode>>,
}

// =============================================================================
// Conversion
// =============================================================================

/// Parser for `model/lightgbm+json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LightGbmParser;

impl ModelParser for LightGbmParser {
    fn parse(&self, set: &FeatureSet, model: &str) -> Result<Box<dyn LtrRanker>> {
        Ok(Box::new(parse_model(set, model)?))
    }
}

pub fn parse_model(set: &FeatureSet, model: &str) -> Result<AdditiveModel> {
    let raw: LgbModel = serde_json::from_str(model)?;

    let version = raw.version.unwrap_or_default();
    if version != "v2" {
        return Err(ParseError::UnsupportedVersion(version));
    }
    if raw.feature_names.is_empty() {
        return Err(ParseError::EmptyFeatureNames);
    }
    let unknown = set.unknown_features(raw.feature_names.iter().map(String::as_str));
    if !unknown.is_empty() {
        return Err(ParseError::UnknownFeatures(unknown));
    }
    let tree_info = raw.tree_info.ok_or(ParseError::MissingField {
        context: "LightGBM model",
        field: "tree_info",
    })?;

    let ordinals: Vec<u32> = raw
        .feature_names
        .iter()
        .filter_map(|name| set.feature_ordinal(name))
        .map(|o| o as u32)
        .collect();

    let trees = tree_info
        .iter()
        .map(|info| {
            let root = info.tree_structure.as_ref().ok_or(ParseError::MissingField {
                context: "LightGBM tree",
                field: "tree_structure",
            })?;
            convert_tree(root, &ordinals)
        })
        .collect::<Result<Vec<Tree>>>()?;

    tracing::debug!(n_trees = trees.len(), n_features = set.size(), "converted LightGBM model");
    Ok(AdditiveModel::unweighted(trees, set.size(), Normalizer::Noop)?)
}

fn convert_tree(root: &LgbNode, ordinals: &[u32]) -> Result<Tree> {
    let mut builder = TreeBuilder::new();
    convert_node(root, ordinals, &mut builder)?;
    Ok(builder.build()?)
}

fn convert_node(node: &LgbNode, ordinals: &[u32], builder: &mut TreeBuilder) -> Result<NodeId> {
    if let Some(value) = node.leaf_value {
        return Ok(builder.push_leaf(value));
    }

    let (
        Some(split_feature),
        Some(threshold),
        Some(decision_type),
        Some(default_left),
        Some(missing_type),
        Some(left),
        Some(right),
    ) = (
        node.split_feature,
        node.threshold.as_ref(),
        node.decision_type.as_deref(),
        node.default_left,
        node.missing_type,
        node.left_child.as_deref(),
        node.right_child.as_deref(),
    )
    else {
        return Err(ParseError::IncompleteSplit);
    };

    if decision_type != "<=" {
        return Err(ParseError::UnsupportedDecisionType(decision_type.to_string()));
    }
    if !default_left {
        return Err(ParseError::DefaultLeftRequired);
    }
    let threshold = threshold
        .as_f64()
        .ok_or_else(|| ParseError::ExpectedFloat(threshold.to_string()))? as f32;
    let feature = usize::try_from(split_feature)
        .ok()
        .and_then(|i| ordinals.get(i).copied())
        .ok_or(ParseError::SplitFeatureOutOfRange {
            index: split_feature,
            n_features: ordinals.len(),
        })?;

    let id = builder.reserve();
    let left = convert_node(left, ordinals, builder)?;
    let right = convert_node(right, ordinals, builder)?;
    builder.set_split(
        id,
        feature,
        threshold,
        left,
        right,
        comparator(missing_type, default_left, threshold),
    );
    Ok(id)
}

/// `missing_type` decides whether `default_left` applies at all: a `None`
/// split compares plainly, so NaN fails `<=` and goes right.
fn comparator(missing_type: MissingType, default_left: bool, threshold: f32) -> Comparator {
    match missing_type {
        MissingType::None => Comparator::Simple,
        MissingType::Zero if default_left && threshold > ZERO_THRESHOLD => Comparator::Simple,
        MissingType::Zero if default_left => Comparator::ZeroDefaultLeft,
        MissingType::Zero => Comparator::ZeroDefaultRight,
        MissingType::NaN if default_left => Comparator::DefaultLeft,
        MissingType::NaN => Comparator::DefaultRight,
    }
}
