//! XGBoost `save_model()` JSON, the `learner` layout.
//!
//! Trees are stored as parallel per-node arrays. A node is a leaf when both
//! of its children are `-1`; its value is `base_weights[id]`. `base_score`
//! is not added to the sum.

use serde::Deserialize;
use serde_json::Value;
use serde_with::{serde_as, DisplayFromStr};

use super::super::error::{json_kind, ParseError, Result};
use super::super::ModelParser;
use super::{deserialize_flags, objective_normalizer, DEFAULT_OBJECTIVE};
use crate::feature::FeatureSet;
use crate::ranker::LtrRanker;
use crate::repr::{AdditiveModel, Comparator, NodeId, Tree, TreeBuilder};

const OBJECT_CONTEXT: &str = "Unable to parse XGBoost object";
const LEAF_CHILD: i64 = -1;

// =============================================================================
// Foreign types
// =============================================================================

#[derive(Debug, Deserialize)]
struct RawDefinition {
    learner: Option<RawLearner>,
}

#[derive(Debug, Deserialize)]
struct RawLearner {
    #[serde(default)]
    feature_names: Vec<String>,
    #[serde(default)]
    feature_types: Vec<String>,
    objective: Option<RawObjective>,
    gradient_booster: Option<RawGradientBooster>,
}

#[derive(Debug, Deserialize)]
struct RawObjective {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawGradientBooster {
    model: RawGbTreeModel,
}

#[derive(Debug, Deserialize)]
struct RawGbTreeModel {
    #[serde(default)]
    trees: Vec<RawTree>,
    gbtree_model_param: Option<GbTreeModelParam>,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct GbTreeModelParam {
    #[serde_as(as = "DisplayFromStr")]
    num_trees: usize,
}

#[derive(Debug, Deserialize)]
struct RawTree {
    left_children: Vec<i64>,
    right_children: Vec<i64>,
    split_conditions: Vec<f32>,
    split_indices: Vec<i64>,
    #[serde(default, deserialize_with = "deserialize_flags")]
    default_left: Option<Vec<bool>>,
    base_weights: Vec<f32>,
}

// =============================================================================
// Conversion
// =============================================================================

/// Parser for `model/xgboost+json+v2` and `model/xgboost+json+raw`.
#[derive(Debug, Clone, Copy, Default)]
pub struct XgboostLearnerParser;

impl ModelParser for XgboostLearnerParser {
    fn parse(&self, set: &FeatureSet, model: &str) -> Result<Box<dyn LtrRanker>> {
        Ok(Box::new(parse_model(set, model)?))
    }
}

pub fn parse_model(set: &FeatureSet, model: &str) -> Result<AdditiveModel> {
    let value: Value = serde_json::from_str(model)?;
    if !value.is_object() {
        return Err(ParseError::UnexpectedToken {
            expected: "start object",
            found: json_kind(&value).to_string(),
        });
    }
    let definition: RawDefinition =
        serde_json::from_value(value).map_err(|e| ParseError::from(e).context(OBJECT_CONTEXT))?;
    let learner = definition.learner.ok_or(ParseError::MissingField {
        context: "XGBoost model",
        field: "learner",
    })?;

    if learner.feature_names.len() != learner.feature_types.len() {
        return Err(ParseError::FeatureTypesLengthMismatch {
            names: learner.feature_names.len(),
            types: learner.feature_types.len(),
        });
    }
    if let Some(bad) = learner.feature_types.iter().find(|t| t.as_str() != "float") {
        return Err(ParseError::NonFloatFeatureType(bad.clone()));
    }
    let unknown = set.unknown_features(learner.feature_names.iter().map(String::as_str));
    if !unknown.is_empty() {
        return Err(ParseError::UnknownFeatures(unknown));
    }

    let objective = learner
        .objective
        .as_ref()
        .map_or(DEFAULT_OBJECTIVE, |o| o.name.as_str());
    let normalizer = objective_normalizer(objective, true).map_err(|e| e.context(OBJECT_CONTEXT))?;

    let booster = learner.gradient_booster.ok_or(ParseError::MissingField {
        context: "XGBoost learner",
        field: "gradient_booster",
    })?;
    let features = SplitFeatures::new(set, &learner.feature_names);
    let trees = booster
        .model
        .trees
        .iter()
        .map(|tree| convert_tree(tree, &features))
        .collect::<Result<Vec<Tree>>>()
        .map_err(|e| e.context(OBJECT_CONTEXT))?;

    if let Some(param) = &booster.model.gbtree_model_param {
        if param.num_trees != trees.len() {
            return Err(ParseError::TreeCountMismatch {
                declared: param.num_trees,
                found: trees.len(),
            });
        }
    }

    tracing::debug!(n_trees = trees.len(), objective, "converted XGBoost learner model");
    Ok(AdditiveModel::unweighted(trees, set.size(), normalizer)?)
}

/// Maps `split_indices` entries to feature set ordinals.
///
/// With `feature_names` the index selects a name; without, it is taken as
/// the ordinal itself.
enum SplitFeatures {
    Named(Vec<u32>),
    Positional(usize),
}

impl SplitFeatures {
    fn new(set: &FeatureSet, names: &[String]) -> Self {
        if names.is_empty() {
            return SplitFeatures::Positional(set.size());
        }
        SplitFeatures::Named(
            names
                .iter()
                .filter_map(|name| set.feature_ordinal(name))
                .map(|o| o as u32)
                .collect(),
        )
    }

    fn resolve(&self, index: i64) -> Result<u32> {
        let (found, n_features) = match self {
            SplitFeatures::Named(ordinals) => (
                usize::try_from(index).ok().and_then(|i| ordinals.get(i).copied()),
                ordinals.len(),
            ),
            SplitFeatures::Positional(size) => (
                u32::try_from(index).ok().filter(|&i| (i as usize) < *size),
                *size,
            ),
        };
        found.ok_or(ParseError::SplitFeatureOutOfRange { index, n_features })
    }
}

/// Split whose children are converted after it.
struct PendingSplit {
    node: NodeId,
    feature: u32,
    threshold: f32,
    comparator: Comparator,
    left: usize,
    right: usize,
}

fn node_index(tree: &RawTree, id: i64) -> Result<usize> {
    usize::try_from(id)
        .ok()
        .filter(|&i| i < tree.left_children.len() && i < tree.right_children.len())
        .ok_or(ParseError::InvalidNodeReference(id))
}

/// Converts the columnar node arrays in pre-order with an explicit stack,
/// so chain-shaped trees cannot exhaust the call stack.
fn convert_tree(tree: &RawTree, features: &SplitFeatures) -> Result<Tree> {
    let mut builder = TreeBuilder::new();
    let mut converted: Vec<Option<NodeId>> = vec![None; tree.left_children.len()];
    let mut pending = Vec::new();
    let mut stack = vec![0i64];

    while let Some(id) = stack.pop() {
        let idx = node_index(tree, id)?;
        // A node reached twice means the child arrays form a cycle or a DAG.
        if converted[idx].is_some() {
            return Err(ParseError::InvalidNodeReference(id));
        }

        let (left, right) = (tree.left_children[idx], tree.right_children[idx]);
        if left == LEAF_CHILD && right == LEAF_CHILD {
            let value = tree
                .base_weights
                .get(idx)
                .copied()
                .ok_or(ParseError::InvalidNodeReference(id))?;
            converted[idx] = Some(builder.push_leaf(value));
            continue;
        }

        let (Some(&threshold), Some(&split_index)) =
            (tree.split_conditions.get(idx), tree.split_indices.get(idx))
        else {
            return Err(ParseError::IncompleteSplit);
        };
        let default_left = tree
            .default_left
            .as_ref()
            .and_then(|flags| flags.get(idx).copied())
            .unwrap_or(false);
        let node = builder.reserve();
        converted[idx] = Some(node);
        pending.push(PendingSplit {
            node,
            feature: features.resolve(split_index)?,
            threshold,
            comparator: if default_left {
                Comparator::LessDefaultLeft
            } else {
                Comparator::LessDefaultRight
            },
            left: node_index(tree, left)?,
            right: node_index(tree, right)?,
        });
        stack.push(right);
        stack.push(left);
    }

    let built = |idx: usize| converted[idx].ok_or(ParseError::InvalidNodeReference(idx as i64));
    for split in &pending {
        let (left, right) = (built(split.left)?, built(split.right)?);
        let PendingSplit { node, feature, threshold, comparator, .. } = *split;
        builder.set_split(node, feature, threshold, left, right, comparator);
    }
    Ok(builder.build()?)
}
