//! Nested XGBoost JSON dump.
//!
//! The top level is either an array of tree roots or an object
//! `{"objective": ..., "splits": [...]}`. Splits route `value < split_condition`
//! to `yes`; NaN goes wherever `missing` points.

use serde::Deserialize;
use serde_json::Value;

use super::super::error::{json_kind, ParseError, Result};
use super::super::ModelParser;
use super::{objective_normalizer, DEFAULT_OBJECTIVE};
use crate::feature::FeatureSet;
use crate::ranker::LtrRanker;
use crate::repr::{AdditiveModel, Comparator, NodeId, Tree, TreeBuilder};

const OBJECT_CONTEXT: &str = "Unable to parse XGBoost object";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LegacyModel {
    objective: Option<String>,
    splits: Option<Vec<LegacyNode>>,
}

#[derive(Debug, Deserialize)]
struct LegacyNode {
    nodeid: Option<i64>,
    split: Option<String>,
    split_condition: Option<f32>,
    yes: Option<i64>,
    no: Option<i64>,
    missing: Option<i64>,
    children: Option<Vec<LegacyNode>>,
    leaf: Option<f32>,
}

/// Parser for `model/xgboost+json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct XgboostLegacyParser;

impl ModelParser for XgboostLegacyParser {
    fn parse(&self, set: &FeatureSet, model: &str) -> Result<Box<dyn LtrRanker>> {
        Ok(Box::new(parse_model(set, model)?))
    }
}

pub fn parse_model(set: &FeatureSet, model: &str) -> Result<AdditiveModel> {
    let value: Value = serde_json::from_str(model)?;
    let (objective, roots) = match value {
        Value::Array(_) => {
            let roots: Vec<LegacyNode> = serde_json::from_value(value)
                .map_err(|e| ParseError::from(e).context(OBJECT_CONTEXT))?;
            (DEFAULT_OBJECTIVE.to_string(), roots)
        }
        Value::Object(_) => {
            let raw: LegacyModel = serde_json::from_value(value)
                .map_err(|e| ParseError::from(e).context(OBJECT_CONTEXT))?;
            let splits = raw.splits.ok_or(ParseError::MissingField {
                context: "XGBoost model",
                field: "splits",
            })?;
            (raw.objective.unwrap_or_else(|| DEFAULT_OBJECTIVE.to_string()), splits)
        }
        other => {
            return Err(ParseError::UnexpectedToken {
                expected: "start array or start object",
                found: json_kind(&other).to_string(),
            })
        }
    };
    let normalizer =
        objective_normalizer(&objective, false).map_err(|e| e.context(OBJECT_CONTEXT))?;

    let trees = roots
        .iter()
        .map(|root| {
            let mut builder = TreeBuilder::new();
            convert_node(root, set, &mut builder)?;
            Ok(builder.build()?)
        })
        .collect::<Result<Vec<Tree>>>()?;

    tracing::debug!(n_trees = trees.len(), objective = %objective, "converted XGBoost model");
    Ok(AdditiveModel::unweighted(trees, set.size(), normalizer)?)
}

fn convert_node(node: &LegacyNode, set: &FeatureSet, builder: &mut TreeBuilder) -> Result<NodeId> {
    if let Some(value) = node.leaf {
        return Ok(builder.push_leaf(value));
    }

    let (Some(nodeid), Some(split), Some(threshold), Some(yes), Some(no), Some(children)) = (
        node.nodeid,
        node.split.as_deref(),
        node.split_condition,
        node.yes,
        node.no,
        node.children.as_deref(),
    ) else {
        return Err(ParseError::IncompleteSplit);
    };

    let [first, second] = children else {
        return Err(ParseError::InconsistentSplit(nodeid));
    };
    let (left, right) = match (first.nodeid, second.nodeid) {
        (Some(a), Some(b)) if a == yes && b == no => (first, second),
        (Some(a), Some(b)) if a == no && b == yes => (second, first),
        _ => return Err(ParseError::InconsistentSplit(nodeid)),
    };
    let comparator = match node.missing {
        Some(m) if m == yes => Comparator::LessDefaultLeft,
        Some(m) if m == no => Comparator::LessDefaultRight,
        None => Comparator::LessDefaultRight,
        Some(_) => return Err(ParseError::InconsistentSplit(nodeid)),
    };
    let feature = set
        .feature_ordinal(split)
        .ok_or_else(|| ParseError::UnknownSplitFeature(split.to_string()))? as u32;

    let id = builder.reserve();
    let left = convert_node(left, set, builder)?;
    let right = convert_node(right, set, builder)?;
    builder.set_split(id, feature, threshold, left, right, comparator);
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_approx_eq;

    const SPLIT: &str = r#"{
        "nodeid": 0, "split": "feat1", "depth": 0, "split_condition": 0.123,
        "yes": 1, "no": 2, "missing": MISSING,
        "children": [
            {"nodeid": 1, "depth": 1, "leaf": 0.5},
            {"nodeid": 2, "depth": 1, "leaf": LEAF}
        ]}"#;

    fn split(missing: i64, leaf: f32) -> String {
        SPLIT
            .replace("MISSING", &missing.to_string())
            .replace("LEAF", &leaf.to_string())
    }

    fn set() -> FeatureSet {
        FeatureSet::new(["feat1"]).unwrap()
    }

    fn score(model: &dyn LtrRanker, value: f32) -> f32 {
        let mut v = model.new_feature_vector();
        v.set_feature_score(0, value);
        model.score(v.as_ref())
    }

    #[test]
    fn reads_a_leaf_only_tree() {
        let model = XgboostLegacyParser
            .parse(&set(), r#"[{"nodeid": 0, "leaf": 0.234}]"#)
            .unwrap();
        assert_eq!(score(model.as_ref(), 10.0), 0.234);
    }

    #[test]
    fn split_routes_strictly_less_to_yes() {
        let model = XgboostLegacyParser
            .parse(&set(), &format!("[{}]", split(1, 0.2)))
            .unwrap();
        assert_eq!(score(model.as_ref(), 0.124), 0.2);
        assert_eq!(score(model.as_ref(), 0.122), 0.5);
        assert_eq!(score(model.as_ref(), 0.123), 0.2);
        assert_eq!(score(model.as_ref(), f32::NAN), 0.5);
    }

    #[test]
    fn object_form_with_objective() {
        for objective in ["", r#""objective": "reg:linear","#] {
            let text = format!(r#"{{{objective} "splits": [{}]}}"#, split(2, 0.2));
            let model = XgboostLegacyParser.parse(&set(), &text).unwrap();
            assert_eq!(score(model.as_ref(), 0.124), 0.2);
            assert_eq!(score(model.as_ref(), 0.122), 0.5);
            assert_eq!(score(model.as_ref(), f32::NAN), 0.2);
        }
    }

    #[test]
    fn logistic_objective_applies_sigmoid() {
        let text = format!(r#"{{"objective": "reg:logistic", "splits": [{}]}}"#, split(2, -0.2));
        let model = XgboostLegacyParser.parse(&set(), &text).unwrap();
        assert_approx_eq!(score(model.as_ref(), 0.124), 0.45016602, 1e-6);
        assert_approx_eq!(score(model.as_ref(), 0.122), 0.62245935, 1e-6);
        assert_approx_eq!(score(model.as_ref(), 0.123), 0.45016602, 1e-6);
    }

    #[test]
    fn unknown_keys_and_objectives_are_object_errors() {
        for prefix in [r#""not_param": "value","#, r#""objective": "reg:invalid","#] {
            let text = format!(r#"{{{prefix} "splits": [{}]}}"#, split(2, 0.2));
            let err = XgboostLegacyParser.parse(&set(), &text).unwrap_err();
            assert_eq!(err.to_string(), "Unable to parse XGBoost object");
        }
    }

    #[test]
    fn split_requires_its_fields() {
        let text = format!("[{}]", split(2, 0.2).replace(r#""split_condition": 0.123,"#, ""));
        let err = XgboostLegacyParser.parse(&set(), &text).unwrap_err();
        assert_eq!(err.to_string(), "This split does not have all the required fields");
    }

    #[test]
    fn children_must_match_yes_and_no() {
        let text = format!("[{}]", split(2, 0.2).replace(r#""no": 2"#, r#""no": 3"#));
        let err = XgboostLegacyParser.parse(&set(), &text).unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Split structure is invalid, yes, no and/or missing"));

        let text = format!("[{}]", split(7, 0.2));
        assert!(matches!(
            XgboostLegacyParser.parse(&set(), &text).unwrap_err(),
            ParseError::InconsistentSplit(0)
        ));
    }

    #[test]
    fn unknown_split_feature() {
        let text = format!("[{}]", split(2, 0.2).replace("feat1", "feat2"));
        let err = XgboostLegacyParser.parse(&set(), &text).unwrap_err();
        assert_eq!(err.to_string(), "Unknown feature [feat2]");
    }

    #[test]
    fn scalar_top_level_is_rejected() {
        let err = XgboostLegacyParser.parse(&set(), "42").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Expected start array or start object but found [number]"
        );
    }
}
