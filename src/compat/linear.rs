//! Flat `{"feature name": weight}` linear models.

use serde_json::Value;

use super::error::{json_kind, ParseError, Result};
use super::ModelParser;
use crate::feature::FeatureSet;
use crate::ranker::LtrRanker;
use crate::repr::LinearRanker;

pub const TYPE: &str = "model/linear";

/// Parser for `model/linear`. Features without a weight score 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearParser;

impl ModelParser for LinearParser {
    fn parse(&self, set: &FeatureSet, model: &str) -> Result<Box<dyn LtrRanker>> {
        Ok(Box::new(parse_model(set, model)?))
    }
}

pub fn parse_model(set: &FeatureSet, model: &str) -> Result<LinearRanker> {
    let value: Value = serde_json::from_str(model)?;
    let Value::Object(entries) = value else {
        return Err(ParseError::UnexpectedToken {
            expected: "start object",
            found: json_kind(&value).to_string(),
        });
    };

    let mut weights = vec![0.0f32; set.size()];
    for (name, weight) in &entries {
        let ordinal = set
            .feature_ordinal(name)
            .ok_or_else(|| ParseError::UnknownFeature(name.clone()))?;
        let weight = weight
            .as_f64()
            .ok_or_else(|| ParseError::ExpectedFloat(json_kind(weight).to_string()))?;
        weights[ordinal] = weight as f32;
    }
    Ok(LinearRanker::new(weights))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn set() -> FeatureSet {
        FeatureSet::new(["feature1", "feature2", "feature3"]).unwrap()
    }

    #[test]
    fn missing_weights_default_to_zero() {
        let ranker = parse_model(&set(), r#"{"feature1": 1.5, "feature3": -2}"#).unwrap();
        assert_eq!(ranker.weights(), &[1.5, 0.0, -2.0]);

        let mut v = ranker.new_feature_vector();
        for i in 0..3 {
            v.set_feature_score(i, 2.0);
        }
        assert_eq!(ranker.score(v.as_ref()), -1.0);
    }

    #[test]
    fn weighted_sum() {
        let set = FeatureSet::new(["a", "b"]).unwrap();
        let ranker = LinearParser.parse(&set, r#"{"a": 1.0, "b": 2.0}"#).unwrap();
        let mut v = ranker.new_feature_vector();
        v.set_feature_score(0, 3.0);
        v.set_feature_score(1, 4.0);
        assert_eq!(ranker.score(v.as_ref()), 11.0);
    }

    #[test]
    fn unknown_feature() {
        let err = parse_model(&set(), r#"{"feature1": 1.0, "nope": 2.0}"#).unwrap_err();
        assert_eq!(err.to_string(), "Feature [nope] is unknown.");
    }

    #[rstest]
    #[case::string(r#"{"feature1": "1.0"}"#, "Expected a float but found [string]")]
    #[case::null(r#"{"feature1": null}"#, "Expected a float but found [null]")]
    #[case::array(r#"{"feature1": [1.0]}"#, "Expected a float but found [start array]")]
    #[case::object(r#"{"feature1": {"w": 1.0}}"#, "Expected a float but found [start object]")]
    #[case::top_level_array("[1.0]", "Expected start object but found [start array]")]
    fn rejects_non_numbers(#[case] text: &str, #[case] message: &str) {
        let err = parse_model(&set(), text).unwrap_err();
        assert_eq!(err.to_string(), message);
    }
}
