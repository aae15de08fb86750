//! XGBoost JSON model loaders.
//!
//! - [`XgboostLegacyParser`]: the nested `dump_model(dump_format="json")`
//!   layout, one object per node with inline `children`
//! - [`XgboostLearnerParser`]: the `save_model()` layout (XGBoost >= 1.0)
//!   with flat per-tree node arrays, registered as both `+v2` and `+raw`

mod learner;
mod legacy;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub use learner::XgboostLearnerParser;
pub use legacy::XgboostLegacyParser;

use super::error::{ParseError, Result};
use crate::repr::Normalizer;

pub const LEGACY_TYPE: &str = "model/xgboost+json";
pub const V2_TYPE: &str = "model/xgboost+json+v2";
pub const RAW_TYPE: &str = "model/xgboost+json+raw";

const DEFAULT_OBJECTIVE: &str = "reg:linear";

/// Output transform for an objective name.
///
/// `allow_ranking` admits `rank:ndcg` and `rank:map`, which only the
/// learner layout accepts.
fn objective_normalizer(name: &str, allow_ranking: bool) -> Result<Normalizer> {
    match name {
        "binary:logistic" | "reg:logistic" => Ok(Normalizer::Sigmoid),
        "binary:logitraw" | "rank:pairwise" | "reg:linear" => Ok(Normalizer::Noop),
        "rank:ndcg" | "rank:map" if allow_ranking => Ok(Normalizer::Noop),
        other => Err(ParseError::UnsupportedObjective(other.to_string())),
    }
}

/// XGBoost writes flags as `0`/`1`, older exports as booleans or strings.
fn deserialize_flags<'de, D>(deserializer: D) -> Result<Option<Vec<bool>>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as SerdeError;

    let values = Option::<Vec<Value>>::deserialize(deserializer)?;
    let Some(values) = values else {
        return Ok(None);
    };
    values
        .into_iter()
        .map(|value| match value {
            Value::Bool(b) => Ok(b),
            Value::Number(n) => n
                .as_f64()
                .map(|f| f != 0.0)
                .ok_or_else(|| SerdeError::custom("invalid number for bool")),
            Value::String(s) => {
                let t = s.trim();
                if t.eq_ignore_ascii_case("true") || t == "1" {
                    Ok(true)
                } else if t.eq_ignore_ascii_case("false") || t == "0" {
                    Ok(false)
                } else {
                    Err(SerdeError::custom(format!("cannot parse bool from string: {s}")))
                }
            }
            _ => Err(SerdeError::custom("unsupported type for bool")),
        })
        .collect::<Result<Vec<bool>, D::Error>>()
        .map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("binary:logistic", false, Normalizer::Sigmoid)]
    #[case("reg:logistic", false, Normalizer::Sigmoid)]
    #[case("binary:logitraw", false, Normalizer::Noop)]
    #[case("rank:pairwise", false, Normalizer::Noop)]
    #[case("reg:linear", false, Normalizer::Noop)]
    #[case("rank:ndcg", true, Normalizer::Noop)]
    #[case("rank:map", true, Normalizer::Noop)]
    fn known_objectives(#[case] name: &str, #[case] ranking: bool, #[case] expected: Normalizer) {
        assert_eq!(objective_normalizer(name, ranking).unwrap(), expected);
    }

    #[test]
    fn ranking_objectives_need_the_learner_layout() {
        let err = objective_normalizer("rank:ndcg", false).unwrap_err();
        assert_eq!(err.to_string(), "Objective [rank:ndcg] is not a valid XGBoost objective");
        assert!(objective_normalizer("reg:invalid", true).is_err());
    }

    #[test]
    fn flags_accept_numbers_booleans_and_strings() {
        #[derive(Deserialize)]
        struct Flags {
            #[serde(default, deserialize_with = "deserialize_flags")]
            flags: Option<Vec<bool>>,
        }
        let parsed: Flags = serde_json::from_str(r#"{"flags": [0, 1, true, "false"]}"#).unwrap();
        assert_eq!(parsed.flags, Some(vec![false, true, true, false]));
        let parsed: Flags = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.flags, None);
        assert!(serde_json::from_str::<Flags>(r#"{"flags": [null]}"#).is_err());
    }
}
