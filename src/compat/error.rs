//! Errors raised while converting external model text.

use crate::ranklib::RankLibError;
use crate::repr::{ModelValidationError, TreeValidationError};

/// Why a model could not be parsed.
///
/// Variants fall into three groups: structural problems with the text,
/// references that do not resolve, and features the model uses that are
/// rejected outright. [`ParseError::Context`] layers a readable description
/// on top of the underlying cause.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    // --- structural ---
    /// Malformed JSON; the message carries line and column.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("Expected {expected} but found [{found}]")]
    UnexpectedToken { expected: &'static str, found: String },

    #[error("{context} missing required field [{field}]")]
    MissingField { context: &'static str, field: &'static str },

    #[error("This split does not have all the required fields")]
    IncompleteSplit,

    #[error("feature_names must not be empty")]
    EmptyFeatureNames,

    #[error("Only version v2 is supported, found [{0}]")]
    UnsupportedVersion(String),

    #[error("Expected a float but found [{0}]")]
    ExpectedFloat(String),

    #[error("Model declares {declared} trees but contains {found}")]
    TreeCountMismatch { declared: usize, found: usize },

    // --- referential ---
    #[error("Unknown features in model: [{}]", .0.join(", "))]
    UnknownFeatures(Vec<String>),

    #[error("Feature [{0}] is unknown.")]
    UnknownFeature(String),

    #[error("Unknown feature [{0}]")]
    UnknownSplitFeature(String),

    #[error("Child node reference ID [{0}] is invalid")]
    InvalidNodeReference(i64),

    #[error("Split structure is invalid, yes, no and/or missing do not point to the children of node [{0}]")]
    InconsistentSplit(i64),

    #[error("Split feature index {index} is out of range for {n_features} features")]
    SplitFeatureOutOfRange { index: i64, n_features: usize },

    #[error("Feature names list and feature types list must have the same length (names: {names}, types: {types})")]
    FeatureTypesLengthMismatch { names: usize, types: usize },

    // --- policy ---
    #[error("Only the <= decision_type is supported, found [{0}]")]
    UnsupportedDecisionType(String),

    #[error("default_left must be true")]
    DefaultLeftRequired,

    #[error("Objective [{0}] is not a valid XGBoost objective")]
    UnsupportedObjective(String),

    #[error("Only float feature types are supported since scores are float32. Found feature type [{0}] in model")]
    NonFloatFeatureType(String),

    // --- registry ---
    #[error("Unsupported LtrRanker format/type [{0}]")]
    UnsupportedFormat(String),

    #[error("Cannot register parser: [{0}] already registered.")]
    DuplicateParser(String),

    // --- conversion ---
    #[error(transparent)]
    InvalidTree(#[from] TreeValidationError),

    #[error(transparent)]
    InvalidModel(#[from] ModelValidationError),

    #[error(transparent)]
    RankLib(#[from] RankLibError),

    #[error("{context}")]
    Context {
        context: String,
        #[source]
        source: Box<ParseError>,
    },
}

impl ParseError {
    pub fn context(self, context: impl Into<String>) -> Self {
        ParseError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error under any [`ParseError::Context`] layers.
    pub fn root_cause(&self) -> &ParseError {
        match self {
            ParseError::Context { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// `context: cause: ...`, outermost first.
    pub fn chain(&self) -> String {
        match self {
            ParseError::Context { context, source } => format!("{context}: {}", source.chain()),
            other => other.to_string(),
        }
    }
}

pub type Result<T, E = ParseError> = std::result::Result<T, E>;

/// Short name of a JSON value's kind, for [`ParseError::UnexpectedToken`].
pub(crate) fn json_kind(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "start array",
        Value::Object(_) => "start object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_features_are_all_listed() {
        let err = ParseError::UnknownFeatures(vec!["feat1".into(), "feat2".into()]);
        assert_eq!(err.to_string(), "Unknown features in model: [feat1, feat2]");
    }

    #[test]
    fn context_chain_reaches_the_root() {
        let err = ParseError::InvalidNodeReference(100).context("Unable to parse XGBoost object");
        assert_eq!(err.to_string(), "Unable to parse XGBoost object");
        assert!(matches!(err.root_cause(), ParseError::InvalidNodeReference(100)));
        assert_eq!(
            err.chain(),
            "Unable to parse XGBoost object: Child node reference ID [100] is invalid"
        );
    }
}
