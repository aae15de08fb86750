//! Loaders for models trained outside this crate.
//!
//! Each parser reads one serialized model format and converts it into a
//! native serving model ([`AdditiveModel`](crate::repr::AdditiveModel),
//! [`LinearRanker`](crate::repr::LinearRanker) or a reloaded RankLib ranker),
//! resolving feature names against a [`FeatureSet`].
//!
//! | Type | Parser |
//! |---|---|
//! | `model/lightgbm+json` | [`LightGbmParser`] |
//! | `model/xgboost+json` | [`XgboostLegacyParser`] |
//! | `model/xgboost+json+v2`, `model/xgboost+json+raw` | [`XgboostLearnerParser`] |
//! | `model/linear` | [`LinearParser`] |
//! | `model/ranklib` | [`RanklibParser`] |
//!
//! ```
//! use ltrkit::compat::ParserFactory;
//! use ltrkit::feature::FeatureSet;
//!
//! let set = FeatureSet::new(["title", "body"])?;
//! let model = r#"{"title": 2.0, "body": 0.5}"#;
//! let ranker = ParserFactory::default().parse("model/linear", &set, model)?;
//!
//! let mut v = ranker.new_feature_vector();
//! v.set_feature_score(0, 1.0);
//! v.set_feature_score(1, 4.0);
//! assert_eq!(ranker.score(v.as_ref()), 4.0);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::collections::HashMap;

use crate::feature::FeatureSet;
use crate::ranker::LtrRanker;

mod error;
pub mod lightgbm;
pub mod linear;
pub mod ranklib;
pub mod xgboost;

pub use error::{ParseError, Result};
pub use lightgbm::LightGbmParser;
pub use linear::LinearParser;
pub use ranklib::{RanklibParser, RanklibRanker};
pub use xgboost::{XgboostLearnerParser, XgboostLegacyParser};

/// Converts model text into a scoring model over a feature set.
pub trait ModelParser: Send + Sync {
    fn parse(&self, set: &FeatureSet, model: &str) -> Result<Box<dyn LtrRanker>>;
}

type ParserCtor = Box<dyn Fn() -> Box<dyn ModelParser> + Send + Sync>;

/// Registry of parsers keyed by model type, e.g. `model/xgboost+json`.
pub struct ParserFactory {
    parsers: HashMap<String, ParserCtor>,
}

impl ParserFactory {
    pub fn builder() -> ParserFactoryBuilder {
        ParserFactoryBuilder {
            parsers: HashMap::new(),
        }
    }

    /// A fresh parser for `model_type`.
    pub fn parser(&self, model_type: &str) -> Result<Box<dyn ModelParser>> {
        self.parsers
            .get(model_type)
            .map(|ctor| ctor())
            .ok_or_else(|| ParseError::UnsupportedFormat(model_type.to_string()))
    }

    pub fn parse(
        &self,
        model_type: &str,
        set: &FeatureSet,
        model: &str,
    ) -> Result<Box<dyn LtrRanker>> {
        let ranker = self.parser(model_type)?.parse(set, model)?;
        tracing::debug!(
            model_type,
            ranker = %ranker.name(),
            n_features = set.size(),
            "parsed model"
        );
        Ok(ranker)
    }

    /// Registered types, sorted.
    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.parsers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl Default for ParserFactory {
    fn default() -> Self {
        let mut builder = Self::builder();
        let registrations: [(&str, fn() -> Box<dyn ModelParser>); 6] = [
            (lightgbm::TYPE, || Box::new(LightGbmParser)),
            (xgboost::LEGACY_TYPE, || Box::new(XgboostLegacyParser)),
            (xgboost::V2_TYPE, || Box::new(XgboostLearnerParser)),
            (xgboost::RAW_TYPE, || Box::new(XgboostLearnerParser)),
            (linear::TYPE, || Box::new(LinearParser)),
            (ranklib::TYPE, || Box::new(RanklibParser::new())),
        ];
        for (model_type, ctor) in registrations {
            // The table above has no duplicates.
            if let Err(e) = builder.register(model_type, ctor) {
                tracing::warn!(error = %e, "skipping parser registration");
            }
        }
        builder.build()
    }
}

impl std::fmt::Debug for ParserFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserFactory").field("types", &self.types()).finish()
    }
}

pub struct ParserFactoryBuilder {
    parsers: HashMap<String, ParserCtor>,
}

impl ParserFactoryBuilder {
    pub fn register<F>(&mut self, model_type: &str, ctor: F) -> Result<&mut Self>
    where
        F: Fn() -> Box<dyn ModelParser> + Send + Sync + 'static,
    {
        if self.parsers.contains_key(model_type) {
            return Err(ParseError::DuplicateParser(model_type.to_string()));
        }
        self.parsers.insert(model_type.to_string(), Box::new(ctor));
        Ok(self)
    }

    pub fn build(self) -> ParserFactory {
        ParserFactory {
            parsers: self.parsers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_factory_knows_every_format() {
        let factory = ParserFactory::default();
        assert_eq!(
            factory.types(),
            vec![
                "model/lightgbm+json",
                "model/linear",
                "model/ranklib",
                "model/xgboost+json",
                "model/xgboost+json+raw",
                "model/xgboost+json+v2",
            ]
        );
    }

    #[test]
    fn unknown_type_is_rejected() {
        let set = FeatureSet::new(["a"]).unwrap();
        let err = ParserFactory::default()
            .parse("model/onnx", &set, "{}")
            .unwrap_err();
        assert_eq!(err.to_string(), "Unsupported LtrRanker format/type [model/onnx]");
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut builder = ParserFactory::builder();
        builder.register(linear::TYPE, || Box::new(LinearParser)).unwrap();
        let err = builder
            .register(linear::TYPE, || Box::new(LinearParser))
            .err()
            .unwrap();
        assert_eq!(
            err.to_string(),
            "Cannot register parser: [model/linear] already registered."
        );
    }
}
