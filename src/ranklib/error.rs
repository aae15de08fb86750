//! The training library's error type.

/// Error raised by training, model text generation and model reloading.
///
/// Lower-level failures (number parsing, XML, worker panics) are wrapped
/// into this one kind, with [`RankLibError::Context`] layering a readable
/// cause chain on top.
#[derive(Debug, thiserror::Error)]
pub enum RankLibError {
    /// A model references a feature name the feature set does not define.
    #[error("Feature [{0}] is unknown.")]
    UnknownFeature(String),

    #[error("Unknown ranker [{0}]")]
    UnknownRanker(String),

    #[error("{0}")]
    InvalidModel(String),

    #[error("{0}")]
    InvalidData(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Xml(#[from] quick_xml::Error),

    #[error("worker task failed: {0}")]
    Worker(String),

    #[error("{context}")]
    Context {
        context: String,
        #[source]
        source: Box<RankLibError>,
    },
}

impl RankLibError {
    /// Wrap `self` under a higher-level description.
    pub fn context(self, context: impl Into<String>) -> Self {
        RankLibError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error of a context chain.
    pub fn root_cause(&self) -> &RankLibError {
        match self {
            RankLibError::Context { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Every message in the chain, outermost first, joined with `: `.
    pub fn chain(&self) -> String {
        match self {
            RankLibError::Context { context, source } => format!("{context}: {}", source.chain()),
            other => other.to_string(),
        }
    }
}

pub type Result<T, E = RankLibError> = std::result::Result<T, E>;

pub(crate) fn parse_num<T: std::str::FromStr>(text: &str, what: &str) -> Result<T> {
    let text = text.trim();
    text.parse::<T>()
        .map_err(|_| RankLibError::InvalidModel(format!("Cannot parse {what} from [{text}]")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_chain() {
        let err =
            RankLibError::UnknownFeature("title".into()).context("Error in LambdaMART::load()");
        assert_eq!(err.to_string(), "Error in LambdaMART::load()");
        assert!(matches!(err.root_cause(), RankLibError::UnknownFeature(name) if name == "title"));
        assert_eq!(
            err.chain(),
            "Error in LambdaMART::load(): Feature [title] is unknown."
        );
    }

    #[test]
    fn parse_num_reports_text() {
        assert_eq!(parse_num::<f64>(" 1.0E-10 ", "lambda").unwrap(), 1e-10);
        let err = parse_num::<i32>("x", "feature id").unwrap_err();
        assert_eq!(err.to_string(), "Cannot parse feature id from [x]");
    }
}
