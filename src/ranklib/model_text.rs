//! Helpers shared by every ranker's text model reader and writer.
//!
//! A model text starts with `## <Ranker name>` and a few `## key = value`
//! parameter lines, followed by the ranker's own payload.

use serde::{Deserialize, Serialize};

use super::error::{parse_num, RankLibError, Result};
use crate::feature::FeatureSet;

/// How feature references in a model text are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureType {
    /// Integer feature ids, as training writes them.
    #[default]
    Ordinal,
    /// Feature names, resolved through a [`FeatureSet`].
    Named,
}

/// Turns a feature reference from model text into a 1-based feature id.
#[derive(Debug, Clone, Copy)]
pub struct FeatureResolver<'a> {
    set: Option<&'a FeatureSet>,
    kind: FeatureType,
}

impl<'a> FeatureResolver<'a> {
    pub fn ordinal() -> Self {
        Self {
            set: None,
            kind: FeatureType::Ordinal,
        }
    }

    pub fn named(set: &'a FeatureSet) -> Self {
        Self {
            set: Some(set),
            kind: FeatureType::Named,
        }
    }

    pub fn new(set: Option<&'a FeatureSet>, kind: FeatureType) -> Self {
        Self { set, kind }
    }

    pub fn kind(&self) -> FeatureType {
        self.kind
    }

    /// Resolve `token`. Named features map to `ordinal + 1`.
    pub fn resolve(&self, token: &str) -> Result<usize> {
        let token = token.trim();
        match self.kind {
            FeatureType::Ordinal => parse_num(token, "feature id"),
            FeatureType::Named => {
                let set = self.set.ok_or_else(|| {
                    RankLibError::Config("named feature resolution requires a feature set".into())
                })?;
                set.feature_ordinal(token)
                    .map(|ordinal| ordinal + 1)
                    .ok_or_else(|| RankLibError::UnknownFeature(token.to_string()))
            }
        }
    }
}

/// Trimmed, non-empty lines that are not `#` comments.
pub(crate) fn content_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

/// Text without its comment lines, newline-joined.
pub(crate) fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in content_lines(text) {
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// The ranker name on the `## <Name>` first line.
pub fn ranker_name(text: &str) -> Option<&str> {
    let first = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let name = first.strip_prefix("##")?.trim();
    (!name.is_empty()).then_some(name)
}

/// Value of the `## key = value` header line, if present.
pub(crate) fn header_value<'t>(text: &'t str, key: &str) -> Option<&'t str> {
    text.lines()
        .filter_map(|line| line.trim().strip_prefix("##"))
        .filter_map(|line| line.split_once('='))
        .find(|(k, _)| k.trim() == key)
        .map(|(_, v)| v.trim())
}

/// `key:value` pairs on one line, after dropping a trailing `# comment`.
///
/// The key is everything before the first `:`, the value everything after
/// the last one, so `fid:threshold:alpha` triples yield `(fid, alpha)`;
/// use [`parse_fields`] to see the middle fields.
pub(crate) fn parse_pairs(line: &str) -> Vec<(&str, &str)> {
    parse_fields(line)
        .into_iter()
        .filter_map(|fields| match fields.as_slice() {
            [key, .., value] => Some((*key, *value)),
            _ => None,
        })
        .collect()
}

/// Every `:`-separated token on one line.
pub(crate) fn parse_fields(line: &str) -> Vec<Vec<&str>> {
    let body = match line.rfind('#') {
        Some(idx) => &line[..idx],
        None => line,
    };
    body.split_whitespace()
        .map(|token| token.split(':').collect::<Vec<_>>())
        .collect()
}

#[inline]
pub(crate) fn yes_no(value: bool) -> &'static str {
    if value {
        "Yes"
    } else {
        "No"
    }
}
