//! Training samples: data points grouped into per-query rank lists.

use std::fmt;

use super::error::{RankLibError, Result};
use crate::feature::FeatureVector;
use crate::utils::sort_indices;

/// Read access to 1-based feature values, as trained rankers see them.
pub trait FeatureLookup {
    /// Value of feature `fid`; unknown features read as 0.
    fn feature_value(&self, fid: usize) -> f32;
}

impl FeatureLookup for DataPoint {
    #[inline]
    fn feature_value(&self, fid: usize) -> f32 {
        DataPoint::feature_value(self, fid)
    }
}

/// Views a 0-based serving [`FeatureVector`] as 1-based RankLib features:
/// feature id `i + 1` reads ordinal `i`.
pub struct OneBased<'a>(pub &'a dyn FeatureVector);

impl FeatureLookup for OneBased<'_> {
    #[inline]
    fn feature_value(&self, fid: usize) -> f32 {
        if fid == 0 {
            return 0.0;
        }
        let v = self.0.feature_score(fid - 1);
        if v.is_nan() {
            0.0
        } else {
            v
        }
    }
}

/// One judged document.
///
/// Feature ids start at 1; slot 0 of the value array is unused. Features
/// that were never given a value are stored as NaN and read back as 0.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    label: f32,
    id: String,
    description: String,
    values: Vec<f32>,
}

impl DataPoint {
    /// A point with dense 1-based values (`values[0]` is ignored).
    pub fn new(label: f32, id: impl Into<String>, values: Vec<f32>) -> Self {
        Self {
            label,
            id: id.into(),
            description: String::new(),
            values,
        }
    }

    /// A point from 0-based feature values; `features[i]` becomes feature id `i + 1`.
    pub fn from_features(label: f32, id: impl Into<String>, features: &[f32]) -> Self {
        let mut values = Vec::with_capacity(features.len() + 1);
        values.push(f32::NAN);
        values.extend_from_slice(features);
        Self::new(label, id, values)
    }

    /// Parse an SVM-light style line: `<label> qid:<id> <fid>:<value> ... # <description>`.
    pub fn parse(line: &str) -> Result<Self> {
        Self::parse_inner(line).map_err(|e| e.context("Error in DataPoint::parse()"))
    }

    fn parse_inner(line: &str) -> Result<Self> {
        let (body, description) = match line.find('#') {
            Some(idx) => (line[..idx].trim(), line[idx..].to_string()),
            None => (line.trim(), String::new()),
        };
        let mut fields = body.split_whitespace();
        let label: f32 = fields
            .next()
            .ok_or_else(|| RankLibError::InvalidData("Missing relevance label.".into()))
            .and_then(|s| parse_field(s, "label"))?;
        if label < 0.0 {
            return Err(RankLibError::InvalidData(
                "Relevance label cannot be negative.".into(),
            ));
        }
        let id = fields
            .next()
            .map(|qid| pair_value(qid).to_string())
            .ok_or_else(|| RankLibError::InvalidData("Missing query id.".into()))?;

        let mut values = vec![f32::NAN];
        for pair in fields {
            let key = pair
                .find(':')
                .map(|idx| &pair[..idx])
                .ok_or_else(|| RankLibError::InvalidData(format!("Malformed feature [{pair}]")))?;
            let fid: i64 = parse_field(key, "feature id")?;
            if fid <= 0 {
                return Err(RankLibError::InvalidData(
                    "Cannot use feature numbering less than or equal to zero. Start your features at 1."
                        .into(),
                ));
            }
            let fid = fid as usize;
            if fid >= values.len() {
                values.resize(fid + 1, f32::NAN);
            }
            values[fid] = parse_field(pair_value(pair), "feature value")?;
        }

        Ok(Self {
            label,
            id,
            description,
            values,
        })
    }

    #[inline]
    pub fn label(&self) -> f32 {
        self.label
    }

    pub fn set_label(&mut self, label: f32) {
        self.label = label;
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Value of feature `fid`; unknown and out-of-range features read as 0.
    #[inline]
    pub fn feature_value(&self, fid: usize) -> f32 {
        match self.values.get(fid) {
            Some(v) if !v.is_nan() => *v,
            _ => 0.0,
        }
    }

    pub fn set_feature_value(&mut self, fid: usize, value: f32) {
        if fid >= self.values.len() {
            self.values.resize(fid + 1, f32::NAN);
        }
        self.values[fid] = value;
    }

    /// Largest feature id this point has a slot for.
    pub fn max_feature_id(&self) -> usize {
        self.values.len().saturating_sub(1)
    }

    /// Number of features with a known value.
    pub fn known_features(&self) -> usize {
        self.values.iter().skip(1).filter(|v| !v.is_nan()).count()
    }
}

impl fmt::Display for DataPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} qid:{}", self.label, self.id)?;
        for (fid, v) in self.values.iter().enumerate().skip(1) {
            if !v.is_nan() {
                write!(f, " {fid}:{v}")?;
            }
        }
        if !self.description.is_empty() {
            write!(f, " {}", self.description)?;
        }
        Ok(())
    }
}

fn pair_value(pair: &str) -> &str {
    match pair.rfind(':') {
        Some(idx) => &pair[idx + 1..],
        None => pair,
    }
}

fn parse_field<T: std::str::FromStr>(text: &str, what: &str) -> Result<T> {
    text.parse()
        .map_err(|_| RankLibError::InvalidData(format!("Cannot parse {what} from [{text}]")))
}

// =============================================================================
// RankList
// =============================================================================

/// The judged documents of one query, in some order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankList {
    points: Vec<DataPoint>,
}

impl RankList {
    pub fn new(points: Vec<DataPoint>) -> Self {
        Self { points }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[inline]
    pub fn get(&self, i: usize) -> &DataPoint {
        &self.points[i]
    }

    pub fn points(&self) -> &[DataPoint] {
        &self.points
    }

    /// Query id of the list (taken from its first point).
    pub fn id(&self) -> &str {
        self.points.first().map_or("", DataPoint::id)
    }

    pub fn labels(&self) -> Vec<f32> {
        self.points.iter().map(DataPoint::label).collect()
    }

    /// A new list holding `self[order[0]], self[order[1]], ...`.
    pub fn reorder(&self, order: &[usize]) -> RankList {
        RankList::new(order.iter().map(|&i| self.points[i].clone()).collect())
    }

    /// The ideal ordering: labels descending, ties in original order.
    pub fn correct_ranking(&self) -> RankList {
        self.reorder(&sort_indices(&self.labels(), false))
    }

    /// Ordered by the value of feature `fid`, descending.
    pub fn ranking_by_feature(&self, fid: usize) -> RankList {
        let values: Vec<f32> = self.points.iter().map(|p| p.feature_value(fid)).collect();
        self.reorder(&sort_indices(&values, false))
    }
}

impl FromIterator<DataPoint> for RankList {
    fn from_iter<I: IntoIterator<Item = DataPoint>>(iter: I) -> Self {
        RankList::new(iter.into_iter().collect())
    }
}

/// Group consecutive data points sharing a query id into rank lists.
pub fn group_by_query(points: impl IntoIterator<Item = DataPoint>) -> Vec<RankList> {
    let mut lists: Vec<RankList> = Vec::new();
    for point in points {
        match lists.last_mut() {
            Some(list) if list.id() == point.id() => list.points.push(point),
            _ => lists.push(RankList::new(vec![point])),
        }
    }
    lists
}

/// Parse a whole SVM-light style document, skipping blank and `#` lines.
pub fn parse_samples(text: &str) -> Result<Vec<RankList>> {
    let points = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(DataPoint::parse)
        .collect::<Result<Vec<_>>>()?;
    Ok(group_by_query(points))
}

/// Largest feature id over every sample.
pub fn max_feature_id(samples: &[RankList]) -> usize {
    samples
        .iter()
        .flat_map(|rl| rl.points.iter())
        .map(DataPoint::max_feature_id)
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_line_with_description() {
        let p = DataPoint::parse("2 qid:10 1:0.5 3:1.5 # doc-7").unwrap();
        assert_eq!(p.label(), 2.0);
        assert_eq!(p.id(), "10");
        assert_eq!(p.description(), "# doc-7");
        assert_eq!(p.feature_value(1), 0.5);
        assert_eq!(p.feature_value(2), 0.0);
        assert_eq!(p.feature_value(3), 1.5);
        assert_eq!(p.feature_value(99), 0.0);
        assert_eq!(p.max_feature_id(), 3);
        assert_eq!(p.known_features(), 2);
        assert_eq!(p.to_string(), "2 qid:10 1:0.5 3:1.5 # doc-7");
    }

    #[test]
    fn parse_rejects_negative_label_and_zero_feature() {
        let err = DataPoint::parse("-1 qid:1 1:1").unwrap_err();
        assert_eq!(err.to_string(), "Error in DataPoint::parse()");
        assert_eq!(
            err.root_cause().to_string(),
            "Relevance label cannot be negative."
        );

        let err = DataPoint::parse("1 qid:1 0:1").unwrap_err();
        assert!(err.chain().contains("Start your features at 1."));
    }

    #[test]
    fn grouping_and_orderings() {
        let lists = parse_samples(
            "# header\n0 qid:1 1:3\n2 qid:1 1:1\n1 qid:1 1:2\n\n1 qid:2 1:5\n",
        )
        .unwrap();
        assert_eq!(lists.len(), 2);
        assert_eq!(lists[0].len(), 3);
        assert_eq!(lists[0].correct_ranking().labels(), vec![2.0, 1.0, 0.0]);
        assert_eq!(lists[0].ranking_by_feature(1).labels(), vec![0.0, 1.0, 2.0]);
        assert_eq!(max_feature_id(&lists), 1);
    }

    #[test]
    fn one_based_view_of_a_feature_vector() {
        use crate::feature::DenseFeatureVector;
        let v = DenseFeatureVector::from_scores(vec![4.0, f32::NAN, 6.0]);
        let view = OneBased(&v);
        assert_eq!(view.feature_value(0), 0.0);
        assert_eq!(view.feature_value(1), 4.0);
        assert_eq!(view.feature_value(2), 0.0);
        assert_eq!(view.feature_value(3), 6.0);
        assert_eq!(view.feature_value(4), 0.0);
    }

    #[test]
    fn from_features_is_one_based() {
        let p = DataPoint::from_features(1.0, "q", &[4.0, 5.0]);
        assert_eq!(p.feature_value(1), 4.0);
        assert_eq!(p.feature_value(2), 5.0);
        assert_eq!(p.feature_value(0), 0.0);
    }
}
