//! Ranking metrics used as training objectives and for early stopping.
//!
//! Scorers work on relevance labels listed in ranked order, so a caller
//! ranks a list (by model score) and then hands over its labels.

use std::fmt;
use std::str::FromStr;

use serde_with::{DeserializeFromStr, SerializeDisplay};

use super::data::RankList;
use super::error::RankLibError;
use crate::utils::{sort_indices, WorkerPool};

// =============================================================================
// Metric trait
// =============================================================================

/// A retrieval measure over a ranked list of relevance labels.
pub trait MetricScorer: Send + Sync {
    /// Depth cutoff; `0` means the whole list.
    fn k(&self) -> usize;

    fn name(&self) -> String;

    /// Score of one ranked list.
    fn score(&self, labels: &[f32]) -> f64;

    /// Mean score over many ranked lists.
    fn score_all(&self, lists: &[RankList], pool: &WorkerPool) -> f64 {
        if lists.is_empty() {
            return 0.0;
        }
        let scores = pool.map(lists, |rl| self.score(&rl.labels()));
        scores.iter().sum::<f64>() / lists.len() as f64
    }

    /// `delta[i][j]`: change in score from swapping positions `i` and `j`.
    ///
    /// The default rescores the list for every pair.
    fn swap_change(&self, labels: &[f32]) -> Vec<Vec<f64>> {
        let n = labels.len();
        let base = self.score(labels);
        let mut delta = vec![vec![0.0; n]; n];
        let mut swapped = labels.to_vec();
        for i in 0..n {
            for j in (i + 1)..n {
                swapped.swap(i, j);
                let change = self.score(&swapped) - base;
                swapped.swap(i, j);
                delta[i][j] = change;
                delta[j][i] = change;
            }
        }
        delta
    }
}

/// Effective depth for a list of `n` documents.
#[inline]
fn depth(k: usize, n: usize) -> usize {
    if k == 0 || k > n {
        n
    } else {
        k
    }
}

#[inline]
fn gain(label: f32) -> f64 {
    2f64.powi(label as i32) - 1.0
}

#[inline]
fn discount(position: usize) -> f64 {
    1.0 / ((position + 2) as f64).log2()
}

fn dcg(labels: &[f32], k: usize) -> f64 {
    labels
        .iter()
        .take(depth(k, labels.len()))
        .enumerate()
        .map(|(i, &l)| gain(l) * discount(i))
        .sum()
}

fn ideal_dcg(labels: &[f32], k: usize) -> f64 {
    let order = sort_indices(labels, false);
    let sorted: Vec<f32> = order.iter().map(|&i| labels[i]).collect();
    dcg(&sorted, k)
}

/// Pairwise DCG deltas for swaps touching the top `k` positions.
fn dcg_swap_change(labels: &[f32], k: usize, scale: f64) -> Vec<Vec<f64>> {
    let n = labels.len();
    let top = depth(k, n);
    let mut delta = vec![vec![0.0; n]; n];
    if scale == 0.0 {
        return delta;
    }
    for i in 0..top {
        for j in (i + 1)..n {
            let d_discount = discount(i) - if j < top { discount(j) } else { 0.0 };
            let change = d_discount * (gain(labels[j]) - gain(labels[i])) / scale;
            delta[i][j] = change;
            delta[j][i] = change;
        }
    }
    delta
}

// =============================================================================
// Scorers
// =============================================================================

/// Discounted cumulative gain at `k`.
#[derive(Debug, Clone, Copy)]
pub struct DcgScorer {
    pub k: usize,
}

impl MetricScorer for DcgScorer {
    fn k(&self) -> usize {
        self.k
    }

    fn name(&self) -> String {
        format!("DCG@{}", self.k)
    }

    fn score(&self, labels: &[f32]) -> f64 {
        dcg(labels, self.k)
    }

    fn swap_change(&self, labels: &[f32]) -> Vec<Vec<f64>> {
        dcg_swap_change(labels, self.k, 1.0)
    }
}

/// DCG normalized by the DCG of the ideal ordering; 0 when no document is relevant.
#[derive(Debug, Clone, Copy)]
pub struct NdcgScorer {
    pub k: usize,
}

impl MetricScorer for NdcgScorer {
    fn k(&self) -> usize {
        self.k
    }

    fn name(&self) -> String {
        format!("NDCG@{}", self.k)
    }

    fn score(&self, labels: &[f32]) -> f64 {
        let ideal = ideal_dcg(labels, self.k);
        if ideal > 0.0 {
            dcg(labels, self.k) / ideal
        } else {
            0.0
        }
    }

    fn swap_change(&self, labels: &[f32]) -> Vec<Vec<f64>> {
        dcg_swap_change(labels, self.k, ideal_dcg(labels, self.k))
    }
}

/// Expected reciprocal rank with a maximum grade of 4.
#[derive(Debug, Clone, Copy)]
pub struct ErrScorer {
    pub k: usize,
}

impl ErrScorer {
    const MAX_GAIN: f64 = 16.0;

    fn relevance(label: f32) -> f64 {
        gain(label) / Self::MAX_GAIN
    }
}

impl MetricScorer for ErrScorer {
    fn k(&self) -> usize {
        self.k
    }

    fn name(&self) -> String {
        format!("ERR@{}", self.k)
    }

    fn score(&self, labels: &[f32]) -> f64 {
        let mut remaining = 1.0;
        let mut score = 0.0;
        for (i, &l) in labels.iter().take(depth(self.k, labels.len())).enumerate() {
            let r = Self::relevance(l);
            score += remaining * r / (i + 1) as f64;
            remaining *= 1.0 - r;
        }
        score
    }
}

/// Fraction of relevant (label > 0) documents in the top `k`.
#[derive(Debug, Clone, Copy)]
pub struct PrecisionScorer {
    pub k: usize,
}

impl MetricScorer for PrecisionScorer {
    fn k(&self) -> usize {
        self.k
    }

    fn name(&self) -> String {
        format!("P@{}", self.k)
    }

    fn score(&self, labels: &[f32]) -> f64 {
        let size = depth(self.k, labels.len());
        if size == 0 {
            return 0.0;
        }
        let relevant = labels[..size].iter().filter(|&&l| l > 0.0).count();
        relevant as f64 / size as f64
    }
}

/// Average precision over the whole list.
#[derive(Debug, Clone, Copy)]
pub struct ApScorer;

impl MetricScorer for ApScorer {
    fn k(&self) -> usize {
        0
    }

    fn name(&self) -> String {
        "MAP".to_string()
    }

    fn score(&self, labels: &[f32]) -> f64 {
        let mut relevant = 0usize;
        let mut sum = 0.0;
        for (i, &l) in labels.iter().enumerate() {
            if l > 0.0 {
                relevant += 1;
                sum += relevant as f64 / (i + 1) as f64;
            }
        }
        if relevant == 0 {
            0.0
        } else {
            sum / relevant as f64
        }
    }
}

/// Reciprocal rank of the first relevant document in the top `k`.
#[derive(Debug, Clone, Copy)]
pub struct ReciprocalRankScorer {
    pub k: usize,
}

impl MetricScorer for ReciprocalRankScorer {
    fn k(&self) -> usize {
        self.k
    }

    fn name(&self) -> String {
        format!("RR@{}", self.k)
    }

    fn score(&self, labels: &[f32]) -> f64 {
        labels
            .iter()
            .take(depth(self.k, labels.len()))
            .position(|&l| l > 0.0)
            .map_or(0.0, |i| 1.0 / (i + 1) as f64)
    }
}

// =============================================================================
// MetricKind
// =============================================================================

/// Serializable metric selection, written as in RankLib (`NDCG@10`, `MAP`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, SerializeDisplay, DeserializeFromStr)]
pub enum MetricKind {
    Dcg(usize),
    Ndcg(usize),
    ExpectedReciprocalRank(usize),
    Precision(usize),
    Map,
    ReciprocalRank(usize),
}

impl Default for MetricKind {
    fn default() -> Self {
        MetricKind::Ndcg(10)
    }
}

impl MetricKind {
    pub fn scorer(self) -> Box<dyn MetricScorer> {
        match self {
            MetricKind::Dcg(k) => Box::new(DcgScorer { k }),
            MetricKind::Ndcg(k) => Box::new(NdcgScorer { k }),
            MetricKind::ExpectedReciprocalRank(k) => Box::new(ErrScorer { k }),
            MetricKind::Precision(k) => Box::new(PrecisionScorer { k }),
            MetricKind::Map => Box::new(ApScorer),
            MetricKind::ReciprocalRank(k) => Box::new(ReciprocalRankScorer { k }),
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Dcg(k) => write!(f, "DCG@{k}"),
            MetricKind::Ndcg(k) => write!(f, "NDCG@{k}"),
            MetricKind::ExpectedReciprocalRank(k) => write!(f, "ERR@{k}"),
            MetricKind::Precision(k) => write!(f, "P@{k}"),
            MetricKind::Map => write!(f, "MAP"),
            MetricKind::ReciprocalRank(k) => write!(f, "RR@{k}"),
        }
    }
}

impl FromStr for MetricKind {
    type Err = RankLibError;

    fn from_str(s: &str) -> Result<Self, RankLibError> {
        let invalid = || RankLibError::Config(format!("Unknown metric [{s}]"));
        let (name, k) = match s.trim().split_once('@') {
            Some((name, k)) => (name, Some(k.parse::<usize>().map_err(|_| invalid())?)),
            None => (s.trim(), None),
        };
        let k = k.unwrap_or(10);
        match name.to_ascii_uppercase().as_str() {
            "DCG" => Ok(MetricKind::Dcg(k)),
            "NDCG" => Ok(MetricKind::Ndcg(k)),
            "ERR" => Ok(MetricKind::ExpectedReciprocalRank(k)),
            "P" => Ok(MetricKind::Precision(k)),
            "MAP" => Ok(MetricKind::Map),
            "RR" => Ok(MetricKind::ReciprocalRank(k)),
            _ => Err(invalid()),
        }
    }
}
