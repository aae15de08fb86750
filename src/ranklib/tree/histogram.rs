//! Cumulative per-feature histograms of pseudo-responses.
//!
//! - [`HistogramLayout`]: the fixed part shared by every node of every tree:
//!   candidate thresholds per feature and the bucket each sample falls in
//! - [`FeatureHistogram`]: cumulative `(sum, count)` per threshold for the
//!   samples of one node, with the sibling = parent - child derivation
//!
//! Split search is O(features × thresholds) per node. Only the smaller side
//! of each split is built from samples; the other is derived.

use super::super::config::HistogramReuse;
use super::super::data::DataPoint;
use super::super::error::Result;
use crate::utils::{sort_indices, WorkerPool};

// =============================================================================
// Layout
// =============================================================================

/// Candidate thresholds and sample-to-bucket map, built once per training run.
#[derive(Debug, Clone)]
pub struct HistogramLayout {
    features: Vec<usize>,
    /// Ascending; the last one is always `f32::MAX`.
    thresholds: Vec<Vec<f32>>,
    /// `buckets[f][sample]`: index of the first threshold `>=` the sample's value.
    buckets: Vec<Vec<usize>>,
    n_samples: usize,
}

impl HistogramLayout {
    /// Build the layout of `features` over `points`.
    ///
    /// `n_threshold == 0` keeps every distinct value as a threshold; otherwise
    /// features with more distinct values get `n_threshold` evenly spaced ones.
    pub fn new(
        points: &[DataPoint],
        features: &[usize],
        n_threshold: usize,
        pool: &WorkerPool,
    ) -> Result<Self> {
        let chunks = pool.run_partitioned(features.len(), |range| {
            Ok(features[range]
                .iter()
                .map(|&fid| feature_layout(points, fid, n_threshold))
                .collect::<Vec<_>>())
        })?;
        let (thresholds, buckets) = chunks.into_iter().flatten().unzip();
        tracing::trace!(
            n_features = features.len(),
            n_samples = points.len(),
            "histogram layout built"
        );
        Ok(Self {
            features: features.to_vec(),
            thresholds,
            buckets,
            n_samples: points.len(),
        })
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.features.len()
    }

    #[inline]
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Feature id at feature index `fi`.
    #[inline]
    pub fn feature(&self, fi: usize) -> usize {
        self.features[fi]
    }

    pub fn thresholds(&self, fi: usize) -> &[f32] {
        &self.thresholds[fi]
    }

    #[inline]
    pub fn bucket(&self, fi: usize, sample: usize) -> usize {
        self.buckets[fi][sample]
    }
}

fn feature_layout(points: &[DataPoint], fid: usize, n_threshold: usize) -> (Vec<f32>, Vec<usize>) {
    let values: Vec<f32> = points.iter().map(|p| p.feature_value(fid)).collect();
    let order = sort_indices(&values, true);

    let mut distinct: Vec<f32> = Vec::new();
    for &i in &order {
        if distinct.last().map_or(true, |&last| values[i] > last) {
            distinct.push(values[i]);
        }
    }

    let mut thresholds = if n_threshold == 0 || distinct.len() <= n_threshold {
        distinct
    } else {
        let fmin = distinct[0];
        let fmax = distinct[distinct.len() - 1];
        let step = (fmax - fmin).abs() / n_threshold as f32;
        let mut t = Vec::with_capacity(n_threshold + 1);
        t.push(fmin);
        for j in 1..n_threshold {
            t.push(t[j - 1] + step);
        }
        t
    };
    thresholds.push(f32::MAX);

    let last = thresholds.len() - 1;
    let mut buckets = vec![last; points.len()];
    let mut t = 0;
    for &i in &order {
        while t < last && values[i] > thresholds[t] {
            t += 1;
        }
        buckets[i] = t;
    }
    (thresholds, buckets)
}

// =============================================================================
// Histogram
// =============================================================================

/// Best split of one node: feature index, threshold index and its score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitCandidate {
    pub feature_index: usize,
    pub threshold_index: usize,
    /// `sum_left² / count_left + sum_right² / count_right`.
    pub score: f64,
    /// Error reduction credited to the feature.
    pub err_reduced: f64,
}

/// Cumulative pseudo-response sums and sample counts per threshold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureHistogram {
    sum: Vec<Vec<f64>>,
    count: Vec<Vec<usize>>,
    sum_response: f64,
    sq_sum_response: f64,
}

impl FeatureHistogram {
    /// Build from the samples of one node.
    pub fn build(
        layout: &HistogramLayout,
        samples: &[usize],
        labels: &[f64],
        pool: &WorkerPool,
    ) -> Result<Self> {
        let chunks = pool.run_partitioned(layout.n_features(), |range| {
            Ok(range
                .map(|fi| {
                    let n_t = layout.thresholds(fi).len();
                    let mut sum = vec![0.0; n_t];
                    let mut count = vec![0usize; n_t];
                    for &k in samples {
                        let t = layout.bucket(fi, k);
                        sum[t] += labels[k];
                        count[t] += 1;
                    }
                    prefix_sum(&mut sum);
                    for t in 1..n_t {
                        count[t] += count[t - 1];
                    }
                    (sum, count)
                })
                .collect::<Vec<_>>())
        })?;
        let (sum, count) = chunks.into_iter().flatten().unzip();
        let (sum_response, sq_sum_response) = response_sums(samples.iter().map(|&k| labels[k]));
        Ok(Self {
            sum,
            count,
            sum_response,
            sq_sum_response,
        })
    }

    /// Refresh the sums for new `labels` over all samples; counts are unchanged.
    pub fn update(
        &mut self,
        layout: &HistogramLayout,
        labels: &[f64],
        pool: &WorkerPool,
    ) -> Result<()> {
        let chunks = pool.run_partitioned(layout.n_features(), |range| {
            Ok(range
                .map(|fi| {
                    let mut sum = vec![0.0; layout.thresholds(fi).len()];
                    for (k, label) in labels.iter().enumerate() {
                        sum[layout.bucket(fi, k)] += label;
                    }
                    prefix_sum(&mut sum);
                    sum
                })
                .collect::<Vec<_>>())
        })?;
        self.sum = chunks.into_iter().flatten().collect();
        (self.sum_response, self.sq_sum_response) = response_sums(labels.iter().copied());
        Ok(())
    }

    /// The right child: `parent - left`.
    ///
    /// With [`HistogramReuse::ReuseParent`] the parent's buffers are moved into
    /// the result and the parent is left empty.
    pub fn sibling(
        parent: &mut FeatureHistogram,
        left: &FeatureHistogram,
        reuse: HistogramReuse,
        pool: &WorkerPool,
    ) -> Result<Self> {
        let sum_response = parent.sum_response - left.sum_response;
        let sq_sum_response = parent.sq_sum_response - left.sq_sum_response;

        let (sum, count) = match reuse {
            HistogramReuse::ReuseParent => {
                let mut sum = std::mem::take(&mut parent.sum);
                let mut count = std::mem::take(&mut parent.count);
                for (f, (s, c)) in sum.iter_mut().zip(count.iter_mut()).enumerate() {
                    for t in 0..s.len() {
                        s[t] -= left.sum[f][t];
                        c[t] -= left.count[f][t];
                    }
                }
                (sum, count)
            }
            HistogramReuse::Copy => {
                let parent = &*parent;
                let chunks = pool.run_partitioned(parent.sum.len(), |range| {
                    Ok(range
                        .map(|f| {
                            let sum: Vec<f64> = parent.sum[f]
                                .iter()
                                .zip(&left.sum[f])
                                .map(|(p, l)| p - l)
                                .collect();
                            let count: Vec<usize> = parent.count[f]
                                .iter()
                                .zip(&left.count[f])
                                .map(|(p, l)| p - l)
                                .collect();
                            (sum, count)
                        })
                        .collect::<Vec<_>>())
                })?;
                chunks.into_iter().flatten().unzip()
            }
        };
        Ok(Self {
            sum,
            count,
            sum_response,
            sq_sum_response,
        })
    }

    pub fn sum_response(&self) -> f64 {
        self.sum_response
    }

    pub fn sq_sum_response(&self) -> f64 {
        self.sq_sum_response
    }

    /// Number of samples in the node.
    pub fn total_count(&self) -> usize {
        self.count
            .first()
            .and_then(|c| c.last())
            .copied()
            .unwrap_or(0)
    }

    /// `Σ(y - mean)²` over the node's samples.
    pub fn deviance(&self) -> f64 {
        let n = self.total_count();
        if n == 0 {
            return 0.0;
        }
        self.sq_sum_response - self.sum_response * self.sum_response / n as f64
    }

    /// Cumulative `(sum, count)` at feature index `fi`, threshold index `t`.
    pub fn left_of(&self, fi: usize, t: usize) -> (f64, usize) {
        (self.sum[fi][t], self.count[fi][t])
    }

    /// Best split over the feature indices in `used`, keeping both sides at
    /// `min_leaf_support` samples or more. Ties go to the earliest candidate.
    pub fn find_best_split(
        &self,
        used: &[usize],
        min_leaf_support: usize,
        pool: &WorkerPool,
    ) -> Result<Option<SplitCandidate>> {
        let total = self.total_count();
        let chunks = pool.run_partitioned(used.len(), |range| {
            let mut best: Option<SplitCandidate> = None;
            for &fi in &used[range] {
                let buckets = self.sum[fi].iter().zip(&self.count[fi]);
                for (t, (&sum_left, &count_left)) in buckets.enumerate() {
                    let count_right = total - count_left;
                    if count_left < min_leaf_support || count_right < min_leaf_support {
                        continue;
                    }
                    let sum_right = self.sum_response - sum_left;
                    let score = sum_left * sum_left / count_left as f64
                        + sum_right * sum_right / count_right as f64;
                    if best.map_or(true, |b| b.score < score) {
                        best = Some(SplitCandidate {
                            feature_index: fi,
                            threshold_index: t,
                            score,
                            err_reduced: (self.sq_sum_response / total as f64)
                                * (score / total as f64),
                        });
                    }
                }
            }
            Ok(best)
        })?;

        let mut best: Option<SplitCandidate> = None;
        for candidate in chunks.into_iter().flatten() {
            if best.map_or(true, |b| b.score < candidate.score) {
                best = Some(candidate);
            }
        }
        Ok(best)
    }
}

fn prefix_sum(values: &mut [f64]) {
    for t in 1..values.len() {
        values[t] += values[t - 1];
    }
}

fn response_sums(labels: impl Iterator<Item = f64>) -> (f64, f64) {
    labels.fold((0.0, 0.0), |(s, sq), y| (s + y, sq + y * y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_approx_eq_f64;
    use proptest::prelude::*;

    fn points(rows: &[Vec<f32>]) -> Vec<DataPoint> {
        rows.iter()
            .map(|r| DataPoint::from_features(0.0, "q", r))
            .collect()
    }

    #[test]
    fn thresholds_are_distinct_values_then_max() {
        let pts = points(&[vec![3.0], vec![1.0], vec![3.0], vec![2.0]]);
        let layout = HistogramLayout::new(&pts, &[1], 256, &WorkerPool::sequential()).unwrap();
        assert_eq!(layout.thresholds(0), &[1.0, 2.0, 3.0, f32::MAX]);
        assert_eq!(
            (0..4).map(|k| layout.bucket(0, k)).collect::<Vec<_>>(),
            vec![2, 0, 2, 1]
        );
    }

    #[test]
    fn thresholds_are_evenly_spaced_when_capped() {
        let rows: Vec<Vec<f32>> = (0..10).map(|i| vec![i as f32]).collect();
        let pool = WorkerPool::sequential();
        let layout = HistogramLayout::new(&points(&rows), &[1], 3, &pool).unwrap();
        assert_eq!(layout.thresholds(0), &[0.0, 3.0, 6.0, f32::MAX]);
        assert_eq!(layout.bucket(0, 4), 2);
        assert_eq!(layout.bucket(0, 9), 3);
    }

    #[test]
    fn sibling_modes_agree() {
        let rows: Vec<Vec<f32>> = (0..8).map(|i| vec![i as f32, (i % 3) as f32]).collect();
        let pts = points(&rows);
        let labels: Vec<f64> = (0..8).map(|i| i as f64 * 0.5 - 1.0).collect();
        let pool = WorkerPool::sequential();
        let layout = HistogramLayout::new(&pts, &[1, 2], 0, &pool).unwrap();

        let all: Vec<usize> = (0..8).collect();
        let parent = FeatureHistogram::build(&layout, &all, &labels, &pool).unwrap();
        let left = FeatureHistogram::build(&layout, &[0, 2, 5], &labels, &pool).unwrap();
        let direct = FeatureHistogram::build(&layout, &[1, 3, 4, 6, 7], &labels, &pool).unwrap();

        let mut copy_parent = parent.clone();
        let copied = FeatureHistogram::sibling(&mut copy_parent, &left, HistogramReuse::Copy, &pool)
            .unwrap();
        assert_eq!(copy_parent, parent);

        let mut reuse_parent = parent.clone();
        let reused = FeatureHistogram::sibling(
            &mut reuse_parent,
            &left,
            HistogramReuse::ReuseParent,
            &pool,
        )
        .unwrap();
        assert_eq!(reuse_parent.total_count(), 0);

        for h in [&copied, &reused] {
            assert_eq!(h.count, direct.count);
            assert_approx_eq_f64!(h.sum_response(), direct.sum_response(), 1e-12);
            for (a, b) in h.sum.iter().flatten().zip(direct.sum.iter().flatten()) {
                assert_approx_eq_f64!(*a, *b, 1e-12);
            }
        }
    }

    #[test]
    fn update_matches_a_fresh_build() {
        let rows: Vec<Vec<f32>> = (0..6).map(|i| vec![(i * 7 % 5) as f32]).collect();
        let pts = points(&rows);
        let pool = WorkerPool::sequential();
        let layout = HistogramLayout::new(&pts, &[1], 0, &pool).unwrap();
        let all: Vec<usize> = (0..6).collect();

        let mut hist = FeatureHistogram::build(&layout, &all, &[0.0; 6], &pool).unwrap();
        let labels = [1.0, -2.0, 0.5, 3.0, 0.0, -1.0];
        hist.update(&layout, &labels, &pool).unwrap();
        assert_eq!(hist, FeatureHistogram::build(&layout, &all, &labels, &pool).unwrap());
    }

    /// Brute force over every (feature, distinct value) split of the samples.
    fn brute_force(
        pts: &[DataPoint],
        features: &[usize],
        labels: &[f64],
        min_leaf: usize,
    ) -> Option<f64> {
        let mut best: Option<f64> = None;
        for &fid in features {
            for p in pts {
                let t = p.feature_value(fid);
                let (mut sl, mut cl, mut sr, mut cr) = (0.0, 0usize, 0.0, 0usize);
                for (q, y) in pts.iter().zip(labels) {
                    if q.feature_value(fid) <= t {
                        sl += y;
                        cl += 1;
                    } else {
                        sr += y;
                        cr += 1;
                    }
                }
                if cl < min_leaf || cr < min_leaf {
                    continue;
                }
                let s = sl * sl / cl as f64 + sr * sr / cr as f64;
                if best.map_or(true, |b| s > b) {
                    best = Some(s);
                }
            }
        }
        best
    }

    proptest! {
        #[test]
        fn best_split_matches_brute_force(
            rows in prop::collection::vec(prop::collection::vec(0u8..6, 1..=5), 2..=50)
                .prop_flat_map(|rows| {
                    let width = rows[0].len();
                    let n = rows.len();
                    (
                        prop::collection::vec(prop::collection::vec(0u8..6, width), n),
                        prop::collection::vec(-3i32..=3, n),
                        1usize..3,
                    )
                })
        ) {
            let (rows, labels, min_leaf) = rows;
            let rows_f32: Vec<Vec<f32>> =
                rows.iter().map(|r| r.iter().map(|&v| v as f32).collect()).collect();
            let pts = points(&rows_f32);
            let labels: Vec<f64> = labels.into_iter().map(f64::from).collect();
            let features: Vec<usize> = (1..=rows[0].len()).collect();
            let pool = WorkerPool::sequential();

            let layout = HistogramLayout::new(&pts, &features, 0, &pool).unwrap();
            let all: Vec<usize> = (0..pts.len()).collect();
            let hist = FeatureHistogram::build(&layout, &all, &labels, &pool).unwrap();
            let used: Vec<usize> = (0..features.len()).collect();

            let found = hist.find_best_split(&used, min_leaf, &pool).unwrap().map(|c| c.score);
            let expected = brute_force(&pts, &features, &labels, min_leaf);
            match (found, expected) {
                (Some(a), Some(b)) => prop_assert!((a - b).abs() < 1e-9, "{a} vs {b}"),
                (None, None) => {}
                other => prop_assert!(false, "mismatch: {:?}", other),
            }
        }
    }
}
