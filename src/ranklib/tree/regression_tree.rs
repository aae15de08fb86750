//! Regression trees fitted on histogram splits, stored as a node arena.

use rand::seq::index;
use rand::Rng;

use super::super::config::HistogramReuse;
use super::super::data::FeatureLookup;
use super::super::error::Result;
use super::histogram::{FeatureHistogram, HistogramLayout};
use crate::utils::WorkerPool;

/// Index of a node inside its tree; the root is 0.
pub type NodeIndex = usize;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TreeNode {
    /// `value <= threshold` goes left.
    Split {
        feature: usize,
        threshold: f32,
        left: NodeIndex,
        right: NodeIndex,
    },
    Leaf {
        output: f32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    pub fn leaf(output: f32) -> Self {
        Self {
            nodes: vec![TreeNode::Leaf { output }],
        }
    }

    /// Wrap an arena already linked by index, root first.
    pub(crate) fn from_nodes(nodes: Vec<TreeNode>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, TreeNode::Leaf { .. }))
            .count()
    }

    pub fn eval(&self, point: &dyn FeatureLookup) -> f32 {
        let mut id = 0;
        loop {
            match self.nodes[id] {
                TreeNode::Leaf { output } => return output,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if point.feature_value(feature) <= threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }

    /// Feature ids used by any split.
    pub fn split_features(&self) -> impl Iterator<Item = usize> + '_ {
        self.nodes.iter().filter_map(|n| match n {
            TreeNode::Split { feature, .. } => Some(*feature),
            TreeNode::Leaf { .. } => None,
        })
    }

    pub(crate) fn set_output(&mut self, leaf: NodeIndex, value: f32) {
        if let TreeNode::Leaf { output } = &mut self.nodes[leaf] {
            *output = value;
        }
    }

    /// Append the `<split>` XML of the tree, one element per line.
    pub fn write_xml(&self, out: &mut String, indent: &str) {
        out.push_str(indent);
        out.push_str("<split>\n");
        self.write_node(out, 0, &format!("{indent}\t"));
        out.push_str(indent);
        out.push_str("</split>\n");
    }

    fn write_node(&self, out: &mut String, id: NodeIndex, indent: &str) {
        match self.nodes[id] {
            TreeNode::Leaf { output } => {
                out.push_str(&format!("{indent}<output> {output:?} </output>\n"));
            }
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                let inner = format!("{indent}\t");
                out.push_str(&format!("{indent}<feature> {feature} </feature>\n"));
                out.push_str(&format!("{indent}<threshold> {threshold:?} </threshold>\n"));
                out.push_str(&format!("{indent}<split pos=\"left\">\n"));
                self.write_node(out, left, &inner);
                out.push_str(&format!("{indent}</split>\n"));
                out.push_str(&format!("{indent}<split pos=\"right\">\n"));
                self.write_node(out, right, &inner);
                out.push_str(&format!("{indent}</split>\n"));
            }
        }
    }
}

// =============================================================================
// Fitting
// =============================================================================

/// Growth limits and histogram handling for one tree.
#[derive(Debug, Clone, Copy)]
pub struct FitParams {
    pub n_leaves: usize,
    pub min_leaf_support: usize,
    /// Fraction of features considered at each split.
    pub feature_sampling_rate: f64,
    pub histogram_reuse: HistogramReuse,
}

/// A fitted tree (leaf outputs still zero) with the samples of every leaf.
#[derive(Debug)]
pub struct FittedTree {
    pub tree: RegressionTree,
    pub leaf_samples: Vec<(NodeIndex, Vec<usize>)>,
}

/// A leaf that may still be split.
struct Candidate {
    node: NodeIndex,
    samples: Vec<usize>,
    /// `None` for the root, whose histogram lives across trees.
    hist: Option<FeatureHistogram>,
    deviance: f64,
}

/// Grows one tree best-first by node deviance.
pub struct TreeFitter<'a> {
    layout: &'a HistogramLayout,
    root_hist: &'a FeatureHistogram,
    labels: &'a [f64],
    params: FitParams,
    pool: &'a WorkerPool,
}

impl<'a> TreeFitter<'a> {
    pub fn new(
        layout: &'a HistogramLayout,
        root_hist: &'a FeatureHistogram,
        labels: &'a [f64],
        params: FitParams,
        pool: &'a WorkerPool,
    ) -> Self {
        Self {
            layout,
            root_hist,
            labels,
            params,
            pool,
        }
    }

    /// Fit a tree over every sample; `impacts[fi]` accumulates the error
    /// reduction of each split on feature index `fi`.
    pub fn fit<R: Rng>(&self, rng: &mut R, impacts: &mut [f64]) -> Result<FittedTree> {
        let mut nodes = vec![TreeNode::Leaf { output: 0.0 }];
        let mut finished: Vec<(NodeIndex, Vec<usize>)> = Vec::new();
        let mut queue: Vec<Candidate> = Vec::new();

        let root = Candidate {
            node: 0,
            samples: (0..self.layout.n_samples()).collect(),
            hist: None,
            deviance: f64::from(f32::MAX),
        };
        match self.split(root, &mut nodes, rng, impacts)? {
            Ok((left, right)) => {
                insert(&mut queue, left);
                insert(&mut queue, right);
            }
            Err(root) => finished.push((root.node, root.samples)),
        }

        let mut taken = 0;
        while taken + queue.len() < self.params.n_leaves && !queue.is_empty() {
            let leaf = queue.remove(0);
            if leaf.samples.len() < 2 * self.params.min_leaf_support {
                taken += 1;
                finished.push((leaf.node, leaf.samples));
                continue;
            }
            match self.split(leaf, &mut nodes, rng, impacts)? {
                Ok((left, right)) => {
                    insert(&mut queue, left);
                    insert(&mut queue, right);
                }
                Err(leaf) => {
                    taken += 1;
                    finished.push((leaf.node, leaf.samples));
                }
            }
        }
        finished.extend(queue.into_iter().map(|c| (c.node, c.samples)));
        finished.sort_by_key(|(node, _)| *node);

        Ok(FittedTree {
            tree: RegressionTree::from_nodes(nodes),
            leaf_samples: finished,
        })
    }

    /// Split `c` in place, or hand it back when no split applies.
    #[allow(clippy::type_complexity)]
    fn split<R: Rng>(
        &self,
        mut c: Candidate,
        nodes: &mut Vec<TreeNode>,
        rng: &mut R,
        impacts: &mut [f64],
    ) -> Result<std::result::Result<(Candidate, Candidate), Candidate>> {
        if c.deviance == 0.0 {
            return Ok(Err(c));
        }
        let used = self.sample_features(rng);
        let hist = c.hist.as_ref().unwrap_or(self.root_hist);
        let min_leaf_support = self.params.min_leaf_support;
        let Some(best) = hist.find_best_split(&used, min_leaf_support, self.pool)? else {
            return Ok(Err(c));
        };

        let fi = best.feature_index;
        let ti = best.threshold_index;
        let (sum_left, _) = hist.left_of(fi, ti);
        let sum_right = hist.sum_response() - sum_left;
        let (left, right): (Vec<usize>, Vec<usize>) = c
            .samples
            .iter()
            .copied()
            .partition(|&k| self.layout.bucket(fi, k) <= ti);
        impacts[fi] += best.err_reduced;

        let left_hist = FeatureHistogram::build(self.layout, &left, self.labels, self.pool)?;
        let right_hist = match c.hist.as_mut() {
            Some(parent) => FeatureHistogram::sibling(
                parent,
                &left_hist,
                self.params.histogram_reuse,
                self.pool,
            )?,
            None => {
                let mut root = self.root_hist.clone();
                FeatureHistogram::sibling(&mut root, &left_hist, HistogramReuse::Copy, self.pool)?
            }
        };
        tracing::trace!(
            node = c.node,
            feature = self.layout.feature(fi),
            n_left = left.len(),
            n_right = right.len(),
            sum_left,
            sum_right,
            "split"
        );

        let l = nodes.len();
        nodes.push(TreeNode::Leaf { output: 0.0 });
        nodes.push(TreeNode::Leaf { output: 0.0 });
        nodes[c.node] = TreeNode::Split {
            feature: self.layout.feature(fi),
            threshold: self.layout.thresholds(fi)[ti],
            left: l,
            right: l + 1,
        };

        let left = Candidate {
            node: l,
            samples: left,
            deviance: left_hist.deviance(),
            hist: Some(left_hist),
        };
        let right = Candidate {
            node: l + 1,
            samples: right,
            deviance: right_hist.deviance(),
            hist: Some(right_hist),
        };
        Ok(Ok((left, right)))
    }

    /// Feature indices to search: all, or a sample without replacement.
    fn sample_features<R: Rng>(&self, rng: &mut R) -> Vec<usize> {
        let n = self.layout.n_features();
        if self.params.feature_sampling_rate >= 1.0 || n == 0 {
            return (0..n).collect();
        }
        let size = ((self.params.feature_sampling_rate * n as f64) as usize).clamp(1, n);
        let mut used = index::sample(rng, n, size).into_vec();
        used.sort_unstable();
        used
    }
}

/// Keep `queue` ordered by deviance, largest first; ties go behind.
fn insert(queue: &mut Vec<Candidate>, c: Candidate) {
    let at = queue
        .iter()
        .position(|q| q.deviance <= c.deviance)
        .unwrap_or(queue.len());
    queue.insert(at, c);
}
