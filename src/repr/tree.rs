//! Immutable decision tree stored as a node arena.
//!
//! - [`Tree`]: nodes addressed by [`NodeId`], root at index 0
//! - [`Comparator`]: the per-split "go left" rule, which also decides where
//!   missing (NaN) and zero values are routed
//! - [`TreeBuilder`]: pre-order construction used by the model parsers
//! - [`TreeValidationError`]: structural validation errors

/// Index of a node inside its tree's arena.
pub type NodeId = u32;

// ============================================================================
// Comparator
// ============================================================================

/// LightGBM treats `-1e-35 < v <= 1e-35` as zero.
pub const ZERO_THRESHOLD: f32 = 1e-35;

#[inline]
pub fn is_zero(value: f32) -> bool {
    value > -ZERO_THRESHOLD && value <= ZERO_THRESHOLD
}

/// Decides whether a feature value descends to the left child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Comparator {
    /// `value <= threshold`. NaN goes right.
    #[default]
    Simple,
    /// `value <= threshold`, NaN goes left.
    DefaultLeft,
    /// `value <= threshold`, NaN goes right.
    DefaultRight,
    /// `value <= threshold`, zero and NaN go left.
    ZeroDefaultLeft,
    /// `value <= threshold`, zero and NaN go right.
    ZeroDefaultRight,
    /// `value < threshold`, NaN goes left.
    LessDefaultLeft,
    /// `value < threshold`, NaN goes right.
    LessDefaultRight,
}

impl Comparator {
    #[inline]
    pub fn goes_left(self, threshold: f32, value: f32) -> bool {
        match self {
            Comparator::Simple => value <= threshold,
            Comparator::DefaultLeft => value <= threshold || value.is_nan(),
            Comparator::DefaultRight => value <= threshold && !value.is_nan(),
            Comparator::ZeroDefaultLeft => value <= threshold || is_zero(value) || value.is_nan(),
            Comparator::ZeroDefaultRight => {
                value <= threshold && !is_zero(value) && !value.is_nan()
            }
            Comparator::LessDefaultLeft => value < threshold || value.is_nan(),
            Comparator::LessDefaultRight => value < threshold && !value.is_nan(),
        }
    }
}

// ============================================================================
// Node / Tree
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Node {
    Split {
        feature: u32,
        threshold: f32,
        left: NodeId,
        right: NodeId,
        comparator: Comparator,
    },
    Leaf {
        value: f32,
    },
}

/// Structural validation errors for [`Tree`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeValidationError {
    #[error("tree has no nodes")]
    EmptyTree,
    #[error("node {node} has {side} child {child} out of bounds ({n_nodes} nodes)")]
    ChildOutOfBounds {
        node: NodeId,
        side: &'static str,
        child: NodeId,
        n_nodes: usize,
    },
    #[error("node {node} references itself")]
    SelfLoop { node: NodeId },
    #[error("cycle detected at node {node}")]
    CycleDetected { node: NodeId },
    #[error("node {node} is reachable by more than one path")]
    DuplicateVisit { node: NodeId },
    #[error("node {node} is unreachable from the root")]
    UnreachableNode { node: NodeId },
}

/// A single regression tree. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    nodes: Box<[Node]>,
}

impl Tree {
    /// A tree that is a single leaf.
    pub fn leaf(value: f32) -> Self {
        Self {
            nodes: vec![Node::Leaf { value }].into_boxed_slice(),
        }
    }

    /// Build from an arena, validating that it forms a tree rooted at 0.
    pub fn from_nodes(nodes: Vec<Node>) -> Result<Self, TreeValidationError> {
        let tree = Self {
            nodes: nodes.into_boxed_slice(),
        };
        tree.validate()?;
        Ok(tree)
    }

    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id as usize]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    /// Largest feature index used by any split.
    pub fn max_feature(&self) -> Option<u32> {
        self.nodes
            .iter()
            .filter_map(|n| match n {
                Node::Split { feature, .. } => Some(*feature),
                Node::Leaf { .. } => None,
            })
            .max()
    }

    /// Descend from the root to a leaf. Features past the end of the slice read as 0.
    #[inline]
    pub fn eval(&self, features: &[f32]) -> f32 {
        let mut id = 0;
        loop {
            match self.nodes[id as usize] {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    comparator,
                } => {
                    let value = features.get(feature as usize).copied().unwrap_or(0.0);
                    id = if comparator.goes_left(threshold, value) {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }

    /// Check the arena is a proper tree: every child in bounds, no cycles,
    /// no shared subtrees and no unreachable nodes.
    pub fn validate(&self) -> Result<(), TreeValidationError> {
        let n_nodes = self.n_nodes();
        if n_nodes == 0 {
            return Err(TreeValidationError::EmptyTree);
        }

        // 0 = unvisited, 1 = visiting, 2 = done
        let mut color = vec![0u8; n_nodes];
        let mut stack: Vec<(NodeId, bool)> = vec![(0, false)];

        while let Some((node, finished)) = stack.pop() {
            let idx = node as usize;
            if finished {
                color[idx] = 2;
                continue;
            }
            match color[idx] {
                0 => {}
                1 => return Err(TreeValidationError::CycleDetected { node }),
                _ => return Err(TreeValidationError::DuplicateVisit { node }),
            }
            color[idx] = 1;
            stack.push((node, true));

            if let Node::Split { left, right, .. } = self.nodes[idx] {
                if left == node || right == node {
                    return Err(TreeValidationError::SelfLoop { node });
                }
                for (side, child) in [("right", right), ("left", left)] {
                    if child as usize >= n_nodes {
                        return Err(TreeValidationError::ChildOutOfBounds {
                            node,
                            side,
                            child,
                            n_nodes,
                        });
                    }
                    stack.push((child, false));
                }
            }
        }

        if let Some(idx) = color.iter().position(|&c| c == 0) {
            return Err(TreeValidationError::UnreachableNode { node: idx as NodeId });
        }
        Ok(())
    }
}

// ============================================================================
// TreeBuilder
// ============================================================================

/// Pre-order tree construction.
///
/// Parsers reserve a split slot, build both subtrees, then fill the slot in
/// with the child ids they got back.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    nodes: Vec<Node>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_leaf(&mut self, value: f32) -> NodeId {
        self.nodes.push(Node::Leaf { value });
        (self.nodes.len() - 1) as NodeId
    }

    /// Reserve a slot for a split whose children are not built yet.
    pub fn reserve(&mut self) -> NodeId {
        self.push_leaf(f32::NAN)
    }

    pub fn set_split(
        &mut self,
        id: NodeId,
        feature: u32,
        threshold: f32,
        left: NodeId,
        right: NodeId,
        comparator: Comparator,
    ) {
        self.nodes[id as usize] = Node::Split {
            feature,
            threshold,
            left,
            right,
            comparator,
        };
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn build(self) -> Result<Tree, TreeValidationError> {
        Tree::from_nodes(self.nodes)
    }
}
