//! Trees in a flat node array
//!
use std::ops::AddAssign;

use tracing::warn;

use packedforest::{
    error::{Error, Result},
    Feature, Mwc,
};

use crate::context::TrainingContext;
use crate::node::{NodeOutcome, NodeProcessor, ParentLink, PendingNode};
use crate::partition::{NodeRange, ObservationBuffer};
use crate::projection::FeatureRef;

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// Bootstrap samples drawn before a tree is given up on
pub const MAX_BOOTSTRAP_ATTEMPTS: usize = 30;

/// A node of a [`Tree`]
///
/// Children are indices into the tree's node array. Index 0 is the root and never a child, so a
/// left child of 0 marks a leaf, whose class is stored in the right child.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct Node<F> {
    cut_value: F,
    feature: FeatureRef,
    left: usize,
    right: usize,
    depth: usize,
    frequency: usize,
}

impl<F: Feature> Node<F> {
    fn leaf(class: usize, depth: usize, frequency: usize) -> Self {
        Node {
            cut_value: F::zero(),
            feature: FeatureRef::default(),
            left: 0,
            right: class,
            depth,
            frequency,
        }
    }

    fn internal(feature: FeatureRef, cut_value: F, depth: usize, frequency: usize) -> Self {
        Node {
            cut_value,
            feature,
            left: 0,
            right: 0,
            depth,
            frequency,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.left == 0
    }

    /// Returns `Some(class)` for leaves and `None` for internal nodes
    pub fn class(&self) -> Option<usize> {
        if self.is_leaf() {
            Some(self.right)
        } else {
            None
        }
    }

    /// Returns the split candidate of internal nodes
    pub fn feature(&self) -> Option<&FeatureRef> {
        if self.is_leaf() {
            None
        } else {
            Some(&self.feature)
        }
    }

    pub fn cut_value(&self) -> F {
        self.cut_value
    }

    /// Returns both children, first left then right
    pub fn children(&self) -> Option<(usize, usize)> {
        if self.is_leaf() {
            None
        } else {
            Some((self.left, self.right))
        }
    }

    /// Returns the depth of the node, the root has depth 0
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of in-bag observations which reached the node during growth
    pub fn frequency(&self) -> usize {
        self.frequency
    }

    /// The child an observation continues to, values at or below the cut go left
    #[inline]
    pub fn next<V: Fn(usize) -> F>(&self, value: V) -> usize {
        if self.feature.project_with(value) <= self.cut_value {
            self.left
        } else {
            self.right
        }
    }
}

/// Depth statistics of one tree or summed over a forest
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub max_depth: usize,
    pub num_leaf_nodes: usize,
    pub leaf_depth_sum: usize,
}

impl TreeStats {
    pub(crate) fn add_leaf(&mut self, depth: usize) {
        self.max_depth = self.max_depth.max(depth);
        self.num_leaf_nodes += 1;
        self.leaf_depth_sum += depth;
    }

    /// Average depth of a leaf, NaN without leaves
    pub fn avg_leaf_depth(&self) -> f64 {
        self.leaf_depth_sum as f64 / self.num_leaf_nodes as f64
    }
}

impl AddAssign for TreeStats {
    fn add_assign(&mut self, other: Self) {
        self.max_depth = self.max_depth.max(other.max_depth);
        self.num_leaf_nodes += other.num_leaf_nodes;
        self.leaf_depth_sum += other.leaf_depth_sum;
    }
}

/// Out-of-bag observations reaching leaves, and how many of those the leaf classifies correctly
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OutOfBagTally {
    pub correct: usize,
    pub total: usize,
}

impl OutOfBagTally {
    /// Fraction classified correctly, `None` without out-of-bag observations
    pub fn accuracy(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(self.correct as f64 / self.total as f64)
        }
    }
}

/// Storage the grower writes nodes into
///
/// A node is written once its outcome is known, then linked into its parent.
pub(crate) trait NodeArena<F> {
    /// Adds an internal node and returns its index
    fn add_internal(
        &mut self,
        parent: Option<ParentLink>,
        depth: usize,
        feature: FeatureRef,
        cut_value: F,
        frequency: usize,
    ) -> usize;

    fn add_leaf(
        &mut self,
        parent: Option<ParentLink>,
        depth: usize,
        class: usize,
        frequency: usize,
    );
}

impl<F: Feature> NodeArena<F> for Vec<Node<F>> {
    fn add_internal(
        &mut self,
        parent: Option<ParentLink>,
        depth: usize,
        feature: FeatureRef,
        cut_value: F,
        frequency: usize,
    ) -> usize {
        let index = self.len();
        self.push(Node::internal(feature, cut_value, depth, frequency));
        link(self, parent, index);
        index
    }

    fn add_leaf(
        &mut self,
        parent: Option<ParentLink>,
        depth: usize,
        class: usize,
        frequency: usize,
    ) {
        let index = self.len();
        self.push(Node::leaf(class, depth, frequency));
        link(self, parent, index);
    }
}

fn link<F>(nodes: &mut [Node<F>], parent: Option<ParentLink>, index: usize) {
    if let Some(parent) = parent {
        let node = &mut nodes[parent.index];
        if parent.is_left {
            node.left = index;
        } else {
            node.right = index;
        }
    }
}

/// Grows trees with the same scratch buffers
pub(crate) struct TreeGrower<'a, F> {
    processor: NodeProcessor<'a, F>,
    pending: Vec<PendingNode>,
    min_classes: usize,
}

impl<'a, F: Feature> TreeGrower<'a, F> {
    pub fn new(ctx: &'a TrainingContext<'a, F>) -> Self {
        TreeGrower {
            processor: NodeProcessor::new(ctx),
            pending: Vec::new(),
            min_classes: ctx.num_observed_classes().min(2),
        }
    }

    /// Grows one tree on a fresh bootstrap sample into `arena`
    ///
    /// Bootstrap samples holding a single class while the data holds several are redrawn, up to
    /// [`MAX_BOOTSTRAP_ATTEMPTS`] times.
    pub fn grow<A: NodeArena<F>>(&mut self, arena: &mut A, rng: &mut Mwc) -> Result<OutOfBagTally> {
        let ctx = self.processor.context();
        for attempt in 1..=MAX_BOOTSTRAP_ATTEMPTS {
            let (mut buffer, root) = ObservationBuffer::bootstrap(
                ctx.data.nobservations(),
                ctx.num_classes,
                |obs| ctx.data.label(obs),
                rng,
            );
            if root.class_totals().num_present_classes() >= self.min_classes {
                return Ok(self.grow_from(arena, &mut buffer, root, rng));
            }
            warn!(attempt, "bootstrap sample holds a single class, redrawing");
        }

        Err(Error::BootstrapExhausted {
            attempts: MAX_BOOTSTRAP_ATTEMPTS,
        })
    }

    fn grow_from<A: NodeArena<F>>(
        &mut self,
        arena: &mut A,
        buffer: &mut ObservationBuffer,
        root: NodeRange,
        rng: &mut Mwc,
    ) -> OutOfBagTally {
        let data = self.processor.context().data;
        let mut tally = OutOfBagTally::default();

        self.pending.push(PendingNode {
            parent: None,
            depth: 0,
            range: root,
        });
        while let Some(node) = self.pending.pop() {
            let frequency = node.range.in_bag_size();
            match self.processor.process(buffer, &node, rng) {
                NodeOutcome::Leaf { class } => {
                    for &obs in buffer.out_of_bag(&node.range) {
                        tally.total += 1;
                        if data.label(obs) == class {
                            tally.correct += 1;
                        }
                    }
                    arena.add_leaf(node.parent, node.depth, class, frequency);
                }
                NodeOutcome::Split {
                    feature,
                    cut_value,
                    left,
                    right,
                } => {
                    let index =
                        arena.add_internal(node.parent, node.depth, feature, cut_value, frequency);
                    let child = |range, is_left| PendingNode {
                        parent: Some(ParentLink { index, is_left }),
                        depth: node.depth + 1,
                        range,
                    };
                    // the smaller child is grown first
                    if left.in_bag_size() <= right.in_bag_size() {
                        self.pending.push(child(right, false));
                        self.pending.push(child(left, true));
                    } else {
                        self.pending.push(child(left, true));
                        self.pending.push(child(right, false));
                    }
                }
            }
        }

        tally
    }
}

/// A single grown tree
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct Tree<F> {
    nodes: Vec<Node<F>>,
    out_of_bag: OutOfBagTally,
}

impl<F: Feature> Tree<F> {
    pub(crate) fn grow(grower: &mut TreeGrower<F>, rng: &mut Mwc) -> Result<Self> {
        let mut nodes = Vec::new();
        let out_of_bag = grower.grow(&mut nodes, rng)?;
        Ok(Self::from_nodes(nodes, out_of_bag))
    }

    pub(crate) fn from_nodes(nodes: Vec<Node<F>>, out_of_bag: OutOfBagTally) -> Self {
        Tree { nodes, out_of_bag }
    }

    pub fn nodes(&self) -> &[Node<F>] {
        &self.nodes
    }

    pub fn root(&self) -> &Node<F> {
        &self.nodes[0]
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Walks from the root to a leaf, `value` supplies the observation's feature values
    #[inline]
    pub fn predict_with<V: Fn(usize) -> F>(&self, value: V) -> usize {
        let mut current = 0;
        while !self.nodes[current].is_leaf() {
            current = self.nodes[current].next(&value);
        }
        self.nodes[current].right
    }

    pub fn predict_row(&self, row: &[F]) -> usize {
        self.predict_with(|feature| row[feature])
    }

    pub fn out_of_bag(&self) -> OutOfBagTally {
        self.out_of_bag
    }

    pub fn max_depth(&self) -> usize {
        self.stats().max_depth
    }

    pub fn num_leaves(&self) -> usize {
        self.nodes.iter().filter(|node| node.is_leaf()).count()
    }

    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats::default();
        for node in self.nodes.iter().filter(|node| node.is_leaf()) {
            stats.add_leaf(node.depth);
        }
        stats
    }
}
