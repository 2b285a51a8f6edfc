//! Unsupervised random forests
//!
//! URF and URerF grow trees without labels. Every tree sees 80% of the observations drawn
//! without replacement and splits a node where a projection falls apart into two groups with
//! the least within-group squared error. Observations sharing a leaf are similar, the forest
//! counts for every pair how many trees put it into the same leaf.

mod similarity;
mod two_means;

use std::collections::HashMap;

use rayon::prelude::*;
use tracing::debug;

use packedforest::{error::Result, prefetch::PREFETCH_DISTANCE, Feature, Mwc};

use crate::context::TrainingContext;
use crate::node::{ParentLink, PendingNode};
use crate::partition::ObservationBuffer;
use crate::projection::{FeatureProjector, FeatureRef};
use crate::tree::{Node, NodeArena, OutOfBagTally, Tree, TreeStats};

pub use similarity::SimilarityMatrix;
pub use two_means::{two_means_split, TwoMeansSplit};

/// Share of the observations every unsupervised tree is grown on
pub const IN_BAG_FRACTION: f64 = 0.8;

struct UnsupervisedGrower<'a, F> {
    ctx: &'a TrainingContext<'a, F>,
    projector: FeatureProjector,
    values: Vec<F>,
    pending: Vec<(PendingNode, f64)>,
}

impl<'a, F: Feature> UnsupervisedGrower<'a, F> {
    fn new(ctx: &'a TrainingContext<'a, F>) -> Self {
        UnsupervisedGrower {
            ctx,
            projector: FeatureProjector::new(
                ctx.projection,
                ctx.num_features,
                ctx.mtry,
                ctx.features_per_draw,
                ctx.image_patch,
            ),
            values: Vec::new(),
            pending: Vec::new(),
        }
    }

    // `two_means_split` reports errors within rounding of the group's magnitude as zero
    fn is_leaf(&self, node: &PendingNode, impurity: f64) -> bool {
        impurity == 0.0
            || node.range.in_bag_size() <= self.ctx.min_parent
            || node.depth >= self.ctx.max_depth
    }

    fn best_split(
        &mut self,
        buffer: &ObservationBuffer,
        node: &PendingNode,
        rng: &mut Mwc,
    ) -> Option<(FeatureRef, TwoMeansSplit<F>)> {
        let data = self.ctx.data;
        let observations = buffer.class_observations(&node.range, 0);

        let mut best: Option<(FeatureRef, TwoMeansSplit<F>)> = None;
        let mut candidates = self.projector.draw(rng);
        while let Some(feature) = candidates.pop() {
            self.values.clear();
            for (idx, &obs) in observations.iter().enumerate() {
                if let Some(&ahead) = observations.get(idx + PREFETCH_DISTANCE) {
                    feature.prefetch(data, ahead);
                }
                self.values.push(feature.project(data, obs));
            }

            if let Some(split) = two_means_split(&mut self.values) {
                if best.as_ref().map_or(true, |(_, b)| split.error < b.error) {
                    best = Some((feature, split));
                }
            }
            if matches!(&best, Some((_, b)) if b.error == 0.0) {
                break;
            }
        }
        best
    }

    /// Grows one tree and counts the co-occurrences of its leaves into `pairs`
    fn grow(
        &mut self,
        rng: &mut Mwc,
        pairs: &mut HashMap<(usize, usize), f64>,
    ) -> Vec<Node<F>> {
        let data = self.ctx.data;
        let (mut buffer, root) =
            ObservationBuffer::subsample(data.nobservations(), IN_BAG_FRACTION, rng);
        let mut nodes = Vec::new();

        self.pending.push((
            PendingNode {
                parent: None,
                depth: 0,
                range: root,
            },
            f64::INFINITY,
        ));
        while let Some((node, impurity)) = self.pending.pop() {
            let frequency = node.range.in_bag_size();
            let split = if self.is_leaf(&node, impurity) {
                None
            } else {
                self.best_split(&buffer, &node, rng)
            };

            match split {
                None => {
                    SimilarityMatrix::count_pairs(buffer.class_observations(&node.range, 0), pairs);
                    SimilarityMatrix::count_pairs(buffer.out_of_bag(&node.range), pairs);
                    nodes.add_leaf(node.parent, node.depth, 0, frequency);
                }
                Some((feature, split)) => {
                    let cut_value = split.cut_value;
                    let (left, right) =
                        buffer.split(&node.range, |obs| feature.project(data, obs) <= cut_value);
                    debug_assert!(left.in_bag_size() > 0 && right.in_bag_size() > 0);

                    let index =
                        nodes.add_internal(node.parent, node.depth, feature, cut_value, frequency);
                    let depth = node.depth + 1;
                    self.pending.push((
                        PendingNode {
                            parent: Some(ParentLink { index, is_left: false }),
                            depth,
                            range: right,
                        },
                        split.right_error,
                    ));
                    self.pending.push((
                        PendingNode {
                            parent: Some(ParentLink { index, is_left: true }),
                            depth,
                            range: left,
                        },
                        split.left_error,
                    ));
                }
            }
        }
        nodes
    }
}

/// A grown URF or URerF forest
#[derive(Debug)]
pub struct UnsupervisedForest<F> {
    trees: Vec<Tree<F>>,
    similarity: SimilarityMatrix,
}

impl<F: Feature> UnsupervisedForest<F> {
    pub(crate) fn grow(ctx: &TrainingContext<F>, num_trees: usize, seed: i32) -> Result<Self> {
        let similarity = SimilarityMatrix::new();
        let trees = (0..num_trees)
            .into_par_iter()
            .map_init(
                || UnsupervisedGrower::new(ctx),
                |grower, tree| {
                    let mut rng = Mwc::from_seed(seed.wrapping_add(tree as i32));
                    let mut pairs = HashMap::new();
                    let nodes = grower.grow(&mut rng, &mut pairs);
                    debug!(tree, nodes = nodes.len(), "grew unsupervised tree");
                    similarity.merge(pairs);
                    Tree::from_nodes(nodes, OutOfBagTally::default())
                },
            )
            .collect();

        Ok(UnsupervisedForest { trees, similarity })
    }

    pub fn trees(&self) -> &[Tree<F>] {
        &self.trees
    }

    pub fn similarity(&self) -> &SimilarityMatrix {
        &self.similarity
    }

    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats::default();
        for tree in self.trees.iter() {
            stats += tree.stats();
        }
        stats
    }
}
