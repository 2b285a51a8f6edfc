//! Forests grown into bins
//!
//! A bin stores a group of trees in one node array. The first `num_classes` nodes are shared
//! leaves, one per class, and the next `num_trees` nodes are the roots. Every internal node
//! whose child is a leaf points straight at the shared leaf of its class, so an index below
//! `num_classes` ends a traversal.
//!
//! Prediction walks all trees of a bin one level at a time, so the loads of different trees
//! overlap, and adds the votes of all bins into shared atomic counters.

use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;

use packedforest::{error::Result, prefetch::prefetch_read, Feature, Mwc};

use crate::context::TrainingContext;
use crate::node::ParentLink;
use crate::projection::FeatureRef;
use crate::tree::{NodeArena, OutOfBagTally, TreeGrower, TreeStats};

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// A node of a [`TreeBin`]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct BinNode<F> {
    cut_value: F,
    feature: FeatureRef,
    left: usize,
    right: usize,
    depth: usize,
}

impl<F: Feature> BinNode<F> {
    fn shared_leaf(class: usize) -> Self {
        BinNode {
            cut_value: F::zero(),
            feature: FeatureRef::default(),
            left: class,
            right: class,
            depth: 0,
        }
    }

    pub fn feature(&self) -> &FeatureRef {
        &self.feature
    }

    pub fn cut_value(&self) -> F {
        self.cut_value
    }

    /// Returns both children, first left then right
    pub fn children(&self) -> (usize, usize) {
        (self.left, self.right)
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    #[inline]
    fn next<V: Fn(usize) -> F>(&self, value: V) -> usize {
        if self.feature.project_with(value) <= self.cut_value {
            self.left
        } else {
            self.right
        }
    }
}

struct BinArena<F> {
    nodes: Vec<BinNode<F>>,
    current_root: usize,
    stats: TreeStats,
}

impl<F: Feature> BinArena<F> {
    fn target(&mut self, parent: ParentLink) -> &mut usize {
        let node = &mut self.nodes[parent.index];
        if parent.is_left {
            &mut node.left
        } else {
            &mut node.right
        }
    }
}

impl<F: Feature> NodeArena<F> for BinArena<F> {
    fn add_internal(
        &mut self,
        parent: Option<ParentLink>,
        depth: usize,
        feature: FeatureRef,
        cut_value: F,
        _frequency: usize,
    ) -> usize {
        let node = BinNode {
            cut_value,
            feature,
            left: 0,
            right: 0,
            depth,
        };
        match parent {
            None => {
                self.nodes[self.current_root] = node;
                self.current_root
            }
            Some(parent) => {
                let index = self.nodes.len();
                self.nodes.push(node);
                *self.target(parent) = index;
                index
            }
        }
    }

    fn add_leaf(
        &mut self,
        parent: Option<ParentLink>,
        depth: usize,
        class: usize,
        _frequency: usize,
    ) {
        self.stats.add_leaf(depth);
        match parent {
            // a root leaf sends everything to the shared leaf of its class
            None => self.nodes[self.current_root] = BinNode::shared_leaf(class),
            Some(parent) => *self.target(parent) = class,
        }
    }
}

/// A group of trees sharing one node array
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct TreeBin<F> {
    nodes: Vec<BinNode<F>>,
    num_classes: usize,
    num_trees: usize,
    stats: TreeStats,
    out_of_bag: Vec<OutOfBagTally>,
}

impl<F: Feature> TreeBin<F> {
    /// Grows `num_trees` trees into one bin, every tree on its own bootstrap sample
    pub(crate) fn grow(
        grower: &mut TreeGrower<F>,
        num_classes: usize,
        num_trees: usize,
        rng: &mut Mwc,
    ) -> Result<Self> {
        let mut arena = BinArena {
            // root slots are overwritten as their trees are grown
            nodes: (0..num_classes)
                .map(BinNode::shared_leaf)
                .chain((0..num_trees).map(|_| BinNode::shared_leaf(0)))
                .collect(),
            current_root: num_classes,
            stats: TreeStats::default(),
        };

        let mut out_of_bag = Vec::with_capacity(num_trees);
        for tree in 0..num_trees {
            arena.current_root = num_classes + tree;
            out_of_bag.push(grower.grow(&mut arena, rng)?);
        }

        Ok(TreeBin {
            nodes: arena.nodes,
            num_classes,
            num_trees,
            stats: arena.stats,
            out_of_bag,
        })
    }

    pub fn nodes(&self) -> &[BinNode<F>] {
        &self.nodes
    }

    pub fn num_trees(&self) -> usize {
        self.num_trees
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn stats(&self) -> TreeStats {
        self.stats
    }

    pub fn out_of_bag(&self) -> &[OutOfBagTally] {
        &self.out_of_bag
    }

    /// Class predicted by every tree of the bin, in root order
    ///
    /// All trees advance one level per step and the node each tree moves to is prefetched
    /// before the next tree is advanced.
    pub fn predict_trees<V: Fn(usize) -> F>(&self, value: V) -> Vec<usize> {
        let mut cursors: Vec<usize> =
            (self.num_classes..self.num_classes + self.num_trees).collect();
        // the cursor of a tree stops at its shared leaf
        loop {
            let mut active = false;
            for cursor in cursors.iter_mut() {
                if *cursor >= self.num_classes {
                    *cursor = self.nodes[*cursor].next(&value);
                    prefetch_read(&self.nodes[*cursor]);
                    active = true;
                }
            }
            if !active {
                break;
            }
        }
        cursors
    }

    /// Adds one vote per tree to `votes`
    pub fn vote<V: Fn(usize) -> F>(&self, value: V, votes: &[AtomicUsize]) {
        for class in self.predict_trees(value) {
            votes[class].fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Sizes of the bins `num_trees` trees are spread over, earlier bins take the remainder
pub fn bin_sizes(num_trees: usize, num_bins: usize) -> Vec<usize> {
    let base = num_trees / num_bins;
    let remainder = num_trees % num_bins;
    (0..num_bins)
        .map(|bin| base + usize::from(bin < remainder))
        .collect()
}

/// A forest stored as bins of trees
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct BinnedForest<F> {
    bins: Vec<TreeBin<F>>,
    num_classes: usize,
}

impl<F: Feature> BinnedForest<F> {
    pub(crate) fn grow(
        ctx: &TrainingContext<F>,
        num_trees: usize,
        num_bins: usize,
        seed: i32,
    ) -> Result<Self> {
        let bins = bin_sizes(num_trees, num_bins)
            .into_par_iter()
            .enumerate()
            .map(|(bin, num_trees)| {
                let mut grower = TreeGrower::new(ctx);
                let mut rng = Mwc::from_seed(seed.wrapping_add(bin as i32));
                TreeBin::grow(&mut grower, ctx.num_classes, num_trees, &mut rng)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(BinnedForest {
            bins,
            num_classes: ctx.num_classes,
        })
    }

    pub fn bins(&self) -> &[TreeBin<F>] {
        &self.bins
    }

    pub fn num_trees(&self) -> usize {
        self.bins.iter().map(|bin| bin.num_trees).sum()
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Votes per class, bins are traversed in parallel
    pub fn predict_post<V: Fn(usize) -> F + Sync>(&self, value: V) -> Vec<usize> {
        let votes: Vec<AtomicUsize> = (0..self.num_classes).map(|_| AtomicUsize::new(0)).collect();
        self.bins.par_iter().for_each(|bin| bin.vote(&value, &votes));
        votes.into_iter().map(AtomicUsize::into_inner).collect()
    }

    /// Votes per class from a single thread, for callers already parallel over observations
    pub fn predict_post_sequential<V: Fn(usize) -> F>(&self, value: V) -> Vec<usize> {
        let mut votes = vec![0; self.num_classes];
        for bin in self.bins.iter() {
            for class in bin.predict_trees(&value) {
                votes[class] += 1;
            }
        }
        votes
    }

    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats::default();
        for bin in self.bins.iter() {
            stats += bin.stats;
        }
        stats
    }

    pub fn out_of_bag(&self) -> impl Iterator<Item = &OutOfBagTally> {
        self.bins.iter().flat_map(|bin| bin.out_of_bag.iter())
    }
}
