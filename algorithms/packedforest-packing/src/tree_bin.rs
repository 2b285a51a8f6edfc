//! A bin of trees packed into one node array
//!
//! The first `numTrees` entries are the roots. The top `headDepth` levels of all trees are laid
//! out level by level, so entries visited together while traversing the bin in lockstep sit next
//! to each other. Below that every subtree is laid out depth first, the child that saw more
//! observations during growth first. Leaves are not stored per tree: a child index at or above
//! the number of internal nodes refers to one of `numClasses` shared class entries at the end of
//! the array.

use std::convert::TryFrom;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};

use packedforest::{
    error::{Error, Result},
    prefetch::prefetch_read,
    Feature,
};
use packedforest_trees::{FeatureRef, Tree};

use crate::node::PackedNode;

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// Size in bytes of a bin header: `numTreesInBin`, `depth`, `numClasses`, `numNodes`
pub const BIN_HEADER_SIZE: usize = 16;

fn to_i32(value: usize, what: &str) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| Error::Packing(format!("{} {} does not fit 32 bits", what, value)))
}

fn to_usize(value: i32, what: &str) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::Packing(format!("negative {}: {}", what, value)))
}

/// Trees of one bin, packed for lockstep traversal
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct PackedBin {
    num_trees: usize,
    head_depth: usize,
    num_classes: usize,
    num_nodes: usize,
    nodes: Vec<PackedNode>,
}

struct Packer<'a, F> {
    trees: &'a [Tree<F>],
    num_nodes: usize,
    nodes: Vec<PackedNode>,
    /// `(tree, node)` every filled entry was copied from
    origin: Vec<(usize, usize)>,
    next_free: usize,
}

impl<'a, F: Feature> Packer<'a, F> {
    /// Copies a node into the bin and returns the index its parent links to
    fn place(&mut self, tree: usize, node: usize) -> Result<u32> {
        let source = &self.trees[tree].nodes()[node];
        if let Some(class) = source.class() {
            if class >= self.nodes.len() - self.num_nodes {
                return Err(Error::Packing(format!(
                    "leaf of tree {} predicts class {} of {}",
                    tree,
                    class,
                    self.nodes.len() - self.num_nodes
                )));
            }
            return Ok((self.num_nodes + class) as u32);
        }

        let feature = source
            .feature()
            .and_then(FeatureRef::as_single)
            .ok_or_else(|| {
                Error::Unsupported("only forests splitting on single features can be packed".into())
            })?;
        let feature = u32::try_from(feature)
            .map_err(|_| Error::Packing(format!("feature {} does not fit 32 bits", feature)))?;
        if self.next_free >= self.num_nodes {
            return Err(Error::Packing(format!(
                "more than {} internal nodes in tree {}",
                self.num_nodes, tree
            )));
        }

        let slot = self.next_free;
        self.next_free += 1;
        self.nodes[slot] = PackedNode::internal(feature, source.cut_value().as_f64());
        self.origin.push((tree, node));
        Ok(slot as u32)
    }

    fn children_of(&self, slot: usize) -> Result<(usize, usize, usize)> {
        let (tree, node) = self.origin[slot];
        let (left, right) = self.trees[tree].nodes()[node].children().ok_or_else(|| {
            Error::Packing(format!(
                "node {} of tree {} is a leaf where a split was expected",
                node, tree
            ))
        })?;
        Ok((tree, left, right))
    }

    fn link_breadth_first(&mut self, slot: usize) -> Result<()> {
        let (tree, left, right) = self.children_of(slot)?;
        self.nodes[slot].left = self.place(tree, left)?;
        self.nodes[slot].right = self.place(tree, right)?;
        Ok(())
    }

    fn push_children(
        &self,
        slot: usize,
        pending: &mut Vec<(usize, usize, usize, bool)>,
    ) -> Result<()> {
        let (tree, left, right) = self.children_of(slot)?;
        let nodes = self.trees[tree].nodes();
        let left_item = (tree, left, slot, true);
        let right_item = (tree, right, slot, false);
        // popped first, so packed first
        if nodes[right].frequency() > nodes[left].frequency() {
            pending.push(left_item);
            pending.push(right_item);
        } else {
            pending.push(right_item);
            pending.push(left_item);
        }
        Ok(())
    }

    /// Lays out everything below `slot` in pre-order, the more frequent child first
    fn link_depth_first(&mut self, slot: usize) -> Result<()> {
        let mut pending = Vec::new();
        self.push_children(slot, &mut pending)?;
        while let Some((tree, node, parent, is_left)) = pending.pop() {
            let target = self.place(tree, node)?;
            if is_left {
                self.nodes[parent].left = target;
            } else {
                self.nodes[parent].right = target;
            }
            if (target as usize) < self.num_nodes {
                self.push_children(target as usize, &mut pending)?;
            }
        }
        Ok(())
    }
}

impl PackedBin {
    /// Packs `trees` into one bin
    ///
    /// ### Parameters
    ///
    /// * `trees`: grown trees splitting on single features, none of them a lone leaf
    /// * `head_depth`: number of top levels laid out across all trees level by level
    /// * `num_classes`: number of shared class entries
    ///
    /// ### Returns
    ///
    /// `Error::Unsupported` for trees splitting on feature combinations and `Error::Packing` if
    /// the trees are not proper binary trees.
    pub fn pack<F: Feature>(
        trees: &[Tree<F>],
        head_depth: usize,
        num_classes: usize,
    ) -> Result<Self> {
        let raw_nodes: usize = trees.iter().map(Tree::num_nodes).sum();
        // every tree with `l` leaves has `l - 1` internal nodes
        let num_nodes = raw_nodes.saturating_sub(trees.len()) / 2;
        if u32::try_from(num_nodes + num_classes).is_err() {
            return Err(Error::Packing(format!(
                "{} nodes do not fit 32 bit indices",
                num_nodes + num_classes
            )));
        }

        let mut nodes = vec![PackedNode::default(); num_nodes + num_classes];
        for class in 0..num_classes {
            nodes[num_nodes + class] = PackedNode::class_leaf(class as u32);
        }
        let mut packer = Packer {
            trees,
            num_nodes,
            nodes,
            origin: Vec::with_capacity(num_nodes),
            next_free: 0,
        };

        for tree in 0..trees.len() {
            let root = packer.place(tree, 0)?;
            if root as usize >= num_nodes {
                return Err(Error::Packing(format!("tree {} is a single leaf", tree)));
            }
        }

        let mut processed = 0;
        for _ in 0..head_depth {
            let level_end = packer.next_free;
            while processed < level_end {
                packer.link_breadth_first(processed)?;
                processed += 1;
            }
        }
        let head_end = packer.next_free;
        for slot in processed..head_end {
            packer.link_depth_first(slot)?;
        }

        if packer.next_free != num_nodes {
            return Err(Error::Packing(format!(
                "filled {} of {} internal nodes",
                packer.next_free, num_nodes
            )));
        }

        Ok(PackedBin {
            num_trees: trees.len(),
            head_depth,
            num_classes,
            num_nodes,
            nodes: packer.nodes,
        })
    }

    pub fn num_trees(&self) -> usize {
        self.num_trees
    }

    pub fn head_depth(&self) -> usize {
        self.head_depth
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Number of internal nodes, the class entries follow them
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn nodes(&self) -> &[PackedNode] {
        &self.nodes
    }

    #[inline]
    pub fn is_internal(&self, index: u32) -> bool {
        (index as usize) < self.num_nodes
    }

    /// Number of features an observation needs
    pub fn required_features(&self) -> usize {
        self.nodes[..self.num_nodes]
            .iter()
            .map(|node| node.feature as usize + 1)
            .max()
            .unwrap_or(0)
    }

    /// Walks all trees of the bin in lockstep
    ///
    /// `cursors` ends up holding the class entry every tree reached. Each round advances every
    /// tree one level and hints the next entry of a tree before the following tree is handled.
    pub fn traverse<V: Fn(usize) -> f64>(&self, value: V, cursors: &mut Vec<u32>) {
        cursors.clear();
        cursors.extend(0..self.num_trees as u32);
        for &cursor in cursors.iter() {
            prefetch_read(&self.nodes[cursor as usize]);
        }

        let mut num_internal = self.num_trees;
        while num_internal > 0 {
            num_internal = self.num_trees;
            for cursor in cursors.iter_mut() {
                if self.is_internal(*cursor) {
                    let node = &self.nodes[*cursor as usize];
                    *cursor = node.next(value(node.feature as usize));
                    prefetch_read(&self.nodes[*cursor as usize]);
                } else {
                    num_internal -= 1;
                }
            }
        }
    }

    /// Adds the vote of every tree to `votes`
    pub fn vote<V: Fn(usize) -> f64>(&self, value: V, cursors: &mut Vec<u32>, votes: &mut [usize]) {
        self.traverse(value, cursors);
        for &cursor in cursors.iter() {
            votes[self.nodes[cursor as usize].right as usize] += 1;
        }
    }

    pub(crate) fn vote_atomic<V: Fn(usize) -> f64>(&self, value: V, votes: &[AtomicUsize]) {
        let mut cursors = Vec::with_capacity(self.num_trees);
        self.traverse(value, &mut cursors);
        for &cursor in cursors.iter() {
            votes[self.nodes[cursor as usize].right as usize].fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut header = [0u8; BIN_HEADER_SIZE];
        header[0..4].copy_from_slice(&to_i32(self.num_trees, "numTreesInBin")?.to_le_bytes());
        header[4..8].copy_from_slice(&to_i32(self.head_depth, "depth")?.to_le_bytes());
        header[8..12].copy_from_slice(&to_i32(self.num_classes, "numClasses")?.to_le_bytes());
        header[12..16].copy_from_slice(&to_i32(self.num_nodes, "numNodes")?.to_le_bytes());
        writer.write_all(&header)?;

        for node in self.nodes.iter() {
            node.write_to(writer)?;
        }
        Ok(())
    }

    /// Reads a bin written by [`PackedBin::write_to`] and checks its links
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut header = [0u8; BIN_HEADER_SIZE];
        reader.read_exact(&mut header)?;
        let field = |at: usize| {
            i32::from_le_bytes([header[at], header[at + 1], header[at + 2], header[at + 3]])
        };

        let num_trees = to_usize(field(0), "numTreesInBin")?;
        let head_depth = to_usize(field(4), "depth")?;
        let num_classes = to_usize(field(8), "numClasses")?;
        let num_nodes = to_usize(field(12), "numNodes")?;

        let len = num_nodes + num_classes;
        let mut nodes = Vec::with_capacity(len.min(1 << 16));
        for _ in 0..len {
            nodes.push(PackedNode::read_from(reader)?);
        }

        let bin = PackedBin {
            num_trees,
            head_depth,
            num_classes,
            num_nodes,
            nodes,
        };
        bin.validate()?;
        Ok(bin)
    }

    /// Checks that every traversal ends in a class entry
    fn validate(&self) -> Result<()> {
        if self.num_trees > self.num_nodes {
            return Err(Error::Packing(format!(
                "{} trees but only {} internal nodes",
                self.num_trees, self.num_nodes
            )));
        }
        for (idx, node) in self.nodes[..self.num_nodes].iter().enumerate() {
            for child in [node.left, node.right] {
                if (child as usize) <= idx || child as usize >= self.nodes.len() {
                    return Err(Error::Packing(format!(
                        "node {} links to {} outside ({}, {})",
                        idx,
                        child,
                        idx,
                        self.nodes.len()
                    )));
                }
            }
        }
        for (class, node) in self.nodes[self.num_nodes..].iter().enumerate() {
            if node.right as usize != class {
                return Err(Error::Packing(format!(
                    "class entry {} holds class {}",
                    class, node.right
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};
    use packedforest::prelude::*;
    use packedforest_trees::{ForestEngine, ForestParams, ForestType};

    fn grown_trees(num_trees: usize) -> Vec<Tree<f64>> {
        let data = Dataset::new(
            Array2::from_shape_fn((60, 2), |(i, j)| ((i * 13 + j * 7) % 60) as f64),
            Array1::from_shape_fn(60, |i| ((i * 13) % 60) / 20),
        )
        .unwrap();
        let forest = ForestParams::new()
            .forest_type(ForestType::RfBase)
            .num_trees(num_trees)
            .seed(11)
            .fit(&data)
            .unwrap();
        match forest.engine() {
            ForestEngine::Trees(forest) => forest.trees().to_vec(),
            _ => unreachable!(),
        }
    }

    #[test]
    fn every_internal_node_is_filled() -> Result<()> {
        let trees = grown_trees(5);
        for head_depth in 0..4 {
            let bin = PackedBin::pack(&trees, head_depth, 3)?;
            let raw: usize = trees.iter().map(Tree::num_nodes).sum();
            assert_eq!(bin.num_nodes(), (raw - 5) / 2);
            assert_eq!(bin.nodes().len(), bin.num_nodes() + 3);
            bin.validate()?;
        }
        Ok(())
    }

    #[test]
    fn roots_come_first_then_their_children() -> Result<()> {
        let trees = grown_trees(3);
        let bin = PackedBin::pack(&trees, 1, 3)?;
        for (tree, root) in trees.iter().zip(bin.nodes()) {
            let feature = tree.root().feature().unwrap().as_single().unwrap();
            assert_eq!(root.feature() as usize, feature);
        }
        // the second level follows the roots, in tree order
        let mut expected = 3;
        for root in bin.nodes()[..3].iter() {
            for child in [root.left(), root.right()] {
                if bin.is_internal(child) {
                    assert_eq!(child, expected);
                    expected += 1;
                }
            }
        }
        Ok(())
    }

    #[test]
    fn packed_votes_match_the_trees() -> Result<()> {
        let trees = grown_trees(7);
        let bin = PackedBin::pack(&trees, 2, 3)?;
        let mut cursors = Vec::new();

        for a in 0..30 {
            let row = [a as f64 * 2.0, 59.0 - a as f64];
            let mut votes = vec![0; 3];
            bin.vote(|feature| row[feature], &mut cursors, &mut votes);

            let mut expected = vec![0; 3];
            for tree in trees.iter() {
                expected[tree.predict_row(&row)] += 1;
            }
            assert_eq!(votes, expected);
        }
        Ok(())
    }

    #[test]
    fn corrupt_links_are_rejected() -> Result<()> {
        let trees = grown_trees(2);
        let mut bin = PackedBin::pack(&trees, 0, 3)?;
        bin.nodes[0].left = 0;

        let mut bytes = Vec::new();
        bin.write_to(&mut bytes)?;
        let res = PackedBin::read_from(&mut bytes.as_slice());
        assert!(matches!(res, Err(Error::Packing(_))));
        Ok(())
    }
}
