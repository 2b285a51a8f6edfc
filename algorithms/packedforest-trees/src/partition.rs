//! Observation bookkeeping of a growing tree
//!
//! Every tree owns one buffer of in-bag observation indices, grouped by class, and one buffer of
//! out-of-bag indices. A node owns a contiguous range of each class group and of the out-of-bag
//! buffer. Splitting a node partitions its ranges in place, the children own the two halves.

use std::ops::Range;

use packedforest::Mwc;

use crate::impurity::ClassTotals;

/// The ranges of the observation buffers owned by one node
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeRange {
    classes: Vec<Range<usize>>,
    out_of_bag: Range<usize>,
}

impl NodeRange {
    /// Number of in-bag observations
    pub fn in_bag_size(&self) -> usize {
        self.classes.iter().map(|r| r.len()).sum()
    }

    pub fn out_of_bag_size(&self) -> usize {
        self.out_of_bag.len()
    }

    pub fn class_totals(&self) -> ClassTotals {
        ClassTotals::from_counts(self.classes.iter().map(|r| r.len()).collect())
    }
}

/// In-bag and out-of-bag observations of one tree
#[derive(Clone, Debug, Default)]
pub struct ObservationBuffer {
    in_bag: Vec<usize>,
    out_of_bag: Vec<usize>,
}

impl ObservationBuffer {
    /// Draws a bootstrap sample of `num_obs` observations with replacement
    ///
    /// Observations never drawn are out of bag. In-bag observations are grouped by class, so
    /// each class of the root range is one contiguous run.
    ///
    /// ### Returns
    ///
    /// The buffer and the range of the root node
    pub fn bootstrap<L: Fn(usize) -> usize>(
        num_obs: usize,
        num_classes: usize,
        label: L,
        rng: &mut Mwc,
    ) -> (Self, NodeRange) {
        let mut potential: Vec<usize> = (0..num_obs).collect();
        let mut num_unused = num_obs;
        let mut by_class = vec![Vec::new(); num_classes];

        for _ in 0..num_obs {
            let drawn = rng.gen_range(num_obs);
            let obs = potential[drawn];
            by_class[label(obs)].push(obs);
            // observations drawn the first time move behind the unused prefix
            if drawn < num_unused {
                num_unused -= 1;
                potential.swap(drawn, num_unused);
            }
        }
        potential.truncate(num_unused);

        let mut in_bag = Vec::with_capacity(num_obs);
        let mut classes = Vec::with_capacity(num_classes);
        for members in by_class {
            let start = in_bag.len();
            in_bag.extend(members);
            classes.push(start..in_bag.len());
        }

        let root = NodeRange {
            classes,
            out_of_bag: 0..potential.len(),
        };
        let buffer = ObservationBuffer {
            in_bag,
            out_of_bag: potential,
        };
        (buffer, root)
    }

    /// Draws `in_bag_fraction` of the observations without replacement, the rest are out of bag
    ///
    /// Used by the unsupervised forests, all observations share class 0.
    pub fn subsample(num_obs: usize, in_bag_fraction: f64, rng: &mut Mwc) -> (Self, NodeRange) {
        let mut order: Vec<usize> = (0..num_obs).collect();
        let num_in_bag = ((num_obs as f64 * in_bag_fraction) as usize).min(num_obs);
        for location in 0..num_in_bag {
            let other = rng.gen_range(num_obs - location) + location;
            order.swap(location, other);
        }
        let out_of_bag = order.split_off(num_in_bag);

        let root = NodeRange {
            classes: vec![0..order.len()],
            out_of_bag: 0..out_of_bag.len(),
        };
        (
            ObservationBuffer {
                in_bag: order,
                out_of_bag,
            },
            root,
        )
    }

    /// Puts every observation in bag once, nothing is out of bag
    #[cfg(test)]
    pub(crate) fn all<L: Fn(usize) -> usize>(
        num_obs: usize,
        num_classes: usize,
        label: L,
    ) -> (Self, NodeRange) {
        let mut in_bag = Vec::with_capacity(num_obs);
        let mut classes = Vec::with_capacity(num_classes);
        for class in 0..num_classes {
            let start = in_bag.len();
            in_bag.extend((0..num_obs).filter(|&obs| label(obs) == class));
            classes.push(start..in_bag.len());
        }
        (
            ObservationBuffer {
                in_bag,
                out_of_bag: Vec::new(),
            },
            NodeRange {
                classes,
                out_of_bag: 0..0,
            },
        )
    }

    /// In-bag observations of `class` in the node
    pub fn class_observations(&self, range: &NodeRange, class: usize) -> &[usize] {
        &self.in_bag[range.classes[class].clone()]
    }

    /// In-bag observations of the node as `(observation, class)`
    pub fn in_bag(&self, range: &NodeRange) -> impl Iterator<Item = (usize, usize)> + '_ {
        let classes = range.classes.clone();
        classes
            .into_iter()
            .enumerate()
            .flat_map(move |(class, r)| self.in_bag[r].iter().map(move |&obs| (obs, class)))
    }

    pub fn out_of_bag(&self, range: &NodeRange) -> &[usize] {
        &self.out_of_bag[range.out_of_bag.clone()]
    }

    /// Appends a class stratified sample of the node's in-bag observations to `out`
    ///
    /// Each class contributes `sample_size · count / total` observations drawn uniformly with
    /// replacement.
    pub fn sample_in_bag(
        &self,
        range: &NodeRange,
        sample_size: usize,
        rng: &mut Mwc,
        out: &mut Vec<(usize, usize)>,
    ) {
        let total = range.in_bag_size();
        if total == 0 {
            return;
        }
        for (class, r) in range.classes.iter().enumerate() {
            let members = &self.in_bag[r.clone()];
            if members.is_empty() {
                continue;
            }
            let draws = sample_size * members.len() / total;
            for _ in 0..draws {
                out.push((members[rng.gen_range(members.len())], class));
            }
        }
    }

    /// Partitions the node's observations, those for which `goes_left` holds move to the front
    ///
    /// ### Returns
    ///
    /// The ranges of the left and the right child
    pub fn split<P: Fn(usize) -> bool>(
        &mut self,
        range: &NodeRange,
        goes_left: P,
    ) -> (NodeRange, NodeRange) {
        let mut left = Vec::with_capacity(range.classes.len());
        let mut right = Vec::with_capacity(range.classes.len());
        for r in range.classes.iter() {
            let mid = partition_in_place(&mut self.in_bag[r.clone()], &goes_left) + r.start;
            left.push(r.start..mid);
            right.push(mid..r.end);
        }

        let r = range.out_of_bag.clone();
        let mid = partition_in_place(&mut self.out_of_bag[r.clone()], &goes_left) + r.start;

        (
            NodeRange {
                classes: left,
                out_of_bag: r.start..mid,
            },
            NodeRange {
                classes: right,
                out_of_bag: mid..r.end,
            },
        )
    }
}

fn partition_in_place<P: Fn(usize) -> bool>(slice: &mut [usize], goes_left: &P) -> usize {
    let mut boundary = 0;
    for idx in 0..slice.len() {
        if goes_left(slice[idx]) {
            slice.swap(boundary, idx);
            boundary += 1;
        }
    }
    boundary
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn bootstrap_groups_by_class_and_tracks_out_of_bag() {
        let labels = [0, 1, 2, 0, 1, 2, 0, 1, 2, 0];
        let mut rng = Mwc::from_seed(17);
        let (buffer, root) = ObservationBuffer::bootstrap(10, 3, |obs| labels[obs], &mut rng);

        assert_eq!(root.in_bag_size(), 10);
        for class in 0..3 {
            assert!(buffer
                .class_observations(&root, class)
                .iter()
                .all(|&obs| labels[obs] == class));
        }

        let drawn: HashSet<usize> = buffer.in_bag(&root).map(|(obs, _)| obs).collect();
        let unused: HashSet<usize> = buffer.out_of_bag(&root).iter().copied().collect();
        assert!(drawn.is_disjoint(&unused));
        assert_eq!(drawn.len() + unused.len(), 10);
        assert_eq!(root.out_of_bag_size(), unused.len());
    }

    #[test]
    fn split_partitions_every_range() {
        let labels = [0, 1, 0, 1, 0, 1, 0, 1];
        let mut rng = Mwc::from_seed(2);
        let (mut buffer, root) = ObservationBuffer::bootstrap(8, 2, |obs| labels[obs], &mut rng);

        let (left, right) = buffer.split(&root, |obs| obs < 4);
        assert_eq!(left.in_bag_size() + right.in_bag_size(), root.in_bag_size());
        assert_eq!(
            left.out_of_bag_size() + right.out_of_bag_size(),
            root.out_of_bag_size()
        );
        assert!(buffer.in_bag(&left).all(|(obs, class)| obs < 4 && labels[obs] == class));
        assert!(buffer.in_bag(&right).all(|(obs, class)| obs >= 4 && labels[obs] == class));
        assert!(buffer.out_of_bag(&left).iter().all(|&obs| obs < 4));
        assert!(buffer.out_of_bag(&right).iter().all(|&obs| obs >= 4));
    }

    #[test]
    fn subsample_without_replacement() {
        let mut rng = Mwc::from_seed(8);
        let (buffer, root) = ObservationBuffer::subsample(50, 0.8, &mut rng);
        assert_eq!(root.in_bag_size(), 40);
        assert_eq!(root.out_of_bag_size(), 10);

        let all: HashSet<usize> = buffer
            .in_bag(&root)
            .map(|(obs, _)| obs)
            .chain(buffer.out_of_bag(&root).iter().copied())
            .collect();
        assert_eq!(all.len(), 50);
    }

    #[test]
    fn node_sample_is_stratified() {
        let labels: Vec<usize> = (0..100).map(|i| if i < 75 { 0 } else { 1 }).collect();
        let mut rng = Mwc::from_seed(4);
        let (buffer, root) = ObservationBuffer::bootstrap(100, 2, |obs| labels[obs], &mut rng);
        let totals = root.class_totals();

        let mut sample = Vec::new();
        buffer.sample_in_bag(&root, 20, &mut rng, &mut sample);
        let zeros = sample.iter().filter(|(_, class)| *class == 0).count();
        assert_eq!(zeros, 20 * totals.count(0) / totals.total());
        assert_eq!(sample.len() - zeros, 20 * totals.count(1) / totals.total());
        assert!(sample.iter().all(|&(obs, class)| labels[obs] == class));
    }
}
